//! In-page JavaScript payloads used while rendering.
//!
//! Each payload is a single arrow function kept as data. The renderer never
//! splices user input into script text: arguments are JSON-encoded and
//! passed positionally through [`invocation`]. Bump [`SCRIPT_VERSION`]
//! whenever a payload's contract (arguments or return shape) changes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SCRIPT_VERSION: u32 = 2;

/// `(selector) -> true | false | null`; `null` when the selector is invalid.
pub const SELECTOR_PRESENT: &str = r#"(selector) => {
  try {
    return document.querySelector(selector) !== null;
  } catch (e) {
    return null;
  }
}"#;

/// `(selector) -> {x, y, width, height} | null`
///
/// Makes the element and every ancestor visible, then measures the element
/// in document coordinates.
pub const REVEAL_AND_MEASURE: &str = r#"(selector) => {
  const el = document.querySelector(selector);
  if (!el || !el.isConnected) return null;
  for (let n = el; n && n.nodeType === 1; n = n.parentElement) {
    if (getComputedStyle(n).display === 'none') {
      n.style.setProperty('display', 'revert', 'important');
      if (getComputedStyle(n).display === 'none') {
        n.style.setProperty('display', 'block', 'important');
      }
    }
    const cs = getComputedStyle(n);
    if (cs.visibility !== 'visible') n.style.setProperty('visibility', 'visible', 'important');
    if (cs.opacity !== '1') n.style.setProperty('opacity', '1', 'important');
  }
  const r = el.getBoundingClientRect();
  return {
    x: r.left + window.scrollX,
    y: r.top + window.scrollY,
    width: r.width,
    height: r.height
  };
}"#;

/// `(selector) -> number of hidden sibling subtrees`
///
/// Walks from the element up to `body`, hiding every sibling at each level
/// with `visibility:hidden` so layout stays untouched.
pub const ISOLATE_ELEMENT: &str = r#"(selector) => {
  const el = document.querySelector(selector);
  if (!el) return 0;
  let hidden = 0;
  for (let n = el; n && n !== document.body && n.parentElement; n = n.parentElement) {
    for (const sib of n.parentElement.children) {
      if (sib === n) continue;
      sib.style.setProperty('visibility', 'hidden', 'important');
      hidden++;
    }
  }
  el.style.setProperty('visibility', 'visible', 'important');
  return hidden;
}"#;

/// `({x, y, width, height}) -> true`
///
/// Shifts the body so the region starts at the page origin and cuts the
/// document height to the region.
pub const CLIP_TO_REGION: &str = r#"(rect) => {
  const html = document.documentElement;
  const body = document.body;
  window.scrollTo(0, 0);
  html.style.setProperty('height', rect.height + 'px', 'important');
  html.style.setProperty('overflow', 'hidden', 'important');
  body.style.setProperty('position', 'relative', 'important');
  body.style.setProperty('left', (-rect.x) + 'px', 'important');
  body.style.setProperty('top', (-rect.y) + 'px', 'important');
  return true;
}"#;

/// Build an expression applying `script` to JSON-encoded `args`.
pub fn invocation(script: &str, args: &[Value]) -> String {
    let args = args
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("({script})({args})")
}

/// An element's box in document coordinates (CSS pixels).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ElementBox {
    /// Clamp the origin to the document (≥ 0), shrinking the box by the
    /// part that lay outside.
    pub fn clamped(self) -> Self {
        let (x, width) = if self.x < 0.0 {
            (0.0, self.width + self.x)
        } else {
            (self.x, self.width)
        };
        let (y, height) = if self.y < 0.0 {
            (0.0, self.height + self.y)
        } else {
            (self.y, self.height)
        };
        Self {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width >= 1.0 && self.height >= 1.0) || !self.width.is_finite() || !self.height.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invocation_json_encodes_arguments() {
        let expr = invocation(SELECTOR_PRESENT, &[json!("a[href='x\"y']")]);
        assert!(expr.starts_with("((selector) =>"));
        assert!(expr.ends_with(r#")("a[href='x\"y']")"#), "got: {expr}");
    }

    #[test]
    fn invocation_passes_objects() {
        let rect = ElementBox {
            x: 1.0,
            y: 2.0,
            width: 3.0,
            height: 4.0,
        };
        let expr = invocation(CLIP_TO_REGION, &[serde_json::to_value(rect).unwrap()]);
        assert!(expr.contains(r#""width":3.0"#), "got: {expr}");
    }

    #[test]
    fn clamped_moves_negative_origin() {
        let b = ElementBox {
            x: -10.0,
            y: 5.0,
            width: 100.0,
            height: 50.0,
        }
        .clamped();
        assert_eq!(b.x, 0.0);
        assert_eq!(b.width, 90.0);
        assert_eq!(b.y, 5.0);
        assert!(!b.is_empty());
    }

    #[test]
    fn offscreen_or_zero_boxes_are_empty() {
        let gone = ElementBox {
            x: -200.0,
            y: 0.0,
            width: 100.0,
            height: 20.0,
        }
        .clamped();
        assert!(gone.is_empty());
        let zero = ElementBox {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
        };
        assert!(zero.is_empty());
    }
}
