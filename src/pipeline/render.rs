//! Page rendering: one URL → one PDF file via headless Chrome.
//!
//! Every render launches its own browser with a private profile and tears it
//! down afterwards, whatever happened in between. Nothing escapes as an
//! `Err`: launch, navigation, export and write failures all come back inside
//! [`RenderResult`] so a batch can carry on.
//!
//! ```text
//! launch ─▶ navigate ─▶ load + network idle ─▶ [selector: reveal, measure,
//!   isolate, clip] ─▶ Page.printToPDF ─▶ atomic write ─▶ close
//! ```

use crate::cdp::network::{wait_for_load_and_idle, LoadState, NetworkIdleTracker};
use crate::cdp::{Browser, PageSession, PrintToPdfParams};
use crate::config::RenderConfig;
use crate::error::EntryError;
use crate::manifest::write_atomic;
use crate::output::{RenderRequest, RenderResult};
use crate::scripts::{self, ElementBox};
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pause between selector probes.
const SELECTOR_POLL: Duration = Duration::from_millis(100);

/// Something that turns a [`RenderRequest`] into a PDF on disk.
///
/// The batch renderer only talks to this trait, so tests and embedders can
/// substitute their own implementation.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> RenderResult;
}

/// [`PageRenderer`] backed by a freshly launched Chrome per call.
#[derive(Debug, Clone)]
pub struct ChromeRenderer {
    config: RenderConfig,
}

impl ChromeRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }
}

#[async_trait]
impl PageRenderer for ChromeRenderer {
    async fn render(&self, request: &RenderRequest) -> RenderResult {
        let started = Instant::now();
        info!("Rendering {} → {}", request.url, request.file_name);

        if let Err(e) = tokio::fs::create_dir_all(&request.output_dir).await {
            return RenderResult::failed(
                &request.file_name,
                EntryError::Write {
                    path: request.output_dir.display().to_string(),
                    detail: e.to_string(),
                },
            );
        }

        let browser = match Browser::launch(&self.config).await {
            Ok(b) => b,
            Err(e) => {
                warn!("Browser launch failed: {}", e);
                return RenderResult::failed(
                    &request.file_name,
                    EntryError::BrowserLaunch { detail: e.to_string() },
                );
            }
        };

        let result = render_in_browser(&browser, request, &self.config).await;
        browser.close().await;

        match &result.error {
            None => debug!(
                "Rendered {} in {}ms",
                request.file_name,
                started.elapsed().as_millis()
            ),
            Some(e) => warn!("Render of {} failed: {}", request.url, e),
        }
        result
    }
}

async fn render_in_browser(browser: &Browser, request: &RenderRequest, config: &RenderConfig) -> RenderResult {
    let page = match browser.new_page().await {
        Ok(p) => p,
        Err(e) => {
            return RenderResult::failed(
                &request.file_name,
                EntryError::BrowserLaunch {
                    detail: format!("could not open a tab: {e}"),
                },
            )
        }
    };

    match render_page(&page, request, config).await {
        Ok(result) => result,
        Err(e) => RenderResult::failed(&request.file_name, e),
    }
}

async fn render_page(
    page: &PageSession,
    request: &RenderRequest,
    config: &RenderConfig,
) -> Result<RenderResult, EntryError> {
    let export_err = |e: crate::cdp::CdpError| EntryError::Export { detail: e.to_string() };
    let mut warnings = Vec::new();

    let (width, height) = config.viewport;
    page.set_viewport(width, height).await.map_err(export_err)?;

    let _auth = match config.proxy.as_ref().and_then(|p| p.credentials()) {
        Some((user, pass)) => Some(page.enable_proxy_auth(user, pass).await.map_err(export_err)?),
        None => None,
    };

    // ── Navigate and wait ─────────────────────────────────────────────────
    let mut events = page.events();
    let mut tracker = NetworkIdleTracker::new(config.network_idle_max_inflight, config.network_idle(), Instant::now());
    let nav_error = |detail: String| EntryError::Navigation {
        url: request.url.clone(),
        detail,
    };
    match page.navigate(&request.url).await {
        Ok(Ok(())) => {}
        Ok(Err(reason)) => return Err(nav_error(reason)),
        Err(e) => return Err(nav_error(e.to_string())),
    }

    match wait_for_load_and_idle(&mut events, page.session_id(), &mut tracker, config.navigation_timeout()).await {
        LoadState::Idle => debug!("{} loaded and idle", request.url),
        LoadState::LoadedBusy => {
            let note = format!(
                "network did not become idle within {}s; exported anyway",
                config.navigation_timeout_secs
            );
            warn!("{}: {}", request.url, note);
            warnings.push(note);
        }
        LoadState::NotLoaded => {
            return Err(EntryError::NavigationTimeout {
                url: request.url.clone(),
                secs: config.navigation_timeout_secs,
            })
        }
    }
    drop(events);

    // ── Optional element clip ─────────────────────────────────────────────
    let mut clipped = false;
    if let Some(selector) = request.selector.as_deref() {
        match clip_to_selector(page, selector, config).await {
            Ok(ClipOutcome::Clipped) => clipped = true,
            Ok(ClipOutcome::Fallback(note)) => {
                warn!("{}: {}", request.url, note);
                warnings.push(note);
            }
            Err(e) => return Err(export_err(e)),
        }
    }

    // ── Export and write ──────────────────────────────────────────────────
    let params = PrintToPdfParams::new(
        config.paper_width_in,
        config.paper_height_in,
        config.margin_in,
        config.print_background,
    );
    let pdf = page.print_to_pdf(&params).await.map_err(export_err)?;
    if pdf.is_empty() {
        return Err(EntryError::EmptyOutput {
            file_name: request.file_name.clone(),
        });
    }

    let path = request.output_path();
    write_pdf(&path, pdf).await?;

    Ok(RenderResult::succeeded(&request.file_name, path, clipped, warnings))
}

#[derive(Debug, PartialEq)]
enum ClipOutcome {
    Clipped,
    /// Full page exported; the note says why.
    Fallback(String),
}

async fn clip_to_selector(
    page: &PageSession,
    selector: &str,
    config: &RenderConfig,
) -> Result<ClipOutcome, crate::cdp::CdpError> {
    let arg = [Value::String(selector.to_string())];

    let probe = wait_for_selector(page, selector, config.selector_timeout()).await?;
    if let Some(fallback) = probe_fallback(probe, selector, config.selector_timeout_secs) {
        return Ok(fallback);
    }

    let measured = page.run_script(scripts::REVEAL_AND_MEASURE, &arg).await?;
    let region = match clip_region(measured, selector) {
        Ok(region) => region,
        Err(fallback) => return Ok(fallback),
    };

    let hidden = page.run_script(scripts::ISOLATE_ELEMENT, &arg).await?;
    debug!("hid {} sibling subtree(s) around '{}'", hidden, selector);
    let region_arg = serde_json::to_value(region)?;
    page.run_script(scripts::CLIP_TO_REGION, &[region_arg]).await?;
    Ok(ClipOutcome::Clipped)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectorProbe {
    Present,
    Missing,
    Invalid,
}

/// Read one `SELECTOR_PRESENT` result; `None` means keep polling.
fn read_probe(value: &Value) -> Option<SelectorProbe> {
    match value {
        Value::Bool(true) => Some(SelectorProbe::Present),
        Value::Null => Some(SelectorProbe::Invalid),
        _ => None,
    }
}

/// The fallback for a selector that cannot be clipped to, if any.
fn probe_fallback(probe: SelectorProbe, selector: &str, timeout_secs: u64) -> Option<ClipOutcome> {
    match probe {
        SelectorProbe::Present => None,
        SelectorProbe::Invalid => Some(ClipOutcome::Fallback(format!(
            "selector '{selector}' is not valid CSS; exported full page"
        ))),
        SelectorProbe::Missing => Some(ClipOutcome::Fallback(
            EntryError::SelectorNotFound {
                selector: selector.to_string(),
                secs: timeout_secs,
            }
            .to_string(),
        )),
    }
}

/// The clip region from a `REVEAL_AND_MEASURE` result, or the fallback when
/// the element is detached or has no visible size.
fn clip_region(measured: Value, selector: &str) -> Result<ElementBox, ClipOutcome> {
    serde_json::from_value::<Option<ElementBox>>(measured)
        .ok()
        .flatten()
        .map(ElementBox::clamped)
        .filter(|b| !b.is_empty())
        .ok_or_else(|| ClipOutcome::Fallback(format!("element '{selector}' has no size; exported full page")))
}

async fn wait_for_selector(
    page: &PageSession,
    selector: &str,
    timeout: Duration,
) -> Result<SelectorProbe, crate::cdp::CdpError> {
    let deadline = Instant::now() + timeout;
    let arg = [Value::String(selector.to_string())];
    loop {
        let value = page.run_script(scripts::SELECTOR_PRESENT, &arg).await?;
        if let Some(probe) = read_probe(&value) {
            return Ok(probe);
        }
        if Instant::now() >= deadline {
            return Ok(SelectorProbe::Missing);
        }
        tokio::time::sleep(SELECTOR_POLL).await;
    }
}

async fn write_pdf(path: &Path, pdf: Vec<u8>) -> Result<(), EntryError> {
    let target = path.to_path_buf();
    let write_err = |detail: String| EntryError::Write {
        path: path.display().to_string(),
        detail,
    };
    tokio::task::spawn_blocking(move || write_atomic(&target, &pdf))
        .await
        .map_err(|e| write_err(format!("write task panicked: {e}")))?
        .map_err(|e| write_err(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_pdf_creates_file_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub/Example Domain.pdf");
        write_pdf(&path, b"%PDF-1.7 test".to_vec()).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7 test");
    }

    #[tokio::test]
    async fn missing_browser_is_reported_as_data() {
        let dir = tempfile::tempdir().unwrap();
        let config = RenderConfig::builder()
            .chrome_path(dir.path().join("no-such-chrome"))
            .build()
            .unwrap();
        let renderer = ChromeRenderer::new(config);
        let request = RenderRequest::new("https://example.com", "Example Domain.pdf", dir.path().join("out"));

        let result = renderer.render(&request).await;

        assert!(!result.success);
        assert!(matches!(result.error, Some(EntryError::BrowserLaunch { .. })));
        assert!(!request.output_path().exists());
    }

    // ── Selector fallback ────────────────────────────────────────────────

    fn note(outcome: Option<ClipOutcome>) -> String {
        match outcome {
            Some(ClipOutcome::Fallback(note)) => note,
            other => panic!("expected a fallback, got {other:?}"),
        }
    }

    #[test]
    fn probe_results_map_to_selector_states() {
        assert_eq!(read_probe(&Value::Bool(true)), Some(SelectorProbe::Present));
        assert_eq!(read_probe(&Value::Null), Some(SelectorProbe::Invalid));
        assert_eq!(read_probe(&Value::Bool(false)), None);
    }

    #[test]
    fn present_selector_proceeds_to_clip() {
        assert_eq!(probe_fallback(SelectorProbe::Present, "main", 10), None);
    }

    #[test]
    fn missing_selector_falls_back_with_warning() {
        let note = note(probe_fallback(SelectorProbe::Missing, "#content", 10));
        assert!(note.contains("#content"), "{note}");
        assert!(note.contains("10"), "{note}");
    }

    #[test]
    fn invalid_selector_falls_back_with_warning() {
        let note = note(probe_fallback(SelectorProbe::Invalid, "div[", 10));
        assert!(note.contains("div["), "{note}");
        assert!(note.contains("not valid CSS"), "{note}");
    }

    #[test]
    fn zero_size_or_detached_element_falls_back() {
        let zero = serde_json::json!({ "x": 10.0, "y": 20.0, "width": 0.0, "height": 300.0 });
        let offscreen = serde_json::json!({ "x": -500.0, "y": 0.0, "width": 400.0, "height": 300.0 });
        for measured in [zero, offscreen, Value::Null, serde_json::json!("garbage")] {
            match clip_region(measured, "main") {
                Err(ClipOutcome::Fallback(note)) => assert!(note.contains("'main' has no size"), "{note}"),
                other => panic!("expected a fallback, got {other:?}"),
            }
        }
    }

    #[test]
    fn visible_element_yields_clamped_region() {
        let measured = serde_json::json!({ "x": -8.0, "y": 40.0, "width": 808.0, "height": 600.0 });
        let region = clip_region(measured, "main").unwrap();
        assert_eq!(
            region,
            ElementBox {
                x: 0.0,
                y: 40.0,
                width: 800.0,
                height: 600.0
            }
        );
    }
}
