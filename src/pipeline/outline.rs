//! PDF outline (bookmark) trees: build from manifest levels, write into a
//! document, and read back out of an existing file.

use crate::error::PageBindError;
use crate::output::{OutlineNode, PdfSummary};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, StringFormat};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// Deepest outline nesting followed when reading a file.
const MAX_READ_DEPTH: usize = 64;

/// A flat bookmark before nesting is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineItem {
    pub title: String,
    pub level: usize,
    pub page_index: usize,
}

/// Nest `items` by level. An item becomes a child of the closest earlier
/// item with a smaller level, so a missing parent is replaced by the nearest
/// ancestor that is present.
pub fn build_outline(items: &[OutlineItem]) -> Vec<OutlineNode> {
    let mut slots: Vec<(OutlineNode, Vec<usize>)> = Vec::with_capacity(items.len());
    let mut roots: Vec<usize> = Vec::new();
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for item in items {
        while stack.last().is_some_and(|(level, _)| *level >= item.level) {
            stack.pop();
        }
        let id = slots.len();
        slots.push((OutlineNode::new(item.title.clone(), item.page_index), Vec::new()));
        match stack.last() {
            Some(&(_, parent)) => slots[parent].1.push(id),
            None => roots.push(id),
        }
        stack.push((item.level, id));
    }

    fn assemble(slots: &[(OutlineNode, Vec<usize>)], id: usize) -> OutlineNode {
        let (node, children) = &slots[id];
        OutlineNode {
            title: node.title.clone(),
            page_index: node.page_index,
            children: children.iter().map(|&c| assemble(slots, c)).collect(),
        }
    }

    roots.iter().map(|&id| assemble(&slots, id)).collect()
}

// ── Writing ──────────────────────────────────────────────────────────────────

/// Add `nodes` to `doc` as an `/Outlines` tree and return its root object.
///
/// `page_ids[i]` is the object of page `i`; every bookmark jumps to its page
/// with a `[page /Fit]` destination.
pub fn write_outline(doc: &mut Document, nodes: &[OutlineNode], page_ids: &[ObjectId]) -> Option<ObjectId> {
    if nodes.is_empty() || page_ids.is_empty() {
        return None;
    }
    let root_id = doc.new_object_id();
    let (first, last, count) = write_siblings(doc, nodes, root_id, page_ids);
    doc.objects.insert(
        root_id,
        Object::Dictionary(dictionary! {
            "Type" => "Outlines",
            "First" => first,
            "Last" => last,
            "Count" => count,
        }),
    );
    Some(root_id)
}

/// Returns (first, last, visible item count) for the sibling list.
fn write_siblings(
    doc: &mut Document,
    nodes: &[OutlineNode],
    parent: ObjectId,
    page_ids: &[ObjectId],
) -> (ObjectId, ObjectId, i64) {
    let ids: Vec<ObjectId> = nodes.iter().map(|_| doc.new_object_id()).collect();
    let mut visible = 0i64;

    for (i, node) in nodes.iter().enumerate() {
        let page = page_ids[node.page_index.min(page_ids.len() - 1)];
        let mut item = dictionary! {
            "Title" => encode_text_string(&node.title),
            "Parent" => parent,
            "Dest" => vec![Object::Reference(page), Object::Name(b"Fit".to_vec())],
        };
        if i > 0 {
            item.set("Prev", ids[i - 1]);
        }
        if i + 1 < ids.len() {
            item.set("Next", ids[i + 1]);
        }
        if !node.children.is_empty() {
            let (first, last, count) = write_siblings(doc, &node.children, ids[i], page_ids);
            item.set("First", first);
            item.set("Last", last);
            item.set("Count", count);
            visible += count;
        }
        visible += 1;
        doc.objects.insert(ids[i], Object::Dictionary(item));
    }

    (ids[0], ids[ids.len() - 1], visible)
}

/// Encode a PDF text string: literal for ASCII, UTF-16BE with BOM otherwise.
pub fn encode_text_string(s: &str) -> Object {
    if s.is_ascii() {
        Object::String(s.as_bytes().to_vec(), StringFormat::Literal)
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in s.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

/// Decode a PDF text string (UTF-16BE with BOM, UTF-8 with BOM, or
/// single-byte).
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        String::from_utf8_lossy(rest).into_owned()
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

// ── Reading ──────────────────────────────────────────────────────────────────

/// Read the page count and outline of the PDF at `path`.
pub fn read_summary(path: &Path) -> Result<PdfSummary, PageBindError> {
    let doc = Document::load(path).map_err(|e| PageBindError::CorruptPdf {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    Ok(summarize(&doc))
}

/// Page count and outline of a loaded document.
pub fn summarize(doc: &Document) -> PdfSummary {
    let page_index: HashMap<ObjectId, usize> = doc
        .get_pages()
        .values()
        .enumerate()
        .map(|(i, id)| (*id, i))
        .collect();

    let outline = root_dictionary(doc)
        .and_then(|root| root.get(b"Outlines").ok())
        .and_then(|o| as_dict(doc, o))
        .and_then(|outlines| outlines.get(b"First").ok())
        .and_then(|first| first.as_reference().ok())
        .map(|first| {
            let mut visited = HashSet::new();
            read_siblings(doc, first, &page_index, &mut visited, 0)
        })
        .unwrap_or_default();

    PdfSummary {
        page_count: page_index.len(),
        outline,
    }
}

fn read_siblings(
    doc: &Document,
    first: ObjectId,
    page_index: &HashMap<ObjectId, usize>,
    visited: &mut HashSet<ObjectId>,
    depth: usize,
) -> Vec<OutlineNode> {
    let mut nodes = Vec::new();
    if depth > MAX_READ_DEPTH {
        return nodes;
    }
    let mut current = Some(first);
    while let Some(id) = current {
        if !visited.insert(id) {
            debug!("outline cycle at {:?}", id);
            break;
        }
        let Ok(item) = doc.get_dictionary(id) else {
            break;
        };
        let title = match item.get(b"Title").ok().map(|t| resolve(doc, t)) {
            Some(Object::String(bytes, _)) => decode_text_string(bytes),
            _ => String::new(),
        };
        let page = destination_page(doc, item, page_index).unwrap_or_else(|| {
            debug!("bookmark '{}' has no resolvable page", title);
            0
        });
        let children = item
            .get(b"First")
            .ok()
            .and_then(|f| f.as_reference().ok())
            .map(|f| read_siblings(doc, f, page_index, visited, depth + 1))
            .unwrap_or_default();

        nodes.push(OutlineNode {
            title,
            page_index: page,
            children,
        });
        current = item.get(b"Next").ok().and_then(|n| n.as_reference().ok());
    }
    nodes
}

/// Page index of an item's `/Dest` or `/A << /S /GoTo /D ... >>`.
fn destination_page(doc: &Document, item: &Dictionary, page_index: &HashMap<ObjectId, usize>) -> Option<usize> {
    let dest = match item.get(b"Dest") {
        Ok(d) => resolve(doc, d),
        Err(_) => {
            let action = as_dict(doc, item.get(b"A").ok()?)?;
            resolve(doc, action.get(b"D").ok()?)
        }
    };
    match dest {
        Object::Array(parts) => match parts.first()? {
            Object::Reference(page) => page_index.get(page).copied(),
            Object::Integer(n) => usize::try_from(*n).ok(),
            _ => None,
        },
        _ => None,
    }
}

fn root_dictionary(doc: &Document) -> Option<&Dictionary> {
    let root = doc.trailer.get(b"Root").ok()?;
    as_dict(doc, root)
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

fn as_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, obj) {
        Object::Dictionary(d) => Some(d),
        _ => None,
    }
}
