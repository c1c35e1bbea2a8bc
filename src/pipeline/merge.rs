//! PDF merging: per-page PDFs → one document with a nested outline.
//!
//! Parts are appended strictly in manifest order. Entries whose PDF is
//! missing or unusable are skipped with a warning and listed in the report;
//! only "nothing at all to merge" is fatal. The work is CPU-bound, so the
//! async entry point hands it to `spawn_blocking`.

use crate::config::MergeConfig;
use crate::error::{EntryError, PageBindError};
use crate::manifest::{write_atomic, Manifest, ManifestEntry};
use crate::output::{MergeReport, MergedEntry, OutlineNode};
use crate::pipeline::outline::{build_outline, encode_text_string, write_outline, OutlineItem};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use std::path::Path;
use tracing::{debug, info, warn};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// How far up the page tree inheritance is followed.
const MAX_TREE_DEPTH: usize = 32;

/// Merge the PDFs of `manifest` found in `pdf_dir` into `output`.
pub async fn merge_pdfs(
    manifest: &Manifest,
    pdf_dir: &Path,
    output: &Path,
    config: &MergeConfig,
) -> Result<MergeReport, PageBindError> {
    let manifest = manifest.clone();
    let pdf_dir = pdf_dir.to_path_buf();
    let output = output.to_path_buf();
    let config = config.clone();
    tokio::task::spawn_blocking(move || merge_pdfs_blocking(&manifest, &pdf_dir, &output, &config))
        .await
        .map_err(|e| PageBindError::Internal(format!("merge task panicked: {e}")))?
}

/// A loaded part waiting to be appended.
struct Part<'a> {
    index: usize,
    entry: &'a ManifestEntry,
    doc: Document,
}

/// Blocking implementation of [`merge_pdfs`].
pub fn merge_pdfs_blocking(
    manifest: &Manifest,
    pdf_dir: &Path,
    output: &Path,
    config: &MergeConfig,
) -> Result<MergeReport, PageBindError> {
    if !pdf_dir.is_dir() {
        return Err(PageBindError::PdfDirMissing {
            path: pdf_dir.to_path_buf(),
        });
    }

    let mut parts = Vec::new();
    let mut missing = Vec::new();
    let mut failed = Vec::new();

    for (index, entry) in manifest.entries().enumerate() {
        let path = entry.pdf_path(pdf_dir);
        match load_part(&path, entry) {
            Ok(doc) => parts.push(Part { index, entry, doc }),
            Err(e @ EntryError::MissingPdf { .. }) => {
                warn!("{}", e);
                missing.push(e);
            }
            Err(e) => {
                warn!("{}", e);
                failed.push(e);
            }
        }
    }

    if parts.is_empty() {
        return Err(PageBindError::NothingToMerge {
            missing: missing.len(),
            failed: failed.len(),
        });
    }

    let merged = assemble(parts, config)?;
    let bytes = merged.bytes;
    write_atomic(output, &bytes)?;

    info!(
        "Merged {} PDF(s), {} page(s) → {}",
        merged.included.len(),
        merged.page_count,
        output.display()
    );

    Ok(MergeReport {
        output_path: output.to_path_buf(),
        file_size: bytes.len() as u64,
        page_count: merged.page_count,
        included: merged.included,
        missing,
        failed,
        outline: merged.outline,
    })
}

fn load_part(path: &Path, entry: &ManifestEntry) -> Result<Document, EntryError> {
    let corrupt = |detail: String| EntryError::CorruptPdf {
        file_name: entry.pdf_file_name(),
        detail,
    };
    if !path.is_file() {
        return Err(EntryError::MissingPdf {
            title: entry.title.clone(),
            file_name: entry.pdf_file_name(),
        });
    }
    let doc = Document::load(path).map_err(|e| corrupt(e.to_string()))?;
    if doc.is_encrypted() {
        return Err(corrupt("document is encrypted".into()));
    }
    if doc.get_pages().is_empty() {
        return Err(corrupt("document has no pages".into()));
    }
    debug!("Loaded {} ({} pages)", path.display(), doc.get_pages().len());
    Ok(doc)
}

struct Assembled {
    bytes: Vec<u8>,
    page_count: usize,
    included: Vec<MergedEntry>,
    outline: Vec<OutlineNode>,
}

fn assemble(parts: Vec<Part<'_>>, config: &MergeConfig) -> Result<Assembled, PageBindError> {
    let mut target = Document::with_version("1.7");
    let mut next_id: u32 = 1;
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut included = Vec::new();
    let mut items = Vec::new();

    for Part { index, entry, mut doc } in parts {
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        let start_page = pages.len();
        let page_ids: Vec<ObjectId> = doc.get_pages().values().copied().collect();
        for page_id in &page_ids {
            if let Ok(page) = doc.get_dictionary(*page_id) {
                pages.push((*page_id, materialize_inherited(&doc, page)));
            }
        }
        let page_count = pages.len() - start_page;

        for (id, object) in doc.objects {
            if !matches!(dict_type(&object), Some(b"Catalog" | b"Pages" | b"Page" | b"Outlines")) {
                target.objects.insert(id, object);
            }
        }

        items.push(OutlineItem {
            title: entry.title.clone(),
            level: entry.level,
            page_index: start_page,
        });
        included.push(MergedEntry {
            index,
            title: entry.title.clone(),
            file_name: entry.pdf_file_name(),
            start_page,
            page_count,
        });
    }

    target.max_id = next_id;
    let pages_id = target.new_object_id();
    let page_ids: Vec<ObjectId> = pages.iter().map(|(id, _)| *id).collect();
    for (id, mut page) in pages {
        page.set("Parent", pages_id);
        target.objects.insert(id, Object::Dictionary(page));
    }
    target.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
            "Count" => page_ids.len() as i64,
        }),
    );

    let outline = build_outline(&items);
    let mut catalog = dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    };
    if let Some(outlines_id) = write_outline(&mut target, &outline, &page_ids) {
        catalog.set("Outlines", outlines_id);
        catalog.set("PageMode", Object::Name(b"UseOutlines".to_vec()));
    }
    let catalog_id = target.add_object(catalog);
    target.trailer.set("Root", catalog_id);

    let mut info = dictionary! {
        "Producer" => encode_text_string(concat!("pagebind ", env!("CARGO_PKG_VERSION"))),
    };
    if let Some(title) = config.title.as_deref() {
        info.set("Title", encode_text_string(title));
    }
    let info_id = target.add_object(info);
    target.trailer.set("Info", info_id);

    target.prune_objects();
    target.renumber_objects();
    if config.compress {
        target.compress();
    }

    let mut bytes = Vec::new();
    target
        .save_to(&mut bytes)
        .map_err(|e| PageBindError::Internal(format!("PDF serialisation failed: {e}")))?;

    Ok(Assembled {
        bytes,
        page_count: page_ids.len(),
        included,
        outline,
    })
}

/// Copy of `page` with inherited attributes made explicit, so the page
/// keeps its size and resources once re-parented.
fn materialize_inherited(doc: &Document, page: &Dictionary) -> Dictionary {
    let mut page = page.clone();
    for key in INHERITABLE {
        if page.has(key) {
            continue;
        }
        if let Some(value) = inherited(doc, &page, key) {
            page.set(key.to_vec(), value);
        }
    }
    page
}

fn inherited(doc: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut node = page;
    for _ in 0..MAX_TREE_DEPTH {
        let parent_id = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent_id).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
    }
    None
}

fn dict_type(object: &Object) -> Option<&[u8]> {
    match object {
        Object::Dictionary(d) => match d.get(b"Type") {
            Ok(Object::Name(name)) => Some(name.as_slice()),
            _ => None,
        },
        _ => None,
    }
}
