//! Result types produced by rendering, batching, merging and inspection.
//!
//! Everything here is plain data: `Serialize` so the CLI can print it as
//! JSON, `Clone` so progress consumers can keep copies.

use crate::error::EntryError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ── Rendering ────────────────────────────────────────────────────────────────

/// One page to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub url: String,
    /// File name inside `output_dir`, `.pdf` suffix included.
    pub file_name: String,
    pub output_dir: PathBuf,
    /// Clip the export to the first element matching this CSS selector.
    pub selector: Option<String>,
}

impl RenderRequest {
    pub fn new(url: impl Into<String>, file_name: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            file_name: file_name.into(),
            output_dir: output_dir.into(),
            selector: None,
        }
    }

    pub fn with_selector(mut self, selector: Option<String>) -> Self {
        self.selector = selector;
        self
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.file_name)
    }
}

/// Outcome of rendering one page. Failures are carried in `error`, never
/// raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderResult {
    pub success: bool,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// The export was clipped to the selected element.
    pub clipped: bool,
    /// Soft failures and other notes (selector missing, network never idle).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EntryError>,
}

impl RenderResult {
    pub fn succeeded(file_name: impl Into<String>, output_path: PathBuf, clipped: bool, warnings: Vec<String>) -> Self {
        Self {
            success: true,
            file_name: file_name.into(),
            output_path: Some(output_path),
            clipped,
            warnings,
            error: None,
        }
    }

    pub fn failed(file_name: impl Into<String>, error: EntryError) -> Self {
        Self {
            success: false,
            file_name: file_name.into(),
            output_path: None,
            clipped: false,
            warnings: Vec::new(),
            error: Some(error),
        }
    }

    /// Human-readable error text, if the render failed.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }
}

// ── Batch ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Rendered,
    /// The PDF already existed and was left alone.
    Skipped,
    Failed,
}

/// What happened to one manifest entry during a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryOutcome {
    /// 0-based manifest position.
    pub index: usize,
    pub title: String,
    pub url: String,
    pub file_name: String,
    pub status: EntryStatus,
    /// Render attempts made (0 when skipped).
    pub attempts: u32,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EntryError>,
}

impl EntryOutcome {
    /// True when the entry's PDF exists after the batch.
    pub fn is_ok(&self) -> bool {
        self.status != EntryStatus::Failed
    }
}

/// Summary of a whole batch, outcomes in manifest order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    pub rendered: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<EntryOutcome>,
}

impl BatchReport {
    pub fn from_outcomes(outcomes: Vec<EntryOutcome>) -> Self {
        let count = |s: EntryStatus| outcomes.iter().filter(|o| o.status == s).count();
        Self {
            total: outcomes.len(),
            rendered: count(EntryStatus::Rendered),
            skipped: count(EntryStatus::Skipped),
            failed: count(EntryStatus::Failed),
            outcomes,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &EntryOutcome> {
        self.outcomes.iter().filter(|o| o.status == EntryStatus::Failed)
    }
}

// ── Merge / inspect ──────────────────────────────────────────────────────────

/// A bookmark in the merged document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineNode {
    pub title: String,
    /// 0-based page the bookmark jumps to.
    pub page_index: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OutlineNode>,
}

impl OutlineNode {
    pub fn new(title: impl Into<String>, page_index: usize) -> Self {
        Self {
            title: title.into(),
            page_index,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, excluding `self`.
    pub fn descendant_count(&self) -> usize {
        self.children.iter().map(|c| 1 + c.descendant_count()).sum()
    }
}

/// A manifest entry whose pages made it into the merged document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedEntry {
    pub index: usize,
    pub title: String,
    pub file_name: String,
    /// 0-based index of the entry's first page in the merged document.
    pub start_page: usize,
    pub page_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
    pub output_path: PathBuf,
    pub file_size: u64,
    pub page_count: usize,
    pub included: Vec<MergedEntry>,
    /// Entries skipped because their PDF was absent.
    pub missing: Vec<EntryError>,
    /// Entries skipped because their PDF could not be used.
    pub failed: Vec<EntryError>,
    pub outline: Vec<OutlineNode>,
}

/// Page count and outline read back from a PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfSummary {
    pub page_count: usize,
    pub outline: Vec<OutlineNode>,
}

impl PdfSummary {
    /// Total bookmarks at every depth.
    pub fn bookmark_count(&self) -> usize {
        self.outline.iter().map(|n| 1 + n.descendant_count()).sum()
    }
}

// ── Full run ─────────────────────────────────────────────────────────────────

/// Everything one `extract → save → merge` run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub manifest_path: PathBuf,
    pub links: usize,
    pub batch: BatchReport,
    pub merge: MergeReport,
}
