//! Error types for the pagebind library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PageBindError`] — **Fatal**: a whole step cannot proceed (unreadable
//!   manifest, malformed base URL, output path not writable). Returned as
//!   `Err(PageBindError)` from the top-level entry points.
//!
//! * [`EntryError`] — **Non-fatal**: a single manifest entry failed (page did
//!   not load, PDF missing at merge time) while every other entry is fine.
//!   Stored inside [`crate::output::EntryOutcome`],
//!   [`crate::output::RenderResult`] and [`crate::output::MergeReport`] so a
//!   run reports partial success instead of losing the batch to one bad page.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pagebind library.
#[derive(Debug, Error)]
pub enum PageBindError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// HTML (or a CSS selector used to query it) could not be parsed.
    #[error("Failed to parse {what}: {detail}")]
    Parse { what: String, detail: String },

    /// The base URL used to resolve relative links is malformed.
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    // ── Manifest errors ───────────────────────────────────────────────────
    /// The manifest file could not be read.
    #[error("Failed to read manifest '{path}': {source}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The manifest file is not valid manifest JSON.
    #[error("Manifest '{path}' is malformed: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    // ── Merge errors ──────────────────────────────────────────────────────
    /// The directory holding per-page PDFs does not exist.
    #[error("PDF directory does not exist: '{path}'")]
    PdfDirMissing { path: PathBuf },

    /// None of the manifest entries had a usable PDF.
    #[error("No PDF files to merge ({missing} missing, {failed} unreadable)")]
    NothingToMerge { missing: usize, failed: usize },

    /// A PDF given directly to the library (not via the manifest) is unreadable.
    #[error("PDF '{path}' could not be read: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file or directory.
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryError {
    /// The requested element never appeared. Soft: the full page is exported.
    #[error("selector '{selector}' not found within {secs}s; exported full page")]
    SelectorNotFound { selector: String, secs: u64 },

    /// The browser reported a navigation failure (DNS, TLS, refused, …).
    #[error("navigation to {url} failed: {detail}")]
    Navigation { url: String, detail: String },

    /// The page did not finish loading in time.
    #[error("navigation to {url} timed out after {secs}s")]
    NavigationTimeout { url: String, secs: u64 },

    /// The browser could not be started or connected to.
    #[error("browser unavailable: {detail}")]
    BrowserLaunch { detail: String },

    /// PDF export or a DevTools call during rendering failed.
    #[error("PDF export failed: {detail}")]
    Export { detail: String },

    /// The rendered PDF could not be written to disk.
    #[error("failed to write {path}: {detail}")]
    Write { path: String, detail: String },

    /// The renderer reported success but no usable file exists.
    #[error("{file_name} was not created or is empty")]
    EmptyOutput { file_name: String },

    /// Merge-time: the entry's PDF is absent from the PDF directory.
    #[error("PDF file does not exist: {file_name} ({title})")]
    MissingPdf { title: String, file_name: String },

    /// Merge-time: the entry's PDF exists but cannot be used.
    #[error("PDF {file_name} is unusable: {detail}")]
    CorruptPdf { file_name: String, detail: String },
}
