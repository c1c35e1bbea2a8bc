//! # pagebind
//!
//! Bind the pages linked from a documentation index into one PDF, with a
//! bookmark per page.
//!
//! ## Why this crate?
//!
//! Documentation sites are spread over dozens of pages, and "print to PDF"
//! only ever captures one of them. This crate reads the index, prints every
//! linked page through headless Chrome (so layout, fonts and scripts behave
//! exactly as in a browser), and stitches the results together in index
//! order with an outline that mirrors the index's nesting.
//!
//! ## Pipeline Overview
//!
//! ```text
//! index.html / URL
//!  │
//!  ├─ 1. Extract  links → manifest JSON (title, absolute URL, file name, level)
//!  ├─ 2. Save     one headless Chrome per page → <title>.pdf (retries, skip existing)
//!  ├─ 3. Merge    PDFs in manifest order → merged.pdf with nested bookmarks
//!  └─ 4. Inspect  read page count and outline back out of a PDF
//! ```
//!
//! Steps talk to each other only through files, so each can be rerun alone.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pagebind::{extract_to_file, merge_pdfs, save_pages, BatchConfig, ExtractConfig, MergeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manifest = extract_to_file(
//!         "https://docs.example.com/index.html",
//!         None,
//!         "data/extracted_urls.json",
//!         &ExtractConfig::default(),
//!     )
//!     .await?;
//!
//!     let batch = save_pages(&manifest, &BatchConfig::new("data/pdfs")).await?;
//!     eprintln!("{} rendered, {} failed", batch.rendered, batch.failed);
//!
//!     let merged = merge_pdfs(&manifest, "data/pdfs", "data/merged.pdf", &MergeConfig::default()).await?;
//!     println!("{} pages", merged.page_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pagebind` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pagebind = { version = "0.3", default-features = false }
//! ```
//!
//! ## Chrome
//!
//! A Chrome or Chromium executable is needed for rendering only. It is found
//! through `CHROME_PATH`, `PATH` and the usual install locations (see
//! [`chrome_auto::locate_chrome`]), or set explicitly with
//! [`RenderConfigBuilder::chrome_path`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod bind;
pub mod cdp;
pub mod config;
pub mod error;
pub mod manifest;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod scripts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use bind::{
    extract_to_file, inspect_pdf, merge_pdfs, render_page, run, run_with, save_pages, save_pages_with, RunLayout,
};
pub use config::{
    BatchConfig, BatchConfigBuilder, ExtractConfig, MergeConfig, ProxyConfig, RenderConfig, RenderConfigBuilder,
};
pub use error::{EntryError, PageBindError};
pub use manifest::{Manifest, ManifestEntry};
pub use output::{
    BatchReport, EntryOutcome, EntryStatus, MergeReport, MergedEntry, OutlineNode, PdfSummary, RenderRequest,
    RenderResult, RunReport,
};
pub use pipeline::extract::extract_links;
pub use pipeline::render::{ChromeRenderer, PageRenderer};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{save_pages_stream, save_pages_stream_with, OutcomeStream};
