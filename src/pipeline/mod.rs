//! Pipeline stages for turning a documentation index into one bound PDF.
//!
//! Each submodule implements exactly one step. The stages meet only through
//! files on disk (the manifest JSON and the per-page PDFs), so any step can
//! be rerun on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ batch/render ──▶ merge (+ outline)
//! (HTML)    (manifest)  (Chrome → PDFs)  (lopdf)
//! ```
//!
//! 1. [`input`]   — read the index page from a local path or URL
//! 2. [`extract`] — pull ordered, titled, absolute links out of the HTML
//! 3. [`render`]  — one URL → one PDF through headless Chrome
//! 4. [`batch`]   — render every manifest entry with retries and skipping
//! 5. [`merge`]   — concatenate the PDFs in manifest order; runs in
//!    `spawn_blocking` because lopdf is synchronous
//! 6. [`outline`] — build, write and read back the bookmark tree

pub mod batch;
pub mod extract;
pub mod input;
pub mod merge;
pub mod outline;
pub mod render;
