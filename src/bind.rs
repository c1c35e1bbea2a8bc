//! Step-level entry points: extract, render, save, merge, inspect, run.
//!
//! Each function is one CLI subcommand's worth of work and communicates with
//! the next step only through files, so a failed run can be resumed from
//! whichever step broke. Fatal problems come back as [`PageBindError`];
//! per-page trouble is reported inside the returned report.

use crate::config::{BatchConfig, ExtractConfig, MergeConfig, RenderConfig};
use crate::error::PageBindError;
use crate::manifest::Manifest;
use crate::output::{BatchReport, MergeReport, PdfSummary, RenderRequest, RenderResult, RunReport};
use crate::pipeline::render::{ChromeRenderer, PageRenderer};
use crate::pipeline::{batch, extract, input, merge, outline};
use std::path::{Path, PathBuf};
use tracing::info;

pub use crate::pipeline::batch::save_pages_with;

/// Default manifest file name inside a work directory.
pub const MANIFEST_FILE: &str = "extracted_urls.json";
/// Default per-page PDF directory inside a work directory.
pub const PDF_DIR: &str = "pdfs";
/// Default merged document name inside a work directory.
pub const MERGED_FILE: &str = "merged.pdf";

/// Extract the links of an index page and write them as a manifest.
///
/// # Arguments
/// * `input`    — local HTML file or http(s) URL
/// * `base_url` — URL relative links resolve against; defaults to `input`
///   when `input` is a URL
/// * `out`      — manifest path; parent directories are created
///
/// # Errors
/// `InvalidBaseUrl` when no usable base URL is available, plus the input
/// and write errors of the underlying steps.
pub async fn extract_to_file(
    input: impl AsRef<str>,
    base_url: Option<&str>,
    out: impl AsRef<Path>,
    config: &ExtractConfig,
) -> Result<Manifest, PageBindError> {
    let input = input.as_ref();
    let out = out.as_ref();
    info!("Extracting links from {}", input);

    let source = input::load_html(input, config.download_timeout_secs).await?;
    let base = match base_url.or_else(|| source.default_base_url()) {
        Some(b) => b.to_string(),
        None => {
            return Err(PageBindError::InvalidBaseUrl {
                url: String::new(),
                reason: format!("'{input}' is a local file; pass --base-url to resolve its links"),
            })
        }
    };

    let links = extract::extract_links(&source.html, &base, config)?;
    let manifest = Manifest::new(base, links);
    manifest.save(out)?;
    info!("Wrote {} link(s) to {}", manifest.len(), out.display());
    Ok(manifest)
}

/// Render a single page to a PDF with headless Chrome.
///
/// Never fails outright; check [`RenderResult::success`].
pub async fn render_page(request: &RenderRequest, config: &RenderConfig) -> RenderResult {
    ChromeRenderer::new(config.clone()).render(request).await
}

/// Render every manifest entry with headless Chrome.
pub async fn save_pages(manifest: &Manifest, config: &BatchConfig) -> Result<BatchReport, PageBindError> {
    let renderer = ChromeRenderer::new(config.render.clone());
    batch::save_pages_with(&renderer, manifest, config).await
}

/// Merge the per-page PDFs of `manifest` into one bookmarked document.
pub async fn merge_pdfs(
    manifest: &Manifest,
    pdf_dir: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &MergeConfig,
) -> Result<MergeReport, PageBindError> {
    merge::merge_pdfs(manifest, pdf_dir.as_ref(), output.as_ref(), config).await
}

/// Read the page count and outline of a PDF without modifying it.
pub async fn inspect_pdf(path: impl AsRef<Path>) -> Result<PdfSummary, PageBindError> {
    let path = path.as_ref().to_path_buf();
    match tokio::fs::metadata(&path).await {
        Ok(m) if m.is_file() => {}
        Ok(_) => return Err(PageBindError::FileNotFound { path }),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PageBindError::PermissionDenied { path })
        }
        Err(_) => return Err(PageBindError::FileNotFound { path }),
    }
    tokio::task::spawn_blocking(move || outline::read_summary(&path))
        .await
        .map_err(|e| PageBindError::Internal(format!("inspect task panicked: {e}")))?
}

/// File locations used by [`run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    pub manifest: PathBuf,
    pub pdf_dir: PathBuf,
    pub merged: PathBuf,
}

impl RunLayout {
    /// `extracted_urls.json`, `pdfs/` and `merged.pdf` under `work_dir`.
    pub fn in_dir(work_dir: impl AsRef<Path>) -> Self {
        let dir = work_dir.as_ref();
        Self {
            manifest: dir.join(MANIFEST_FILE),
            pdf_dir: dir.join(PDF_DIR),
            merged: dir.join(MERGED_FILE),
        }
    }
}

/// Extract, render and merge in one go.
///
/// The batch's `output_dir` is replaced by `layout.pdf_dir`. A batch where
/// every page failed still reaches the merge step, which then reports
/// `NothingToMerge`.
pub async fn run(
    input: impl AsRef<str>,
    base_url: Option<&str>,
    layout: &RunLayout,
    extract_config: &ExtractConfig,
    batch_config: &BatchConfig,
    merge_config: &MergeConfig,
) -> Result<RunReport, PageBindError> {
    let renderer = ChromeRenderer::new(batch_config.render.clone());
    run_with(&renderer, input, base_url, layout, extract_config, batch_config, merge_config).await
}

/// Like [`run`] with a caller-supplied renderer.
pub async fn run_with<R>(
    renderer: &R,
    input: impl AsRef<str>,
    base_url: Option<&str>,
    layout: &RunLayout,
    extract_config: &ExtractConfig,
    batch_config: &BatchConfig,
    merge_config: &MergeConfig,
) -> Result<RunReport, PageBindError>
where
    R: PageRenderer + ?Sized,
{
    let manifest = extract_to_file(input, base_url, &layout.manifest, extract_config).await?;

    let mut batch_config = batch_config.clone();
    batch_config.output_dir = layout.pdf_dir.clone();
    let batch = batch::save_pages_with(renderer, &manifest, &batch_config).await?;

    let merge = merge::merge_pdfs(&manifest, &layout.pdf_dir, &layout.merged, merge_config).await?;
    info!(
        "Bound {} page(s) from {} of {} link(s) into {}",
        merge.page_count,
        merge.included.len(),
        manifest.len(),
        layout.merged.display()
    );

    Ok(RunReport {
        manifest_path: layout.manifest.clone(),
        links: manifest.len(),
        batch,
        merge,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn extract_to_file_writes_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let html = dir.path().join("index.html");
        std::fs::write(&html, r#"<ul><li><a href="intro.html">Intro</a></li></ul>"#).unwrap();
        let out = dir.path().join("data/extracted_urls.json");

        let manifest = assert_ok!(
            extract_to_file(
                html.to_str().unwrap(),
                Some("https://docs.example.com/"),
                &out,
                &ExtractConfig::default(),
            )
            .await
        );

        assert_eq!(manifest.len(), 1);
        let reloaded = Manifest::load(&out).unwrap();
        assert_eq!(reloaded, manifest);
        assert_eq!(reloaded.links[0].url, "https://docs.example.com/intro.html");
    }

    #[tokio::test]
    async fn local_input_without_base_url_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let html = dir.path().join("index.html");
        std::fs::write(&html, r#"<a href="intro.html">Intro</a>"#).unwrap();

        let err = extract_to_file(html.to_str().unwrap(), None, dir.path().join("m.json"), &ExtractConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PageBindError::InvalidBaseUrl { .. }));
        assert!(!dir.path().join("m.json").exists());
    }

    #[tokio::test]
    async fn inspect_missing_file_is_file_not_found() {
        let err = assert_err!(inspect_pdf("/no/such/merged.pdf").await);
        assert!(matches!(err, PageBindError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn inspect_garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();
        let err = assert_err!(inspect_pdf(&path).await);
        assert!(matches!(err, PageBindError::CorruptPdf { .. }));
    }

    #[test]
    fn layout_uses_conventional_names() {
        let layout = RunLayout::in_dir("/tmp/work");
        assert_eq!(layout.manifest, PathBuf::from("/tmp/work/extracted_urls.json"));
        assert_eq!(layout.pdf_dir, PathBuf::from("/tmp/work/pdfs"));
        assert_eq!(layout.merged, PathBuf::from("/tmp/work/merged.pdf"));
    }
}
