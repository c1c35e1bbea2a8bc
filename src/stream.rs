//! Streaming batch API: emit entry outcomes as they finish.
//!
//! Rendering a large manifest takes a long time. [`save_pages_stream`] yields
//! each [`EntryOutcome`] as soon as its entry is done, so callers can report
//! progress or start post-processing early. Outcomes arrive in manifest
//! order even when `concurrency > 1`.

use crate::config::BatchConfig;
use crate::error::PageBindError;
use crate::manifest::Manifest;
use crate::output::EntryOutcome;
use crate::pipeline::batch::{prepare_output_dir, process_entry};
use crate::pipeline::render::{ChromeRenderer, PageRenderer};
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of entry outcomes.
pub type OutcomeStream = Pin<Box<dyn Stream<Item = EntryOutcome> + Send>>;

/// Render `manifest` with headless Chrome, streaming outcomes.
///
/// # Returns
/// - `Ok(OutcomeStream)` — one [`EntryOutcome`] per entry, in order
/// - `Err(PageBindError)` — the output directory could not be created
///
/// # Example
/// ```rust,no_run
/// use pagebind::{save_pages_stream, BatchConfig, Manifest};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let manifest = Manifest::load("data/links.json")?;
/// let config = BatchConfig::new("data/pdfs");
/// let mut outcomes = save_pages_stream(manifest, config).await?;
/// while let Some(o) = outcomes.next().await {
///     println!("{:?} {}", o.status, o.file_name);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn save_pages_stream(manifest: Manifest, config: BatchConfig) -> Result<OutcomeStream, PageBindError> {
    let renderer = Arc::new(ChromeRenderer::new(config.render.clone()));
    save_pages_stream_with(renderer, manifest, config).await
}

/// Like [`save_pages_stream`] with a caller-supplied renderer.
pub async fn save_pages_stream_with(
    renderer: Arc<dyn PageRenderer>,
    manifest: Manifest,
    config: BatchConfig,
) -> Result<OutcomeStream, PageBindError> {
    prepare_output_dir(&config.output_dir).await?;
    let total = manifest.len();
    info!("Streaming {} page(s) into {}", total, config.output_dir.display());

    let concurrency = config.concurrency.max(1);
    let config = Arc::new(config);
    let s = stream::iter(manifest.links.into_iter().enumerate().map(move |(index, entry)| {
        let renderer = Arc::clone(&renderer);
        let cfg = Arc::clone(&config);
        async move { process_entry(renderer.as_ref(), index, total, &entry, &cfg).await }
    }))
    .buffered(concurrency);

    Ok(Box::pin(s))
}
