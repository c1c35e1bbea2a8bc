//! Batch rendering: every manifest entry → its PDF, with retries.
//!
//! Entries are independent. A failing entry is retried with exponential
//! backoff (`retry_backoff_ms * 2^(attempt-1)`) and, once its retries are
//! exhausted, recorded in the report while the batch moves on. With
//! `concurrency > 1` several entries render at once, but outcomes are
//! always reported in manifest order.

use crate::config::BatchConfig;
use crate::error::{EntryError, PageBindError};
use crate::manifest::{Manifest, ManifestEntry};
use crate::output::{BatchReport, EntryOutcome, EntryStatus, RenderRequest, RenderResult};
use crate::pipeline::render::PageRenderer;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Render every entry of `manifest` with `renderer`.
///
/// Only a failure to create the output directory is fatal; per-entry
/// failures end up in the returned [`BatchReport`].
pub async fn save_pages_with<R>(
    renderer: &R,
    manifest: &Manifest,
    config: &BatchConfig,
) -> Result<BatchReport, PageBindError>
where
    R: PageRenderer + ?Sized,
{
    prepare_output_dir(&config.output_dir).await?;

    let total = manifest.len();
    info!(
        "Rendering {} page(s) into {} (concurrency {})",
        total,
        config.output_dir.display(),
        config.concurrency
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let outcomes: Vec<EntryOutcome> = stream::iter(
        manifest
            .entries()
            .enumerate()
            .map(|(index, entry)| process_entry(renderer, index, total, entry, config)),
    )
    .buffered(config.concurrency.max(1))
    .collect()
    .await;

    let report = BatchReport::from_outcomes(outcomes);
    info!(
        "Batch finished: {} rendered, {} skipped, {} failed",
        report.rendered, report.skipped, report.failed
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(report.total, report.rendered + report.skipped);
    }
    Ok(report)
}

pub(crate) async fn prepare_output_dir(dir: &Path) -> Result<(), PageBindError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| PageBindError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source,
        })
}

/// Skip, or render with retries, a single entry.
pub(crate) async fn process_entry<R>(
    renderer: &R,
    index: usize,
    total: usize,
    entry: &ManifestEntry,
    config: &BatchConfig,
) -> EntryOutcome
where
    R: PageRenderer + ?Sized,
{
    let started = Instant::now();
    let file_name = entry.pdf_file_name();
    let request = RenderRequest::new(&entry.url, &file_name, &config.output_dir)
        .with_selector(config.selector.clone());
    // The renderer writes and `verify` checks this one path.
    let path = request.output_path();
    let mut outcome = EntryOutcome {
        index,
        title: entry.title.clone(),
        url: entry.url.clone(),
        file_name: file_name.clone(),
        status: EntryStatus::Failed,
        attempts: 0,
        duration_ms: 0,
        warnings: Vec::new(),
        error: None,
    };

    if config.skip_existing && has_content(&path).await {
        debug!("Entry {}: {} already exists, skipping", index + 1, file_name);
        outcome.status = EntryStatus::Skipped;
        if let Some(ref cb) = config.progress_callback {
            cb.on_entry_skipped(index, total, &entry.title);
        }
        return outcome;
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_entry_start(index, total, &entry.title);
    }

    let mut last_error: Option<EntryError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.backoff(attempt);
            warn!(
                "Page {}: retry {}/{} after {}ms",
                index + 1,
                attempt,
                config.max_retries,
                backoff.as_millis()
            );
            if let (Some(cb), Some(err)) = (&config.progress_callback, &last_error) {
                cb.on_entry_retry(index, attempt, &err.to_string());
            }
            tokio::time::sleep(backoff).await;
        }

        outcome.attempts = attempt + 1;
        let result = renderer.render(&request).await;
        match verify(result, &path, &file_name).await {
            Ok(warnings) => {
                outcome.status = EntryStatus::Rendered;
                outcome.warnings = warnings;
                last_error = None;
                break;
            }
            Err(e) => {
                debug!("Page {} attempt {} failed: {}", index + 1, attempt + 1, e);
                last_error = Some(e);
            }
        }
    }

    outcome.duration_ms = started.elapsed().as_millis() as u64;
    match last_error {
        None => {
            if let Some(ref cb) = config.progress_callback {
                cb.on_entry_complete(index, total, &entry.title);
            }
        }
        Some(err) => {
            warn!(
                "Page {} ({}) failed after {} attempt(s): {}",
                index + 1,
                entry.url,
                outcome.attempts,
                err
            );
            if let Some(ref cb) = config.progress_callback {
                cb.on_entry_error(index, total, &err.to_string());
            }
            outcome.error = Some(err);
        }
    }
    outcome
}

/// A render only counts when its file landed on disk with content.
async fn verify(result: RenderResult, path: &Path, file_name: &str) -> Result<Vec<String>, EntryError> {
    if let Some(err) = result.error {
        return Err(err);
    }
    if !result.success {
        return Err(EntryError::Export {
            detail: "renderer reported failure without a reason".into(),
        });
    }
    if !has_content(path).await {
        return Err(EntryError::EmptyOutput {
            file_name: file_name.to_string(),
        });
    }
    Ok(result.warnings)
}

async fn has_content(path: &Path) -> bool {
    matches!(tokio::fs::metadata(path).await, Ok(m) if m.is_file() && m.len() > 0)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::progress::BatchProgressCallback;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Writes a small fake PDF, failing a URL the first `n` times it is seen.
    #[derive(Default)]
    pub(crate) struct ScriptedRenderer {
        pub failures: HashMap<String, usize>,
        pub empty: Vec<String>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedRenderer {
        pub fn failing(url: &str, times: usize) -> Self {
            let mut failures = HashMap::new();
            failures.insert(url.to_string(), times);
            Self {
                failures,
                ..Self::default()
            }
        }

        fn calls_for(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
        }
    }

    #[async_trait]
    impl PageRenderer for ScriptedRenderer {
        async fn render(&self, request: &RenderRequest) -> RenderResult {
            let seen = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(request.url.clone());
                calls.iter().filter(|u| **u == request.url).count()
            };
            if self.failures.get(&request.url).is_some_and(|n| seen <= *n) {
                return RenderResult::failed(
                    &request.file_name,
                    EntryError::Navigation {
                        url: request.url.clone(),
                        detail: "net::ERR_CONNECTION_REFUSED".into(),
                    },
                );
            }
            let path = request.output_path();
            let body: &[u8] = if self.empty.contains(&request.url) { b"" } else { b"%PDF-1.7 fake" };
            std::fs::write(&path, body).unwrap();
            RenderResult::succeeded(&request.file_name, path, false, Vec::new())
        }
    }

    #[derive(Default)]
    struct Counts {
        started: AtomicUsize,
        completed: AtomicUsize,
        skipped: AtomicUsize,
        retries: AtomicUsize,
        errors: AtomicUsize,
        finished_ok: AtomicUsize,
    }

    impl BatchProgressCallback for Counts {
        fn on_entry_start(&self, _: usize, _: usize, _: &str) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn on_entry_complete(&self, _: usize, _: usize, _: &str) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
        fn on_entry_skipped(&self, _: usize, _: usize, _: &str) {
            self.skipped.fetch_add(1, Ordering::SeqCst);
        }
        fn on_entry_retry(&self, _: usize, _: u32, _: &str) {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }
        fn on_entry_error(&self, _: usize, _: usize, _: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
        fn on_batch_complete(&self, _: usize, succeeded: usize) {
            self.finished_ok.store(succeeded, Ordering::SeqCst);
        }
    }

    fn manifest() -> Manifest {
        Manifest::new(
            "https://docs.example.com/",
            vec![
                ManifestEntry::new("https://docs.example.com/a", "Alpha"),
                ManifestEntry::new("https://docs.example.com/b", "Beta"),
                ManifestEntry::new("https://docs.example.com/c", "Gamma"),
            ],
        )
    }

    fn config(dir: &Path) -> BatchConfig {
        BatchConfig::builder(dir).retry_backoff_ms(1).build().unwrap()
    }

    #[tokio::test]
    async fn renders_every_entry_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = ScriptedRenderer::default();

        let report = save_pages_with(&renderer, &manifest(), &config(dir.path()))
            .await
            .unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.rendered, 3);
        let names: Vec<_> = report.outcomes.iter().map(|o| o.file_name.as_str()).collect();
        assert_eq!(names, vec!["Alpha.pdf", "Beta.pdf", "Gamma.pdf"]);
        assert!(dir.path().join("Beta.pdf").exists());
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = ScriptedRenderer::failing("https://docs.example.com/b", 2);
        let counts = Arc::new(Counts::default());
        let cfg = BatchConfig::builder(dir.path())
            .retry_backoff_ms(1)
            .progress_callback(counts.clone())
            .build()
            .unwrap();

        let report = save_pages_with(&renderer, &manifest(), &cfg).await.unwrap();

        assert_eq!(report.failed, 0);
        assert_eq!(report.outcomes[1].attempts, 3);
        assert_eq!(renderer.calls_for("https://docs.example.com/b"), 3);
        assert_eq!(counts.retries.load(Ordering::SeqCst), 2);
        assert_eq!(counts.completed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_entry_fails_without_stopping_batch() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = ScriptedRenderer::failing("https://docs.example.com/a", usize::MAX);
        let counts = Arc::new(Counts::default());
        let cfg = BatchConfig::builder(dir.path())
            .max_retries(1)
            .retry_backoff_ms(1)
            .progress_callback(counts.clone())
            .build()
            .unwrap();

        let report = save_pages_with(&renderer, &manifest(), &cfg).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.rendered, 2);
        let failed = report.failures().next().unwrap();
        assert_eq!(failed.index, 0);
        assert_eq!(failed.attempts, 2);
        assert!(matches!(failed.error, Some(EntryError::Navigation { .. })));
        assert!(!dir.path().join("Alpha.pdf").exists());
        assert_eq!(counts.errors.load(Ordering::SeqCst), 1);
        assert_eq!(counts.finished_ok.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn existing_pdfs_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Alpha.pdf"), b"%PDF-1.7 old").unwrap();
        std::fs::write(dir.path().join("Beta.pdf"), b"").unwrap();
        let renderer = ScriptedRenderer::default();

        let report = save_pages_with(&renderer, &manifest(), &config(dir.path()))
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.rendered, 2);
        assert_eq!(report.outcomes[0].status, EntryStatus::Skipped);
        assert_eq!(report.outcomes[0].attempts, 0);
        assert_eq!(renderer.calls_for("https://docs.example.com/a"), 0);
        assert_eq!(std::fs::read(dir.path().join("Alpha.pdf")).unwrap(), b"%PDF-1.7 old");
    }

    #[tokio::test]
    async fn skip_existing_off_rerenders() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Alpha.pdf"), b"%PDF-1.7 old").unwrap();
        let renderer = ScriptedRenderer::default();
        let cfg = BatchConfig::builder(dir.path()).skip_existing(false).build().unwrap();

        let report = save_pages_with(&renderer, &manifest(), &cfg).await.unwrap();

        assert_eq!(report.rendered, 3);
        assert_eq!(std::fs::read(dir.path().join("Alpha.pdf")).unwrap(), b"%PDF-1.7 fake");
    }

    #[tokio::test]
    async fn success_without_bytes_on_disk_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = ScriptedRenderer {
            empty: vec!["https://docs.example.com/c".into()],
            ..ScriptedRenderer::default()
        };
        let cfg = BatchConfig::builder(dir.path()).max_retries(0).build().unwrap();

        let report = save_pages_with(&renderer, &manifest(), &cfg).await.unwrap();

        assert_eq!(report.failed, 1);
        assert!(matches!(
            report.outcomes[2].error,
            Some(EntryError::EmptyOutput { .. })
        ));
    }

    #[tokio::test]
    async fn concurrent_batch_keeps_manifest_order() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = ScriptedRenderer::failing("https://docs.example.com/a", 1);
        let cfg = BatchConfig::builder(dir.path())
            .concurrency(3)
            .retry_backoff_ms(20)
            .build()
            .unwrap();

        let report = save_pages_with(&renderer, &manifest(), &cfg).await.unwrap();

        let order: Vec<_> = report.outcomes.iter().map(|o| o.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(report.rendered, 3);
    }

    #[tokio::test]
    async fn empty_manifest_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let report = save_pages_with(
            &ScriptedRenderer::default(),
            &Manifest::new("", Vec::new()),
            &config(dir.path()),
        )
        .await
        .unwrap();
        assert_eq!(report.total, 0);
    }

    #[tokio::test]
    async fn unusable_output_dir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let err = save_pages_with(&ScriptedRenderer::default(), &manifest(), &config(&blocker.join("pdfs")))
            .await
            .unwrap_err();
        assert!(matches!(err, PageBindError::OutputWriteFailed { .. }));
    }

    #[tokio::test]
    async fn explicit_file_names_render_and_verify_inside_output_dir() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("out");
        let manifest = Manifest::from_json(
            r#"[
                { "url": "https://docs.example.com/a", "title": "A", "file_name": "sub/a.pdf" },
                { "url": "https://docs.example.com/e", "title": "E", "file_name": "../escape.pdf" }
            ]"#,
        )
        .unwrap();
        let config = BatchConfig::builder(&out).max_retries(1).retry_backoff_ms(1).build().unwrap();

        let report = save_pages_with(&ScriptedRenderer::default(), &manifest, &config)
            .await
            .unwrap();

        assert_eq!(report.rendered, 2, "outcomes: {:?}", report.outcomes);
        assert!(report.outcomes.iter().all(|o| o.attempts == 1 && o.error.is_none()));
        assert!(out.join("a.pdf").exists());
        assert!(out.join("escape.pdf").exists());
        assert!(!root.path().join("escape.pdf").exists());
    }
}
