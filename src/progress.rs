//! Progress-callback trait for per-entry batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive events
//! as the batch renders each manifest entry. The CLI uses this to drive its
//! progress bar; library users can forward events anywhere they like.
//!
//! # Example
//!
//! ```rust
//! use pagebind::{BatchConfig, BatchProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_entry_complete(&self, index: usize, total: usize, title: &str) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("[{}/{}] {}", index + 1, total, title);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = BatchConfig::builder("./data/pdfs")
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch renderer as it processes each entry.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. With `concurrency > 1` the per-entry methods may be
/// called from several tasks at once; indexes are 0-based manifest positions.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any entry is processed.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called before the first render attempt of an entry.
    fn on_entry_start(&self, index: usize, total: usize, title: &str) {
        let _ = (index, total, title);
    }

    /// Called when an entry's PDF was produced.
    fn on_entry_complete(&self, index: usize, total: usize, title: &str) {
        let _ = (index, total, title);
    }

    /// Called when an entry is left alone because its PDF already exists.
    fn on_entry_skipped(&self, index: usize, total: usize, title: &str) {
        let _ = (index, total, title);
    }

    /// Called when a render attempt fails and another attempt will follow.
    fn on_entry_retry(&self, index: usize, attempt: u32, error: &str) {
        let _ = (index, attempt, error);
    }

    /// Called when an entry fails after all retries are exhausted.
    fn on_entry_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every entry has been attempted.
    ///
    /// # Arguments
    /// * `total`     — number of entries in the manifest
    /// * `succeeded` — entries rendered or skipped (their PDF exists)
    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        let _ = (total, succeeded);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
