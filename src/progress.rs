//! Progress-callback trait for per-stage append events.
//!
//! Inject an [`Arc<dyn AppendProgressCallback>`] via
//! [`crate::config::ArchiveConfigBuilder::progress_callback`] to receive
//! events as an append moves through compose → rasterize → merge. A UI can
//! forward these to a status label; the CLI drives a spinner with them.
//!
//! # Example
//!
//! ```rust
//! use chat_archiver::{AppendProgressCallback, ArchiveConfig, Stage};
//! use std::sync::Arc;
//!
//! struct Log;
//!
//! impl AppendProgressCallback for Log {
//!     fn on_stage_complete(&self, stage: Stage, duration_ms: u64) {
//!         eprintln!("{stage} took {duration_ms}ms");
//!     }
//! }
//!
//! let config = ArchiveConfig::builder()
//!     .progress_callback(Arc::new(Log) as Arc<dyn AppendProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::Stage;
use std::path::Path;
use std::sync::Arc;

/// Called by the append pipeline as it moves between stages.
///
/// Implementations must be `Send + Sync`: the pipeline runs on tokio worker
/// threads and an [`crate::Archiver`] may serve several callers. All methods
/// default to no-ops.
pub trait AppendProgressCallback: Send + Sync {
    /// Called once before any stage runs.
    fn on_append_start(&self, archive: &Path) {
        let _ = archive;
    }

    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage finishes successfully.
    fn on_stage_complete(&self, stage: Stage, duration_ms: u64) {
        let _ = (stage, duration_ms);
    }

    /// Called when a stage fails; no further stages run.
    fn on_append_error(&self, stage: Option<Stage>, error: &str) {
        let _ = (stage, error);
    }

    /// Called after the archive has been updated.
    ///
    /// * `page_count`: total pages in the archive after the append
    fn on_append_complete(&self, page_count: usize) {
        let _ = page_count;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AppendProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ArchiveConfig`].
pub type ProgressCallback = Arc<dyn AppendProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        started: Mutex<Vec<Stage>>,
        completed: AtomicUsize,
        errors: AtomicUsize,
        final_pages: AtomicUsize,
    }

    impl AppendProgressCallback for TrackingCallback {
        fn on_stage_start(&self, stage: Stage) {
            self.started.lock().unwrap().push(stage);
        }

        fn on_stage_complete(&self, _stage: Stage, _duration_ms: u64) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_append_error(&self, _stage: Option<Stage>, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_append_complete(&self, page_count: usize) {
            self.final_pages.store(page_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_append_start(Path::new("chat.pdf"));
        cb.on_stage_start(Stage::Compose);
        cb.on_stage_complete(Stage::Compose, 3);
        cb.on_append_error(Some(Stage::Rasterize), "boom");
        cb.on_append_complete(4);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_stage_start(Stage::Compose);
        tracker.on_stage_complete(Stage::Compose, 5);
        tracker.on_stage_start(Stage::Rasterize);
        tracker.on_append_error(Some(Stage::Rasterize), "exit 1");

        assert_eq!(
            *tracker.started.lock().unwrap(),
            vec![Stage::Compose, Stage::Rasterize]
        );
        assert_eq!(tracker.completed.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);

        tracker.on_append_complete(7);
        assert_eq!(tracker.final_pages.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_stage_start(Stage::Merge);
        cb.on_append_complete(1);
    }
}
