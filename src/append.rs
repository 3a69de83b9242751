//! Append entry points: one request in, one page onto the archive.
//!
//! [`append_page`] runs the whole pipeline once. It does not coordinate with
//! other callers; two concurrent appends to the same archive can lose a
//! page. Use an [`Archiver`] when appends may overlap within a process.

use crate::config::ArchiveConfig;
use crate::error::{ArchiveError, ComposeError, MergeError, Stage};
use crate::output::{AppendOutcome, AppendStats, ArchiveInfo};
use crate::pipeline::compose::{self, ComposedDocument};
use crate::pipeline::input::{self, ArchiveTarget};
use crate::pipeline::merge;
use crate::pipeline::rasterize::{self, Scratch};
use crate::progress::AppendProgressCallback;
use crate::request::PageRequest;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Render `request` into a page and append it to the archive at
/// `archive_path`, creating the archive if it does not exist.
///
/// # Errors
/// Returns the first stage failure. The archive is unchanged whenever an
/// error is returned, and no transient files are left behind either way.
///
/// # Example
/// ```rust,no_run
/// use chat_archiver::{append_page, ArchiveConfig, PageRequest};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let request = PageRequest::new("What is Rust?", "A systems language.");
/// let outcome = append_page(&request, "chat.pdf", &ArchiveConfig::default()).await?;
/// println!("archive now has {} pages", outcome.page_count);
/// # Ok(())
/// # }
/// ```
pub async fn append_page(
    request: &PageRequest,
    archive_path: impl AsRef<Path>,
    config: &ArchiveConfig,
) -> Result<AppendOutcome, ArchiveError> {
    let archive_path = archive_path.as_ref();
    info!("Appending page to {}", archive_path.display());
    notify(config, |cb| cb.on_append_start(archive_path));

    match run_append(request, archive_path, config).await {
        Ok(outcome) => {
            info!(
                "Append complete: {} now has {} page(s), {}ms total",
                archive_path.display(),
                outcome.page_count,
                outcome.stats.total_duration_ms
            );
            notify(config, |cb| cb.on_append_complete(outcome.page_count));
            Ok(outcome)
        }
        Err(e) => {
            warn!("Append to {} failed: {}", archive_path.display(), e);
            notify(config, |cb| cb.on_append_error(e.stage(), &e.to_string()));
            Err(e)
        }
    }
}

/// Synchronous wrapper around [`append_page`].
///
/// Creates a temporary tokio runtime internally, so it must not be called
/// from inside an async context.
pub fn append_page_sync(
    request: &PageRequest,
    archive_path: impl AsRef<Path>,
    config: &ArchiveConfig,
) -> Result<AppendOutcome, ArchiveError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ArchiveError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(append_page(request, archive_path, config))
}

/// Compose the HTML page for `request` without rasterizing or touching any
/// archive.
pub async fn compose_html(
    request: &PageRequest,
    config: &ArchiveConfig,
) -> Result<String, ArchiveError> {
    Ok(compose_document(request, config).await?.html)
}

/// Report page count and version of an existing archive.
///
/// Does not need a rasterizer and never modifies the file.
pub async fn inspect(archive_path: impl AsRef<Path>) -> Result<ArchiveInfo, ArchiveError> {
    let path = archive_path.as_ref().to_path_buf();
    let target = input::resolve_archive(&path)?;
    if !target.exists() {
        return Err(MergeError::ArchiveUnreadable {
            path,
            detail: "archive does not exist".into(),
        }
        .into());
    }

    tokio::task::spawn_blocking(move || -> Result<ArchiveInfo, ArchiveError> {
        let doc = lopdf::Document::load(&path).map_err(|e| MergeError::ArchiveUnreadable {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        let file_size_bytes = std::fs::metadata(&path)
            .map(|m| m.len())
            .unwrap_or_default();
        Ok(ArchiveInfo {
            page_count: doc.get_pages().len(),
            pdf_version: doc.version.clone(),
            file_size_bytes,
            path,
        })
    })
    .await
    .map_err(|e| ArchiveError::Internal(format!("Inspect task panicked: {}", e)))?
}

/// Serializes appends per archive path within one process.
///
/// Appends to different archives run concurrently; appends to the same
/// archive (compared by absolute path) wait for each other.
///
/// ```rust,no_run
/// use chat_archiver::{ArchiveConfig, Archiver, PageRequest};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let archiver = Archiver::new(ArchiveConfig::default());
/// archiver.append(&PageRequest::new("hi", "hello"), "chat.pdf").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Archiver {
    config: ArchiveConfig,
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl Archiver {
    pub fn new(config: ArchiveConfig) -> Self {
        Self {
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Append one page, waiting for any in-flight append to the same archive.
    pub async fn append(
        &self,
        request: &PageRequest,
        archive_path: impl AsRef<Path>,
    ) -> Result<AppendOutcome, ArchiveError> {
        let archive_path = archive_path.as_ref();
        let key = std::path::absolute(archive_path).map_err(|e| {
            ArchiveError::InvalidConfig(format!(
                "cannot resolve archive path {}: {}",
                archive_path.display(),
                e
            ))
        })?;
        let lease = self.lease(key);
        let _guard = lease.lock.lock().await;
        append_page(request, archive_path, &self.config).await
    }

    fn lease(&self, key: PathBuf) -> LockLease<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = Arc::clone(locks.entry(key.clone()).or_default());
        LockLease {
            locks: &self.locks,
            key,
            lock,
        }
    }
}

/// One caller's hold on a per-archive lock. The map entry is dropped
/// together with the last lease, so idle archives cost nothing.
struct LockLease<'a> {
    locks: &'a Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
    key: PathBuf,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for LockLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map and this lease still hold it.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.key);
        }
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn notify(config: &ArchiveConfig, f: impl FnOnce(&dyn AppendProgressCallback)) {
    if let Some(ref cb) = config.progress_callback {
        f(cb.as_ref());
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

async fn run_append(
    request: &PageRequest,
    archive_path: &Path,
    config: &ArchiveConfig,
) -> Result<AppendOutcome, ArchiveError> {
    let total_start = Instant::now();

    // Fail on a bad archive path before paying for a browser round-trip.
    let target = input::resolve_archive(archive_path)?;
    let scratch = Scratch::create(config.scratch_dir.as_deref())?;

    let result = run_stages(request, target, &scratch, config).await;

    if let Err(warning) = scratch.close() {
        warn!("{}", warning);
    }

    let (report, mut stats) = result?;
    stats.total_duration_ms = elapsed_ms(total_start);
    Ok(AppendOutcome {
        archive_path: archive_path.to_path_buf(),
        page_count: report.page_count,
        pages_added: report.pages_added,
        created: report.created,
        stats,
    })
}

async fn run_stages(
    request: &PageRequest,
    target: ArchiveTarget,
    scratch: &Scratch,
    config: &ArchiveConfig,
) -> Result<(merge::MergeReport, AppendStats), ArchiveError> {
    let mut stats = AppendStats::default();

    // ── Compose ──────────────────────────────────────────────────────────
    notify(config, |cb| cb.on_stage_start(Stage::Compose));
    let start = Instant::now();
    let document = compose_document(request, config).await?;
    tokio::fs::write(scratch.html_path(), &document.html)
        .await
        .map_err(|source| ComposeError::HtmlWriteFailed {
            path: scratch.html_path().to_path_buf(),
            source,
        })?;
    stats.compose_duration_ms = elapsed_ms(start);
    stats.html_bytes = document.html.len();
    stats.image_count = document.image_count;
    debug!(
        "Compose: {} bytes, {} images, {}ms",
        stats.html_bytes, stats.image_count, stats.compose_duration_ms
    );
    notify(config, |cb| {
        cb.on_stage_complete(Stage::Compose, stats.compose_duration_ms)
    });

    // ── Rasterize ────────────────────────────────────────────────────────
    notify(config, |cb| cb.on_stage_start(Stage::Rasterize));
    let start = Instant::now();
    rasterize::rasterize(&config.rasterizer, scratch.html_path(), scratch.page_path()).await?;
    stats.rasterize_duration_ms = elapsed_ms(start);
    debug!("Rasterize: {}ms", stats.rasterize_duration_ms);
    notify(config, |cb| {
        cb.on_stage_complete(Stage::Rasterize, stats.rasterize_duration_ms)
    });

    // ── Merge ────────────────────────────────────────────────────────────
    notify(config, |cb| cb.on_stage_start(Stage::Merge));
    let start = Instant::now();
    let page_path = scratch.page_path().to_path_buf();
    let report = tokio::task::spawn_blocking(move || merge::merge_into_archive(&target, &page_path))
        .await
        .map_err(|e| ArchiveError::Internal(format!("Merge task panicked: {}", e)))??;
    stats.merge_duration_ms = elapsed_ms(start);
    debug!(
        "Merge: {} page(s) added, {}ms",
        report.pages_added, stats.merge_duration_ms
    );
    notify(config, |cb| {
        cb.on_stage_complete(Stage::Merge, stats.merge_duration_ms)
    });

    Ok((report, stats))
}

/// Load images and stylesheet, then assemble the document off the async
/// runtime (syntect highlighting is CPU-bound).
async fn compose_document(
    request: &PageRequest,
    config: &ArchiveConfig,
) -> Result<ComposedDocument, ArchiveError> {
    let images = input::load_images(&request.image_paths).await?;
    let stylesheet = compose::load_stylesheet(config).await?.into_owned();

    let request = request.clone();
    let config = config.clone();
    tokio::task::spawn_blocking(move || compose::compose(&request, &images, &stylesheet, &config))
        .await
        .map_err(|e| ArchiveError::Internal(format!("Compose task panicked: {}", e)))
}
