//! Error types for the chat-archiver library.
//!
//! Three severities exist:
//!
//! * [`ArchiveError`]: **Fatal**: the append cannot complete. It wraps the
//!   stage-specific error ([`ComposeError`], [`RasterizationError`],
//!   [`MergeError`]) so callers can tell which stage failed. Nothing is
//!   merged into the archive when one of these is returned.
//!
//! * [`RenderError`]: **Recovered**: the highlighter failed on one code
//!   block. The renderer falls back to escaped plain text and logs it; it
//!   never reaches the caller.
//!
//! * [`CleanupWarning`]: **Non-fatal**: a transient file could not be
//!   removed. Logged at `warn` level only.

use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage that produced a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Stage {
    /// Markdown rendering and HTML document assembly.
    Compose,
    /// External HTML → PDF process.
    Rasterize,
    /// Appending the new page onto the archive.
    Merge,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Compose => "compose",
            Stage::Rasterize => "rasterize",
            Stage::Merge => "merge",
        };
        f.write_str(name)
    }
}

/// All fatal errors returned by the chat-archiver library.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The HTML page could not be assembled.
    #[error("Compose stage failed: {0}")]
    Compose(#[from] ComposeError),

    /// The external rasterizer did not produce a page.
    #[error("Rasterization stage failed: {0}")]
    Rasterization(#[from] RasterizationError),

    /// The new page could not be appended; the archive is unchanged.
    #[error("Merge stage failed: {0}")]
    Merge(#[from] MergeError),

    /// The per-invocation scratch directory could not be created.
    #[error("Failed to create scratch directory: {source}")]
    Scratch {
        #[source]
        source: std::io::Error,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error (task panic, runtime creation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ArchiveError {
    /// The pipeline stage this error belongs to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ArchiveError::Compose(_) => Some(Stage::Compose),
            ArchiveError::Rasterization(_) => Some(Stage::Rasterize),
            ArchiveError::Merge(_) => Some(Stage::Merge),
            ArchiveError::Scratch { .. }
            | ArchiveError::InvalidConfig(_)
            | ArchiveError::Internal(_) => None,
        }
    }
}

/// Failures while building the HTML document.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// A configured stylesheet override could not be read.
    #[error("Cannot read stylesheet '{path}': {source}")]
    StylesheetUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An image supplied with the request could not be read.
    #[error("Cannot read image '{path}': {source}")]
    ImageUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The composed HTML could not be written to the scratch directory.
    #[error("Failed to write page HTML to '{path}': {source}")]
    HtmlWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures at the external rasterizer boundary.
#[derive(Debug, Error)]
pub enum RasterizationError {
    /// The rasterizer executable does not exist or is not on `PATH`.
    #[error("Rasterizer executable '{program}' was not found.\nInstall it or point --rasterizer at it.")]
    ExecutableNotFound { program: String },

    /// The configured working directory does not exist or is not a directory.
    #[error("Rasterizer working directory '{dir}' does not exist.\nCreate it or point --rasterizer-dir elsewhere.")]
    WorkingDirMissing { dir: PathBuf },

    /// The process could not be started for another reason.
    #[error("Failed to start rasterizer '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran longer than the configured timeout and was killed.
    #[error("Rasterizer '{program}' timed out after {secs}s")]
    TimedOut { program: String, secs: u64 },

    /// The process exited with a failure status.
    #[error("Rasterizer '{program}' exited with {status}: {stderr}")]
    ExitFailure {
        program: String,
        status: String,
        stderr: String,
    },

    /// Exit status was zero but no (non-empty) PDF was written.
    #[error("Rasterizer reported success but produced no PDF at '{path}'")]
    MissingOutput { path: PathBuf },

    /// Waiting on the child process failed.
    #[error("Lost track of rasterizer '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures while appending the new page. The archive is left untouched.
#[derive(Debug, Error)]
pub enum MergeError {
    /// The existing archive is not a readable PDF.
    #[error("Archive '{path}' is unreadable or corrupt: {detail}")]
    ArchiveUnreadable { path: PathBuf, detail: String },

    /// The rendered page file is not a readable PDF.
    #[error("Rendered page '{path}' is unreadable or corrupt: {detail}")]
    PageUnreadable { path: PathBuf, detail: String },

    /// The rendered page file contains no pages.
    #[error("Rendered page '{path}' contains no pages")]
    EmptyPage { path: PathBuf },

    /// The merged document failed its page-count check before writing.
    #[error("Merged archive has {actual} pages, expected {expected}")]
    PageCountMismatch { expected: usize, actual: usize },

    /// The merged archive could not be written or moved into place.
    #[error("Failed to write archive '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A highlighter failure for a single code block.
///
/// Recovered by the renderer: the block is emitted as escaped plain text.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Highlighting '{language}' failed: {detail}")]
    Highlight { language: String, detail: String },
}

/// A transient file that could not be removed.
#[derive(Debug, Error)]
#[error("Could not remove transient '{path}': {source}")]
pub struct CleanupWarning {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}
