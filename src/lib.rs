//! # chat-archiver
//!
//! Append formatted conversation pages to a growing PDF archive.
//!
//! Each call takes a user message, a model response and optional images,
//! renders them as one styled HTML page (Markdown, highlighted code, math
//! left for MathJax), turns that page into PDF with an external headless
//! browser, and appends the result to an existing PDF. If the archive does
//! not exist yet, the new page becomes it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PageRequest
//!  │
//!  ├─ 1. Compose    Markdown + syntect + base64 images → HTML document
//!  ├─ 2. Rasterize  external browser process: HTML → single-page PDF
//!  └─ 3. Merge      lopdf append + atomic replace of the archive
//! ```
//!
//! The archive is never left half-written: every failure leaves it exactly
//! as it was, and every invocation cleans up its own scratch directory.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chat_archiver::{append_page, ArchiveConfig, PageRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Default rasterizer: `node <crate>/scripts/generate_pdf.js {html} {pdf}`
//!     let config = ArchiveConfig::default();
//!     let request = PageRequest::new("Explain $e^{i\\pi}$", "It equals $-1$.");
//!     let outcome = append_page(&request, "conversation.pdf", &config).await?;
//!     eprintln!("{} pages, rasterized in {}ms",
//!         outcome.page_count,
//!         outcome.stats.rasterize_duration_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `chat-archiver` binary (clap + anyhow + indicatif + tracing-subscriber + serde_json) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! chat-archiver = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod append;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod request;
pub mod template;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use append::{append_page, append_page_sync, compose_html, inspect, Archiver};
pub use config::{ArchiveConfig, ArchiveConfigBuilder, RasterizerConfig};
pub use error::{
    ArchiveError, CleanupWarning, ComposeError, MergeError, RasterizationError, RenderError, Stage,
};
pub use output::{AppendOutcome, AppendStats, ArchiveInfo};
pub use pipeline::markdown::render_markdown;
pub use progress::{AppendProgressCallback, NoopProgressCallback, ProgressCallback};
pub use request::PageRequest;
