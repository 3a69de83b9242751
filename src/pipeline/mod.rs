//! Pipeline stages for appending one page to a PDF archive.
//!
//! Each submodule implements exactly one step. Stages hand work to each
//! other through files in a per-invocation scratch directory, because the
//! rasterizer is an external process.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ compose ──▶ rasterize ──▶ merge
//! (images)  (HTML)      (HTML → PDF)  (lopdf append)
//! ```
//!
//! 1. [`input`]: resolve the archive path and read image files
//! 2. [`compose`]: render both texts through [`markdown`] (which uses
//!    [`shield`] and [`highlight`]), embed images via [`encode`], and
//!    assemble one HTML document
//! 3. [`rasterize`]: run the external headless browser with a timeout;
//!    the only stage that spawns a process
//! 4. [`merge`]: graft the new page onto the archive and replace the
//!    file atomically; runs in `spawn_blocking`

pub mod compose;
pub mod encode;
pub mod highlight;
pub mod input;
pub mod markdown;
pub mod merge;
pub mod rasterize;
pub mod shield;
