//! Input resolution: check the archive target and load request images.
//!
//! The archive is checked before anything is rendered so that a wrong path
//! (a directory, a non-PDF file) fails fast instead of after a full
//! browser round-trip.

use crate::error::{ComposeError, MergeError};
use crate::pipeline::encode;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where the new page will go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveTarget {
    /// No archive yet; the new page will become it.
    Absent(PathBuf),
    /// An existing PDF to append to.
    Existing(PathBuf),
}

impl ArchiveTarget {
    /// The archive path regardless of whether it exists yet.
    pub fn path(&self) -> &Path {
        match self {
            ArchiveTarget::Absent(p) | ArchiveTarget::Existing(p) => p,
        }
    }

    pub fn exists(&self) -> bool {
        matches!(self, ArchiveTarget::Existing(_))
    }
}

/// Resolve the archive path, validating an existing file's PDF magic bytes.
pub fn resolve_archive(path: &Path) -> Result<ArchiveTarget, MergeError> {
    if !path.exists() {
        debug!("Archive {} does not exist yet", path.display());
        return Ok(ArchiveTarget::Absent(path.to_path_buf()));
    }
    if path.is_dir() {
        return Err(MergeError::ArchiveUnreadable {
            path: path.to_path_buf(),
            detail: "path is a directory".into(),
        });
    }
    ensure_pdf_magic(path).map_err(|detail| MergeError::ArchiveUnreadable {
        path: path.to_path_buf(),
        detail,
    })?;
    debug!("Resolved existing archive: {}", path.display());
    Ok(ArchiveTarget::Existing(path.to_path_buf()))
}

/// Check that the file starts with `%PDF`.
pub fn ensure_pdf_magic(path: &Path) -> Result<(), String> {
    let mut f = std::fs::File::open(path).map_err(|e| e.to_string())?;
    let mut magic = [0u8; 4];
    f.read_exact(&mut magic)
        .map_err(|_| "file is shorter than a PDF header".to_string())?;
    if &magic != b"%PDF" {
        return Err(format!("not a PDF (first bytes: {magic:?})"));
    }
    Ok(())
}

/// An image read from disk, ready to inline.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub path: PathBuf,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl LoadedImage {
    pub fn data_uri(&self) -> String {
        encode::data_uri(&self.bytes, self.mime)
    }
}

/// Read every image in order. The first unreadable file aborts.
pub async fn load_images(paths: &[PathBuf]) -> Result<Vec<LoadedImage>, ComposeError> {
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ComposeError::ImageUnreadable {
                path: path.clone(),
                source,
            })?;
        let mime = encode::mime_for_path(path);
        debug!("Loaded image {} ({}, {} bytes)", path.display(), mime, bytes.len());
        images.push(LoadedImage {
            path: path.clone(),
            mime,
            bytes,
        });
    }
    Ok(images)
}
