//! Result types returned by the append and inspect entry points.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What a successful append did to the archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendOutcome {
    /// The archive that was created or grown.
    pub archive_path: PathBuf,
    /// Total pages in the archive after the append.
    pub page_count: usize,
    /// Pages contributed by this append (normally 1).
    pub pages_added: usize,
    /// True when the archive did not exist before this append.
    pub created: bool,
    pub stats: AppendStats,
}

/// Timing and size figures for one append.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppendStats {
    /// Markdown rendering, image embedding and document assembly.
    pub compose_duration_ms: u64,
    /// Wall-clock time of the external rasterizer.
    pub rasterize_duration_ms: u64,
    /// Loading, appending and atomically replacing the archive.
    pub merge_duration_ms: u64,
    /// End-to-end, including scratch setup and cleanup.
    pub total_duration_ms: u64,
    /// Size of the composed HTML document.
    pub html_bytes: usize,
    /// Images embedded in the page.
    pub image_count: usize,
}

/// Archive facts reported by [`crate::inspect`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveInfo {
    pub path: PathBuf,
    pub page_count: usize,
    /// Header version, e.g. `"1.7"`.
    pub pdf_version: String,
    pub file_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_stats() {
        let outcome = AppendOutcome {
            archive_path: PathBuf::from("chat.pdf"),
            page_count: 3,
            pages_added: 1,
            created: false,
            stats: AppendStats {
                html_bytes: 1024,
                image_count: 1,
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["page_count"], 3);
        assert_eq!(json["created"], false);
        assert_eq!(json["stats"]["html_bytes"], 1024);
    }
}
