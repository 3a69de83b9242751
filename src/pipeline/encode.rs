//! Image encoding: file bytes → base64 `data:` URI.
//!
//! Images are inlined rather than linked so the composed page is
//! self-contained; the rasterizer may run in another working directory or a
//! sandbox that cannot see the caller's files.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use std::path::Path;
use tracing::debug;

/// MIME type used when the extension is not a known image type.
pub const FALLBACK_MIME: &str = "application/octet-stream";

/// Infer an image MIME type from the file extension (case-insensitive).
pub fn mime_for_path(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return FALLBACK_MIME;
    };
    let ext = ext.to_ascii_lowercase();
    if ext == "svg" || ext == "svgz" {
        return "image/svg+xml";
    }
    ImageFormat::from_extension(&ext)
        .map(|f| f.to_mime_type())
        .unwrap_or(FALLBACK_MIME)
}

/// Encode raw image bytes as a `data:` URI.
pub fn data_uri(bytes: &[u8], mime: &str) -> String {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded {} image → {} bytes base64", mime, b64.len());
    format!("data:{mime};base64,{b64}")
}
