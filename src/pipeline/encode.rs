//! Image encoding: raster file → base64 data-URI content part.
//!
//! VLM APIs accept images as base64 data URIs embedded in the JSON request
//! body. The bytes are sent exactly as they sit on disk — the preparer has
//! already capped dimensions, and re-encoding lossy formats would only cost
//! quality.

use crate::error::ExtractError;
use crate::pipeline::gateway::ContentPart;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;
use tracing::debug;

/// MIME type for a supported raster extension.
fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("tiff") => "image/tiff",
        // jpg / jpeg and anything the preparer let through
        _ => "image/jpeg",
    }
}

/// Read an image file and wrap it as an inline data-URI part.
pub fn image_part(path: &Path) -> Result<ContentPart, ExtractError> {
    let bytes = std::fs::read(path).map_err(|e| ExtractError::Image {
        path: path.to_path_buf(),
        detail: format!("read failed: {e}"),
    })?;
    let b64 = STANDARD.encode(&bytes);
    debug!("Encoded {} → {} bytes base64", path.display(), b64.len());
    Ok(ContentPart::image(format!(
        "data:{};base64,{}",
        mime_for(path),
        b64
    )))
}
