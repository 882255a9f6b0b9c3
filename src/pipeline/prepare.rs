//! Document preparation: arbitrary input files → a flat list of raster
//! images ready for prompt embedding.
//!
//! Three steps, all before any network call:
//!
//! 1. **Validation** — every path must exist, be a file, and carry a
//!    supported extension; one bad file rejects the whole request.
//! 2. **Rasterisation** — PDFs become one PNG per page via pdfium, written
//!    to temp files registered with the caller's [`TempRegistry`]. pdfium is
//!    not async-safe, so the work runs on `spawn_blocking`.
//! 3. **Resize** — every raster input is capped to `max_image_size` on its
//!    longest edge, aspect preserved, in place. PDF pages are already capped
//!    by the render config and skip this step.

use crate::error::ExtractError;
use crate::resources::TempRegistry;
use image::imageops::FilterType;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Extensions the extractor accepts, lowercase, without the dot.
pub const SUPPORTED_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "tiff", "bmp", "gif", "webp", "pdf"];

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn is_pdf(path: &Path) -> bool {
    extension_of(path).as_deref() == Some("pdf")
}

/// Validate every input path before any conversion or network work.
pub fn validate_paths(paths: &[PathBuf]) -> Result<(), ExtractError> {
    for path in paths {
        if !path.exists() || !path.is_file() {
            return Err(ExtractError::FileNotFound { path: path.clone() });
        }
        let extension = extension_of(path).unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ExtractError::UnsupportedFormat {
                path: path.clone(),
                extension: format!(".{extension}"),
                supported: SUPPORTED_EXTENSIONS.join(", "),
            });
        }
    }
    debug!("Validated {} input path(s)", paths.len());
    Ok(())
}

/// Normalise input files into an ordered list of size-capped raster images.
///
/// PDF pages are appended in page order at the position of their source
/// file, so the document indices the model sees follow the input order.
pub async fn prepare_documents(
    paths: &[PathBuf],
    max_image_size: u32,
    registry: &TempRegistry,
) -> Result<Vec<PathBuf>, ExtractError> {
    validate_paths(paths)?;

    let paths = paths.to_vec();
    let registry = registry.clone();
    tokio::task::spawn_blocking(move || prepare_blocking(&paths, max_image_size, &registry))
        .await
        .map_err(|e| ExtractError::Internal(format!("preparation task panicked: {e}")))?
}

fn prepare_blocking(
    paths: &[PathBuf],
    max_image_size: u32,
    registry: &TempRegistry,
) -> Result<Vec<PathBuf>, ExtractError> {
    let mut images = Vec::new();
    for path in paths {
        if is_pdf(path) {
            let pages = rasterize_pdf(path, max_image_size, registry)?;
            info!("Converted '{}' to {} page image(s)", path.display(), pages.len());
            images.extend(pages);
        } else {
            resize_to_fit(path, max_image_size)?;
            images.push(path.clone());
        }
    }
    Ok(images)
}

/// Render every page of a PDF to a registered temp PNG.
///
/// The render config caps the longest edge at `max_image_size`, so pages
/// need no separate resize pass.
fn rasterize_pdf(
    path: &Path,
    max_image_size: u32,
    registry: &TempRegistry,
) -> Result<Vec<PathBuf>, ExtractError> {
    let pdfium = Pdfium::default();
    let document =
        pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| ExtractError::Rasterisation {
                path: path.to_path_buf(),
                page: 0,
                detail: format!("{e:?}"),
            })?;

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_image_size as i32)
        .set_maximum_height(max_image_size as i32);

    let mut page_paths = Vec::new();
    for (idx, page) in document.pages().iter().enumerate() {
        let bitmap =
            page.render_with_config(&render_config)
                .map_err(|e| ExtractError::Rasterisation {
                    path: path.to_path_buf(),
                    page: idx,
                    detail: format!("{e:?}"),
                })?;
        let image = bitmap.as_image();

        let temp = tempfile::Builder::new()
            .prefix("docharvest_page_")
            .suffix(".png")
            .tempfile()
            .map_err(|e| ExtractError::Internal(format!("temp file creation failed: {e}")))?;
        let page_path = temp
            .keep()
            .map_err(|e| ExtractError::Internal(format!("temp file persist failed: {e}")))?
            .1;

        image.save(&page_path).map_err(|e| ExtractError::Image {
            path: page_path.clone(),
            detail: format!("PNG write failed: {e}"),
        })?;

        registry.register(&page_path);
        debug!(
            "Rendered '{}' page {} → {} ({}x{} px)",
            path.display(),
            idx,
            page_path.display(),
            image.width(),
            image.height()
        );
        page_paths.push(page_path);
    }

    Ok(page_paths)
}

/// Cap an image's longest edge at `max_dimension`, preserving aspect ratio.
///
/// Rewrites the file in place; a no-op when already within bounds.
pub fn resize_to_fit(path: &Path, max_dimension: u32) -> Result<(), ExtractError> {
    let img = image::open(path).map_err(|e| ExtractError::Image {
        path: path.to_path_buf(),
        detail: format!("decode failed: {e}"),
    })?;

    let (w, h) = (img.width(), img.height());
    if w.max(h) <= max_dimension {
        debug!("'{}' already within {}px", path.display(), max_dimension);
        return Ok(());
    }

    let resized = img.resize(max_dimension, max_dimension, FilterType::Lanczos3);
    resized.save(path).map_err(|e| ExtractError::Image {
        path: path.to_path_buf(),
        detail: format!("write after resize failed: {e}"),
    })?;
    debug!(
        "Resized '{}': {}x{} → {}x{}",
        path.display(),
        w,
        h,
        resized.width(),
        resized.height()
    );
    Ok(())
}
