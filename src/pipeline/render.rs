//! PDF rasterisation for the OCR fallback.
//!
//! ## Why scale by DPI, then cap pixels?
//!
//! OCR accuracy depends on glyph size in pixels, so pages are rendered at a
//! fixed DPI (300 by default) relative to their physical size. A poster-sized
//! menu at 300 DPI would still be enormous, so `max_pixels` caps the longest
//! edge regardless of physical size, keeping memory bounded.

use crate::config::PipelineConfig;
use crate::error::MenuError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

/// PDF user-space units per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// How pages are rasterised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub dpi: u32,
    pub max_pixels: u32,
}

impl RenderOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
        }
    }

    /// Scale factor from PDF points to pixels.
    pub fn scale(&self) -> f32 {
        self.dpi as f32 / POINTS_PER_INCH
    }
}

/// Render selected pages of an open document.
///
/// Out-of-range indices are skipped with a warning.
pub(crate) fn render_document_pages(
    document: &PdfDocument<'_>,
    page_indices: &[usize],
    options: &RenderOptions,
) -> Result<Vec<(usize, DynamicImage)>, MenuError> {
    let pages = document.pages();
    let total_pages = pages.len() as usize;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(options.scale())
        .set_maximum_width(options.max_pixels as i32)
        .set_maximum_height(options.max_pixels as i32);

    let mut results = Vec::with_capacity(page_indices.len());

    for &idx in page_indices {
        if idx >= total_pages {
            warn!(
                "Skipping page {} (out of range, total={})",
                idx + 1,
                total_pages
            );
            continue;
        }

        let page = pages.get(idx as u16).map_err(|e| MenuError::OcrFailed {
            page: idx + 1,
            detail: format!("could not load page for rendering: {:?}", e),
        })?;

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| MenuError::OcrFailed {
                page: idx + 1,
                detail: format!("rasterisation failed: {:?}", e),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} at {} DPI → {}x{} px",
            idx + 1,
            options.dpi,
            image.width(),
            image.height()
        );

        results.push((idx, image));
    }

    Ok(results)
}
