//! Native text-layer reading via pdfium, behind the [`PdfBackend`] trait.
//!
//! ## Why a trait?
//!
//! The extractor's interesting decisions (when to fall back to OCR, which
//! pages to keep) do not depend on pdfium. Putting pdfium behind a trait lets
//! tests drive those decisions with canned page texts, and lets a test double
//! prove that OCR is never reached for a fully text-based document.
//!
//! All methods are blocking; the extractor calls them from
//! `tokio::task::spawn_blocking` because pdfium is not async-safe.

use crate::error::MenuError;
use crate::pipeline::render::{self, RenderOptions};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// Blocking access to a PDF's text layer and page images.
pub trait PdfBackend: Send + Sync {
    /// Raw text layer of every page in order (index 0 is page 1).
    ///
    /// A page without a text layer yields an empty string, never an error.
    fn page_texts(&self, path: &Path, password: Option<&str>) -> Result<Vec<String>, MenuError>;

    /// Rasterise the given 0-based pages.
    ///
    /// Returns `(page_index_0based, image)` pairs in the order requested.
    fn render_pages(
        &self,
        path: &Path,
        password: Option<&str>,
        page_indices: &[usize],
        options: &RenderOptions,
    ) -> Result<Vec<(usize, DynamicImage)>, MenuError>;
}

/// The production backend: pdfium, bound through `pdfium-auto`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfiumBackend;

impl PdfBackend for PdfiumBackend {
    fn page_texts(&self, path: &Path, password: Option<&str>) -> Result<Vec<String>, MenuError> {
        let pdfium = bind_pdfium()?;
        let document = load_document(&pdfium, path, password)?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        let mut texts = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            let text = match page.text() {
                Ok(t) => t.all(),
                Err(e) => {
                    warn!("Page {}: text layer unreadable ({:?}), treating as empty", idx + 1, e);
                    String::new()
                }
            };
            debug!("Page {}: {} chars of native text", idx + 1, text.len());
            texts.push(text);
        }
        Ok(texts)
    }

    fn render_pages(
        &self,
        path: &Path,
        password: Option<&str>,
        page_indices: &[usize],
        options: &RenderOptions,
    ) -> Result<Vec<(usize, DynamicImage)>, MenuError> {
        let pdfium = bind_pdfium()?;
        let document = load_document(&pdfium, path, password)?;
        render::render_document_pages(&document, page_indices, options)
    }
}

/// Bind to the pdfium shared library, downloading it on first use.
pub(crate) fn bind_pdfium() -> Result<Pdfium, MenuError> {
    pdfium_auto::bind_pdfium_silent().map_err(|e| MenuError::PdfEngineUnavailable(e.to_string()))
}

/// Open a PDF, mapping pdfium's load errors onto [`MenuError::DocumentUnreadable`].
pub(crate) fn load_document<'a>(
    pdfium: &'a Pdfium,
    path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, MenuError> {
    pdfium.load_pdf_from_file(path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        let reason = if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                "wrong password".to_string()
            } else {
                "document is encrypted and needs a password".to_string()
            }
        } else {
            format!("corrupt or unsupported PDF: {err_str}")
        };
        MenuError::DocumentUnreadable {
            path: path.to_path_buf(),
            reason,
        }
    })
}
