//! The extraction stage: PDF path in, ordered page texts out.
//!
//! ## Algorithm
//!
//! 1. Validate the path (`%PDF` magic) and read every page's native text
//!    layer on a blocking thread.
//! 2. Trim each page; pages that are empty after trimming are dropped.
//! 3. Decide which pages need OCR:
//!    - [`FallbackPolicy::DocumentLevel`]: every page, but only when *no* page
//!      had native text. A document with any text layer is never OCR'd.
//!    - [`FallbackPolicy::PageLevel`]: exactly the pages whose native text
//!      was empty.
//! 4. Rasterise those pages at the configured DPI and run the OCR engine on
//!    them one at a time, each under a timeout.
//! 5. Trim OCR output, drop empty pages, and apply price normalisation.
//! 6. Fail with [`MenuError::NoExtractableText`] if nothing survived.
//!
//! OCR pages run sequentially: the engines are CPU- or quota-bound and
//! rendered pages at 300 DPI are large, so parallelism buys little and costs
//! memory.

use crate::config::{FallbackPolicy, OcrBackend, PipelineConfig};
use crate::error::MenuError;
use crate::output::{ExtractedDocument, ExtractionMethod, PageText};
use crate::pipeline::input;
use crate::pipeline::normalize::{clean_ocr_text, PriceCorrector};
use crate::pipeline::ocr::{OcrEngine, TesseractOcr, VisionOcr};
use crate::pipeline::render::RenderOptions;
use crate::pipeline::text_layer::{PdfBackend, PdfiumBackend};
use crate::progress::{self, ProgressCallback};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Extracts page text from a PDF, falling back to OCR.
pub struct TextExtractor {
    pdf: Arc<dyn PdfBackend>,
    ocr: Arc<dyn OcrEngine>,
    corrector: PriceCorrector,
    render: RenderOptions,
    policy: FallbackPolicy,
    password: Option<String>,
    ocr_timeout: Duration,
    normalize_native: bool,
    progress: ProgressCallback,
}

impl TextExtractor {
    /// Production extractor: pdfium plus the configured OCR backend.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, MenuError> {
        let ocr: Arc<dyn OcrEngine> = match config.ocr_backend {
            OcrBackend::Tesseract => Arc::new(TesseractOcr::new(
                config.tesseract_cmd.clone(),
                config.ocr_language.clone(),
                config.dpi,
            )),
            OcrBackend::Vision => Arc::new(VisionOcr::from_config(config)?),
        };
        Self::with_backends(config, Arc::new(PdfiumBackend), ocr)
    }

    /// Extractor with explicit PDF and OCR backends.
    pub fn with_backends(
        config: &PipelineConfig,
        pdf: Arc<dyn PdfBackend>,
        ocr: Arc<dyn OcrEngine>,
    ) -> Result<Self, MenuError> {
        Ok(Self {
            pdf,
            ocr,
            corrector: PriceCorrector::new(&config.price_words)?,
            render: RenderOptions::from_config(config),
            policy: config.fallback_policy,
            password: config.password.clone(),
            ocr_timeout: Duration::from_secs(config.ocr_timeout_secs),
            normalize_native: config.normalize_native_text,
            progress: progress::or_noop(&config.progress_callback),
        })
    }

    /// Extract the text of every page of `path`.
    pub async fn extract(&self, path: &Path) -> Result<ExtractedDocument, MenuError> {
        let path = input::validate_pdf_path(path)?;

        let raw_pages = self.read_text_layer(&path).await?;
        let source_pages = raw_pages.len();
        info!("{}: {} pages", path.display(), source_pages);
        self.progress.on_extraction_start(source_pages);

        let mut pages = Vec::with_capacity(source_pages);
        let mut empty = Vec::new();
        for (idx, raw) in raw_pages.iter().enumerate() {
            let text = raw.trim();
            if text.is_empty() {
                empty.push(idx);
                continue;
            }
            let text = if self.normalize_native {
                clean_ocr_text(text, &self.corrector)
            } else {
                text.to_string()
            };
            pages.push(PageText {
                page_number: idx + 1,
                text,
                method: ExtractionMethod::TextLayer,
            });
        }

        let ocr_targets = ocr_targets(self.policy, pages.is_empty(), &empty);
        if !ocr_targets.is_empty() {
            if !pages.is_empty() {
                debug!("{} of {} pages have no text layer", ocr_targets.len(), source_pages);
            }
            pages.extend(self.ocr_pages(&path, &ocr_targets).await?);
            pages.sort_by_key(|p| p.page_number);
        } else if !empty.is_empty() {
            debug!("Dropping {} pages without a text layer", empty.len());
        }

        if pages.is_empty() {
            warn!("{}: no extractable text", path.display());
            return Err(MenuError::NoExtractableText {
                path,
                pages: source_pages,
            });
        }

        for p in &pages {
            self.progress.on_page_extracted(
                p.page_number,
                p.method == ExtractionMethod::Ocr,
                p.text.chars().count(),
            );
        }

        let doc = ExtractedDocument {
            pages,
            source_pages,
        };
        info!(
            "Extracted {} of {} pages ({} via OCR, {} chars)",
            doc.pages.len(),
            source_pages,
            doc.ocr_pages(),
            doc.text_chars()
        );
        Ok(doc)
    }

    async fn read_text_layer(&self, path: &Path) -> Result<Vec<String>, MenuError> {
        let pdf = Arc::clone(&self.pdf);
        let owned_path = path.to_path_buf();
        let password = self.password.clone();
        tokio::task::spawn_blocking(move || pdf.page_texts(&owned_path, password.as_deref()))
            .await
            .map_err(|e| MenuError::Internal(format!("text layer task failed: {e}")))?
    }

    async fn ocr_pages(&self, path: &Path, targets: &[usize]) -> Result<Vec<PageText>, MenuError> {
        let page_numbers: Vec<usize> = targets.iter().map(|i| i + 1).collect();
        info!(
            "OCR fallback with {} on {} page(s): {:?}",
            self.ocr.name(),
            targets.len(),
            page_numbers
        );
        self.progress.on_ocr_fallback(&page_numbers);

        let pdf = Arc::clone(&self.pdf);
        let owned_path = path.to_path_buf();
        let password = self.password.clone();
        let indices = targets.to_vec();
        let render = self.render;
        let images = tokio::task::spawn_blocking(move || {
            pdf.render_pages(&owned_path, password.as_deref(), &indices, &render)
        })
        .await
        .map_err(|e| MenuError::Internal(format!("render task failed: {e}")))??;

        let mut out = Vec::with_capacity(images.len());
        for (idx, image) in images {
            let page_num = idx + 1;
            let raw = tokio::time::timeout(self.ocr_timeout, self.ocr.recognize(page_num, &image))
                .await
                .map_err(|_| MenuError::OcrTimeout {
                    page: page_num,
                    secs: self.ocr_timeout.as_secs(),
                })??;

            let text = raw.trim();
            if text.is_empty() {
                debug!("Page {}: OCR found no text", page_num);
                continue;
            }
            out.push(PageText {
                page_number: page_num,
                text: clean_ocr_text(text, &self.corrector),
                method: ExtractionMethod::Ocr,
            });
        }
        Ok(out)
    }
}

/// 0-based pages to OCR, given the policy and the text-layer outcome.
fn ocr_targets(policy: FallbackPolicy, no_native_text: bool, empty: &[usize]) -> Vec<usize> {
    match policy {
        // With no native text at all, `empty` is every page.
        FallbackPolicy::DocumentLevel if no_native_text => empty.to_vec(),
        FallbackPolicy::DocumentLevel => Vec::new(),
        FallbackPolicy::PageLevel => empty.to_vec(),
    }
}
