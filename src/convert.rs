//! Full-pipeline entry points: PDF in, menu JSON out.
//!
//! Every invocation is independent. A [`Pipeline`] holds only immutable
//! configuration and shared handles to stateless backends, so one value can
//! serve many concurrent conversions without coordination.
//!
//! The two stages run strictly in sequence: extraction must finish before
//! structuring starts because the model needs the whole menu at once.

use crate::config::PipelineConfig;
use crate::error::MenuError;
use crate::extract::TextExtractor;
use crate::output::{ExtractedDocument, MenuOutput, PipelineStats};
use crate::progress::{self, NoopProgressCallback, ProgressCallback};
use crate::structure::MenuStructurer;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Extraction followed by structuring.
pub struct Pipeline {
    extractor: TextExtractor,
    structurer: MenuStructurer,
    progress: ProgressCallback,
}

impl Pipeline {
    pub fn new(extractor: TextExtractor, structurer: MenuStructurer) -> Self {
        Self {
            extractor,
            structurer,
            progress: Arc::new(NoopProgressCallback),
        }
    }

    /// Production pipeline for `config`.
    ///
    /// The model provider is resolved here, so a missing API key fails
    /// before any PDF work is done.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, MenuError> {
        let structurer = MenuStructurer::from_config(config)?;
        let extractor = TextExtractor::from_config(config)?;
        Ok(Self {
            extractor,
            structurer,
            progress: progress::or_noop(&config.progress_callback),
        })
    }

    /// Route stage failures to `cb` as well as returning them.
    pub fn with_progress(mut self, cb: ProgressCallback) -> Self {
        self.progress = cb;
        self
    }

    /// Convert one PDF.
    pub async fn run(&self, path: &Path) -> Result<MenuOutput, MenuError> {
        let result = self.run_inner(path).await;
        if let Err(ref e) = result {
            warn!("{}: {}", path.display(), e);
            self.progress.on_error(&e.client_message());
        }
        result
    }

    async fn run_inner(&self, path: &Path) -> Result<MenuOutput, MenuError> {
        let total_start = Instant::now();
        info!("Starting conversion: {}", path.display());

        // ── Step 1: Extract ──────────────────────────────────────────────
        let extract_start = Instant::now();
        let document = self.extractor.extract(path).await?;
        let extraction_ms = extract_start.elapsed().as_millis() as u64;

        // ── Step 2: Structure ────────────────────────────────────────────
        let structure_start = Instant::now();
        let menu = self
            .structurer
            .structure(&document.to_page_labeled_text())
            .await?;
        let structuring_ms = structure_start.elapsed().as_millis() as u64;

        let stats = PipelineStats {
            source_pages: document.source_pages,
            extracted_pages: document.pages.len(),
            ocr_pages: document.ocr_pages(),
            text_chars: document.text_chars(),
            extraction_ms,
            structuring_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };
        info!(
            "Conversion complete: {} pages ({} OCR), extraction {}ms, structuring {}ms",
            stats.extracted_pages, stats.ocr_pages, extraction_ms, structuring_ms
        );

        Ok(MenuOutput {
            menu,
            document,
            stats,
        })
    }

    /// Convert one PDF and write `<stem>.json` into `out_dir`.
    pub async fn run_to_file(
        &self,
        path: &Path,
        out_dir: &Path,
    ) -> Result<(PathBuf, PipelineStats), MenuError> {
        let output = self.run(path).await?;
        let written = write_menu_json(&output.menu, out_dir, &output_stem(path)).await?;
        Ok((written, output.stats))
    }
}

/// Convert a PDF to menu JSON.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// Every failure is fatal and returned as `Err`; no partial or default menu
/// is ever produced. Use [`MenuError::stage`] to tell extraction failures
/// from structuring failures.
///
/// # Example
/// ```rust,no_run
/// use menu2json::{convert, PipelineConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PipelineConfig::default();
/// let output = convert("drinks.pdf", &config).await?;
/// println!("{}", serde_json::to_string_pretty(&output.menu)?);
/// # Ok(())
/// # }
/// ```
pub async fn convert(
    path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<MenuOutput, MenuError> {
    Pipeline::from_config(config)?.run(path.as_ref()).await
}

/// Run only the extraction stage.
///
/// Needs no model provider or API key.
pub async fn extract_text(
    path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<ExtractedDocument, MenuError> {
    TextExtractor::from_config(config)?
        .extract(path.as_ref())
        .await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<MenuOutput, MenuError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| MenuError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(path, config))
}

/// Convert PDF bytes held in memory, e.g. an upload body.
///
/// The bytes are written to a managed [`tempfile`] that is removed when the
/// call returns.
pub async fn convert_from_bytes(
    bytes: &[u8],
    config: &PipelineConfig,
) -> Result<MenuOutput, MenuError> {
    let mut tmp = tempfile::Builder::new()
        .prefix("menu2json-")
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| MenuError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| MenuError::Internal(format!("tempfile write: {e}")))?;
    tmp.flush()
        .map_err(|e| MenuError::Internal(format!("tempfile flush: {e}")))?;
    // `tmp` is dropped (and the file deleted) when `convert` returns
    convert(tmp.path(), config).await
}

/// Convert a PDF and write the menu to `<out_dir>/<stem>.json`.
///
/// Returns the written path. Uses an atomic write (temp file + rename) so a
/// reader never sees a half-written file.
pub async fn convert_to_file(
    path: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<(PathBuf, PipelineStats), MenuError> {
    Pipeline::from_config(config)?
        .run_to_file(path.as_ref(), out_dir.as_ref())
        .await
}

/// Convert several PDFs, at most `concurrency` at a time.
///
/// Each document is an independent invocation; one failure does not affect
/// the others. Results come back in input order. The outer `Err` is only
/// for setup failures (e.g. no model provider).
pub async fn convert_batch(
    paths: &[PathBuf],
    config: &PipelineConfig,
    concurrency: usize,
) -> Result<Vec<(PathBuf, Result<MenuOutput, MenuError>)>, MenuError> {
    let pipeline = Pipeline::from_config(config)?;
    Ok(run_batch(&pipeline, paths, concurrency).await)
}

/// [`convert_batch`] over an existing pipeline.
pub async fn run_batch(
    pipeline: &Pipeline,
    paths: &[PathBuf],
    concurrency: usize,
) -> Vec<(PathBuf, Result<MenuOutput, MenuError>)> {
    info!("Batch of {} documents, concurrency {}", paths.len(), concurrency.max(1));
    stream::iter(paths.iter().cloned())
        .map(|path| async move {
            let result = pipeline.run(&path).await;
            (path, result)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}

/// File stem for the output JSON; `menu` when the input has none.
pub fn output_stem(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "menu".to_string())
}

/// Write `menu` as pretty JSON (2-space indent) to `<out_dir>/<stem>.json`.
///
/// Creates `out_dir` if needed and replaces an existing file atomically.
pub async fn write_menu_json(
    menu: &Value,
    out_dir: &Path,
    stem: &str,
) -> Result<PathBuf, MenuError> {
    let path = out_dir.join(format!("{stem}.json"));
    let write_failed = |source: std::io::Error| MenuError::OutputWriteFailed {
        path: path.clone(),
        source,
    };

    tokio::fs::create_dir_all(out_dir).await.map_err(write_failed)?;

    let mut body = serde_json::to_vec_pretty(menu)
        .map_err(|e| MenuError::Internal(format!("serialising menu: {e}")))?;
    body.push(b'\n');

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &body).await.map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, &path).await.map_err(write_failed)?;

    info!("Wrote {}", path.display());
    Ok(path)
}
