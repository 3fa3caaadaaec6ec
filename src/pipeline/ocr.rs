//! Optical character recognition behind the [`OcrEngine`] trait.
//!
//! Two engines ship with the crate:
//!
//! - [`TesseractOcr`] drives the `tesseract` executable as a child process.
//!   The rendered page goes in as PNG on stdin and plain text comes back on
//!   stdout, so nothing touches the filesystem.
//! - [`VisionOcr`] sends the page image to a vision-capable LLM through
//!   `edgequake-llm` and asks for a verbatim transcription. Useful on hosts
//!   where installing tesseract is not an option.
//!
//! Engines see one page at a time. Timeouts are applied by the caller, so
//! an engine future must be safe to drop mid-flight; the tesseract child is
//! spawned with `kill_on_drop` for that reason.

use crate::config::PipelineConfig;
use crate::error::MenuError;
use crate::pipeline::encode;
use crate::pipeline::model::resolve_vision_provider;
use crate::prompts::OCR_SYSTEM_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use image::DynamicImage;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Recognises the text on a single rendered page.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Short engine name for logs and error messages.
    fn name(&self) -> &str;

    /// Recognise the text on `image`, which is page `page_num` (1-indexed).
    ///
    /// Returns the raw recognised text; cleanup happens in the extractor.
    async fn recognize(&self, page_num: usize, image: &DynamicImage) -> Result<String, MenuError>;
}

// ── Tesseract ────────────────────────────────────────────────────────────

/// Tesseract as an external process.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    cmd: String,
    language: String,
    dpi: u32,
}

impl TesseractOcr {
    /// `cmd` is the executable (name on `PATH` or absolute path), `language`
    /// a tesseract language code such as `eng` or `eng+fra`, and `dpi` the
    /// resolution the page was rendered at.
    pub fn new(cmd: impl Into<String>, language: impl Into<String>, dpi: u32) -> Self {
        Self {
            cmd: cmd.into(),
            language: language.into(),
            dpi,
        }
    }

    fn args(&self) -> Vec<String> {
        vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.language.clone(),
            "--dpi".to_string(),
            self.dpi.to_string(),
        ]
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, page_num: usize, image: &DynamicImage) -> Result<String, MenuError> {
        let png = encode::encode_png(image).map_err(|e| MenuError::OcrFailed {
            page: page_num,
            detail: format!("PNG encoding failed: {e}"),
        })?;

        let mut child = Command::new(&self.cmd)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MenuError::OcrEngineUnavailable {
                        engine: self.cmd.clone(),
                        detail: "executable not found; install tesseract or set --tesseract-cmd"
                            .to_string(),
                    }
                } else {
                    MenuError::OcrEngineUnavailable {
                        engine: self.cmd.clone(),
                        detail: e.to_string(),
                    }
                }
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| MenuError::Internal("tesseract stdin was not captured".into()))?;

        // Feed stdin while stdout drains, or a large page can fill the pipe.
        let feed = async move {
            let res = stdin.write_all(&png).await;
            drop(stdin);
            res
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());

        let output = output.map_err(|e| MenuError::OcrFailed {
            page: page_num,
            detail: format!("waiting for tesseract: {e}"),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MenuError::OcrFailed {
                page: page_num,
                detail: format!("tesseract exited with {}: {}", output.status, stderr.trim()),
            });
        }
        // A write error with a successful exit means tesseract stopped
        // reading early; its stdout is still the answer.
        if let Err(e) = fed {
            debug!("Page {}: tesseract closed stdin early ({})", page_num, e);
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("Page {}: tesseract returned {} chars", page_num, text.len());
        Ok(text)
    }
}

// ── Vision LLM ───────────────────────────────────────────────────────────

/// A vision LLM used as an OCR engine.
pub struct VisionOcr {
    provider: Arc<dyn LLMProvider>,
    label: String,
    temperature: f32,
    max_tokens: usize,
}

impl VisionOcr {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
            temperature: 0.0,
            max_tokens: 4096,
        }
    }

    /// Vision OCR on the provider [`resolve_vision_provider`] picks, with the
    /// configured reply budget.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, MenuError> {
        let (provider, label) = resolve_vision_provider(config)?;
        Ok(Self::new(provider, label).with_max_tokens(config.max_tokens))
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

impl std::fmt::Debug for VisionOcr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionOcr")
            .field("label", &self.label)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[async_trait]
impl OcrEngine for VisionOcr {
    fn name(&self) -> &str {
        &self.label
    }

    async fn recognize(&self, page_num: usize, image: &DynamicImage) -> Result<String, MenuError> {
        let image_data = encode::encode_image_data(image).map_err(|e| MenuError::OcrFailed {
            page: page_num,
            detail: format!("PNG encoding failed: {e}"),
        })?;

        // The image carries the content; the user turn text stays empty.
        let messages = vec![
            ChatMessage::system(OCR_SYSTEM_PROMPT),
            ChatMessage::user_with_images("", vec![image_data]),
        ];
        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| MenuError::OcrFailed {
                page: page_num,
                detail: format!("{} vision OCR failed: {}", self.label, e),
            })?;

        debug!(
            "Page {}: vision OCR used {} input / {} output tokens",
            page_num, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn blank_page() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 20, Rgba([255, 255, 255, 255])))
    }

    #[tokio::test]
    async fn vision_ocr_returns_provider_transcription() {
        let provider = Arc::new(edgequake_llm::MockProvider::new());
        provider.add_response("Pale Ale S13").await;
        let ocr = VisionOcr::new(provider, "mock/vision");

        let text = ocr.recognize(1, &blank_page()).await.unwrap();
        assert_eq!(text, "Pale Ale S13");
        assert_eq!(ocr.name(), "mock/vision");
    }

    #[test]
    fn vision_ocr_takes_reply_budget_from_config() {
        let config = PipelineConfig::builder()
            .provider_name("mock")
            .max_tokens(2048)
            .build()
            .unwrap();
        let ocr = VisionOcr::from_config(&config).unwrap();
        let debug = format!("{ocr:?}");
        assert!(debug.contains("max_tokens: 2048"), "{debug}");
        assert!(ocr.name().starts_with("mock/"));
    }

    #[test]
    fn tesseract_reads_stdin_and_writes_stdout() {
        let ocr = TesseractOcr::new("tesseract", "eng+fra", 300);
        assert_eq!(
            ocr.args(),
            vec!["stdin", "stdout", "-l", "eng+fra", "--dpi", "300"]
        );
    }

    #[tokio::test]
    async fn missing_executable_is_engine_unavailable() {
        let ocr = TesseractOcr::new("menu2json-no-such-tesseract-binary", "eng", 300);
        let err = ocr.recognize(1, &blank_page()).await.unwrap_err();
        match err {
            MenuError::OcrEngineUnavailable { engine, .. } => {
                assert_eq!(engine, "menu2json-no-such-tesseract-binary");
            }
            other => panic!("expected OcrEngineUnavailable, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_ocr_failed() {
        // `false` ignores its arguments and exits 1.
        let ocr = TesseractOcr::new("false", "eng", 300);
        let err = ocr.recognize(2, &blank_page()).await.unwrap_err();
        assert!(matches!(err, MenuError::OcrFailed { page: 2, .. }), "got {err:?}");
    }
}
