//! Error types for the menu2json library.
//!
//! Every failure is fatal for the invocation that hit it and is returned as
//! `Err(MenuError)`. Nothing is downgraded to an empty or default menu: a
//! wrong menu is worse than a visible failure.
//!
//! Each variant belongs to a pipeline [`Stage`] so that callers (an HTTP
//! layer, a CLI) can tell the user *where* things went wrong without leaking
//! paths or provider payloads — see [`MenuError::client_message`].

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Configuration or internal plumbing, before any document work.
    Pipeline,
    /// PDF text-layer reading, rasterisation, OCR.
    Extraction,
    /// Prompting the model and validating its response.
    Structuring,
    /// Writing the resulting JSON.
    Output,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Pipeline => "pipeline",
            Stage::Extraction => "extraction",
            Stage::Structuring => "structuring",
            Stage::Output => "output",
        };
        f.write_str(s)
    }
}

/// All errors returned by the menu2json library.
#[derive(Debug, Error)]
pub enum MenuError {
    // ── Extraction ────────────────────────────────────────────────────────
    /// The file is missing, unreadable, not a PDF, or cannot be parsed.
    #[error("Cannot read PDF '{path}': {reason}")]
    DocumentUnreadable { path: PathBuf, reason: String },

    /// The pdfium library could not be located or bound.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy."
    )]
    PdfEngineUnavailable(String),

    /// The OCR backend is not present on this host.
    #[error("OCR engine '{engine}' is not available: {detail}")]
    OcrEngineUnavailable { engine: String, detail: String },

    /// The OCR backend ran but failed on a page.
    #[error("OCR failed on page {page}: {detail}")]
    OcrFailed { page: usize, detail: String },

    /// The OCR backend did not finish a page in time.
    #[error("OCR timed out after {secs}s on page {page}")]
    OcrTimeout { page: usize, secs: u64 },

    /// Neither the text layer nor OCR produced any text.
    ///
    /// A blank document is not a system fault, but there is nothing to
    /// structure. Check with [`MenuError::is_no_text`].
    #[error("No extractable text in '{path}' ({pages} pages, text layer and OCR both empty)")]
    NoExtractableText { path: PathBuf, pages: usize },

    // ── Structuring ───────────────────────────────────────────────────────
    /// Structuring was asked to work on empty text; no model call was made.
    #[error("Input text is empty; refusing to call the model")]
    EmptyInput,

    /// No model provider could be resolved.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Network, auth or quota failure from the model service.
    #[error("Model call to '{provider}' failed: {detail}")]
    ModelCallFailed { provider: String, detail: String },

    /// The model call exceeded the configured timeout.
    #[error("Model call to '{provider}' timed out after {secs}s")]
    ModelTimeout { provider: String, secs: u64 },

    /// The model answered, but not with JSON.
    #[error("Model response is not valid JSON: {detail}\nResponse starts with: {snippet:?}")]
    ModelResponseMalformed { detail: String, snippet: String },

    /// Strict schema checking rejected a well-formed JSON response.
    #[error("Model response does not match the menu schema: {}", .issues.join("; "))]
    SchemaViolation { issues: Vec<String> },

    // ── Output ────────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Pipeline ──────────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MenuError {
    /// The stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            MenuError::DocumentUnreadable { .. }
            | MenuError::PdfEngineUnavailable(_)
            | MenuError::OcrEngineUnavailable { .. }
            | MenuError::OcrFailed { .. }
            | MenuError::OcrTimeout { .. }
            | MenuError::NoExtractableText { .. } => Stage::Extraction,
            MenuError::EmptyInput
            | MenuError::ProviderNotConfigured { .. }
            | MenuError::ModelCallFailed { .. }
            | MenuError::ModelTimeout { .. }
            | MenuError::ModelResponseMalformed { .. }
            | MenuError::SchemaViolation { .. } => Stage::Structuring,
            MenuError::OutputWriteFailed { .. } => Stage::Output,
            MenuError::InvalidConfig(_) | MenuError::Internal(_) => Stage::Pipeline,
        }
    }

    /// `true` for an entirely blank document, as opposed to a real fault.
    pub fn is_no_text(&self) -> bool {
        matches!(self, MenuError::NoExtractableText { .. })
    }

    /// A message safe to show an end user: names the failed stage, carries
    /// no paths, provider payloads or other internal detail.
    pub fn client_message(&self) -> String {
        let summary = match self {
            MenuError::DocumentUnreadable { .. } => "the document could not be read as a PDF",
            MenuError::PdfEngineUnavailable(_) => "the PDF engine is not available",
            MenuError::OcrEngineUnavailable { .. } => "the OCR engine is not available",
            MenuError::OcrFailed { .. } => "optical character recognition failed",
            MenuError::OcrTimeout { .. } => "optical character recognition timed out",
            MenuError::NoExtractableText { .. } => "no text could be found in the document",
            MenuError::EmptyInput => "there was no text to structure",
            MenuError::ProviderNotConfigured { .. } => "no language model is configured",
            MenuError::ModelCallFailed { .. } => "the language model request failed",
            MenuError::ModelTimeout { .. } => "the language model did not answer in time",
            MenuError::ModelResponseMalformed { .. } => "the language model returned malformed JSON",
            MenuError::SchemaViolation { .. } => "the language model returned an unexpected menu shape",
            MenuError::OutputWriteFailed { .. } => "the result could not be saved",
            MenuError::InvalidConfig(_) => "the pipeline is misconfigured",
            MenuError::Internal(_) => "an internal error occurred",
        };
        format!("{} failed: {}", self.stage(), summary)
    }
}
