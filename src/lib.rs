//! # menu2json
//!
//! Turn a food or drinks menu PDF into structured JSON: a short summary, the
//! products with prices, and how much of the menu each brand accounts for.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Extract    native text layer via pdfium (spawn_blocking)
//!  │     └─ no text?  rasterise at 300 DPI → OCR (tesseract / vision LLM)
//!  │                  → `S10` → `$10` price correction
//!  ├─ 2. Serialise  "Page 1: …\nPage 2: …"
//!  ├─ 3. Prompt     instruction block + brand list + **TEXT** marker + text
//!  ├─ 4. Model      one JSON-mode call (Gemini native, or any edgequake-llm provider)
//!  └─ 5. Parse      strict JSON → serde_json::Value (optional schema check)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use menu2json::{convert, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / ...
//!     let config = PipelineConfig::default();
//!     let output = convert("cocktails.pdf", &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.menu)?);
//!     eprintln!("{} pages, {} via OCR", output.stats.extracted_pages, output.stats.ocr_pages);
//!     Ok(())
//! }
//! ```
//!
//! The two stages are also usable on their own: [`TextExtractor`] needs no
//! model, and [`MenuStructurer`] works on any text.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `menu2json` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! menu2json = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod structure;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    BrandList, FallbackPolicy, OcrBackend, PipelineConfig, PipelineConfigBuilder, PriceWords,
    SchemaCheck,
};
pub use convert::{
    convert, convert_batch, convert_from_bytes, convert_sync, convert_to_file, extract_text,
    Pipeline,
};
pub use error::{MenuError, Stage};
pub use extract::TextExtractor;
pub use output::{ExtractedDocument, ExtractionMethod, MenuDocument, MenuOutput, PageText, PipelineStats, Product};
pub use pipeline::model::{GenerationOptions, MenuModel, ResponseFormat};
pub use pipeline::ocr::OcrEngine;
pub use pipeline::text_layer::PdfBackend;
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use structure::MenuStructurer;
