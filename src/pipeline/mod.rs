//! Pipeline stages for PDF-to-menu-JSON conversion.
//!
//! Each submodule implements exactly one step. The seams that touch the
//! outside world (pdfium, the OCR engine, the model service) are traits so
//! tests can swap them for doubles without touching the logic around them.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌── text_layer ──────────────────────────────┐
//! input ──▶──┤                                            ├──▶ page-labelled text ──▶ model ──▶ response
//! (path)     └── render ──▶ encode ──▶ ocr ──▶ normalize ─┘                          (LLM)     (JSON)
//!              (only when the fallback policy asks for OCR)
//! ```
//!
//! 1. [`input`]      — validate the path points at a readable PDF
//! 2. [`text_layer`] — read the embedded text of every page (pdfium)
//! 3. [`render`]     — rasterise pages for OCR at a fixed DPI
//! 4. [`encode`]     — PNG-encode rendered pages
//! 5. [`ocr`]        — recognise text (tesseract or a vision LLM)
//! 6. [`normalize`]  — fix known OCR misreads (`S10` → `$10`)
//! 7. [`model`]      — the generative capability behind [`model::MenuModel`]
//! 8. [`response`]   — strict JSON parsing and optional schema checks

pub mod encode;
pub mod input;
pub mod model;
pub mod normalize;
pub mod ocr;
pub mod render;
pub mod response;
pub mod text_layer;
