//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to observe a
//! conversion as it moves through extraction and structuring. The CLI uses
//! this to drive its progress bar; a service can forward the same events to
//! its own job tracker.
//!
//! # Example
//!
//! ```rust
//! use menu2json::{PipelineConfig, PipelineProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     pages: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_page_extracted(&self, _page_num: usize, _ocr: bool, _chars: usize) {
//!         self.pages.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { pages: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline at each stage boundary.
///
/// All methods default to no-ops so callers only override what they care
/// about. Implementations must be `Send + Sync`: batch conversion runs several
/// documents concurrently and may share one callback between them.
pub trait PipelineProgressCallback: Send + Sync {
    /// The text layer was read; `total_pages` is the document's page count.
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// OCR is about to run on `pages` (1-indexed).
    fn on_ocr_fallback(&self, pages: &[usize]) {
        let _ = pages;
    }

    /// A page produced non-empty text.
    ///
    /// # Arguments
    /// * `page_num` — 1-indexed page number
    /// * `ocr`      — whether the text came from OCR
    /// * `chars`    — character count after trimming
    fn on_page_extracted(&self, page_num: usize, ocr: bool, chars: usize) {
        let _ = (page_num, ocr, chars);
    }

    /// The prompt is built and the model call is about to start.
    fn on_structuring_start(&self, prompt_chars: usize) {
        let _ = prompt_chars;
    }

    /// The model reply parsed as JSON.
    fn on_structuring_complete(&self, response_chars: usize) {
        let _ = response_chars;
    }

    /// A stage failed; `error` is the client-facing message.
    fn on_error(&self, error: &str) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

/// The configured callback, or a no-op.
pub(crate) fn or_noop(cb: &Option<ProgressCallback>) -> ProgressCallback {
    cb.clone().unwrap_or_else(|| Arc::new(NoopProgressCallback))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        total: AtomicUsize,
        ocr_pages: Mutex<Vec<usize>>,
        extracted: AtomicUsize,
        errors: Mutex<Vec<String>>,
    }

    impl PipelineProgressCallback for TrackingCallback {
        fn on_extraction_start(&self, total_pages: usize) {
            self.total.store(total_pages, Ordering::SeqCst);
        }

        fn on_ocr_fallback(&self, pages: &[usize]) {
            self.ocr_pages.lock().unwrap().extend_from_slice(pages);
        }

        fn on_page_extracted(&self, _page_num: usize, _ocr: bool, _chars: usize) {
            self.extracted.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, error: &str) {
            self.errors.lock().unwrap().push(error.to_string());
        }
    }

    #[test]
    fn tracking_callback_receives_events() {
        let cb = TrackingCallback::default();
        cb.on_extraction_start(3);
        cb.on_ocr_fallback(&[1, 3]);
        cb.on_page_extracted(1, true, 120);
        cb.on_page_extracted(3, true, 80);
        cb.on_error("Extraction failed: boom");

        assert_eq!(cb.total.load(Ordering::SeqCst), 3);
        assert_eq!(*cb.ocr_pages.lock().unwrap(), vec![1, 3]);
        assert_eq!(cb.extracted.load(Ordering::SeqCst), 2);
        assert_eq!(cb.errors.lock().unwrap().len(), 1);
    }

    #[test]
    fn noop_callback_compiles_and_runs() {
        let cb = NoopProgressCallback;
        cb.on_extraction_start(5);
        cb.on_ocr_fallback(&[1]);
        cb.on_page_extracted(1, false, 100);
        cb.on_structuring_start(2048);
        cb.on_structuring_complete(512);
        cb.on_error("oops");
    }

    #[test]
    fn or_noop_prefers_configured_callback() {
        let tracking = Arc::new(TrackingCallback::default());
        let configured: Option<ProgressCallback> = Some(tracking.clone());
        or_noop(&configured).on_extraction_start(7);
        assert_eq!(tracking.total.load(Ordering::SeqCst), 7);

        or_noop(&None).on_extraction_start(1);
    }
}
