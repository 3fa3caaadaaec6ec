//! Pipeline wiring tests with in-process doubles.
//!
//! No pdfium, no tesseract, no network: the PDF backend returns canned page
//! texts, the OCR engine fails the test if it is ever reached (unless the
//! test is about OCR), and the model returns a fixed reply.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use image::{DynamicImage, RgbaImage};
use menu2json::pipeline::render::RenderOptions;
use menu2json::{
    ExtractionMethod, GenerationOptions, MenuDocument, MenuError, MenuModel, MenuStructurer,
    OcrEngine, PdfBackend, Pipeline, PipelineConfig, PipelineProgressCallback, Stage,
    TextExtractor,
};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Doubles ──────────────────────────────────────────────────────────────────

/// Canned page texts keyed by file name, so one backend can serve a batch.
struct CannedPdf {
    pages: Vec<(&'static str, Vec<&'static str>)>,
}

impl CannedPdf {
    fn single(pages: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            pages: vec![("*", pages)],
        })
    }

    fn lookup(&self, path: &Path) -> Vec<&'static str> {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        self.pages
            .iter()
            .find(|(k, _)| *k == "*" || name.starts_with(k))
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }
}

impl PdfBackend for CannedPdf {
    fn page_texts(&self, path: &Path, _password: Option<&str>) -> Result<Vec<String>, MenuError> {
        Ok(self.lookup(path).into_iter().map(str::to_string).collect())
    }

    fn render_pages(
        &self,
        _path: &Path,
        _password: Option<&str>,
        page_indices: &[usize],
        _options: &RenderOptions,
    ) -> Result<Vec<(usize, DynamicImage)>, MenuError> {
        Ok(page_indices
            .iter()
            .map(|&i| (i, DynamicImage::ImageRgba8(RgbaImage::new(2, 2))))
            .collect())
    }
}

/// OCR that must never run.
struct ForbiddenOcr;

#[async_trait]
impl OcrEngine for ForbiddenOcr {
    fn name(&self) -> &str {
        "forbidden"
    }

    async fn recognize(&self, page_num: usize, _image: &DynamicImage) -> Result<String, MenuError> {
        panic!("OCR must not run for a document with a text layer (page {page_num})");
    }
}

/// OCR returning the same text for every page.
struct EchoOcr(&'static str);

#[async_trait]
impl OcrEngine for EchoOcr {
    fn name(&self) -> &str {
        "echo"
    }

    async fn recognize(&self, _page_num: usize, _image: &DynamicImage) -> Result<String, MenuError> {
        Ok(self.0.to_string())
    }
}

/// Model replying with a fixed string and recording what it was sent.
struct StubModel {
    reply: String,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl StubModel {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl MenuModel for StubModel {
    fn name(&self) -> &str {
        "stub"
    }

    async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<String, MenuError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

const EXAMPLE_MENU: &str = r#"{
  "menu_summary": "Beer menu with floral design",
  "products": [
    {"name": "Sierra Nevada Pale Ale", "description": "A crisp pale ale.", "price": "$13", "brand": "Sierra Nevada"},
    {"name": "House Draught Stout", "price": "$10"}
  ],
  "brand_percentages": {"Sierra Nevada": 20, "unbranded": 80}
}"#;

// ── Helpers ──────────────────────────────────────────────────────────────────

/// A file that passes the `%PDF` header check; content comes from the double.
fn fixture(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(b"%PDF-1.7\n% menu fixture\n").unwrap();
    path
}

fn pipeline(
    config: &PipelineConfig,
    pdf: Arc<dyn PdfBackend>,
    ocr: Arc<dyn OcrEngine>,
    model: Arc<dyn MenuModel>,
) -> Pipeline {
    let extractor = TextExtractor::with_backends(config, pdf, ocr).unwrap();
    let structurer = MenuStructurer::new(config, model);
    Pipeline::new(extractor, structurer)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn text_layer_menu_produces_example_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(dir.path(), "beer_menu.pdf");
    let pdf = CannedPdf::single(vec![
        "Sierra Nevada Pale Ale ... S13\nA crisp pale ale.",
        "House Draught Stout ... $10",
    ]);
    let model = StubModel::new(EXAMPLE_MENU);
    let config = PipelineConfig::default();
    let p = pipeline(&config, pdf, Arc::new(ForbiddenOcr), model.clone());

    let output = p.run(&path).await.unwrap();

    let expected: Value = serde_json::from_str(EXAMPLE_MENU).unwrap();
    assert_eq!(output.menu, expected);
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);

    // The model saw the page-labelled text verbatim (native text is not normalised).
    let prompt = model.prompts.lock().unwrap()[0].clone();
    assert!(prompt.ends_with(
        "**TEXT**:\nPage 1: Sierra Nevada Pale Ale ... S13\nA crisp pale ale.\nPage 2: House Draught Stout ... $10\n"
    ));
    assert!(prompt.contains("    - sierra nevada"));

    assert_eq!(output.stats.source_pages, 2);
    assert_eq!(output.stats.extracted_pages, 2);
    assert_eq!(output.stats.ocr_pages, 0);

    let typed = MenuDocument::from_value(&output.menu).unwrap();
    assert_eq!(typed.products.len(), 2);
    assert!((typed.percentage_total() - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn scanned_menu_goes_through_ocr_and_price_fix() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(dir.path(), "scan.pdf");
    let pdf = CannedPdf::single(vec!["", ""]);
    let model = StubModel::new(EXAMPLE_MENU);
    let p = pipeline(
        &PipelineConfig::default(),
        pdf,
        Arc::new(EchoOcr("  Pale Ale S13  ")),
        model.clone(),
    );

    let output = p.run(&path).await.unwrap();

    assert_eq!(output.document.ocr_pages(), 2);
    assert!(output
        .document
        .pages
        .iter()
        .all(|pg| pg.method == ExtractionMethod::Ocr));
    assert_eq!(
        output.document.to_page_labeled_text(),
        "Page 1: Pale Ale $13\nPage 2: Pale Ale $13"
    );
    let prompt = model.prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains("Page 1: Pale Ale $13"));
}

#[tokio::test]
async fn blank_document_never_reaches_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(dir.path(), "blank.pdf");
    let model = StubModel::new(EXAMPLE_MENU);
    let p = pipeline(
        &PipelineConfig::default(),
        CannedPdf::single(vec!["", " "]),
        Arc::new(EchoOcr("   ")),
        model.clone(),
    );

    let err = p.run(&path).await.unwrap_err();

    assert!(err.is_no_text());
    assert_eq!(err.stage(), Stage::Extraction);
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_model_reply_fails_in_structuring() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(dir.path(), "menu.pdf");
    let p = pipeline(
        &PipelineConfig::default(),
        CannedPdf::single(vec!["IPA $9"]),
        Arc::new(ForbiddenOcr),
        StubModel::new("Here is the menu you asked for!"),
    );

    let err = p.run(&path).await.unwrap_err();

    assert!(matches!(err, MenuError::ModelResponseMalformed { .. }));
    assert!(err.client_message().starts_with("structuring failed"));
}

#[tokio::test]
async fn errors_reach_the_progress_callback() {
    #[derive(Default)]
    struct Errors(Mutex<Vec<String>>);
    impl PipelineProgressCallback for Errors {
        fn on_error(&self, error: &str) {
            self.0.lock().unwrap().push(error.to_string());
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let errors = Arc::new(Errors::default());
    let p = pipeline(
        &PipelineConfig::default(),
        CannedPdf::single(vec!["IPA $9"]),
        Arc::new(ForbiddenOcr),
        StubModel::new("{}"),
    )
    .with_progress(errors.clone());

    let missing = dir.path().join("missing.pdf");
    assert!(p.run(&missing).await.is_err());

    let seen = errors.0.lock().unwrap().clone();
    assert_eq!(seen, vec!["extraction failed: the document could not be read as a PDF"]);
}

#[tokio::test]
async fn run_to_file_writes_stem_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(dir.path(), "Summer Cocktails.pdf");
    let out_dir = dir.path().join("output_jsons");
    let p = pipeline(
        &PipelineConfig::default(),
        CannedPdf::single(vec!["Mojito $14"]),
        Arc::new(ForbiddenOcr),
        StubModel::new(EXAMPLE_MENU),
    );

    let (written, stats) = p.run_to_file(&path, &out_dir).await.unwrap();

    assert_eq!(written, out_dir.join("Summer Cocktails.json"));
    assert_eq!(stats.extracted_pages, 1);
    let text = std::fs::read_to_string(&written).unwrap();
    assert!(
        text.starts_with("{\n  \"menu_summary\": \"Beer menu with floral design\",\n  \"products\": ["),
        "expected the reply's key order with 2-space indent, got: {text}"
    );
    let pos = |needle: &str| text.find(needle).unwrap();
    assert!(pos("\"products\"") < pos("\"brand_percentages\""));
    assert!(pos("\"description\"") < pos("\"price\": \"$13\""));
    assert!(pos("\"Sierra Nevada\": 20") < pos("\"unbranded\": 80"));
    let back: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(back, serde_json::from_str::<Value>(EXAMPLE_MENU).unwrap());
}

#[tokio::test]
async fn batch_keeps_input_order_and_isolates_failures() {
    let dir = tempfile::tempdir().unwrap();
    let good_a = fixture(dir.path(), "a_menu.pdf");
    let blank = fixture(dir.path(), "b_blank.pdf");
    let good_c = fixture(dir.path(), "c_menu.pdf");
    let pdf = Arc::new(CannedPdf {
        pages: vec![
            ("a_", vec!["Lager $8"]),
            ("b_", vec![""]),
            ("c_", vec!["Cider $9"]),
        ],
    });
    let model = StubModel::new(EXAMPLE_MENU);
    let p = pipeline(
        &PipelineConfig::default(),
        pdf,
        Arc::new(EchoOcr("")),
        model.clone(),
    );

    let paths = vec![good_a.clone(), blank.clone(), good_c.clone()];
    let results = menu2json::convert::run_batch(&p, &paths, 3).await;

    let order: Vec<&PathBuf> = results.iter().map(|(p, _)| p).collect();
    assert_eq!(order, vec![&good_a, &blank, &good_c]);
    assert!(results[0].1.is_ok());
    assert!(results[1].1.as_ref().unwrap_err().is_no_text());
    assert!(results[2].1.is_ok());
    assert_eq!(model.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn custom_brand_list_reaches_the_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(dir.path(), "menu.pdf");
    let config = PipelineConfig::builder()
        .brands(["Coopers", "Little Creatures"].into_iter().collect())
        .build()
        .unwrap();
    let model = StubModel::new(EXAMPLE_MENU);
    let p = pipeline(
        &config,
        CannedPdf::single(vec!["Coopers Pale $11"]),
        Arc::new(ForbiddenOcr),
        model.clone(),
    );

    p.run(&path).await.unwrap();

    let prompt = model.prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains("    - Coopers\n    - Little Creatures\n"));
    assert!(!prompt.contains("    - Bacardi"));
}

#[test]
fn pipeline_types_are_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Pipeline>();
    assert_send_sync::<TextExtractor>();
    assert_send_sync::<MenuStructurer>();
}
