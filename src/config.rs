//! Configuration types for menu extraction and structuring.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! [`PipelineConfigBuilder`]. One struct for both stages means a single value
//! can be shared across concurrent invocations and logged as-is.
//!
//! Two pieces of configuration change *what* the pipeline produces rather than
//! *how*: the [`BrandList`] is rendered verbatim into the prompt, and the
//! [`PriceWords`] vocabulary drives OCR price correction. Both are plain data
//! so they can grow without touching extraction or prompting code.

use crate::error::MenuError;
use crate::pipeline::model::MenuModel;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for one menu conversion.
///
/// # Example
/// ```rust
/// use menu2json::{FallbackPolicy, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .dpi(300)
///     .fallback_policy(FallbackPolicy::PageLevel)
///     .price_word("eleven")
///     .build()
///     .unwrap();
/// assert!(config.price_words.contains("eleven"));
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Rasterisation DPI for the OCR fallback. Range: 72–600. Default: 300.
    ///
    /// Tesseract is tuned for ~300 DPI input; lower values lose small print
    /// such as prices in the margin.
    pub dpi: u32,

    /// Cap on the longest edge of a rendered page, in pixels. Default: 5000.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// When to fall back to OCR. Default: [`FallbackPolicy::DocumentLevel`].
    pub fallback_policy: FallbackPolicy,

    /// Which OCR engine to use. Default: [`OcrBackend::Tesseract`].
    pub ocr_backend: OcrBackend,

    /// Tesseract executable (name on `PATH` or absolute path). Default: `tesseract`.
    pub tesseract_cmd: String,

    /// Tesseract language code(s), e.g. `eng` or `eng+fra`. Default: `eng`.
    pub ocr_language: String,

    /// Per-page OCR timeout in seconds. Default: 120.
    pub ocr_timeout_secs: u64,

    /// Also run the cleanup pass over native text-layer output. Default: false.
    ///
    /// Native text is assumed clean; only OCR output is normalised unless
    /// this is switched on.
    pub normalize_native_text: bool,

    /// Spelled-out prices recognised by the `S` → `$` correction.
    pub price_words: PriceWords,

    /// Brands the model may attribute products to.
    pub brands: BrandList,

    /// LLM model identifier, e.g. `gemini-1.5-flash`, `gpt-4.1-mini`.
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. `gemini`, `openai`, `anthropic`, `ollama`).
    /// If None along with `model_client`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed model client. Takes precedence over `provider_name`.
    pub model_client: Option<Arc<dyn MenuModel>>,

    /// Sampling temperature for the structuring call. Default: 0.2.
    ///
    /// Low temperature keeps run-to-run output close; the model is still not
    /// literally deterministic.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 8192.
    ///
    /// A long wine list easily produces several thousand tokens of JSON, and
    /// truncated JSON is rejected as malformed.
    pub max_tokens: usize,

    /// Model call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Replacement for the built-in instruction block. If None, uses
    /// [`crate::prompts::instruction_block`].
    pub instructions: Option<String>,

    /// Post-parse schema checking. Default: [`SchemaCheck::Off`].
    pub schema_check: SchemaCheck,

    /// Optional progress events sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 5000,
            password: None,
            fallback_policy: FallbackPolicy::default(),
            ocr_backend: OcrBackend::default(),
            tesseract_cmd: "tesseract".to_string(),
            ocr_language: "eng".to_string(),
            ocr_timeout_secs: 120,
            normalize_native_text: false,
            price_words: PriceWords::default(),
            brands: BrandList::default(),
            model: None,
            provider_name: None,
            model_client: None,
            temperature: 0.2,
            max_tokens: 8192,
            api_timeout_secs: 120,
            instructions: None,
            schema_check: SchemaCheck::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("fallback_policy", &self.fallback_policy)
            .field("ocr_backend", &self.ocr_backend)
            .field("tesseract_cmd", &self.tesseract_cmd)
            .field("ocr_language", &self.ocr_language)
            .field("ocr_timeout_secs", &self.ocr_timeout_secs)
            .field("normalize_native_text", &self.normalize_native_text)
            .field("price_words", &self.price_words)
            .field("brands", &self.brands)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("model_client", &self.model_client.as_ref().map(|_| "<dyn MenuModel>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("schema_check", &self.schema_check)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn fallback_policy(mut self, policy: FallbackPolicy) -> Self {
        self.config.fallback_policy = policy;
        self
    }

    pub fn ocr_backend(mut self, backend: OcrBackend) -> Self {
        self.config.ocr_backend = backend;
        self
    }

    pub fn tesseract_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.config.tesseract_cmd = cmd.into();
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs;
        self
    }

    pub fn normalize_native_text(mut self, v: bool) -> Self {
        self.config.normalize_native_text = v;
        self
    }

    pub fn price_words(mut self, words: PriceWords) -> Self {
        self.config.price_words = words;
        self
    }

    /// Add one word to the price vocabulary.
    pub fn price_word(mut self, word: impl Into<String>) -> Self {
        self.config.price_words.insert(word);
        self
    }

    pub fn brands(mut self, brands: BrandList) -> Self {
        self.config.brands = brands;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model_client(mut self, client: Arc<dyn MenuModel>) -> Self {
        self.config.model_client = Some(client);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn instructions(mut self, text: impl Into<String>) -> Self {
        self.config.instructions = Some(text.into());
        self
    }

    pub fn schema_check(mut self, check: SchemaCheck) -> Self {
        self.config.schema_check = check;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, MenuError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(MenuError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.max_tokens == 0 {
            return Err(MenuError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.ocr_timeout_secs == 0 || c.api_timeout_secs == 0 {
            return Err(MenuError::InvalidConfig("timeouts must be ≥ 1 second".into()));
        }
        if c.tesseract_cmd.trim().is_empty() {
            return Err(MenuError::InvalidConfig("tesseract command is empty".into()));
        }
        if c.brands.is_empty() {
            return Err(MenuError::InvalidConfig(
                "brand list is empty; the prompt needs at least one recognised brand".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// When the extractor falls back from the text layer to OCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FallbackPolicy {
    /// OCR every page, but only when *no* page has a text layer. (default)
    ///
    /// A single page with native text disables OCR for the whole document,
    /// even if other pages are scanned images.
    #[default]
    DocumentLevel,
    /// Keep native text where present and OCR only the pages without it.
    PageLevel,
}

/// OCR engine selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OcrBackend {
    /// The `tesseract` executable. (default)
    #[default]
    Tesseract,
    /// A vision LLM reads the rendered page.
    Vision,
}

/// What to do with a JSON response that does not look like a menu.
///
/// Checking is an addition on top of plain JSON parsing; with `Off` the
/// parsed value is returned exactly as the model produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SchemaCheck {
    /// Only require valid JSON. (default)
    #[default]
    Off,
    /// Log schema issues at WARN level and return the value anyway.
    Warn,
    /// Fail with [`MenuError::SchemaViolation`] on any issue.
    Reject,
}

// ── Vocabularies ─────────────────────────────────────────────────────────

/// Spelled-out price words recognised after a misread `$`.
///
/// Deliberately a plain list, not a number parser: coverage grows by adding
/// words. Stored lowercase, deduplicated, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceWords(Vec<String>);

impl Default for PriceWords {
    fn default() -> Self {
        Self::from_iter(["ten", "twelve", "fifteen", "twenty"])
    }
}

impl PriceWords {
    /// An empty vocabulary: only numerals are corrected.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Add a word. Blank words are ignored.
    pub fn insert(&mut self, word: impl Into<String>) {
        let word = word.into().trim().to_lowercase();
        if !word.is_empty() && !self.0.contains(&word) {
            self.0.push(word);
        }
    }

    pub fn contains(&self, word: &str) -> bool {
        let word = word.to_lowercase();
        self.0.iter().any(|w| *w == word)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for PriceWords {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut words = Self::empty();
        for w in iter {
            words.insert(w);
        }
        words
    }
}

impl<S: Into<String>> Extend<S> for PriceWords {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for w in iter {
            self.insert(w);
        }
    }
}

/// Recognised brands, rendered into the prompt exactly as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandList(Vec<String>);

impl Default for BrandList {
    fn default() -> Self {
        Self::from_iter([
            "Bacardi",
            "10000 hours",
            "free reign",
            "state of brewing",
            "sierra nevada",
        ])
    }
}

impl BrandList {
    /// Parse one brand per line; blank lines and `#` comments are skipped.
    pub fn from_lines(text: &str) -> Self {
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for BrandList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut brands: Vec<String> = Vec::new();
        for b in iter {
            let b = b.into().trim().to_string();
            if !b.is_empty() && !brands.contains(&b) {
                brands.push(b);
            }
        }
        Self(brands)
    }
}
