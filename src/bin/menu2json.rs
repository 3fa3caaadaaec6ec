//! CLI binary for menu2json.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use menu2json::{
    extract_text, BrandList, FallbackPolicy, MenuError, OcrBackend, Pipeline, PipelineConfig,
    PipelineProgressCallback, PriceWords, ProgressCallback, SchemaCheck,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar counting documents, with the current stage as
/// the message and notable events (OCR fallback, failures) printed above it.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new(total_files: usize) -> Arc<Self> {
        let style = if total_files > 1 {
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} menus  \
                 ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
        } else {
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
        }
        .tick_strings(TICKS);

        let bar = ProgressBar::new(total_files as u64);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.set_message("opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.bar.set_message(format!("reading {total_pages} pages"));
    }

    fn on_ocr_fallback(&self, pages: &[usize]) {
        self.bar.println(format!(
            "  {} no text layer on {} page(s), running OCR",
            cyan("◆"),
            pages.len()
        ));
        self.bar.set_message(format!("OCR on {} page(s)", pages.len()));
    }

    fn on_structuring_start(&self, prompt_chars: usize) {
        self.bar
            .set_message(format!("structuring ({prompt_chars} chars)"));
    }

    fn on_structuring_complete(&self, response_chars: usize) {
        self.bar.set_message(format!("parsed {response_chars} chars of JSON"));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One menu, JSON on stdout
  menu2json drinks.pdf

  # Several menus, one <name>.json each
  menu2json -o output_jsons/ test_cases/*.pdf

  # Just the extracted text (no API key needed)
  menu2json --text-only scanned_menu.pdf

  # Scanned menus with a few text pages, OCR only where needed
  menu2json --fallback page-level mixed.pdf

  # Custom brand list, strict shape checking
  menu2json --brands-file brands.txt --schema-check reject menu.pdf

  # Use a specific provider and model
  menu2json --provider openai --model gpt-4.1-mini menu.pdf

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default provider, gemini-1.5-flash)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium; skips auto-download
  MENU2JSON_*             Every flag has an env var, e.g. MENU2JSON_DPI

SETUP:
  1. Install tesseract (for scanned menus): apt install tesseract-ocr
  2. Set API key:     export GEMINI_API_KEY=...
  3. Convert:         menu2json menu.pdf

  PDFium (~30 MB) is downloaded automatically on first run and cached.
"#;

/// Convert menu PDFs into structured JSON.
#[derive(Parser, Debug)]
#[command(
    name = "menu2json",
    version,
    about = "Convert drinks and food menu PDFs into structured JSON",
    long_about = "Extract the text of a menu PDF (native text layer, OCR fallback for scans) \
and have a language model structure it into a summary, a product list with prices, and brand \
percentages.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Menu PDF file(s).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Write `<name>.json` files into this directory instead of printing.
    #[arg(short, long, env = "MENU2JSON_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Print the extracted page text and stop (no model call).
    #[arg(long)]
    text_only: bool,

    /// LLM model ID (e.g. gemini-1.5-flash, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// OCR rendering DPI (72–600).
    #[arg(long, env = "MENU2JSON_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "MENU2JSON_PASSWORD")]
    password: Option<String>,

    /// When to fall back to OCR.
    #[arg(long, env = "MENU2JSON_FALLBACK", value_enum, default_value = "document-level")]
    fallback: FallbackArg,

    /// OCR engine.
    #[arg(long, env = "MENU2JSON_OCR", value_enum, default_value = "tesseract")]
    ocr: OcrArg,

    /// Tesseract executable.
    #[arg(long, env = "MENU2JSON_TESSERACT_CMD", default_value = "tesseract")]
    tesseract_cmd: String,

    /// Tesseract language(s), e.g. eng or eng+fra.
    #[arg(long, env = "MENU2JSON_OCR_LANG", default_value = "eng")]
    ocr_lang: String,

    /// Per-page OCR timeout in seconds.
    #[arg(long, env = "MENU2JSON_OCR_TIMEOUT", default_value_t = 120)]
    ocr_timeout: u64,

    /// Also apply the `S10` → `$10` correction to native text.
    #[arg(long, env = "MENU2JSON_NORMALIZE_NATIVE")]
    normalize_native: bool,

    /// Recognised brands (comma-separated); replaces the built-in list.
    #[arg(long, env = "MENU2JSON_BRANDS", value_delimiter = ',', conflicts_with = "brands_file")]
    brands: Vec<String>,

    /// File with one recognised brand per line (`#` comments allowed).
    #[arg(long, env = "MENU2JSON_BRANDS_FILE")]
    brands_file: Option<PathBuf>,

    /// Extra spelled-out price words (comma-separated), added to the defaults.
    #[arg(long, env = "MENU2JSON_PRICE_WORDS", value_delimiter = ',')]
    price_words: Vec<String>,

    /// Check the model's JSON against the menu shape.
    #[arg(long, env = "MENU2JSON_SCHEMA_CHECK", value_enum, default_value = "off")]
    schema_check: SchemaCheckArg,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "MENU2JSON_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Max LLM output tokens.
    #[arg(long, env = "MENU2JSON_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Model call timeout in seconds.
    #[arg(long, env = "MENU2JSON_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Number of menus converted concurrently.
    #[arg(short, long, env = "MENU2JSON_CONCURRENCY", default_value_t = 2)]
    concurrency: usize,

    /// Print JSON on one line instead of indented.
    #[arg(long, env = "MENU2JSON_COMPACT")]
    compact: bool,

    /// Disable progress bar.
    #[arg(long, env = "MENU2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MENU2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MENU2JSON_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FallbackArg {
    DocumentLevel,
    PageLevel,
}

impl From<FallbackArg> for FallbackPolicy {
    fn from(v: FallbackArg) -> Self {
        match v {
            FallbackArg::DocumentLevel => FallbackPolicy::DocumentLevel,
            FallbackArg::PageLevel => FallbackPolicy::PageLevel,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OcrArg {
    Tesseract,
    Vision,
}

impl From<OcrArg> for OcrBackend {
    fn from(v: OcrArg) -> Self {
        match v {
            OcrArg::Tesseract => OcrBackend::Tesseract,
            OcrArg::Vision => OcrBackend::Vision,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SchemaCheckArg {
    Off,
    Warn,
    Reject,
}

impl From<SchemaCheckArg> for SchemaCheck {
    fn from(v: SchemaCheckArg) -> Self {
        match v {
            SchemaCheckArg::Off => SchemaCheck::Off,
            SchemaCheckArg::Warn => SchemaCheck::Warn,
            SchemaCheckArg::Reject => SchemaCheck::Reject,
        }
    }
}

/// Attach the stage-level message on top of the library error.
fn staged(e: MenuError) -> anyhow::Error {
    let msg = e.client_message();
    anyhow::Error::new(e).context(msg)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.inputs.len() > 1 && cli.output_dir.is_none() && !cli.text_only {
        anyhow::bail!("Several inputs need --output-dir (one <name>.json is written per menu)");
    }

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.text_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Ensure PDFium engine is available ───────────────────────────────────
    // On the very first run the library (~30 MB) is downloaded and cached;
    // later startups only check the cache path.
    if !pdfium_auto::is_pdfium_cached() {
        if !cli.quiet {
            let dl_bar = ProgressBar::new(0);
            dl_bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.cyan} {prefix:.bold}  \
                     [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  ")
                .tick_strings(TICKS),
            );
            dl_bar.set_prefix("PDF engine");
            dl_bar.enable_steady_tick(Duration::from_millis(80));

            let bar = dl_bar.clone();
            tokio::task::block_in_place(|| {
                pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
                    if let Some(t) = total {
                        if bar.length().unwrap_or(0) != t {
                            bar.set_length(t);
                        }
                    }
                    bar.set_position(downloaded);
                }))
            })
            .context("Failed to download PDFium engine")?;

            dl_bar.finish_with_message("ready ✓");
        } else {
            tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
                .context("Failed to download PDFium engine")?;
        }
    }

    // ── Text-only mode ───────────────────────────────────────────────────
    if cli.text_only {
        let config = build_config(&cli, None).await?;
        let many = cli.inputs.len() > 1;
        let stdout = io::stdout();
        for input in &cli.inputs {
            let doc = extract_text(input, &config)
                .await
                .map_err(staged)
                .with_context(|| format!("Failed to extract {}", input.display()))?;
            let mut handle = stdout.lock();
            if many {
                writeln!(handle, "==> {} <==", input.display()).ok();
            }
            writeln!(handle, "{}", doc.to_page_labeled_text())
                .context("Failed to write to stdout")?;
        }
        return Ok(());
    }

    // ── Build config and pipeline ────────────────────────────────────────
    let progress = if show_progress {
        Some(CliProgressCallback::new(cli.inputs.len()))
    } else {
        None
    };
    let config = build_config(
        &cli,
        progress
            .clone()
            .map(|p| p as Arc<dyn PipelineProgressCallback>),
    )
    .await?;
    let pipeline = Pipeline::from_config(&config)
        .map_err(staged)
        .context("Failed to set up the pipeline")?;

    // ── Single menu to stdout ────────────────────────────────────────────
    let Some(ref out_dir) = cli.output_dir else {
        let input = &cli.inputs[0];
        let result = pipeline.run(input).await;
        if let Some(ref p) = progress {
            p.bar.finish_and_clear();
        }
        let output = result
            .map_err(staged)
            .with_context(|| format!("Conversion of {} failed", input.display()))?;

        let json = if cli.compact {
            serde_json::to_string(&output.menu)
        } else {
            serde_json::to_string_pretty(&output.menu)
        }
        .context("Failed to serialise menu")?;
        println!("{json}");

        if !cli.quiet {
            eprintln!(
                "{}  {} pages ({} OCR)  {}ms",
                green("✔"),
                output.stats.extracted_pages,
                output.stats.ocr_pages,
                output.stats.total_duration_ms
            );
        }
        return Ok(());
    };

    // ── One JSON file per menu ───────────────────────────────────────────
    let results: Vec<(PathBuf, Result<PathBuf, MenuError>)> = stream::iter(cli.inputs.iter())
        .map(|input| {
            let pipeline = &pipeline;
            let progress = progress.clone();
            async move {
                let result = pipeline
                    .run_to_file(input, out_dir)
                    .await
                    .map(|(path, _stats)| path);
                if let Some(p) = progress {
                    report_file(&p.bar, input, &result);
                    p.bar.inc(1);
                }
                (input.clone(), result)
            }
        })
        .buffered(cli.concurrency.max(1))
        .collect()
        .await;

    if let Some(ref p) = progress {
        p.bar.finish_and_clear();
    }

    let failed: Vec<_> = results.into_iter().filter_map(|(input, r)| r.err().map(|e| (input, e))).collect();
    let total = cli.inputs.len();

    if !cli.quiet {
        if failed.is_empty() {
            eprintln!(
                "{} {} menus written to {}",
                green("✔"),
                bold(&total.to_string()),
                bold(&out_dir.display().to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} menus converted  ({} failed)",
                if failed.len() == total { red("✘") } else { cyan("⚠") },
                bold(&(total - failed.len()).to_string()),
                total,
                red(&failed.len().to_string()),
            );
        }
    }

    if let Some((input, err)) = failed.into_iter().next() {
        return Err(staged(err)).with_context(|| format!("Conversion of {} failed", input.display()));
    }
    Ok(())
}

fn report_file(bar: &ProgressBar, input: &Path, result: &Result<PathBuf, MenuError>) {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match result {
        Ok(path) => bar.println(format!(
            "  {} {}  →  {}",
            green("✓"),
            name,
            dim(&path.display().to_string())
        )),
        Err(e) => bar.println(format!("  {} {}  {}", red("✗"), name, red(&e.client_message()))),
    }
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .dpi(cli.dpi)
        .fallback_policy(cli.fallback.into())
        .ocr_backend(cli.ocr.into())
        .tesseract_cmd(cli.tesseract_cmd.clone())
        .ocr_language(cli.ocr_lang.clone())
        .ocr_timeout_secs(cli.ocr_timeout)
        .normalize_native_text(cli.normalize_native)
        .schema_check(cli.schema_check.into())
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref path) = cli.brands_file {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read brand list from {:?}", path))?;
        builder = builder.brands(BrandList::from_lines(&text));
    } else if !cli.brands.is_empty() {
        builder = builder.brands(cli.brands.iter().map(|b| b.trim()).filter(|b| !b.is_empty()).collect());
    }

    if !cli.price_words.is_empty() {
        let mut words = PriceWords::default();
        words.extend(cli.price_words.iter().map(|w| w.trim().to_string()));
        builder = builder.price_words(words);
    }

    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().map_err(staged).context("Invalid configuration")
}
