//! CLI binary for edgequake-doctranslate.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `TranslationConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_doctranslate::{
    inspect, supported_formats, translate_document, translate_document_to_file, ImageInstruction,
    OutputFormat, ProgressCallback, TranslationConfig, TranslationOutput,
    TranslationProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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

/// Live progress bar over the image batch. Images finish out of order, so
/// start times are keyed by image index.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Extracting document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Translating");
        self.bar.set_message("text…");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl TranslationProgressCallback for CliProgressCallback {
    fn on_translation_start(&self, total_images: usize) {
        self.activate_bar(total_images);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Translating text and {total_images} image(s)…"))
        ));
    }

    fn on_image_start(&self, index: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
    }

    fn on_image_complete(&self, index: usize, total: usize, text_len: usize) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} Image {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            index + 1,
            total,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_image_error(&self, index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Image {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_text_translated(&self, chars: usize) {
        self.bar.println(format!(
            "  {} Text           {}",
            green("✓"),
            dim(&format!("{chars:>5} chars"))
        ));
        self.bar.set_message("");
    }

    fn on_translation_complete(&self, total_images: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {}/{} image(s) translated",
                green("✔"),
                bold(&success_count.to_string()),
                total_images
            );
        } else {
            eprintln!(
                "{} {}/{} image(s) translated  ({} failed)",
                cyan("⚠"),
                bold(&success_count.to_string()),
                total_images,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Translate a PDF into English (Markdown on stdout, images in ./assets)
  doctranslate report.pdf

  # Translate into German, write to a file (images in out/assets)
  doctranslate -l German report.docx -o out/report.md

  # Web page to a bilingual HTML page with a summary
  doctranslate https://example.org/post.html --format html --summary -o post.html

  # Only translate the text visible in images
  doctranslate --image-mode text-only slides.pdf -o slides.md

  # Keep images but skip image translation
  doctranslate --no-images notes.md -o notes.en.md

  # Inspect document metadata (no API key needed)
  doctranslate --inspect-only report.pdf

  # JSON report (document, per-image outcomes, stats)
  doctranslate --json report.pdf > report.json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory) for PDF input
  RUST_LOG                tracing filter, e.g. edgequake_doctranslate=debug
"#;

/// Translate documents into bilingual Markdown with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "doctranslate",
    version,
    about = "Translate documents into bilingual Markdown using LLMs",
    long_about = "Translate PDF, Word, HTML, Markdown and text documents (local files or URLs) \
into a bilingual Markdown document. Images stay at their original position and are followed by \
their own translation. Supports OpenAI, Anthropic, Google Gemini, Azure OpenAI, and any \
OpenAI-compatible endpoint (Ollama, vLLM, LiteLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local document path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "list_formats")]
    input: Option<String>,

    /// Write the document to this file instead of stdout.
    #[arg(short, long, env = "DOCTRANSLATE_OUTPUT")]
    output: Option<PathBuf>,

    /// Target language, e.g. English, German, "Simplified Chinese".
    #[arg(short = 'l', long, env = "DOCTRANSLATE_TARGET_LANGUAGE", default_value = "English")]
    target_language: String,

    /// LLM model ID (e.g. gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Maximum translation calls in flight.
    #[arg(short, long, env = "DOCTRANSLATE_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// Attempts per call, first try included.
    #[arg(long, env = "DOCTRANSLATE_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Delay before the first retry in milliseconds; doubles per retry.
    #[arg(long, env = "DOCTRANSLATE_RETRY_BACKOFF_MS", default_value_t = 1000)]
    retry_backoff_ms: u64,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "DOCTRANSLATE_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Max LLM output tokens per call.
    #[arg(long, env = "DOCTRANSLATE_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "DOCTRANSLATE_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// What to ask the model for each image.
    #[arg(long, env = "DOCTRANSLATE_IMAGE_MODE", value_enum, default_value = "describe")]
    image_mode: ImageModeArg,

    /// Keep images in the document but do not translate them.
    #[arg(long, env = "DOCTRANSLATE_NO_IMAGES")]
    no_images: bool,

    /// Add a summary section.
    #[arg(long, env = "DOCTRANSLATE_SUMMARY")]
    summary: bool,

    /// Output format.
    #[arg(long, env = "DOCTRANSLATE_FORMAT", value_enum, default_value = "markdown")]
    format: FormatArg,

    /// Asset directory name, relative to the output file (or the working directory).
    #[arg(long, env = "DOCTRANSLATE_ASSETS", default_value = "assets")]
    assets: String,

    /// Longest text chunk per translation call, in characters.
    #[arg(long, env = "DOCTRANSLATE_MAX_CHUNK_CHARS", default_value_t = 12_000)]
    max_chunk_chars: usize,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOCTRANSLATE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Output the JSON report (TranslationOutput) instead of the document.
    #[arg(long, env = "DOCTRANSLATE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCTRANSLATE_NO_PROGRESS")]
    no_progress: bool,

    /// Print document metadata only, no translation.
    #[arg(long)]
    inspect_only: bool,

    /// List supported input formats and exit.
    #[arg(long)]
    list_formats: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCTRANSLATE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCTRANSLATE_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ImageModeArg {
    /// Describe each image and translate its text.
    Describe,
    /// Translate only the text visible in each image.
    TextOnly,
}

impl From<ImageModeArg> for ImageInstruction {
    fn from(v: ImageModeArg) -> Self {
        match v {
            ImageModeArg::Describe => ImageInstruction::DescribeAndTranslate,
            ImageModeArg::TextOnly => ImageInstruction::EmbeddedTextOnly,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Markdown,
    Html,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Markdown => OutputFormat::Markdown,
            FormatArg::Html => OutputFormat::Html,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose asks for them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
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

    if cli.list_formats {
        println!("{}", supported_formats().join(", "));
        return Ok(());
    }
    let input = cli.input.clone().context("No input document given")?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect(&input).await.context("Failed to inspect document")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", input);
            println!("Format:       {}", meta.format.name());
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            if let Some(ref s) = meta.subject {
                println!("Subject:      {}", s);
            }
            println!("Pages:        {}", meta.page_count);
            println!("Images:       {}", meta.image_count);
            println!("Characters:   {}", meta.char_count);
            println!("Words:        {}", meta.word_count);
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn TranslationProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run translation ──────────────────────────────────────────────────
    let output = match cli.output {
        Some(ref output_path) => translate_document_to_file(&input, output_path, &config)
            .await
            .context("Translation failed")?,
        None => translate_document(&input, PathBuf::from(&cli.assets), &config)
            .await
            .context("Translation failed")?,
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if cli.output.is_none() {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(output.document.as_bytes())
            .context("Failed to write to stdout")?;
        if !output.document.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet {
        print_summary(&output, cli.output.as_ref());
    }
    Ok(())
}

fn print_summary(output: &TranslationOutput, path: Option<&PathBuf>) {
    let stats = &output.stats;
    let target = path
        .map(|p| format!("  →  {}", bold(&p.display().to_string())))
        .unwrap_or_default();
    eprintln!(
        "{}  {}/{} images  {} text chunk(s)  {}ms{}",
        if stats.failed_images == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        stats.translated_images,
        stats.total_images,
        stats.text_chunks,
        stats.total_duration_ms,
        target,
    );
    eprintln!(
        "   {} tokens in  /  {} tokens out",
        dim(&stats.total_input_tokens.to_string()),
        dim(&stats.total_output_tokens.to_string()),
    );
}

/// Map CLI args to `TranslationConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<TranslationConfig> {
    let mut builder = TranslationConfig::builder()
        .target_language(cli.target_language.clone())
        .concurrency(cli.concurrency)
        .max_attempts(cli.max_attempts)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .api_timeout_secs(cli.api_timeout)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .image_instruction(cli.image_mode.into())
        .translate_images(!cli.no_images)
        .include_summary(cli.summary)
        .output_format(cli.format.into())
        .asset_link_prefix(cli.assets.clone())
        .max_chunk_chars(cli.max_chunk_chars)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
