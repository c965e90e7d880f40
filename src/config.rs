//! Configuration types for document translation.
//!
//! All translation behaviour is controlled through [`TranslationConfig`],
//! built via its [`TranslationConfigBuilder`]. One struct holds every knob so
//! a config can be shared across tasks and logged as a whole.

use crate::error::DocTranslateError;
use crate::pipeline::assemble::SectionLabels;
use crate::pipeline::llm::TranslationClient;
use crate::pipeline::retry::RetryPolicy;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a document translation.
///
/// Built via [`TranslationConfig::builder()`] or using
/// [`TranslationConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_doctranslate::TranslationConfig;
///
/// let config = TranslationConfig::builder()
///     .target_language("French")
///     .concurrency(4)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.target_language, "French");
/// ```
#[derive(Clone)]
pub struct TranslationConfig {
    /// Language the document is translated into. Default: "English".
    ///
    /// Passed verbatim into every prompt, so any name the model understands
    /// works ("Simplified Chinese", "pt-BR", "Deutsch").
    pub target_language: String,

    /// Maximum number of translation calls in flight at once. Default: 10.
    ///
    /// Applies to the image batch and to chunked full-text translation. Lower
    /// it if the provider answers with `429`.
    pub concurrency: usize,

    /// Attempts per call, first try included. Default: 3.
    ///
    /// Only transient failures (rate limit, timeout, 5xx, dropped connection)
    /// are retried. A permanent failure stops after one attempt.
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds. Default: 1000.
    ///
    /// Doubles after each attempt: 1 s → 2 s → 4 s. Each task sleeps on its
    /// own, so one image backing off never stalls its siblings.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 60.
    ///
    /// Expiry counts as a transient failure and is retried.
    pub api_timeout_secs: u64,

    /// LLM model identifier, e.g. "gpt-4.1-nano". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, resolved from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed translation client. Takes precedence over `provider`.
    ///
    /// Lets callers plug in any backend, and lets tests script responses.
    pub client: Option<Arc<dyn TranslationClient>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 8192.
    ///
    /// A translated chunk is roughly as long as its source, so this must
    /// cover `max_chunk_chars` worth of output.
    pub max_tokens: usize,

    /// What the model is asked to do with each image. Default: describe and translate.
    pub image_instruction: ImageInstruction,

    /// Send images to the model at all. Default: true.
    ///
    /// When false, images are still saved and referenced in both sections,
    /// but no translation block follows them.
    pub translate_images: bool,

    /// Add a `## Summary` section generated from the original text. Default: false.
    pub include_summary: bool,

    /// Shape of the final artifact. Default: Markdown.
    pub output_format: OutputFormat,

    /// Relative path prefix used in image links. Default: "assets".
    ///
    /// Should match where the asset directory sits relative to the output file.
    pub asset_link_prefix: String,

    /// Section headers and the translation label.
    pub labels: SectionLabels,

    /// Longest text chunk sent in one full-text call. Default: 12 000 chars.
    pub max_chunk_chars: usize,

    /// Largest input accepted, in bytes. Default: 50 MiB.
    pub max_input_bytes: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives per-image progress events. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            target_language: "English".to_string(),
            concurrency: 10,
            max_attempts: 3,
            retry_backoff_ms: 1000,
            api_timeout_secs: 60,
            model: None,
            provider_name: None,
            provider: None,
            client: None,
            temperature: 0.1,
            max_tokens: 8192,
            image_instruction: ImageInstruction::default(),
            translate_images: true,
            include_summary: false,
            output_format: OutputFormat::default(),
            asset_link_prefix: "assets".to_string(),
            labels: SectionLabels::default(),
            max_chunk_chars: 12_000,
            max_input_bytes: 50 * 1024 * 1024,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for TranslationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationConfig")
            .field("target_language", &self.target_language)
            .field("concurrency", &self.concurrency)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("client", &self.client.as_ref().map(|_| "<dyn TranslationClient>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("image_instruction", &self.image_instruction)
            .field("translate_images", &self.translate_images)
            .field("include_summary", &self.include_summary)
            .field("output_format", &self.output_format)
            .field("asset_link_prefix", &self.asset_link_prefix)
            .field("max_chunk_chars", &self.max_chunk_chars)
            .finish()
    }
}

impl TranslationConfig {
    /// Create a new builder for `TranslationConfig`.
    pub fn builder() -> TranslationConfigBuilder {
        TranslationConfigBuilder {
            config: Self::default(),
        }
    }

    /// Retry policy derived from the attempt, backoff and timeout knobs.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.retry_backoff_ms),
            call_timeout: Duration::from_secs(self.api_timeout_secs),
        }
    }
}

/// Builder for [`TranslationConfig`].
#[derive(Debug)]
pub struct TranslationConfigBuilder {
    config: TranslationConfig,
}

impl TranslationConfigBuilder {
    pub fn target_language(mut self, lang: impl Into<String>) -> Self {
        self.config.target_language = lang.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
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

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn client(mut self, client: Arc<dyn TranslationClient>) -> Self {
        self.config.client = Some(client);
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

    pub fn image_instruction(mut self, kind: ImageInstruction) -> Self {
        self.config.image_instruction = kind;
        self
    }

    pub fn translate_images(mut self, v: bool) -> Self {
        self.config.translate_images = v;
        self
    }

    pub fn include_summary(mut self, v: bool) -> Self {
        self.config.include_summary = v;
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn asset_link_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.asset_link_prefix = prefix.into();
        self
    }

    pub fn labels(mut self, labels: SectionLabels) -> Self {
        self.config.labels = labels;
        self
    }

    pub fn max_chunk_chars(mut self, n: usize) -> Self {
        self.config.max_chunk_chars = n;
        self
    }

    pub fn max_input_bytes(mut self, n: u64) -> Self {
        self.config.max_input_bytes = n;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TranslationConfig, DocTranslateError> {
        let c = &self.config;
        if c.target_language.trim().is_empty() {
            return Err(DocTranslateError::InvalidConfig(
                "Target language must not be empty".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(DocTranslateError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_attempts == 0 {
            return Err(DocTranslateError::InvalidConfig(
                "Max attempts must be ≥ 1".into(),
            ));
        }
        if c.max_chunk_chars < 500 {
            return Err(DocTranslateError::InvalidConfig(format!(
                "Chunk size must be ≥ 500 characters, got {}",
                c.max_chunk_chars
            )));
        }
        if c.max_input_bytes == 0 {
            return Err(DocTranslateError::InvalidConfig(
                "Input size limit must be > 0".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What the model is asked to produce for each image.
///
/// The two kinds are mutually exclusive per call; the caller picks one for
/// the whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageInstruction {
    /// Describe the image and translate any text in it. (default)
    #[default]
    DescribeAndTranslate,
    /// Translate only the text visible in the image; no description.
    EmbeddedTextOnly,
}

/// Shape of the assembled artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Bilingual Markdown. (default)
    #[default]
    Markdown,
    /// The same Markdown rendered into a standalone HTML page.
    Html,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Html => "html",
        }
    }
}
