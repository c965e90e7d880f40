//! Translation client: the only stage that talks to a model.
//!
//! [`TranslationClient`] is the seam between the pipeline and the backend.
//! It takes an already-rendered prompt (plus an image for vision calls) and
//! returns one completion, or a [`TranslationError`] classified as transient
//! or permanent. Retry, backoff and timeouts live in
//! [`crate::pipeline::retry`], not here.
//!
//! [`LlmTranslationClient`] implements the trait on top of any
//! `edgequake_llm::LLMProvider`.

use crate::config::TranslationConfig;
use crate::error::TranslationError;
use crate::pipeline::encode;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// One model response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl Completion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Stateless text and vision completion capability.
///
/// Implementations must be safe to call concurrently; the image translator
/// keeps up to `concurrency` calls in flight on one shared client.
#[async_trait]
pub trait TranslationClient: Send + Sync {
    /// Complete a text-only prompt.
    async fn complete_text(&self, prompt: &str) -> Result<Completion, TranslationError>;

    /// Complete a prompt about one image.
    async fn complete_image(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<Completion, TranslationError>;
}

/// [`TranslationClient`] backed by an `edgequake_llm` provider.
#[derive(Clone)]
pub struct LlmTranslationClient {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl LlmTranslationClient {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &TranslationConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    async fn send(&self, messages: Vec<ChatMessage>) -> Result<Completion, TranslationError> {
        let start = Instant::now();
        let response = self
            .provider
            .chat(&messages, Some(&build_options(self.temperature, self.max_tokens)))
            .await
            .map_err(|e| classify_error(&e.to_string()))?;
        debug!(
            "{} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(Completion {
            text: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

impl fmt::Debug for LlmTranslationClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmTranslationClient")
            .field("provider", &"<dyn LLMProvider>")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[async_trait]
impl TranslationClient for LlmTranslationClient {
    async fn complete_text(&self, prompt: &str) -> Result<Completion, TranslationError> {
        self.send(vec![ChatMessage::user(prompt)]).await
    }

    async fn complete_image(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<Completion, TranslationError> {
        let data = encode::to_image_data(image, mime_type);
        self.send(vec![ChatMessage::user_with_images(prompt, vec![data])])
            .await
    }
}

/// Build `CompletionOptions` for every request this client sends.
fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

/// Markers in a provider error message that indicate a retry may succeed.
const TRANSIENT_MARKERS: &[&str] = &[
    "rate limit",
    "ratelimit",
    "too many requests",
    "429",
    "timeout",
    "timed out",
    "500",
    "502",
    "503",
    "504",
    "overloaded",
    "unavailable",
    "connection",
];

/// Classify a provider error message as transient or permanent.
///
/// Providers surface HTTP status and network failures only as text, so the
/// classification works on the message.
pub fn classify_error(message: &str) -> TranslationError {
    let lower = message.to_lowercase();
    if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
        TranslationError::Transient(message.to_string())
    } else {
        TranslationError::Permanent(message.to_string())
    }
}
