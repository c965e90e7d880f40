//! Bounded concurrent image translation.
//!
//! [`ImageTranslator::translate_batch`] sends every image to the backend with
//! at most `concurrency` calls in flight and returns exactly one
//! [`ImageTranslation`] per input image, in input order. A failed image is
//! recorded as [`ImageTranslation::Failed`]; it never aborts the batch.
//!
//! ## Scheduling
//!
//! The batch is a `futures` stream driven with `buffer_unordered(concurrency)`:
//! at most `concurrency` futures are polled at once, and a slot frees up the
//! moment its image finishes, whatever happens to the images before it. A
//! task asleep in its retry backoff holds only its own slot. Results carry
//! their index and are put back in input order at the end.
//!
//! When the batch shares its ceiling with other backend work (the full-text
//! chunks of the same document), [`ImageTranslator::with_limiter`] hands it a
//! semaphore; each image then also holds one permit from its first attempt
//! to its last.

use crate::config::ImageInstruction;
use crate::document::ImageRecord;
use crate::error::ImageError;
use crate::pipeline::encode;
use crate::pipeline::llm::TranslationClient;
use crate::pipeline::retry::{run_with_retry, RetryPolicy};
use crate::progress::ProgressCallback;
use crate::prompts;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Outcome for one image, index-aligned with the batch input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageTranslation {
    /// The backend produced a translated description.
    Translated {
        text: String,
        attempts: u32,
        input_tokens: usize,
        output_tokens: usize,
    },
    /// Every attempt failed, or the backend rejected the image.
    Failed(ImageError),
    /// Image translation was switched off; no backend call was made.
    Skipped,
}

impl ImageTranslation {
    pub fn is_translated(&self) -> bool {
        matches!(self, Self::Translated { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Translated { attempts, .. } => *attempts,
            Self::Failed(e) => e.attempts(),
            Self::Skipped => 0,
        }
    }

    /// Text placed after the image in the translated section.
    ///
    /// `None` for skipped images: they get an image reference and no block.
    pub fn block_text(&self) -> Option<String> {
        match self {
            Self::Translated { text, .. } => Some(text.clone()),
            Self::Failed(e) => Some(failure_text(e)),
            Self::Skipped => None,
        }
    }
}

/// The labelled failure line shown in place of a translation.
pub fn failure_text(error: &ImageError) -> String {
    match error {
        ImageError::EncodeFailed { detail, .. } => {
            format!("Image translation failed: could not read image data: {detail}")
        }
        _ => format!(
            "Image translation failed after {} attempt(s): {}",
            error.attempts(),
            error.detail()
        ),
    }
}

/// Translates images against a [`TranslationClient`] under a concurrency ceiling.
#[derive(Clone)]
pub struct ImageTranslator {
    client: Arc<dyn TranslationClient>,
    concurrency: usize,
    policy: RetryPolicy,
    progress: Option<ProgressCallback>,
    limiter: Option<Arc<Semaphore>>,
}

impl ImageTranslator {
    /// Create a translator with the default retry policy. `concurrency` is clamped to ≥ 1.
    pub fn new(client: Arc<dyn TranslationClient>, concurrency: usize) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
            policy: RetryPolicy::default(),
            progress: None,
            limiter: None,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Share a permit pool with other callers of the same backend.
    pub fn with_limiter(mut self, limiter: Arc<Semaphore>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Translate every image; the result has the same length and order as `images`.
    pub async fn translate_batch(
        &self,
        images: &[ImageRecord],
        target_language: &str,
        instruction: ImageInstruction,
    ) -> Vec<ImageTranslation> {
        let total = images.len();
        if total == 0 {
            return Vec::new();
        }
        info!(
            "Translating {} image(s) into {} (concurrency {})",
            total, target_language, self.concurrency
        );
        let prompt = prompts::image_prompt(instruction, target_language);

        let mut indexed: Vec<(usize, ImageTranslation)> = stream::iter(images.iter().enumerate())
            .map(|(index, image)| {
                let prompt = &prompt;
                async move { (index, self.translate_one(index, total, image, prompt).await) }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        indexed.sort_by_key(|(index, _)| *index);
        let results: Vec<ImageTranslation> = indexed.into_iter().map(|(_, r)| r).collect();

        let ok = results.iter().filter(|r| r.is_translated()).count();
        info!("Image batch done: {}/{} translated", ok, total);
        results
    }

    /// Image-to-image mode.
    ///
    /// No backend can regenerate an image yet, so each result carries the
    /// source bytes unchanged under the derived id `<id>-translated`.
    ///
    /// Library-only: [`crate::translate_document`] and the CLI always run
    /// [`translate_batch`](Self::translate_batch). Callers that want
    /// image-to-image output call this on the document's images themselves.
    pub fn translate_to_images(&self, images: &[ImageRecord]) -> Vec<ImageRecord> {
        images
            .iter()
            .map(|img| img.clone().with_id(format!("{}-translated", img.id)))
            .collect()
    }

    async fn translate_one(
        &self,
        index: usize,
        total: usize,
        image: &ImageRecord,
        prompt: &str,
    ) -> ImageTranslation {
        if let Some(ref cb) = self.progress {
            cb.on_image_start(index, total);
        }

        let result = match encode::prepare_payload(&image.bytes, image.format) {
            Err(e) => ImageTranslation::Failed(ImageError::EncodeFailed {
                index,
                detail: e.to_string(),
            }),
            Ok(payload) => {
                let label = format!("Image {}/{} ({})", index + 1, total, image.id);
                // Only fails once the semaphore is closed, which never happens.
                let _permit = match &self.limiter {
                    Some(limiter) => limiter.acquire().await.ok(),
                    None => None,
                };
                let outcome = run_with_retry(&self.policy, &label, || {
                    self.client
                        .complete_image(&payload.bytes, payload.mime_type, prompt)
                })
                .await;
                match outcome.result {
                    Ok(completion) => {
                        debug!(
                            "{}: {} chars after {} attempt(s)",
                            label,
                            completion.text.len(),
                            outcome.attempts
                        );
                        ImageTranslation::Translated {
                            text: completion.text.trim().to_string(),
                            attempts: outcome.attempts,
                            input_tokens: completion.input_tokens,
                            output_tokens: completion.output_tokens,
                        }
                    }
                    Err(e) if e.is_retryable() => {
                        ImageTranslation::Failed(ImageError::RetriesExhausted {
                            index,
                            attempts: outcome.attempts,
                            detail: e.to_string(),
                        })
                    }
                    Err(e) => ImageTranslation::Failed(ImageError::Rejected {
                        index,
                        attempts: outcome.attempts,
                        detail: e.to_string(),
                    }),
                }
            }
        };

        match &result {
            ImageTranslation::Failed(e) => {
                warn!("{}", e);
                if let Some(ref cb) = self.progress {
                    cb.on_image_error(index, total, &e.to_string());
                }
            }
            ImageTranslation::Translated { text, .. } => {
                if let Some(ref cb) = self.progress {
                    cb.on_image_complete(index, total, text.len());
                }
            }
            ImageTranslation::Skipped => {}
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ImageFormat, ImagePosition};
    use crate::error::TranslationError;
    use crate::pipeline::llm::Completion;
    use async_trait::async_trait;

    struct EchoClient;

    #[async_trait]
    impl TranslationClient for EchoClient {
        async fn complete_text(&self, prompt: &str) -> Result<Completion, TranslationError> {
            Ok(Completion::new(prompt))
        }

        async fn complete_image(
            &self,
            image: &[u8],
            _mime_type: &str,
            _prompt: &str,
        ) -> Result<Completion, TranslationError> {
            match image.first() {
                Some(0) => Err(TranslationError::Permanent("bad image".into())),
                _ => Ok(Completion::new(format!("  image of {} bytes \n", image.len()))),
            }
        }
    }

    fn record(index: u32, bytes: Vec<u8>) -> ImageRecord {
        ImageRecord::new(
            bytes,
            ImageFormat::Png,
            ImagePosition::Pdf {
                page: 1,
                index,
                object_ref: index,
            },
        )
    }

    #[tokio::test]
    async fn empty_batch_returns_empty() {
        let t = ImageTranslator::new(Arc::new(EchoClient), 4);
        let out = t
            .translate_batch(&[], "English", ImageInstruction::default())
            .await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn mixed_batch_is_index_aligned() {
        let t = ImageTranslator::new(Arc::new(EchoClient), 2);
        let images = vec![record(0, vec![1, 1]), record(1, vec![0]), record(2, vec![1, 1, 1])];
        let out = t
            .translate_batch(&images, "English", ImageInstruction::default())
            .await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].block_text().as_deref(), Some("image of 2 bytes"));
        assert!(matches!(
            out[1],
            ImageTranslation::Failed(ImageError::Rejected {
                index: 1,
                attempts: 1,
                ..
            })
        ));
        assert_eq!(out[2].block_text().as_deref(), Some("image of 3 bytes"));
    }

    #[test]
    fn failure_text_is_labelled() {
        let e = ImageError::RetriesExhausted {
            index: 0,
            attempts: 3,
            detail: "transient backend error: 503".into(),
        };
        assert_eq!(
            failure_text(&e),
            "Image translation failed after 3 attempt(s): transient backend error: 503"
        );
    }

    #[test]
    fn image_to_image_passes_bytes_through() {
        let t = ImageTranslator::new(Arc::new(EchoClient), 1);
        let src = vec![record(0, vec![9, 8, 7])];
        let out = t.translate_to_images(&src);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bytes, src[0].bytes);
        assert_eq!(out[0].id, "image-1-0-0-translated");
        assert_eq!(out[0].position, src[0].position);
    }

    #[test]
    fn skipped_has_no_block() {
        assert_eq!(ImageTranslation::Skipped.block_text(), None);
        assert_eq!(ImageTranslation::Skipped.attempts(), 0);
    }
}
