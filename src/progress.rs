//! Progress-callback trait for per-image translation events.
//!
//! Inject an [`Arc<dyn TranslationProgressCallback>`] via
//! [`crate::config::TranslationConfigBuilder::progress_callback`] to receive
//! events as the pipeline translates the text and each image.
//!
//! # Example
//!
//! ```rust
//! use edgequake_doctranslate::{TranslationProgressCallback, TranslationConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl TranslationProgressCallback for CountingCallback {
//!     fn on_image_complete(&self, index: usize, total: usize, text_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Image {}/{} done ({} bytes)", index + 1, total, text_len);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = TranslationConfig::builder()
//!     .progress_callback(counter as Arc<dyn TranslationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the translation pipeline as it works through a document.
///
/// Implementations must be `Send + Sync`: image events fire from concurrent
/// tasks, in completion order rather than input order. All methods have
/// default no-op implementations.
pub trait TranslationProgressCallback: Send + Sync {
    /// Called once after extraction, before any backend call.
    ///
    /// # Arguments
    /// * `total_images` — number of images that will be translated
    fn on_translation_start(&self, total_images: usize) {
        let _ = total_images;
    }

    /// Called just before the first attempt for an image.
    ///
    /// # Arguments
    /// * `index` — 0-based position of the image in the document
    /// * `total` — number of images in the batch
    fn on_image_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when an image translation succeeds.
    ///
    /// # Arguments
    /// * `index`    — 0-based image index
    /// * `total`    — number of images
    /// * `text_len` — byte length of the translated description
    fn on_image_complete(&self, index: usize, total: usize, text_len: usize) {
        let _ = (index, total, text_len);
    }

    /// Called when an image fails permanently or runs out of attempts.
    fn on_image_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once the full text has been translated.
    ///
    /// # Arguments
    /// * `chars` — character count of the translated text
    fn on_text_translated(&self, chars: usize) {
        let _ = chars;
    }

    /// Called once after every image has been attempted.
    ///
    /// # Arguments
    /// * `total_images`  — images in the document
    /// * `success_count` — images translated without error
    fn on_translation_complete(&self, total_images: usize, success_count: usize) {
        let _ = (total_images, success_count);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl TranslationProgressCallback for NoopProgressCallback {}

/// Alias matching the type stored in [`crate::config::TranslationConfig`].
pub type ProgressCallback = Arc<dyn TranslationProgressCallback>;
