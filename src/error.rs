//! Error types for the edgequake-doctranslate library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`DocTranslateError`] — **Fatal**: the document cannot be translated at
//!   all (unreadable input, unsupported format, asset write failure, image and
//!   translation lists out of alignment). Returned as `Err(DocTranslateError)`
//!   from the top-level `translate_*` functions. No output file is written.
//!
//! * [`TranslationError`] — **Per call**: one request to the translation
//!   backend failed. Classified as transient (retried with backoff) or
//!   permanent (not retried).
//!
//! * [`ImageError`] — **Non-fatal**: a single image could not be translated
//!   after its retries. Stored inside [`crate::pipeline::images::ImageTranslation`]
//!   so the rest of the batch, and the document, still complete.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-doctranslate library.
///
/// Per-image failures use [`ImageError`] and never surface here.
#[derive(Debug, Error)]
pub enum DocTranslateError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file extension does not map to any supported document format.
    #[error("Unsupported document format '{extension}' for '{path}'\nSupported: pdf, docx, txt, md, html, htm")]
    UnsupportedFormat { path: PathBuf, extension: String },

    /// The input exceeds the configured size limit.
    #[error("Document '{path}' is {size} bytes, above the {limit}-byte limit")]
    InputTooLarge { path: PathBuf, size: u64, limit: u64 },

    /// The file has a `.pdf` extension but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The format reader could not parse the document.
    #[error("Failed to extract '{path}': {detail}")]
    ExtractionFailed { path: PathBuf, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium on the library search path, or set\n\
PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The full-text translation failed after all retries.
    #[error("Text translation failed after {attempts} attempt(s): {detail}")]
    TextTranslationFailed { attempts: u32, detail: String },

    // ── Assembly errors ───────────────────────────────────────────────────
    /// Image list and translation list differ in length.
    ///
    /// Always an upstream bug: the lists are never truncated or padded.
    #[error("Alignment error: {images} images but {translations} translation results")]
    Alignment { images: usize, translations: usize },

    /// Could not persist an image asset.
    #[error("Failed to write image asset '{path}': {source}")]
    AssetWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output document.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure of a single call to the translation backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranslationError {
    /// Rate limit, server-side failure or dropped connection. Retried.
    #[error("transient backend error: {0}")]
    Transient(String),

    /// The per-call timeout expired. Retried.
    #[error("call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Anything else: bad request, auth failure, content filter. Not retried.
    #[error("backend rejected the request: {0}")]
    Permanent(String),
}

impl TranslationError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout { .. })
    }
}

/// A non-fatal error for a single image.
///
/// Stored in [`crate::pipeline::images::ImageTranslation::Failed`]. The batch
/// and the document continue; the image still appears in the output with a
/// labelled failure line in place of its translation.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum ImageError {
    /// Every attempt failed with a transient error.
    #[error("Image {index}: failed after {attempts} attempt(s): {detail}")]
    RetriesExhausted {
        index: usize,
        attempts: u32,
        detail: String,
    },

    /// The backend returned a permanent error; no retry was made.
    #[error("Image {index}: rejected on attempt {attempts}: {detail}")]
    Rejected {
        index: usize,
        attempts: u32,
        detail: String,
    },

    /// The image payload could not be prepared for the backend.
    #[error("Image {index}: could not encode payload: {detail}")]
    EncodeFailed { index: usize, detail: String },
}

impl ImageError {
    /// Number of backend calls made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::RetriesExhausted { attempts, .. } | Self::Rejected { attempts, .. } => *attempts,
            Self::EncodeFailed { .. } => 0,
        }
    }

    /// Human-readable cause without the image index prefix.
    pub fn detail(&self) -> &str {
        match self {
            Self::RetriesExhausted { detail, .. }
            | Self::Rejected { detail, .. }
            | Self::EncodeFailed { detail, .. } => detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_display() {
        let e = DocTranslateError::Alignment {
            images: 3,
            translations: 2,
        };
        let msg = e.to_string();
        assert!(msg.contains("3 images"), "got: {msg}");
        assert!(msg.contains("2 translation"), "got: {msg}");
    }

    #[test]
    fn unsupported_format_display() {
        let e = DocTranslateError::UnsupportedFormat {
            path: PathBuf::from("slides.pptx"),
            extension: "pptx".into(),
        };
        assert!(e.to_string().contains("pptx"));
    }

    #[test]
    fn retryable_classification() {
        assert!(TranslationError::Transient("503".into()).is_retryable());
        assert!(TranslationError::Timeout { secs: 60 }.is_retryable());
        assert!(!TranslationError::Permanent("401".into()).is_retryable());
    }

    #[test]
    fn image_error_accessors() {
        let e = ImageError::RetriesExhausted {
            index: 4,
            attempts: 3,
            detail: "rate limited".into(),
        };
        assert_eq!(e.attempts(), 3);
        assert_eq!(e.detail(), "rate limited");
        assert!(e.to_string().contains("Image 4"));

        let e = ImageError::EncodeFailed {
            index: 0,
            detail: "bad bmp".into(),
        };
        assert_eq!(e.attempts(), 0);
    }
}
