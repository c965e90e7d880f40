//! Result types returned by the translation entry points.
//!
//! Everything here is `Serialize` so the CLI can emit it with `--json` and
//! library callers can persist a run report next to the document.

use crate::document::{DocumentFormat, ImageFormat};
use serde::{Deserialize, Serialize};

/// Complete result of translating one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationOutput {
    /// The assembled artifact: bilingual Markdown, or HTML when requested.
    pub document: String,
    /// Extracted source text, markers still inline.
    pub original_text: String,
    /// Translated text, markers still inline.
    pub translated_text: String,
    /// Summary of the original text, when requested.
    pub summary: Option<String>,
    /// One report per extracted image, in document order.
    pub images: Vec<ImageReport>,
    pub metadata: DocumentMetadata,
    pub stats: TranslationStats,
}

/// Per-image outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageReport {
    /// 0-based position of the image in the document.
    pub index: usize,
    pub id: String,
    /// Position marker token, e.g. `image-1-0-7.png`.
    pub marker: String,
    /// Asset file name written by the assembler.
    pub asset: String,
    pub format: ImageFormat,
    /// Payload size in bytes.
    pub size: usize,
    /// Backend calls made for this image (0 when images were not translated).
    pub attempts: u32,
    pub translated: bool,
    /// Failure description when `translated` is false and translation was attempted.
    pub error: Option<String>,
}

/// Aggregate statistics for a translation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslationStats {
    pub total_images: usize,
    pub translated_images: usize,
    pub failed_images: usize,
    /// Full-text chunks sent to the backend.
    pub text_chunks: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub extract_duration_ms: u64,
    pub translate_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Document-level metadata gathered during extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub format: DocumentFormat,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    /// Pages for PDF; 1 for flowing formats.
    pub page_count: usize,
    pub image_count: usize,
    pub char_count: usize,
    pub word_count: usize,
    pub line_count: usize,
}

impl DocumentMetadata {
    /// Metadata with text counts derived from `text`; title and friends left empty.
    pub fn from_text(format: DocumentFormat, text: &str) -> Self {
        let mut meta = Self {
            format,
            title: None,
            author: None,
            subject: None,
            page_count: 1,
            image_count: 0,
            char_count: 0,
            word_count: 0,
            line_count: 0,
        };
        meta.count_text(text);
        meta
    }

    /// Refresh the character, word and line counts.
    pub fn count_text(&mut self, text: &str) {
        self.char_count = text.chars().count();
        self.word_count = text.split_whitespace().count();
        self.line_count = text.lines().count();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_from_text() {
        let m = DocumentMetadata::from_text(DocumentFormat::Text, "héllo world\nsecond line");
        assert_eq!(m.char_count, 23);
        assert_eq!(m.word_count, 4);
        assert_eq!(m.line_count, 2);
        assert_eq!(m.page_count, 1);
    }

    #[test]
    fn output_serialises() {
        let out = TranslationOutput {
            document: "# Bilingual Document\n".into(),
            original_text: String::new(),
            translated_text: String::new(),
            summary: None,
            images: vec![],
            metadata: DocumentMetadata::from_text(DocumentFormat::Markdown, ""),
            stats: TranslationStats::default(),
        };
        let json = serde_json::to_string(&out).unwrap();
        assert!(json.contains("\"format\":\"Markdown\""));
    }
}
