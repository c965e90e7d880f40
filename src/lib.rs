//! # edgequake-doctranslate
//!
//! Translate documents (PDF, Word, HTML, Markdown, plain text) with an LLM
//! into a bilingual Markdown document that keeps every image where it was.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document
//!  │
//!  ├─ 1. Input     resolve local file or download from URL
//!  ├─ 2. Extract   text + one position marker per image (spawn_blocking)
//!  ├─ 3. Translate full text in chunks  ║  images, ≤ N calls in flight
//!  ├─ 4. Polish    cleanup rules + marker repair
//!  └─ 5. Assemble  save assets, splice translations at their markers
//! ```
//!
//! A position marker such as `image-3-0-17.png` stands in for an image in the
//! extracted text as `![image-3-0-17.png](image-3-0-17.png)`. The model
//! translates around it; the assembler swaps it for a link to the saved
//! original and, in the translated section, follows it with the image's own
//! translation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_doctranslate::{translate_document_to_file, TranslationConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = TranslationConfig::builder()
//!         .target_language("German")
//!         .build()?;
//!     let output = translate_document_to_file("report.pdf", "out/report.md", &config).await?;
//!     eprintln!(
//!         "{}/{} images translated, {} tokens in / {} out",
//!         output.stats.translated_images,
//!         output.stats.total_images,
//!         output.stats.total_input_tokens,
//!         output.stats.total_output_tokens
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doctranslate` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-doctranslate = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ImageInstruction, OutputFormat, TranslationConfig, TranslationConfigBuilder};
pub use convert::{
    inspect, summarize, supported_formats, translate_document, translate_document_sync,
    translate_document_to_file, translate_text,
};
pub use document::{DocumentFormat, ExtractedDocument, ImageFormat, ImagePosition, ImageRecord};
pub use error::{DocTranslateError, ImageError, TranslationError};
pub use output::{DocumentMetadata, ImageReport, TranslationOutput, TranslationStats};
pub use pipeline::assemble::{
    AssetStore, Assembler, DocumentArtifact, LocalAssetStore, SectionLabels,
};
pub use pipeline::images::{ImageTranslation, ImageTranslator};
pub use pipeline::llm::{Completion, LlmTranslationClient, TranslationClient};
pub use pipeline::marker::PositionMarker;
pub use pipeline::retry::RetryPolicy;
pub use progress::{NoopProgressCallback, ProgressCallback, TranslationProgressCallback};
