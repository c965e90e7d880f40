//! Pipeline stages for document translation.
//!
//! Each submodule implements one transformation step and is testable on its
//! own; [`crate::convert`] wires them together.
//!
//! ## Data Flow
//!
//! ```text
//!                         ┌──▶ chunk ──▶ llm ──▶ postprocess ──┐
//! input ──▶ reader ──────┤     (full text, retry)              ├──▶ assemble
//! (URL/path) (text+markers)└──▶ images ──▶ encode ──▶ llm ─────┘  (assets + md)
//! ```
//!
//! 1. [`input`]    resolve the path or URL to a local file, detect the format
//! 2. [`reader`]   extract text with one [`marker`] per image, in position
//! 3. [`chunk`]    split long text on paragraph boundaries
//! 4. [`images`]   translate images under a concurrency ceiling via [`retry`]
//! 5. [`encode`]   make image payloads acceptable to vision models
//! 6. [`llm`]      the [`llm::TranslationClient`] seam; the only network I/O
//! 7. [`postprocess`] deterministic cleanup and marker repair
//! 8. [`assemble`] save assets, splice translations, compose the document

pub mod assemble;
pub mod chunk;
pub mod encode;
pub mod images;
pub mod input;
pub mod llm;
pub mod marker;
pub mod postprocess;
pub mod reader;
pub mod retry;
