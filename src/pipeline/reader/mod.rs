//! Format readers: turn a document into text with inline image markers.
//!
//! One [`FormatReader`] per [`DocumentFormat`]. Every reader returns an
//! [`ExtractedDocument`] whose text already carries one
//! `![token](token)` reference per extracted image, at the position the
//! image occupied, and whose image list is in marker order.
//!
//! All readers are blocking (pdfium, zip and file I/O); [`read_document`]
//! runs them on the blocking pool.

pub mod html;
pub mod pdf;
pub mod text;
pub mod word;

use crate::document::{DocumentFormat, ExtractedDocument, ImageFormat};
use crate::error::DocTranslateError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Extract text and positioned images from one document format.
pub trait FormatReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<ExtractedDocument, DocTranslateError>;
}

/// The reader responsible for `format`.
pub fn reader_for(format: DocumentFormat) -> Box<dyn FormatReader> {
    match format {
        DocumentFormat::Pdf => Box::new(pdf::PdfReader),
        DocumentFormat::Word => Box::new(word::WordReader),
        DocumentFormat::Html => Box::new(html::HtmlReader),
        DocumentFormat::Markdown => Box::new(text::MarkdownReader),
        DocumentFormat::Text => Box::new(text::PlainTextReader),
    }
}

/// Read a document on the blocking pool and fill in the text counts.
pub async fn read_document(
    path: &Path,
    format: DocumentFormat,
) -> Result<ExtractedDocument, DocTranslateError> {
    let owned = path.to_path_buf();
    let mut doc = tokio::task::spawn_blocking(move || reader_for(format).read(&owned))
        .await
        .map_err(|e| DocTranslateError::Internal(format!("Extraction task panicked: {}", e)))??;

    doc.metadata.format = format;
    doc.metadata.image_count = doc.images.len();
    doc.metadata.count_text(&doc.text);
    info!(
        "Extracted {} document: {} chars, {} image(s)",
        format.name(),
        doc.metadata.char_count,
        doc.images.len()
    );
    Ok(doc)
}

pub(crate) fn extraction_failed(path: &Path, detail: impl std::fmt::Display) -> DocTranslateError {
    DocTranslateError::ExtractionFailed {
        path: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

// ── Shared helpers ───────────────────────────────────────────────────────

static RE_BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Normalise extracted text: LF line endings, no trailing spaces, at most one
/// blank line in a row, no leading or trailing blank lines.
pub(crate) fn tidy_text(input: &str) -> String {
    let s = input.replace("\r\n", "\n").replace('\r', "\n");
    let s = s.lines().map(str::trim_end).collect::<Vec<_>>().join("\n");
    RE_BLANK_RUNS.replace_all(&s, "\n\n").trim_matches('\n').to_string()
}

/// Join non-empty blocks with a blank line between them.
pub(crate) fn join_blocks<S: AsRef<str>>(blocks: &[S]) -> String {
    blocks
        .iter()
        .map(|b| b.as_ref().trim())
        .filter(|b| !b.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Bytes of an image referenced from HTML or Markdown.
///
/// Handles base64 `data:` URIs and relative paths that stay inside
/// `base_dir`. Absolute paths, paths that climb out of `base_dir`, remote
/// URLs, missing files and payloads that are not a recognised image return
/// `None`; callers keep those as plain links.
pub(crate) fn load_embedded_image(src: &str, base_dir: &Path) -> Option<(Vec<u8>, ImageFormat)> {
    let src = src.trim();
    if let Some(rest) = src.strip_prefix("data:") {
        let (meta, payload) = rest.split_once(',')?;
        if !meta.split(';').any(|p| p.eq_ignore_ascii_case("base64")) {
            debug!("Skipping non-base64 data URI");
            return None;
        }
        let bytes = STANDARD.decode(payload.trim()).ok()?;
        return sniffed(bytes, "data URI");
    }
    if src.contains("://") || src.starts_with("//") {
        return None;
    }

    let path = resolve_inside(base_dir, src)?;
    let bytes = std::fs::read(&path).ok()?;
    sniffed(bytes, src)
}

/// Keep `bytes` only when their magic bytes name an image format.
fn sniffed(bytes: Vec<u8>, origin: &str) -> Option<(Vec<u8>, ImageFormat)> {
    match ImageFormat::sniff(&bytes) {
        Some(format) => Some((bytes, format)),
        None => {
            warn!("Not an image, kept as a link: {}", origin);
            None
        }
    }
}

/// `src` resolved against `base_dir`, or `None` when it is absolute or
/// ends up outside `base_dir` once symlinks and `..` are resolved.
fn resolve_inside(base_dir: &Path, src: &str) -> Option<PathBuf> {
    let clean = src.split(['?', '#']).next().unwrap_or(src);
    let rel = Path::new(clean);
    if clean.is_empty() || rel.has_root() {
        debug!("Skipping absolute image path: {}", src);
        return None;
    }
    let base = if base_dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        base_dir
    };
    let base = base.canonicalize().ok()?;
    let resolved = base.join(rel).canonicalize().ok()?;
    if resolved.starts_with(&base) && resolved.is_file() {
        Some(resolved)
    } else {
        debug!("Skipping image outside the document directory: {}", src);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tidy_collapses_and_trims() {
        assert_eq!(tidy_text("\n\na  \r\n\r\n\r\n\r\nb\n\n"), "a\n\nb");
    }

    #[test]
    fn join_skips_empty_blocks() {
        assert_eq!(join_blocks(&["a", "  ", "b "]), "a\n\nb");
    }

    #[test]
    fn data_uri_is_decoded() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        let uri = format!("data:image/png;base64,{}", STANDARD.encode(png));
        let (bytes, format) = load_embedded_image(&uri, Path::new(".")).unwrap();
        assert_eq!(bytes, png);
        assert_eq!(format, ImageFormat::Png);
    }

    #[test]
    fn remote_and_missing_images_are_skipped() {
        assert!(load_embedded_image("https://x.org/a.png", Path::new(".")).is_none());
        assert!(load_embedded_image("nope/missing.png", Path::new("/nonexistent")).is_none());
    }

    #[test]
    fn local_image_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
        std::fs::write(dir.path().join("fig.jpg"), jpeg).unwrap();
        let (bytes, format) = load_embedded_image("fig.jpg?v=2", dir.path()).unwrap();
        assert_eq!(bytes, jpeg);
        assert_eq!(format, ImageFormat::Jpeg);
    }

    #[test]
    fn paths_outside_the_document_directory_are_not_read() {
        let root = tempfile::tempdir().unwrap();
        let inner = root.path().join("doc");
        std::fs::create_dir(&inner).unwrap();
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        std::fs::write(root.path().join("outside.png"), png).unwrap();
        let absolute = root.path().join("outside.png");

        assert!(load_embedded_image("../outside.png", &inner).is_none());
        assert!(load_embedded_image(absolute.to_str().unwrap(), &inner).is_none());
        assert!(load_embedded_image("/etc/hostname", &inner).is_none());
    }

    #[test]
    fn non_image_bytes_are_not_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("secret.png"), b"TOP SECRET").unwrap();
        assert!(load_embedded_image("secret.png", dir.path()).is_none());

        let uri = format!("data:image/png;base64,{}", STANDARD.encode(b"TOP SECRET"));
        assert!(load_embedded_image(&uri, dir.path()).is_none());
    }

    #[test]
    fn escaping_markdown_refs_stay_links() {
        let root = tempfile::tempdir().unwrap();
        let inner = root.path().join("doc");
        std::fs::create_dir(&inner).unwrap();
        std::fs::write(root.path().join("secret.txt"), b"TOP SECRET").unwrap();

        let source = "a ![x](/etc/hostname) b ![y](../secret.txt)";
        let (text, images) = text::extract_markdown_images(source, &inner);
        assert!(images.is_empty());
        assert_eq!(text, source);
    }
}
