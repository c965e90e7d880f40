//! Plain text and Markdown readers.

use super::{extraction_failed, load_embedded_image, tidy_text, FormatReader};
use crate::document::{DocumentFormat, ExtractedDocument, ImagePosition, ImageRecord};
use crate::error::DocTranslateError;
use crate::output::DocumentMetadata;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::warn;

/// Reads `.txt` files. No images.
pub struct PlainTextReader;

impl FormatReader for PlainTextReader {
    fn read(&self, path: &Path) -> Result<ExtractedDocument, DocTranslateError> {
        let text = tidy_text(&read_utf8(path)?);
        Ok(ExtractedDocument {
            metadata: DocumentMetadata::from_text(DocumentFormat::Text, &text),
            text,
            images: Vec::new(),
        })
    }
}

/// Reads `.md` / `.markdown` files.
///
/// Image references to data URIs or to files next to the document are
/// replaced by markers; remote images and missing files are left as written.
pub struct MarkdownReader;

impl FormatReader for MarkdownReader {
    fn read(&self, path: &Path) -> Result<ExtractedDocument, DocTranslateError> {
        let source = read_utf8(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let (text, images) = extract_markdown_images(&tidy_text(&source), base_dir);

        let mut metadata = DocumentMetadata::from_text(DocumentFormat::Markdown, &text);
        metadata.title = first_heading(&text);
        Ok(ExtractedDocument {
            text,
            images,
            metadata,
        })
    }
}

fn read_utf8(path: &Path) -> Result<String, DocTranslateError> {
    let bytes = std::fs::read(path).map_err(|e| extraction_failed(path, e))?;
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes[..]);
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            warn!("{} is not valid UTF-8 ({}); decoding lossily", path.display(), e);
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

static RE_MD_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"!\[([^\]]*)\]\(([^)\s]+)(?:\s+"[^"]*")?\)"#).unwrap());

/// Replace loadable image references with markers, returning the rewritten
/// text and the images in order.
pub fn extract_markdown_images(text: &str, base_dir: &Path) -> (String, Vec<ImageRecord>) {
    let mut images = Vec::new();
    let out = RE_MD_IMAGE.replace_all(text, |caps: &regex::Captures<'_>| {
        let alt = &caps[1];
        let src = &caps[2];
        match load_embedded_image(src, base_dir) {
            Some((bytes, format)) => {
                let record = ImageRecord::new(
                    bytes,
                    format,
                    ImagePosition::Embedded {
                        index: images.len() as u32,
                        src: src.to_string(),
                        alt: alt.to_string(),
                    },
                );
                let reference = record.marker().markdown_ref();
                images.push(record);
                reference
            }
            None => caps[0].to_string(),
        }
    });
    (out.into_owned(), images)
}

fn first_heading(text: &str) -> Option<String> {
    text.lines()
        .find_map(|l| l.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn plain_text_strips_bom_and_tidies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"\xEF\xBB\xBFline one  \r\n\r\n\r\n\r\nline two\r\n").unwrap();
        let doc = PlainTextReader.read(&path).unwrap();
        assert_eq!(doc.text, "line one\n\nline two");
        assert!(doc.images.is_empty());
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.txt");
        std::fs::write(&path, b"caf\xE9").unwrap();
        let doc = PlainTextReader.read(&path).unwrap();
        assert_eq!(doc.text, "caf\u{FFFD}");
    }

    #[test]
    fn markdown_local_images_become_markers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fig.png"), PNG).unwrap();
        let path = dir.path().join("doc.md");
        std::fs::write(
            &path,
            "# Title\n\nSee ![a figure](fig.png \"caption\") and ![remote](https://x.org/r.png).\n",
        )
        .unwrap();

        let doc = MarkdownReader.read(&path).unwrap();
        assert_eq!(doc.images.len(), 1);
        let marker = doc.images[0].marker();
        assert_eq!(
            doc.text,
            format!("# Title\n\nSee {} and ![remote](https://x.org/r.png).", marker.markdown_ref())
        );
        assert_eq!(doc.metadata.title.as_deref(), Some("Title"));
    }

    #[test]
    fn second_image_gets_next_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), PNG).unwrap();
        std::fs::write(dir.path().join("b.png"), PNG).unwrap();
        let (_, images) = extract_markdown_images("![](a.png)\n\n![](b.png)", dir.path());
        assert_eq!(images.len(), 2);
        assert!(images[1].marker().as_str().starts_with("image-1-1-"));
    }
}
