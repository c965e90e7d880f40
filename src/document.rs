//! Data model shared by the extraction, translation and assembly stages.
//!
//! An [`ExtractedDocument`] is what every format reader returns: the document
//! text with one position marker per image already inlined, plus the ordered
//! [`ImageRecord`] list those markers refer to. Records are read-only after
//! extraction; a "translated" image is a new record, never an update.

use crate::output::DocumentMetadata;
use crate::pipeline::marker::PositionMarker;
use serde::{Deserialize, Serialize};

/// Closed set of supported input formats.
///
/// The pipeline never branches on format beyond picking the reader; all
/// format-specific byte handling lives in [`crate::pipeline::reader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentFormat {
    Pdf,
    Word,
    Text,
    Markdown,
    Html,
}

impl DocumentFormat {
    /// Every supported extension, lowercase, with its format.
    pub const EXTENSIONS: &'static [(&'static str, DocumentFormat)] = &[
        ("pdf", DocumentFormat::Pdf),
        ("docx", DocumentFormat::Word),
        ("txt", DocumentFormat::Text),
        ("md", DocumentFormat::Markdown),
        ("markdown", DocumentFormat::Markdown),
        ("html", DocumentFormat::Html),
        ("htm", DocumentFormat::Html),
    ];

    /// Map a file extension (case-insensitive, without the dot) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        Self::EXTENSIONS
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, f)| *f)
    }

    pub fn name(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "PDF",
            DocumentFormat::Word => "Word",
            DocumentFormat::Text => "Text",
            DocumentFormat::Markdown => "Markdown",
            DocumentFormat::Html => "HTML",
        }
    }
}

/// Image encoding tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Webp,
    Tiff,
}

impl ImageFormat {
    /// File extension used for markers and saved assets.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Webp => "webp",
            ImageFormat::Tiff => "tiff",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Tiff => "image/tiff",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" | "jpe" => Some(ImageFormat::Jpeg),
            "gif" => Some(ImageFormat::Gif),
            "bmp" | "dib" => Some(ImageFormat::Bmp),
            "webp" => Some(ImageFormat::Webp),
            "tif" | "tiff" => Some(ImageFormat::Tiff),
            _ => None,
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        mime.trim()
            .to_ascii_lowercase()
            .strip_prefix("image/")
            .and_then(Self::from_extension)
    }

    /// Identify the encoding from the payload's magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match image::guess_format(bytes).ok()? {
            image::ImageFormat::Png => Some(ImageFormat::Png),
            image::ImageFormat::Jpeg => Some(ImageFormat::Jpeg),
            image::ImageFormat::Gif => Some(ImageFormat::Gif),
            image::ImageFormat::Bmp => Some(ImageFormat::Bmp),
            image::ImageFormat::WebP => Some(ImageFormat::Webp),
            image::ImageFormat::Tiff => Some(ImageFormat::Tiff),
            _ => None,
        }
    }

    /// Magic bytes first, then the extension hint, then PNG.
    pub fn detect(bytes: &[u8], ext_hint: Option<&str>) -> Self {
        Self::sniff(bytes)
            .or_else(|| ext_hint.and_then(Self::from_extension))
            .unwrap_or(ImageFormat::Png)
    }
}

/// Format-specific location of an image within its document.
///
/// Opaque to the assembler: only [`PositionMarker::encode`] looks inside.
/// Callers must keep positions unique per image within one document; two
/// equal positions encode to the same marker and collide during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImagePosition {
    /// PDF image object: 1-based page, ordinal on the page, content-stream index.
    Pdf {
        page: u32,
        index: u32,
        object_ref: u32,
    },
    /// Word drawing: 1-based paragraph, document-wide ordinal, media part name and length.
    Word {
        paragraph: u32,
        index: u32,
        filename: String,
        size: u64,
    },
    /// HTML `<img>` or Markdown image reference: document-wide ordinal, source and alt text.
    Embedded { index: u32, src: String, alt: String },
}

/// One extracted image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    /// Stable identifier. Defaults to the marker stem.
    pub id: String,
    /// Raw image payload.
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub position: ImagePosition,
}

impl ImageRecord {
    /// Create a record whose id is derived from its position.
    pub fn new(bytes: Vec<u8>, format: ImageFormat, position: ImagePosition) -> Self {
        let id = PositionMarker::encode(&position, format).stem().to_string();
        Self {
            id,
            bytes,
            format,
            position,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// The marker that stands in for this image in the extracted text.
    pub fn marker(&self) -> PositionMarker {
        PositionMarker::encode(&self.position, self.format)
    }
}

/// Output of a format reader.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    /// Document text with one Markdown marker reference inlined per image.
    pub text: String,
    /// Images in the order their markers appear.
    pub images: Vec<ImageRecord>,
    pub metadata: DocumentMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_format_from_extension() {
        assert_eq!(DocumentFormat::from_extension("PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension(".docx"), Some(DocumentFormat::Word));
        assert_eq!(DocumentFormat::from_extension("htm"), Some(DocumentFormat::Html));
        assert_eq!(DocumentFormat::from_extension("markdown"), Some(DocumentFormat::Markdown));
        assert_eq!(DocumentFormat::from_extension("doc"), None);
        assert_eq!(DocumentFormat::from_extension(""), None);
    }

    #[test]
    fn image_format_sniff_png() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
        assert_eq!(ImageFormat::sniff(&png), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::detect(b"garbage", Some("jpeg")), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::detect(b"garbage", None), ImageFormat::Png);
    }

    #[test]
    fn image_format_from_mime() {
        assert_eq!(ImageFormat::from_mime("image/jpeg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_mime("IMAGE/PNG"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_mime("text/plain"), None);
    }

    #[test]
    fn record_id_defaults_to_marker_stem() {
        let rec = ImageRecord::new(
            vec![1, 2, 3],
            ImageFormat::Png,
            ImagePosition::Pdf {
                page: 1,
                index: 0,
                object_ref: 17,
            },
        );
        assert_eq!(rec.id, "image-1-0-17");
        assert_eq!(rec.marker().as_str(), "image-1-0-17.png");
        assert_eq!(rec.with_id("fig-a").id, "fig-a");
    }
}
