//! PDF reader on top of pdfium.
//!
//! Each page contributes a `Page <n>` line followed by its text. Image
//! objects are sorted top to bottom; the page text is cut into horizontal
//! bands at each image's top edge, and the image's marker goes between the
//! band above it and the band below. Text beside an image therefore lands
//! after its marker, never before.
//!
//! pdfium keeps thread-local state, so this reader only runs inside
//! `spawn_blocking` (see [`super::read_document`]).

use super::{extraction_failed, join_blocks, tidy_text, FormatReader};
use crate::document::{DocumentFormat, ExtractedDocument, ImageFormat, ImagePosition, ImageRecord};
use crate::error::DocTranslateError;
use crate::output::DocumentMetadata;
use crate::pipeline::encode;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, warn};

/// Reads `.pdf` files.
pub struct PdfReader;

impl FormatReader for PdfReader {
    fn read(&self, path: &Path) -> Result<ExtractedDocument, DocTranslateError> {
        let pdfium = bind_pdfium()?;
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| extraction_failed(path, format!("{:?}", e)))?;

        let mut page_blocks = Vec::new();
        let mut images = Vec::new();
        for (idx, page) in document.pages().iter().enumerate() {
            let page_num = idx as u32 + 1;
            let (text, page_images) = read_page(&page, page_num)
                .map_err(|e| extraction_failed(path, format!("page {page_num}: {e:?}")))?;
            page_blocks.push(format!("Page {}\n\n{}", page_num, text));
            images.extend(page_images);
        }

        let metadata_tags = document.metadata();
        let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
            metadata_tags
                .get(tag)
                .map(|t| t.value().trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let text = join_blocks(&page_blocks);
        let mut metadata = DocumentMetadata::from_text(DocumentFormat::Pdf, &text);
        metadata.title = get_meta(PdfDocumentMetadataTagType::Title);
        metadata.author = get_meta(PdfDocumentMetadataTagType::Author);
        metadata.subject = get_meta(PdfDocumentMetadataTagType::Subject);
        metadata.page_count = document.pages().len() as usize;

        Ok(ExtractedDocument {
            text,
            images,
            metadata,
        })
    }
}

/// Bind to pdfium: `PDFIUM_LIB_PATH` (file or directory) first, then the system library.
pub fn bind_pdfium() -> Result<Pdfium, DocTranslateError> {
    if let Ok(p) = std::env::var("PDFIUM_LIB_PATH") {
        if !p.is_empty() {
            let path = Path::new(&p);
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(path)
            } else {
                path.to_path_buf()
            };
            return Pdfium::bind_to_library(&lib)
                .map(Pdfium::new)
                .map_err(|e| {
                    DocTranslateError::PdfiumBindingFailed(format!("{}: {:?}", lib.display(), e))
                });
        }
    }
    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| DocTranslateError::PdfiumBindingFailed(format!("{:?}", e)))
}

struct PlacedImage {
    object_ref: u32,
    top: f32,
    bytes: Vec<u8>,
    format: ImageFormat,
}

fn read_page(page: &PdfPage, page_num: u32) -> Result<(String, Vec<ImageRecord>), PdfiumError> {
    let text = page.text()?;
    let width = page.width().value;
    let height = page.height().value;

    let mut placed = Vec::new();
    for (object_ref, object) in page.objects().iter().enumerate() {
        let Some(image) = object.as_image_object() else {
            continue;
        };
        let top = match object.bounds() {
            Ok(b) => b.top().value,
            Err(e) => {
                warn!(
                    "Page {}: image object {} has no bounds ({:?}); placing at page bottom",
                    page_num, object_ref, e
                );
                0.0
            }
        };
        match image_bytes(image) {
            Some((bytes, format)) => placed.push(PlacedImage {
                object_ref: object_ref as u32,
                top,
                bytes,
                format,
            }),
            None => warn!(
                "Page {}: could not read pixels of image object {}",
                page_num, object_ref
            ),
        }
    }

    if placed.is_empty() {
        return Ok((tidy_text(&text.all()), Vec::new()));
    }

    // Highest on the page first (PDF y grows upwards).
    placed.sort_by(|a, b| b.top.total_cmp(&a.top));

    let mut blocks = Vec::with_capacity(placed.len() * 2 + 1);
    let mut records = Vec::with_capacity(placed.len());
    let mut cursor = height;
    for (index, img) in placed.into_iter().enumerate() {
        let band_bottom = img.top.min(cursor);
        blocks.push(tidy_text(&text.inside_rect(PdfRect::new_from_values(
            band_bottom,
            0.0,
            cursor,
            width,
        ))));
        cursor = band_bottom;

        let record = ImageRecord::new(
            img.bytes,
            img.format,
            ImagePosition::Pdf {
                page: page_num,
                index: index as u32,
                object_ref: img.object_ref,
            },
        );
        debug!("Page {}: image {} at y={:.1}", page_num, record.id, img.top);
        blocks.push(record.marker().markdown_ref());
        records.push(record);
    }
    blocks.push(tidy_text(&text.inside_rect(PdfRect::new_from_values(0.0, 0.0, cursor, width))));

    Ok((join_blocks(&blocks), records))
}

/// Decoded pixels re-encoded as PNG, falling back to the raw stream when it
/// is already a format vision models accept (typically DCT-encoded JPEG).
fn image_bytes(image: &PdfPageImageObject) -> Option<(Vec<u8>, ImageFormat)> {
    if let Ok(decoded) = image.get_raw_image() {
        if let Ok(png) = encode::encode_png(&decoded) {
            return Some((png, ImageFormat::Png));
        }
    }
    let raw = image.get_raw_image_data().ok()?;
    let format = ImageFormat::sniff(&raw)?;
    Some((raw, format))
}
