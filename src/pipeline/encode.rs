//! Image payload preparation for the vision backend.
//!
//! Vision APIs accept PNG, JPEG, GIF and WebP. BMP and TIFF payloads are
//! decoded and re-encoded as lossless PNG first; everything else is sent as
//! extracted. The base64 wrapper carries `detail: "high"` so small text in
//! figures stays legible to the model.

use crate::document::ImageFormat;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::borrow::Cow;
use std::io::Cursor;
use tracing::debug;

/// Bytes and MIME type ready to hand to a [`crate::pipeline::llm::TranslationClient`].
#[derive(Debug, Clone)]
pub struct ImagePayload<'a> {
    pub bytes: Cow<'a, [u8]>,
    pub mime_type: &'static str,
}

/// Normalise a payload into a format vision APIs accept.
pub fn prepare_payload(
    bytes: &[u8],
    format: ImageFormat,
) -> Result<ImagePayload<'_>, image::ImageError> {
    match format {
        ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Gif | ImageFormat::Webp => {
            Ok(ImagePayload {
                bytes: Cow::Borrowed(bytes),
                mime_type: format.mime_type(),
            })
        }
        ImageFormat::Bmp | ImageFormat::Tiff => {
            let img = image::load_from_memory(bytes)?;
            let png = encode_png(&img)?;
            debug!(
                "Re-encoded {:?} image as PNG ({} → {} bytes)",
                format,
                bytes.len(),
                png.len()
            );
            Ok(ImagePayload {
                bytes: Cow::Owned(png),
                mime_type: ImageFormat::Png.mime_type(),
            })
        }
    }
}

/// Lossless PNG encoding of a decoded image.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Wrap raw bytes as a base64 `ImageData` attachment.
pub fn to_image_data(bytes: &[u8], mime_type: &str) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, mime_type).with_detail("high")
}
