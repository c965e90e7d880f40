//! Position markers: deterministic placeholder tokens for images.
//!
//! A marker has the form `image-<page>-<index>-<ref>.<ext>` and appears in
//! extracted text as the Markdown reference `![token](token)`. The same token
//! is the key the assembler uses to splice image blocks back in, so `encode`
//! must be a pure function of the position fields.
//!
//! Markers are opaque keys downstream: nothing parses them back into a
//! position, and substitution is a literal match on [`PositionMarker::markdown_ref`].

use crate::document::{ImageFormat, ImagePosition};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Placeholder token for one image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionMarker(String);

impl PositionMarker {
    /// Encode a position into its token.
    pub fn encode(position: &ImagePosition, format: ImageFormat) -> Self {
        let (page, index, reference) = match position {
            ImagePosition::Pdf {
                page,
                index,
                object_ref,
            } => (*page, *index, object_ref.to_string()),
            ImagePosition::Word {
                paragraph,
                index,
                filename,
                ..
            } => (*paragraph, *index, sanitize_ref(file_stem(filename))),
            ImagePosition::Embedded { index, src, .. } => (1, *index, short_hash(src)),
        };
        Self(format!(
            "image-{}-{}-{}.{}",
            page,
            index,
            reference,
            format.extension()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Token without its extension, e.g. `image-1-0-7`.
    pub fn stem(&self) -> &str {
        self.0.rsplit_once('.').map(|(s, _)| s).unwrap_or(&self.0)
    }

    /// The literal form inserted into extracted text: `![token](token)`.
    pub fn markdown_ref(&self) -> String {
        format!("![{0}]({0})", self.0)
    }
}

impl fmt::Display for PositionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn file_stem(name: &str) -> &str {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    base.rsplit_once('.').map(|(s, _)| s).unwrap_or(base)
}

/// Keep the ref component safe for file names and Markdown link targets.
fn sanitize_ref(raw: &str) -> String {
    let s: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if s.is_empty() {
        "0".to_string()
    } else {
        s
    }
}

/// First 8 hex chars of SHA-256; `src` may be a long data URI.
fn short_hash(src: &str) -> String {
    let digest = Sha256::digest(src.as_bytes());
    digest.iter().take(4).map(|b| format!("{b:02x}")).collect()
}
