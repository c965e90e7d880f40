//! Document assembly: splice images and their translations back into the text.
//!
//! [`Assembler::assemble`] takes the original and translated text (markers
//! still inline), the image list and the index-aligned translation results.
//! It saves every image through an [`AssetStore`], rewrites each marker
//! reference in both texts, and composes the bilingual Markdown artifact.
//!
//! Marker substitution matches only the full `![token](token)` form of a
//! known token and runs in a single pass over each text, so a translation
//! block that quotes another marker is never rewritten. A marker the model
//! dropped from the translated text simply does not appear there.

use crate::document::ImageRecord;
use crate::error::DocTranslateError;
use crate::pipeline::images::ImageTranslation;
use crate::pipeline::marker::PositionMarker;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// ── Asset storage ────────────────────────────────────────────────────────

/// Destination for original image files.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Write `bytes` under `file_name`, creating the target directory if needed.
    async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<(), DocTranslateError>;
}

/// Writes assets into a directory on the local file system.
#[derive(Debug, Clone)]
pub struct LocalAssetStore {
    root: PathBuf,
}

impl LocalAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<(), DocTranslateError> {
        let path = self.root.join(file_name);
        let wrap = |source| DocTranslateError::AssetWriteFailed {
            path: path.clone(),
            source,
        };
        tokio::fs::create_dir_all(&self.root).await.map_err(wrap)?;
        tokio::fs::write(&path, bytes).await.map_err(wrap)?;
        debug!("Saved asset {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}

// ── Labels ───────────────────────────────────────────────────────────────

/// Headers and labels used in the assembled document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionLabels {
    pub title: String,
    pub summary: String,
    pub original: String,
    pub translated: String,
    /// Bold label introducing each image translation block.
    pub translation: String,
}

impl Default for SectionLabels {
    fn default() -> Self {
        Self {
            title: "Bilingual Document".into(),
            summary: "Summary".into(),
            original: "Original".into(),
            translated: "Translated".into(),
            translation: "Translation".into(),
        }
    }
}

// ── Artifact ─────────────────────────────────────────────────────────────

/// One persisted image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedAsset {
    pub marker: String,
    /// File name inside the asset store, e.g. `image-1-0-7-original.png`.
    pub file_name: String,
    /// Link target used in the document, e.g. `assets/image-1-0-7-original.png`.
    pub link: String,
}

/// The assembled bilingual document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentArtifact {
    /// Full Markdown document.
    pub markdown: String,
    /// Original text with markers rewritten.
    pub original: String,
    /// Translated text with markers rewritten and translation blocks added.
    pub translated: String,
    /// Assets in image order, one per distinct marker.
    pub assets: Vec<SavedAsset>,
}

// ── Assembler ────────────────────────────────────────────────────────────

struct Splice {
    image_ref: String,
    block: Option<String>,
}

/// Builds a [`DocumentArtifact`] from text, images and translation results.
#[derive(Debug, Clone)]
pub struct Assembler {
    link_prefix: String,
    labels: SectionLabels,
    summary: Option<String>,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new("assets", SectionLabels::default())
    }
}

impl Assembler {
    pub fn new(link_prefix: impl Into<String>, labels: SectionLabels) -> Self {
        Self {
            link_prefix: link_prefix.into().trim_end_matches('/').to_string(),
            labels,
            summary: None,
        }
    }

    /// Add a summary section between the title and the original text.
    pub fn with_summary(mut self, summary: Option<String>) -> Self {
        self.summary = summary.filter(|s| !s.trim().is_empty());
        self
    }

    /// Asset file name for a marker: `<stem>-original.<ext>`.
    pub fn asset_file_name(marker: &PositionMarker, image: &ImageRecord) -> String {
        format!("{}-original.{}", marker.stem(), image.format.extension())
    }

    fn link_for(&self, file_name: &str) -> String {
        if self.link_prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", self.link_prefix, file_name)
        }
    }

    /// Assemble the bilingual document.
    ///
    /// Fails with [`DocTranslateError::Alignment`] before touching the store
    /// when `images` and `translations` differ in length, and with
    /// [`DocTranslateError::AssetWriteFailed`] when an asset cannot be saved.
    pub async fn assemble(
        &self,
        original_text: &str,
        translated_text: &str,
        images: &[ImageRecord],
        translations: &[ImageTranslation],
        store: &dyn AssetStore,
    ) -> Result<DocumentArtifact, DocTranslateError> {
        if images.len() != translations.len() {
            return Err(DocTranslateError::Alignment {
                images: images.len(),
                translations: translations.len(),
            });
        }

        // ── Step 1: persist assets, build the substitution map ───────────
        let mut splices: HashMap<String, Splice> = HashMap::new();
        let mut assets = Vec::with_capacity(images.len());
        for (image, translation) in images.iter().zip(translations) {
            let marker = image.marker();
            let file_name = Self::asset_file_name(&marker, image);
            let link = self.link_for(&file_name);

            if splices.contains_key(marker.as_str()) {
                warn!(
                    "Duplicate image position {}: later image replaces the earlier one",
                    marker
                );
            } else {
                assets.push(SavedAsset {
                    marker: marker.to_string(),
                    file_name: file_name.clone(),
                    link: link.clone(),
                });
            }
            store.save(&file_name, &image.bytes).await?;

            let stem = file_name
                .rsplit_once('.')
                .map(|(s, _)| s)
                .unwrap_or(&file_name);
            splices.insert(
                marker.to_string(),
                Splice {
                    image_ref: format!("![{stem}]({link})"),
                    block: translation.block_text(),
                },
            );
        }

        // ── Step 2: rewrite both texts ───────────────────────────────────
        let original = splice_refs(original_text, &splices, |splice| splice.image_ref.clone());
        let translated = splice_refs(translated_text, &splices, |splice| match &splice.block {
            Some(text) => format!(
                "{}\n\n**{}:** \n{}",
                splice.image_ref, self.labels.translation, text
            ),
            None => splice.image_ref.clone(),
        });

        // ── Step 3: compose ──────────────────────────────────────────────
        let markdown = self.compose(&original, &translated);
        info!(
            "Assembled document: {} asset(s), {} chars",
            assets.len(),
            markdown.len()
        );

        Ok(DocumentArtifact {
            markdown,
            original,
            translated,
            assets,
        })
    }

    fn compose(&self, original: &str, translated: &str) -> String {
        let mut out = format!("# {}\n\n", self.labels.title);
        if let Some(ref summary) = self.summary {
            out.push_str(&format!("## {}\n\n{}\n\n", self.labels.summary, summary.trim()));
        }
        out.push_str(&format!("## {}\n\n{}\n\n", self.labels.original, original.trim()));
        out.push_str(&format!("## {}\n\n{}\n", self.labels.translated, translated.trim()));
        out
    }
}

static RE_MARKER_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]\n]+)\]\(([^)\s]+)\)").unwrap());

/// Replace every `![token](token)` of a known token with `render(splice)`.
///
/// One left-to-right pass: replacement text is never scanned again.
fn splice_refs(
    text: &str,
    splices: &HashMap<String, Splice>,
    render: impl Fn(&Splice) -> String,
) -> String {
    RE_MARKER_REF
        .replace_all(text, |caps: &Captures<'_>| {
            match splices.get(&caps[2]).filter(|_| caps[1] == caps[2]) {
                Some(splice) => render(splice),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

// ── HTML rendering ───────────────────────────────────────────────────────

const HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<style>
body { font-family: Arial, sans-serif; margin: 40px auto; max-width: 960px; line-height: 1.5; }
img { max-width: 100%; }
h2 { border-bottom: 1px solid #ddd; padding-bottom: 4px; }
</style>
</head>
<body>
{body}
</body>
</html>
"#;

/// Render an assembled Markdown document as a standalone HTML page.
pub fn render_html(markdown: &str, title: &str) -> String {
    let body = markdown::to_html(markdown);
    HTML_TEMPLATE
        .replace("{title}", &escape_html(title))
        .replace("{body}", &body)
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ImageFormat, ImagePosition};
    use crate::error::ImageError;

    const REF_7: &str = "![image-1-0-7-original](assets/image-1-0-7-original.png)";

    fn image(page: u32, index: u32, object_ref: u32) -> ImageRecord {
        ImageRecord::new(
            vec![0x89, b'P', b'N', b'G', page as u8, index as u8, object_ref as u8],
            ImageFormat::Png,
            ImagePosition::Pdf {
                page,
                index,
                object_ref,
            },
        )
    }

    fn translated(text: &str) -> ImageTranslation {
        ImageTranslation::Translated {
            text: text.into(),
            attempts: 1,
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    #[tokio::test]
    async fn single_image_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalAssetStore::new(dir.path().join("assets"));
        let text = "Page 1\n\n![image-1-0-7.png](image-1-0-7.png)\n";
        let results = [translated("A red circle.")];
        let art = Assembler::default()
            .assemble(text, text, &[image(1, 0, 7)], &results, &store)
            .await
            .unwrap();

        let block = format!("{REF_7}\n\n**Translation:** \nA red circle.");
        assert!(art.translated.contains(&block));
        assert_eq!(art.original, format!("Page 1\n\n{REF_7}\n"));
        assert!(!art.original.contains("**Translation:**"));
        assert_eq!(art.translated.matches("**Translation:**").count(), 1);
        assert!(dir.path().join("assets/image-1-0-7-original.png").exists());
    }

    #[tokio::test]
    async fn alignment_error_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("assets");
        let store = LocalAssetStore::new(&assets);
        let images = [image(1, 0, 1), image(1, 1, 2)];
        let err = Assembler::default()
            .assemble("x", "y", &images, &[translated("a")], &store)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DocTranslateError::Alignment {
                images: 2,
                translations: 1
            }
        ));
        assert!(!assets.exists());
    }

    #[tokio::test]
    async fn dropped_marker_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalAssetStore::new(dir.path());
        let original = "![image-1-0-1.png](image-1-0-1.png)";
        let translated_text = "translated without the image";
        let art = Assembler::default()
            .assemble(original, translated_text, &[image(1, 0, 1)], &[translated("t")], &store)
            .await
            .unwrap();
        assert_eq!(art.translated, translated_text);
        assert_eq!(art.assets.len(), 1);
    }

    #[tokio::test]
    async fn failure_and_skip_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalAssetStore::new(dir.path());
        let text = "![image-1-0-1.png](image-1-0-1.png)\n\n![image-1-1-2.png](image-1-1-2.png)";
        let results = vec![
            ImageTranslation::Failed(ImageError::RetriesExhausted {
                index: 0,
                attempts: 3,
                detail: "rate limited".into(),
            }),
            ImageTranslation::Skipped,
        ];
        let art = Assembler::new("img/", SectionLabels::default())
            .assemble(text, text, &[image(1, 0, 1), image(1, 1, 2)], &results, &store)
            .await
            .unwrap();
        assert!(art.translated.contains(
            "**Translation:** \nImage translation failed after 3 attempt(s): rate limited"
        ));
        assert!(art
            .translated
            .ends_with("![image-1-1-2-original](img/image-1-1-2-original.png)"));
    }

    #[tokio::test]
    async fn marker_quoted_in_a_translation_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalAssetStore::new(dir.path());
        let text = "![image-1-0-1.png](image-1-0-1.png)\n\n![image-1-1-2.png](image-1-1-2.png)";
        let echo = "See ![image-1-1-2.png](image-1-1-2.png)";
        let results = [translated(echo), translated("second")];
        let art = Assembler::default()
            .assemble(text, text, &[image(1, 0, 1), image(1, 1, 2)], &results, &store)
            .await
            .unwrap();

        assert!(art.translated.contains(&format!("**Translation:** \n{echo}")));
        assert_eq!(art.translated.matches("**Translation:**").count(), 2);
        assert_eq!(art.translated.matches("image-1-1-2-original.png").count(), 1);
    }

    #[tokio::test]
    async fn assembling_twice_gives_identical_output() {
        let text = "Intro\n\n![image-1-0-1.png](image-1-0-1.png)\n\n\
                    Middle\n\n![image-2-0-5.png](image-2-0-5.png)\n\nEnd";
        let images = [image(1, 0, 1), image(2, 0, 5)];
        let results = [
            translated("first"),
            ImageTranslation::Failed(ImageError::Rejected {
                index: 1,
                attempts: 1,
                detail: "400".into(),
            }),
        ];
        let assembler = Assembler::default().with_summary(Some("Sum.".into()));

        let mut runs = Vec::new();
        for _ in 0..2 {
            let dir = tempfile::tempdir().unwrap();
            let store = LocalAssetStore::new(dir.path().join("assets"));
            let art = assembler
                .assemble(text, text, &images, &results, &store)
                .await
                .unwrap();
            let mut files: Vec<(String, Vec<u8>)> = std::fs::read_dir(store.root())
                .unwrap()
                .map(|e| {
                    let e = e.unwrap();
                    let name = e.file_name().to_string_lossy().into_owned();
                    (name, std::fs::read(e.path()).unwrap())
                })
                .collect();
            files.sort();
            runs.push((art.markdown, files));
        }

        assert_eq!(runs[0].0, runs[1].0);
        assert_eq!(runs[0].1, runs[1].1);
        assert_eq!(runs[0].1.len(), 2);
        assert_eq!(runs[0].1[0].1, images[0].bytes);
    }

    #[tokio::test]
    async fn compose_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalAssetStore::new(dir.path());
        let art = Assembler::default()
            .with_summary(Some("Short.".into()))
            .assemble("Hallo\n", "Hello\n", &[], &[], &store)
            .await
            .unwrap();
        assert_eq!(
            art.markdown,
            "# Bilingual Document\n\n## Summary\n\nShort.\n\n\
             ## Original\n\nHallo\n\n## Translated\n\nHello\n"
        );
    }

    #[test]
    fn html_wraps_markdown() {
        let html = render_html("# Title\n\nSome *text*", "A <b> title");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<em>text</em>"));
        assert!(html.contains("<title>A &lt;b&gt; title</title>"));
    }
}
