//! HTML reader.
//!
//! Walks the parsed DOM depth-first and flattens it to lightweight Markdown:
//! block elements start a new paragraph, headings and list items get their
//! Markdown prefix, `<pre>` keeps its whitespace in a fenced block, and all
//! other text has its whitespace collapsed. `<img>` elements whose source can
//! be loaded (data URI or a file next to the document) become markers; remote
//! images stay as plain Markdown links.

use super::{extraction_failed, join_blocks, load_embedded_image, tidy_text, FormatReader};
use crate::document::{DocumentFormat, ExtractedDocument, ImagePosition, ImageRecord};
use crate::error::DocTranslateError;
use crate::output::DocumentMetadata;
use scraper::{ElementRef, Html, Node};
use std::path::Path;
use tracing::debug;

/// Reads `.html` / `.htm` files.
pub struct HtmlReader;

impl FormatReader for HtmlReader {
    fn read(&self, path: &Path) -> Result<ExtractedDocument, DocTranslateError> {
        let bytes = std::fs::read(path).map_err(|e| extraction_failed(path, e))?;
        let source = String::from_utf8_lossy(&bytes);
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(extract_html(&source, base_dir))
    }
}

/// Extract text and images from an HTML string, resolving relative image paths against `base_dir`.
pub fn extract_html(source: &str, base_dir: &Path) -> ExtractedDocument {
    let html = Html::parse_document(source);
    let root = html.root_element();

    let title = root
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "title")
        .map(|e| e.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let mut walker = Walker::new(base_dir);
    walker.walk(root);
    walker.flush();

    let text = tidy_text(&join_blocks(&walker.blocks));
    let mut metadata = DocumentMetadata::from_text(DocumentFormat::Html, &text);
    metadata.title = title;

    ExtractedDocument {
        text,
        images: walker.images,
        metadata,
    }
}

const SKIPPED: &[&str] = &["head", "script", "style", "noscript", "template", "svg"];

const BLOCKS: &[&str] = &[
    "html", "body", "p", "div", "section", "article", "header", "footer", "main", "nav", "aside",
    "blockquote", "ul", "ol", "dl", "dt", "dd", "table", "thead", "tbody", "tr", "figure",
    "figcaption", "form", "address", "details", "summary",
];

struct Walker<'a> {
    base_dir: &'a Path,
    blocks: Vec<String>,
    current: String,
    images: Vec<ImageRecord>,
}

impl<'a> Walker<'a> {
    fn new(base_dir: &'a Path) -> Self {
        Self {
            base_dir,
            blocks: Vec::new(),
            current: String::new(),
            images: Vec::new(),
        }
    }

    fn flush(&mut self) {
        let block = std::mem::take(&mut self.current);
        let trimmed = block.trim();
        // A heading or list prefix with nothing after it.
        if trimmed.is_empty() || trimmed.chars().all(|c| c == '#' || c == '-') {
            return;
        }
        self.blocks.push(trimmed.to_string());
    }

    fn push_inline(&mut self, text: &str) {
        for c in text.chars() {
            if c.is_whitespace() {
                if !self.current.is_empty() && !self.current.ends_with([' ', '\n']) {
                    self.current.push(' ');
                }
            } else {
                self.current.push(c);
            }
        }
    }

    fn walk(&mut self, el: ElementRef<'_>) {
        for child in el.children() {
            match child.value() {
                Node::Text(t) => {
                    let s: &str = t;
                    self.push_inline(s);
                }
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.element(child_el);
                    }
                }
                _ => {}
            }
        }
    }

    fn element(&mut self, el: ElementRef<'_>) {
        let name = el.value().name();
        if SKIPPED.contains(&name) {
            return;
        }
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<usize>().unwrap_or(1);
                self.flush();
                self.current = format!("{} ", "#".repeat(level));
                self.walk(el);
                self.flush();
            }
            "li" => {
                self.flush();
                self.current = "- ".to_string();
                self.walk(el);
                self.flush();
            }
            "pre" => {
                self.flush();
                let code = el.text().collect::<String>();
                let code = code.trim_matches('\n');
                if !code.trim().is_empty() {
                    self.blocks.push(format!("```\n{code}\n```"));
                }
            }
            "br" => {
                let trimmed = self.current.trim_end_matches(' ').len();
                self.current.truncate(trimmed);
                self.current.push('\n');
            }
            "hr" => self.flush(),
            "td" | "th" => {
                self.push_inline(" ");
                self.walk(el);
                self.push_inline(" ");
            }
            "img" => self.image(el),
            _ if BLOCKS.contains(&name) => {
                self.flush();
                self.walk(el);
                self.flush();
            }
            _ => self.walk(el),
        }
    }

    fn image(&mut self, el: ElementRef<'_>) {
        let src = el.value().attr("src").unwrap_or_default().trim();
        let alt = el.value().attr("alt").unwrap_or_default().trim();
        if src.is_empty() {
            return;
        }
        match load_embedded_image(src, self.base_dir) {
            Some((bytes, format)) => {
                let record = ImageRecord::new(
                    bytes,
                    format,
                    ImagePosition::Embedded {
                        index: self.images.len() as u32,
                        src: src.to_string(),
                        alt: alt.to_string(),
                    },
                );
                self.flush();
                self.blocks.push(record.marker().markdown_ref());
                self.images.push(record);
            }
            None => {
                debug!("Keeping unresolvable image as a link: {}", src);
                self.push_inline(" ");
                self.current.push_str(&format!("![{alt}]({src})"));
            }
        }
    }
}
