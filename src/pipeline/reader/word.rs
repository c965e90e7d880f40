//! Word (`.docx`) reader.
//!
//! A docx file is a zip archive. Body text lives in `word/document.xml`;
//! drawings reference their picture through a relationship id
//! (`<a:blip r:embed="rId5"/>`, or `<v:imagedata r:id=".."/>` in legacy VML)
//! that `word/_rels/document.xml.rels` maps to a part under `word/media/`.
//! Title, author and subject come from `docProps/core.xml`.
//!
//! Each body paragraph becomes one block. A drawing splits its paragraph: the
//! text before it, the marker, then the text after it.

use super::{extraction_failed, join_blocks, tidy_text, FormatReader};
use crate::document::{DocumentFormat, ExtractedDocument, ImageFormat, ImagePosition, ImageRecord};
use crate::error::DocTranslateError;
use crate::output::DocumentMetadata;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::warn;
use zip::ZipArchive;

/// Reads `.docx` files.
pub struct WordReader;

impl FormatReader for WordReader {
    fn read(&self, path: &Path) -> Result<ExtractedDocument, DocTranslateError> {
        let file = File::open(path).map_err(|e| extraction_failed(path, e))?;
        let mut archive = ZipArchive::new(file).map_err(|e| extraction_failed(path, e))?;

        let body = read_part(&mut archive, "word/document.xml")
            .ok_or_else(|| extraction_failed(path, "missing word/document.xml"))?;
        let rels = read_part(&mut archive, "word/_rels/document.xml.rels")
            .map(|xml| parse_relationships(&xml))
            .unwrap_or_default();

        let parsed = parse_body(&body).map_err(|e| extraction_failed(path, e))?;

        let mut images = Vec::with_capacity(parsed.drawings.len());
        let mut text = parsed.text;
        for drawing in parsed.drawings {
            let record = match rels.get(&drawing.rel_id).map(|t| media_part_name(t)) {
                Some(part) => match read_binary_part(&mut archive, &part) {
                    Some(bytes) => {
                        let ext = Path::new(&part).extension().and_then(|e| e.to_str());
                        let format = ImageFormat::detect(&bytes, ext);
                        let size = bytes.len() as u64;
                        Some(ImageRecord::new(
                            bytes,
                            format,
                            ImagePosition::Word {
                                paragraph: drawing.paragraph,
                                index: images.len() as u32,
                                filename: part,
                                size,
                            },
                        ))
                    }
                    None => {
                        warn!("Drawing {} points at missing part {}", drawing.rel_id, part);
                        None
                    }
                },
                None => {
                    warn!("Drawing references unknown relationship {}", drawing.rel_id);
                    None
                }
            };
            let replacement = record
                .as_ref()
                .map(|r| r.marker().markdown_ref())
                .unwrap_or_default();
            text = text.replacen(&drawing.placeholder, &replacement, 1);
            images.extend(record);
        }

        let text = tidy_text(&text);
        let mut metadata = DocumentMetadata::from_text(DocumentFormat::Word, &text);
        if let Some(core) = read_part(&mut archive, "docProps/core.xml") {
            let props = parse_core_properties(&core);
            metadata.title = props.get("title").cloned();
            metadata.author = props.get("creator").cloned();
            metadata.subject = props.get("subject").cloned();
        }

        Ok(ExtractedDocument {
            text,
            images,
            metadata,
        })
    }
}

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Option<String> {
    let mut file = archive.by_name(name).ok()?;
    let mut s = String::new();
    file.read_to_string(&mut s).ok()?;
    Some(s)
}

fn read_binary_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Option<Vec<u8>> {
    let mut file = archive.by_name(name).ok()?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).ok()?;
    Some(buf)
}

/// Zip part name for a relationship target relative to `word/`.
fn media_part_name(target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        return abs.to_string();
    }
    let mut parts: Vec<&str> = vec!["word"];
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

fn attr_value(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// `Id → Target` for every relationship.
fn parse_relationships(xml: &str) -> HashMap<String, String> {
    let mut reader = Reader::from_str(xml);
    let mut rels = HashMap::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) =
                    (attr_value(&e, b"Id"), attr_value(&e, b"Target"))
                {
                    rels.insert(id, target);
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
    rels
}

/// `title`, `creator`, `subject` and friends from `docProps/core.xml`, keyed by local name.
fn parse_core_properties(xml: &str) -> HashMap<String, String> {
    let mut reader = Reader::from_str(xml);
    let mut props = HashMap::new();
    let mut current: Option<String> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                current = Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Text(t)) => {
                if let (Some(key), Ok(value)) = (current.as_ref(), t.unescape()) {
                    let value = value.trim();
                    if !value.is_empty() {
                        props.insert(key.clone(), value.to_string());
                    }
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
    props
}

struct Drawing {
    rel_id: String,
    paragraph: u32,
    /// Unique token standing in the text until the image is resolved.
    placeholder: String,
}

struct ParsedBody {
    text: String,
    drawings: Vec<Drawing>,
}

fn heading_level(style: &str) -> Option<usize> {
    let lower = style.to_ascii_lowercase();
    if lower == "title" {
        return Some(1);
    }
    lower
        .strip_prefix("heading")
        .and_then(|n| n.trim().parse::<usize>().ok())
        .map(|n| n.clamp(1, 6))
}

/// Walk `word/document.xml`, producing paragraph text with one placeholder per drawing.
fn parse_body(xml: &str) -> Result<ParsedBody, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut blocks: Vec<String> = Vec::new();
    let mut drawings = Vec::new();

    let mut paragraph = 0u32;
    let mut depth = 0usize;
    let mut line = String::new();
    let mut heading: Option<usize> = None;
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => {
                    if depth == 0 {
                        paragraph += 1;
                        line.clear();
                        heading = None;
                    }
                    depth += 1;
                }
                b"t" => in_text = true,
                b"blip" | b"imagedata" => {
                    push_drawing(&e, paragraph, &mut line, &mut blocks, &mut drawings)
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => line.push('\t'),
                b"br" | b"cr" => line.push('\n'),
                b"pStyle" if depth > 0 => {
                    heading = attr_value(&e, b"val").as_deref().and_then(heading_level);
                }
                b"blip" | b"imagedata" => {
                    push_drawing(&e, paragraph, &mut line, &mut blocks, &mut drawings)
                }
                _ => {}
            },
            Event::Text(t) if in_text => line.push_str(&t.unescape()?),
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        let text = std::mem::take(&mut line);
                        match heading {
                            Some(level) if !text.trim().is_empty() => {
                                blocks.push(format!("{} {}", "#".repeat(level), text.trim()));
                            }
                            _ => blocks.push(text),
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(ParsedBody {
        text: join_blocks(&blocks),
        drawings,
    })
}

fn push_drawing(
    e: &BytesStart<'_>,
    paragraph: u32,
    line: &mut String,
    blocks: &mut Vec<String>,
    drawings: &mut Vec<Drawing>,
) {
    let rel_id = attr_value(e, b"embed").or_else(|| attr_value(e, b"id"));
    let Some(rel_id) = rel_id else {
        return;
    };
    let placeholder = format!("\u{0}drawing-{}\u{0}", drawings.len());
    blocks.push(std::mem::take(line));
    blocks.push(placeholder.clone());
    drawings.push(Drawing {
        rel_id,
        paragraph: paragraph.max(1),
        placeholder,
    });
}
