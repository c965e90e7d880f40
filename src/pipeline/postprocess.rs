//! Post-processing: deterministic cleanup of model-translated text.
//!
//! Models occasionally wrap their answer in a code fence, emit CRLF line
//! endings or invisible Unicode, and, worst for this pipeline, translate the
//! alt text of an image marker (`![图片](image-1-0-7.png)`). The assembler
//! only recognises the exact `![token](token)` form, so marker repair is the
//! one rule here that changes the outcome rather than the cosmetics.
//!
//! Rules (applied in order):
//! 1. Strip outer markdown fences
//! 2. Normalise line endings (CRLF → LF)
//! 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
//! 4. Trim trailing whitespace per line
//! 5. Collapse runs of blank lines to one
//! 6. Repair image markers for known tokens
//! 7. Ensure the text ends with exactly one newline

use crate::pipeline::marker::PositionMarker;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Apply every cleanup rule to one translated chunk.
///
/// `markers` are the tokens extracted from the source; only references whose
/// target is one of them are repaired, so ordinary Markdown images in the
/// document are left alone.
pub fn clean_translation(input: &str, markers: &[PositionMarker]) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = repair_markers(&s, markers);
    ensure_final_newline(&s)
}

// ── Rule 1: Strip outer markdown fences ──────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\n(.*)\n```\s*$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode ─────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

// ── Rule 4: Trim trailing whitespace ─────────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

// ── Rule 5: Collapse blank lines ─────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").into_owned()
}

// ── Rule 6: Repair image markers ─────────────────────────────────────────
//
// Matches any image reference, optionally with the target in angle brackets
// or with surrounding spaces. If the target is a known token the whole
// reference is rewritten to the canonical form.

static RE_IMAGE_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[[^\]\n]*\]\(\s*<?([^)\s>]+)>?\s*\)").unwrap());

fn repair_markers(input: &str, markers: &[PositionMarker]) -> String {
    if markers.is_empty() {
        return input.to_string();
    }
    let known: HashSet<&str> = markers.iter().map(PositionMarker::as_str).collect();
    RE_IMAGE_REF
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let target = &caps[1];
            if known.contains(target) {
                format!("![{target}]({target})")
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

// ── Rule 7: Final newline ────────────────────────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}
