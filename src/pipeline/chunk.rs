//! Paragraph-aligned chunking for long full-text translations.
//!
//! Chunks break only on blank lines, so a marker reference (always on its
//! own line) is never split. A single paragraph longer than the limit is
//! split on line boundaries, and only a single over-long line is split
//! mid-line, on a char boundary.

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Joining the chunks with `"\n\n"` reproduces the paragraph structure of the
/// input. Empty or whitespace-only input yields no chunks.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for para in paragraphs(text) {
        for piece in split_paragraph(para, max_chars) {
            let piece_len = piece.chars().count();
            let sep = if current.is_empty() { 0 } else { 2 };
            if current_len + sep + piece_len > max_chars && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if !current.is_empty() {
                current.push_str("\n\n");
                current_len += 2;
            }
            current.push_str(&piece);
            current_len += piece_len;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Paragraphs separated by one or more blank lines, trimmed of outer blank lines.
fn paragraphs(text: &str) -> impl Iterator<Item = &str> {
    text.split("\n\n")
        .map(|p| p.trim_matches('\n'))
        .filter(|p| !p.trim().is_empty())
}

fn split_paragraph(para: &str, max_chars: usize) -> Vec<String> {
    if para.chars().count() <= max_chars {
        return vec![para.to_string()];
    }
    let mut out = Vec::new();
    let mut current = String::new();
    for line in para.lines() {
        for piece in split_line(line, max_chars) {
            let needed = piece.chars().count() + usize::from(!current.is_empty());
            if current.chars().count() + needed > max_chars && !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(piece);
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn split_line(line: &str, max_chars: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = line;
    while rest.chars().count() > max_chars {
        let cut = rest
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        out.push(&rest[..cut]);
        rest = &rest[cut..];
    }
    out.push(rest);
    out
}
