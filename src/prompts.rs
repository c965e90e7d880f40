//! Prompt templates for document, image and summary requests.
//!
//! Every prompt sent to the backend is rendered from a constant in this
//! module, so tests can inspect them without a live model. Placeholders use
//! `{target_language}` and `{content}`.

use crate::config::ImageInstruction;

/// Full-text translation prompt.
///
/// Marker lines must survive translation untouched: the assembler finds
/// images in the translated text by exact match on them.
pub const DOCUMENT_TRANSLATION_PROMPT: &str = r#"You are a professional translator. Translate the document below into {target_language}.

Follow these rules precisely:

1. CONTENT
   - Translate ALL text completely and faithfully
   - Keep the original meaning, tone and terminology
   - Do not summarise, omit or add content

2. STRUCTURE
   - Keep the Markdown structure: headings, lists, tables, emphasis, links
   - Keep paragraph breaks exactly where they are
   - Keep code blocks, URLs and numbers unchanged

3. IMAGE MARKERS
   - Lines of the form ![image-1-0-7.png](image-1-0-7.png) are image markers
   - Copy every image marker exactly as written, character for character
   - Never translate, rename, reorder or drop an image marker

4. OUTPUT FORMAT
   - Output ONLY the translated document
   - Do NOT wrap the output in ```markdown fences
   - Do NOT add commentary or explanations

Document:

{content}"#;

/// Image prompt for [`ImageInstruction::DescribeAndTranslate`].
pub const IMAGE_DESCRIBE_PROMPT: &str = r#"Look at this image carefully.

1. Briefly describe what the image shows (chart, diagram, photo, table, screenshot...).
2. Transcribe any text that appears in the image and translate it into {target_language}.

Write the whole answer in {target_language}. Output plain Markdown with no preamble and no code fences."#;

/// Image prompt for [`ImageInstruction::EmbeddedTextOnly`].
pub const IMAGE_TEXT_ONLY_PROMPT: &str = r#"Extract every piece of text that appears in this image and translate it into {target_language}.

Keep the reading order of the image. Do not describe the image itself. If the image contains no text, answer with a single dash (-).
Output plain Markdown with no preamble and no code fences."#;

/// Summary prompt, run over the original text.
pub const DOCUMENT_SUMMARY_PROMPT: &str = r#"Summarise the document below in {target_language}.

- Start with one sentence stating what the document is about
- Follow with 3 to 7 bullet points covering the key points
- Ignore image markers such as ![image-1-0-7.png](image-1-0-7.png)
- Output ONLY the summary in Markdown, with no preamble

Document:

{content}"#;

/// Render the full-text translation prompt.
pub fn document_translation_prompt(content: &str, target_language: &str) -> String {
    DOCUMENT_TRANSLATION_PROMPT
        .replace("{target_language}", target_language)
        .replace("{content}", content)
}

/// Render the image prompt for the given instruction kind.
pub fn image_prompt(kind: ImageInstruction, target_language: &str) -> String {
    let template = match kind {
        ImageInstruction::DescribeAndTranslate => IMAGE_DESCRIBE_PROMPT,
        ImageInstruction::EmbeddedTextOnly => IMAGE_TEXT_ONLY_PROMPT,
    };
    template.replace("{target_language}", target_language)
}

pub fn summary_prompt(content: &str, target_language: &str) -> String {
    DOCUMENT_SUMMARY_PROMPT
        .replace("{target_language}", target_language)
        .replace("{content}", content)
}
