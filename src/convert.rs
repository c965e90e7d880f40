//! Document translation entry points.
//!
//! [`translate_document`] runs the whole pipeline for one input: resolve,
//! extract, translate text and images concurrently, assemble. The other
//! functions expose pieces of it (text only, summary only, metadata only).

use crate::config::{OutputFormat, TranslationConfig};
use crate::document::{DocumentFormat, ImageRecord};
use crate::error::DocTranslateError;
use crate::output::{DocumentMetadata, ImageReport, TranslationOutput, TranslationStats};
use crate::pipeline::assemble::{render_html, Assembler, LocalAssetStore};
use crate::pipeline::chunk::split_into_chunks;
use crate::pipeline::images::{ImageTranslation, ImageTranslator};
use crate::pipeline::llm::{Completion, LlmTranslationClient, TranslationClient};
use crate::pipeline::marker::PositionMarker;
use crate::pipeline::postprocess::clean_translation;
use crate::pipeline::retry::run_with_retry;
use crate::pipeline::{input, reader};
use crate::prompts;
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Stand-in text for a document with neither text nor images.
pub const EMPTY_DOCUMENT_TEXT: &str = "No text content could be extracted from the document.";

/// Model used when a provider is named without one.
const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Translate a document file or URL into a bilingual document.
///
/// # Arguments
/// * `input`     — Local file path or HTTP/HTTPS URL (pdf, docx, txt, md, html)
/// * `asset_dir` — Directory that receives the original image files
/// * `config`    — Translation configuration
///
/// # Returns
/// `Ok(TranslationOutput)` even when some images failed; check
/// `output.stats.failed_images`. Failed images carry a labelled failure line
/// in the translated section.
///
/// # Errors
/// Returns `Err(DocTranslateError)` only for fatal errors:
/// - input not found, unreadable, unsupported or too large
/// - extraction failure
/// - no provider configured
/// - full-text translation failed after retries
/// - an asset could not be written
pub async fn translate_document(
    input_str: impl AsRef<str>,
    asset_dir: impl AsRef<Path>,
    config: &TranslationConfig,
) -> Result<TranslationOutput, DocTranslateError> {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting translation into {}: {}", config.target_language, input_str);

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let resolved = input::resolve_input(
        input_str,
        config.download_timeout_secs,
        config.max_input_bytes,
    )
    .await?;

    // ── Step 2: Extract text and images ──────────────────────────────────
    let extract_start = Instant::now();
    let mut doc = reader::read_document(resolved.path(), resolved.format()).await?;
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    if doc.text.trim().is_empty() && doc.images.is_empty() {
        warn!("No text content extracted from {}", input_str);
        doc.text = EMPTY_DOCUMENT_TEXT.to_string();
    }

    // ── Step 3: Get/create the translation client ────────────────────────
    let client = resolve_client(config).await?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_translation_start(doc.images.len());
    }

    // ── Step 4: Translate text and images concurrently ───────────────────
    // Text chunks and images draw from one permit pool, so the document as a
    // whole never has more than `concurrency` backend calls in flight.
    let translate_start = Instant::now();
    let markers: Vec<PositionMarker> = doc.images.iter().map(ImageRecord::marker).collect();
    let limiter = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let translator = ImageTranslator::new(Arc::clone(&client), config.concurrency)
        .with_retry_policy(config.retry_policy())
        .with_progress(config.progress_callback.clone())
        .with_limiter(Arc::clone(&limiter));

    let images_future = async {
        if config.translate_images {
            translator
                .translate_batch(&doc.images, &config.target_language, config.image_instruction)
                .await
        } else {
            debug!("Image translation disabled; {} image(s) skipped", doc.images.len());
            vec![ImageTranslation::Skipped; doc.images.len()]
        }
    };
    let (text_result, image_results) = tokio::join!(
        translate_marked_text(client.as_ref(), &doc.text, &markers, config, Some(&limiter)),
        images_future
    );
    let text = text_result?;
    if let Some(ref cb) = config.progress_callback {
        cb.on_text_translated(text.text.chars().count());
    }

    // ── Step 5: Optional summary ─────────────────────────────────────────
    let mut summary_tokens = (0u64, 0u64);
    let summary = if config.include_summary {
        match request_summary(client.as_ref(), &doc.text, config).await {
            Ok(c) => {
                summary_tokens = (c.input_tokens as u64, c.output_tokens as u64);
                Some(clean_translation(&c.text, &markers).trim_end().to_string())
            }
            Err(e) => {
                warn!("Summary generation failed: {}", e);
                Some(format!("Summary generation failed: {e}"))
            }
        }
    } else {
        None
    };
    let translate_duration_ms = translate_start.elapsed().as_millis() as u64;

    // ── Step 6: Assemble ─────────────────────────────────────────────────
    let store = LocalAssetStore::new(asset_dir.as_ref());
    let artifact = Assembler::new(config.asset_link_prefix.clone(), config.labels.clone())
        .with_summary(summary.clone())
        .assemble(&doc.text, &text.text, &doc.images, &image_results, &store)
        .await?;

    let document = match config.output_format {
        OutputFormat::Markdown => artifact.markdown,
        OutputFormat::Html => {
            let title = doc.metadata.title.as_deref().unwrap_or(&config.labels.title);
            render_html(&artifact.markdown, title)
        }
    };

    // ── Step 7: Reports and stats ────────────────────────────────────────
    let images = image_reports(&doc.images, &image_results);
    let translated_images = images.iter().filter(|r| r.translated).count();
    let failed_images = image_results
        .iter()
        .filter(|r| matches!(r, ImageTranslation::Failed(_)))
        .count();
    let (image_in, image_out) = image_results.iter().fold((0u64, 0u64), |acc, r| match r {
        ImageTranslation::Translated {
            input_tokens,
            output_tokens,
            ..
        } => (acc.0 + *input_tokens as u64, acc.1 + *output_tokens as u64),
        _ => acc,
    });

    let stats = TranslationStats {
        total_images: doc.images.len(),
        translated_images,
        failed_images,
        text_chunks: text.chunks,
        total_input_tokens: text.input_tokens + image_in + summary_tokens.0,
        total_output_tokens: text.output_tokens + image_out + summary_tokens.1,
        extract_duration_ms,
        translate_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Translation complete: {}/{} image(s) translated, {} text chunk(s), {}ms total",
        translated_images, stats.total_images, stats.text_chunks, stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_translation_complete(stats.total_images, translated_images);
    }

    Ok(TranslationOutput {
        document,
        original_text: doc.text,
        translated_text: text.text,
        summary,
        images,
        metadata: doc.metadata,
        stats,
    })
}

/// Translate a document and write the result to `output_path`.
///
/// Assets go to `<output dir>/<asset_link_prefix>` so the relative links in
/// the document resolve. The document itself is written atomically (temp
/// file + rename); nothing is written when translation fails.
pub async fn translate_document_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &TranslationConfig,
) -> Result<TranslationOutput, DocTranslateError> {
    let path = output_path.as_ref();
    let output = translate_document(input_str, asset_dir_for(path, config), config).await?;

    let write_err = |source| DocTranslateError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    tokio::fs::write(&tmp_path, &output.document)
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    info!("Wrote {}", path.display());
    Ok(output)
}

/// Asset directory used by [`translate_document_to_file`] for `output_path`.
pub fn asset_dir_for(output_path: &Path, config: &TranslationConfig) -> PathBuf {
    let parent = output_path.parent().unwrap_or_else(|| Path::new(""));
    let prefix = config.asset_link_prefix.trim_end_matches('/');
    if prefix.is_empty() {
        parent.to_path_buf()
    } else {
        parent.join(prefix)
    }
}

/// Synchronous wrapper around [`translate_document`].
///
/// Creates a temporary tokio runtime internally.
pub fn translate_document_sync(
    input_str: impl AsRef<str>,
    asset_dir: impl AsRef<Path>,
    config: &TranslationConfig,
) -> Result<TranslationOutput, DocTranslateError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DocTranslateError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(translate_document(input_str, asset_dir, config))
}

/// Translate a piece of text with the full-text pipeline (chunking, retry, cleanup).
pub async fn translate_text(
    text: &str,
    config: &TranslationConfig,
) -> Result<String, DocTranslateError> {
    let client = resolve_client(config).await?;
    let out = translate_marked_text(client.as_ref(), text, &[], config, None).await?;
    Ok(out.text)
}

/// Summarise `text` in the target language.
pub async fn summarize(
    text: &str,
    config: &TranslationConfig,
) -> Result<String, DocTranslateError> {
    let client = resolve_client(config).await?;
    let completion = request_summary(client.as_ref(), text, config).await?;
    Ok(clean_translation(&completion.text, &[]).trim_end().to_string())
}

/// Extract document metadata without translating.
///
/// Does not require an LLM provider or API key.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<DocumentMetadata, DocTranslateError> {
    let defaults = TranslationConfig::default();
    let resolved = input::resolve_input(
        input_str.as_ref(),
        defaults.download_timeout_secs,
        defaults.max_input_bytes,
    )
    .await?;
    let doc = reader::read_document(resolved.path(), resolved.format()).await?;
    Ok(doc.metadata)
}

/// File extensions accepted as input, lowercase and without the dot.
pub fn supported_formats() -> Vec<&'static str> {
    DocumentFormat::EXTENSIONS.iter().map(|(ext, _)| *ext).collect()
}

// ── Internal helpers ─────────────────────────────────────────────────────

struct TextTranslation {
    text: String,
    chunks: usize,
    input_tokens: u64,
    output_tokens: u64,
}

/// True when `text` has content beyond whitespace and marker references.
fn has_translatable_text(text: &str, markers: &[PositionMarker]) -> bool {
    let mut rest = text.to_string();
    for m in markers {
        rest = rest.replace(&m.markdown_ref(), "");
    }
    !rest.trim().is_empty()
}

/// Full-text translation: chunk, translate chunks under the concurrency
/// ceiling, clean each result, re-join in order.
///
/// Chunks holding only markers are passed through without a call. Any chunk
/// failing after its retries fails the whole text. With a `limiter`, each
/// chunk also holds one of its permits while it is being translated.
async fn translate_marked_text(
    client: &dyn TranslationClient,
    text: &str,
    markers: &[PositionMarker],
    config: &TranslationConfig,
    limiter: Option<&Semaphore>,
) -> Result<TextTranslation, DocTranslateError> {
    if text == EMPTY_DOCUMENT_TEXT || !has_translatable_text(text, markers) {
        debug!("No translatable text; keeping the original");
        return Ok(TextTranslation {
            text: text.to_string(),
            chunks: 0,
            input_tokens: 0,
            output_tokens: 0,
        });
    }

    let chunks = split_into_chunks(text, config.max_chunk_chars);
    let total = chunks.len();
    let policy = config.retry_policy();
    info!("Translating text: {} chars in {} chunk(s)", text.chars().count(), total);

    let mut results: Vec<_> = stream::iter(chunks.iter().enumerate())
        .map(|(i, chunk)| {
            let policy = &policy;
            async move {
                if !has_translatable_text(chunk, markers) {
                    return (i, Ok(Completion::new(chunk.clone())), 0);
                }
                let prompt = prompts::document_translation_prompt(chunk, &config.target_language);
                let label = format!("Text chunk {}/{}", i + 1, total);
                let _permit = match limiter {
                    Some(limiter) => limiter.acquire().await.ok(),
                    None => None,
                };
                let outcome =
                    run_with_retry(policy, &label, || client.complete_text(&prompt)).await;
                (i, outcome.result, outcome.attempts)
            }
        })
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;
    results.sort_by_key(|(i, _, _)| *i);

    let mut parts = Vec::with_capacity(total);
    let mut sent = 0;
    let (mut input_tokens, mut output_tokens) = (0u64, 0u64);
    for (_, result, attempts) in results {
        let completion = result.map_err(|e| DocTranslateError::TextTranslationFailed {
            attempts,
            detail: e.to_string(),
        })?;
        if attempts > 0 {
            sent += 1;
        }
        input_tokens += completion.input_tokens as u64;
        output_tokens += completion.output_tokens as u64;
        parts.push(clean_translation(&completion.text, markers).trim_end().to_string());
    }

    Ok(TextTranslation {
        text: parts.join("\n\n"),
        chunks: sent,
        input_tokens,
        output_tokens,
    })
}

async fn request_summary(
    client: &dyn TranslationClient,
    text: &str,
    config: &TranslationConfig,
) -> Result<Completion, DocTranslateError> {
    let prompt = prompts::summary_prompt(text, &config.target_language);
    let policy = config.retry_policy();
    let outcome = run_with_retry(&policy, "Summary", || client.complete_text(&prompt)).await;
    outcome
        .result
        .map_err(|e| DocTranslateError::TextTranslationFailed {
            attempts: outcome.attempts,
            detail: e.to_string(),
        })
}

fn image_reports(images: &[ImageRecord], results: &[ImageTranslation]) -> Vec<ImageReport> {
    images
        .iter()
        .zip(results)
        .enumerate()
        .map(|(index, (image, result))| {
            let marker = image.marker();
            ImageReport {
                index,
                id: image.id.clone(),
                asset: Assembler::asset_file_name(&marker, image),
                marker: marker.to_string(),
                format: image.format,
                size: image.bytes.len(),
                attempts: result.attempts(),
                translated: result.is_translated(),
                error: match result {
                    ImageTranslation::Failed(e) => Some(e.to_string()),
                    _ => None,
                },
            }
        })
        .collect()
}

/// The translation client to use: `config.client`, else an
/// [`LlmTranslationClient`] over the resolved provider.
async fn resolve_client(
    config: &TranslationConfig,
) -> Result<Arc<dyn TranslationClient>, DocTranslateError> {
    if let Some(ref client) = config.client {
        return Ok(Arc::clone(client));
    }
    let provider = resolve_provider(config).await?;
    Ok(Arc::new(LlmTranslationClient::new(provider, config)))
}

fn create_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, DocTranslateError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DocTranslateError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `config.provider`, used as-is
/// 2. `config.provider_name` with `config.model`
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set
/// 4. OpenAI when `OPENAI_API_KEY` is set
/// 5. `ProviderFactory::from_env` auto-detection
async fn resolve_provider(
    config: &TranslationConfig,
) -> Result<Arc<dyn LLMProvider>, DocTranslateError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
    if let Some(ref name) = config.provider_name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, &env_model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DocTranslateError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ImageFormat, ImagePosition};

    fn marker(object_ref: u32) -> PositionMarker {
        PositionMarker::encode(
            &ImagePosition::Pdf {
                page: 1,
                index: 0,
                object_ref,
            },
            ImageFormat::Png,
        )
    }

    #[test]
    fn marker_only_text_is_not_translatable() {
        let m = marker(7);
        assert!(!has_translatable_text(&format!("\n{}\n", m.markdown_ref()), &[m.clone()]));
        assert!(has_translatable_text(&format!("Hi\n\n{}", m.markdown_ref()), &[m]));
        assert!(!has_translatable_text("  \n ", &[]));
    }

    #[test]
    fn supported_formats_lists_extensions() {
        let f = supported_formats();
        for ext in ["pdf", "docx", "txt", "md", "markdown", "html", "htm"] {
            assert!(f.contains(&ext), "{ext}");
        }
    }

    #[test]
    fn asset_dir_sits_next_to_output() {
        let config = TranslationConfig::default();
        assert_eq!(
            asset_dir_for(Path::new("out/doc.md"), &config),
            PathBuf::from("out/assets")
        );
        let flat = TranslationConfig::builder().asset_link_prefix("").build().unwrap();
        assert_eq!(asset_dir_for(Path::new("out/doc.md"), &flat), PathBuf::from("out"));
    }
}
