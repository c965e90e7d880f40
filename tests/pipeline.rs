//! Integration tests for the translation pipeline against a scripted client.
//!
//! No network and no API key: [`ScriptedClient`] answers every call from a
//! script, counts calls in flight (text and image alike) and records when
//! each image finished.
//! Timing tests run on a paused tokio clock, so backoff sleeps cost nothing.

use async_trait::async_trait;
use edgequake_doctranslate::convert::EMPTY_DOCUMENT_TEXT;
use edgequake_doctranslate::{
    translate_document_to_file, Completion, DocTranslateError, ImageError, ImageFormat,
    ImageInstruction, ImagePosition, ImageRecord, ImageTranslation, ImageTranslator,
    OutputFormat, RetryPolicy, TranslationClient, TranslationConfig, TranslationError,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

// ── Scripted client ──────────────────────────────────────────────────────────

/// Images are keyed by their first byte.
#[derive(Default)]
struct ScriptedClient {
    delay: Duration,
    transient: Mutex<HashMap<u8, u32>>,
    permanent: HashSet<u8>,
    fail_text: bool,
    mangle_markers: bool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    image_calls: AtomicUsize,
    text_calls: AtomicUsize,
    finished_at: Mutex<HashMap<u8, Instant>>,
}

impl ScriptedClient {
    fn new() -> Self {
        Self::default()
    }

    fn delay(mut self, d: Duration) -> Self {
        self.delay = d;
        self
    }

    /// The first `n` calls for image `key` fail with a transient error.
    fn transient(self, key: u8, n: u32) -> Self {
        self.transient.lock().unwrap().insert(key, n);
        self
    }

    fn permanent(mut self, key: u8) -> Self {
        self.permanent.insert(key);
        self
    }

    fn failing_text(mut self) -> Self {
        self.fail_text = true;
        self
    }

    fn mangling_markers(mut self) -> Self {
        self.mangle_markers = true;
        self
    }

    /// Count one call in flight for `delay`.
    async fn hold_slot(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn finished(&self, key: u8) -> Instant {
        self.finished_at.lock().unwrap()[&key]
    }

    /// "Translate" line by line, leaving marker lines alone (or translating
    /// their alt text when asked to misbehave).
    fn translate_lines(&self, content: &str) -> String {
        content
            .lines()
            .map(|line| {
                if line.starts_with("![") {
                    if self.mangle_markers {
                        let target = line.split_once("](").map(|(_, t)| t).unwrap_or(")");
                        format!("![Bild]({target}")
                    } else {
                        line.to_string()
                    }
                } else if line.trim().is_empty() {
                    String::new()
                } else {
                    format!("DE: {line}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl TranslationClient for ScriptedClient {
    async fn complete_text(&self, prompt: &str) -> Result<Completion, TranslationError> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_text {
            return Err(TranslationError::Permanent("401 invalid api key".into()));
        }
        if prompt.starts_with("Summarise") {
            return Ok(Completion::new("Short summary."));
        }
        let content = prompt
            .rsplit_once("Document:\n\n")
            .map(|(_, c)| c)
            .unwrap_or(prompt);
        self.hold_slot().await;
        Ok(Completion {
            text: format!("```markdown\n{}\n```", self.translate_lines(content)),
            input_tokens: 100,
            output_tokens: 80,
        })
    }

    async fn complete_image(
        &self,
        image: &[u8],
        _mime_type: &str,
        _prompt: &str,
    ) -> Result<Completion, TranslationError> {
        let key = image[0];
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        self.hold_slot().await;

        if self.permanent.contains(&key) {
            return Err(TranslationError::Permanent("400 unsupported image".into()));
        }
        {
            let mut transient = self.transient.lock().unwrap();
            if let Some(left) = transient.get_mut(&key) {
                if *left > 0 {
                    *left -= 1;
                    return Err(TranslationError::Transient("503 Service Unavailable".into()));
                }
            }
        }
        self.finished_at.lock().unwrap().insert(key, Instant::now());
        Ok(Completion {
            text: format!("Translated image {key}"),
            input_tokens: 10,
            output_tokens: 5,
        })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn image(key: u8) -> ImageRecord {
    ImageRecord::new(
        vec![key, 0xAA, 0xBB],
        ImageFormat::Png,
        ImagePosition::Pdf {
            page: 1,
            index: key as u32,
            object_ref: key as u32,
        },
    )
}

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_secs(1),
        call_timeout: Duration::from_secs(60),
    }
}

fn translator(client: &Arc<ScriptedClient>, ceiling: usize) -> ImageTranslator {
    ImageTranslator::new(client.clone() as Arc<dyn TranslationClient>, ceiling)
        .with_retry_policy(policy())
}

const PNG: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

fn config_with(client: Arc<ScriptedClient>) -> edgequake_doctranslate::TranslationConfigBuilder {
    TranslationConfig::builder()
        .target_language("German")
        .retry_backoff_ms(0)
        .client(client as Arc<dyn TranslationClient>)
}

fn write_markdown_fixture(dir: &Path) -> String {
    std::fs::write(dir.join("fig.png"), PNG).unwrap();
    let path = dir.join("doc.md");
    std::fs::write(
        &path,
        "# Title\n\nFirst paragraph.\n\n![Figure](fig.png)\n\nLast paragraph.\n",
    )
    .unwrap();
    path.to_string_lossy().into_owned()
}

// ── Image batch ──────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn batch_results_are_index_aligned() {
    let client = Arc::new(
        ScriptedClient::new()
            .delay(Duration::from_millis(50))
            .transient(2, 5)
            .transient(5, 1)
            .permanent(4),
    );
    let images: Vec<ImageRecord> = (1..=6).map(image).collect();

    let out = translator(&client, 3)
        .translate_batch(&images, "German", ImageInstruction::DescribeAndTranslate)
        .await;

    assert_eq!(out.len(), 6);
    assert_eq!(out[0].block_text().as_deref(), Some("Translated image 1"));
    assert!(matches!(
        out[1],
        ImageTranslation::Failed(ImageError::RetriesExhausted { index: 1, attempts: 3, .. })
    ));
    assert_eq!(out[2].block_text().as_deref(), Some("Translated image 3"));
    assert!(matches!(
        out[3],
        ImageTranslation::Failed(ImageError::Rejected { index: 3, attempts: 1, .. })
    ));
    assert_eq!(out[4].attempts(), 2);
    assert_eq!(out[4].block_text().as_deref(), Some("Translated image 5"));
    assert_eq!(out[5].block_text().as_deref(), Some("Translated image 6"));
}

#[tokio::test(start_paused = true)]
async fn in_flight_calls_never_exceed_ceiling() {
    for ceiling in [1, 4] {
        let client = Arc::new(ScriptedClient::new().delay(Duration::from_millis(100)));
        let images: Vec<ImageRecord> = (1..=12).map(image).collect();

        let out = translator(&client, ceiling)
            .translate_batch(&images, "German", ImageInstruction::default())
            .await;

        assert_eq!(out.len(), 12);
        assert!(out.iter().all(ImageTranslation::is_translated));
        assert_eq!(client.image_calls.load(Ordering::SeqCst), 12);
        assert_eq!(client.max_in_flight.load(Ordering::SeqCst), ceiling, "ceiling {ceiling}");
    }
}

#[tokio::test(start_paused = true)]
async fn backoff_does_not_stall_other_images() {
    // Image 1 fails twice: it waits 1 s, then 2 s, before its third attempt.
    // Images 2 and 3 share the second slot and finish long before that.
    let client = Arc::new(
        ScriptedClient::new()
            .delay(Duration::from_millis(100))
            .transient(1, 2),
    );
    let images = vec![image(1), image(2), image(3)];
    let start = Instant::now();

    let out = translator(&client, 2)
        .translate_batch(&images, "German", ImageInstruction::default())
        .await;

    assert!(out.iter().all(ImageTranslation::is_translated));
    assert_eq!(out[0].attempts(), 3);
    assert!(client.finished(1) - start >= Duration::from_secs(3));
    assert!(client.finished(2) - start < Duration::from_secs(1));
    assert!(client.finished(3) - start < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn permanent_errors_are_not_retried() {
    let client = Arc::new(ScriptedClient::new().permanent(7));
    let out = translator(&client, 2)
        .translate_batch(&[image(7)], "German", ImageInstruction::default())
        .await;

    assert_eq!(client.image_calls.load(Ordering::SeqCst), 1);
    assert_eq!(out[0].attempts(), 1);
    assert!(!out[0].is_translated());
}

#[tokio::test(start_paused = true)]
async fn timeouts_are_retried_then_reported() {
    let client = Arc::new(ScriptedClient::new().delay(Duration::from_secs(30)));
    let shared: Arc<dyn TranslationClient> = client.clone();
    let t = ImageTranslator::new(shared, 1).with_retry_policy(RetryPolicy {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(10),
        call_timeout: Duration::from_secs(1),
    });

    let out = t
        .translate_batch(&[image(9)], "German", ImageInstruction::default())
        .await;

    assert_eq!(client.image_calls.load(Ordering::SeqCst), 2);
    match &out[0] {
        ImageTranslation::Failed(e @ ImageError::RetriesExhausted { attempts: 2, .. }) => {
            assert!(e.detail().contains("timed out"), "{e}");
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}

// ── Whole documents ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn text_and_images_share_one_ceiling() {
    let dir = tempfile::tempdir().unwrap();
    let mut body = String::new();
    for n in 1..=4u8 {
        std::fs::write(dir.path().join(format!("fig{n}.png")), PNG).unwrap();
        body.push_str(&format!("Paragraph {n}: {}\n\n", "words ".repeat(70)));
        body.push_str(&format!("![Figure {n}](fig{n}.png)\n\n"));
    }
    let input = dir.path().join("long.md");
    std::fs::write(&input, body).unwrap();

    let client = Arc::new(ScriptedClient::new().delay(Duration::from_millis(100)));
    let config = config_with(client.clone())
        .concurrency(2)
        .max_chunk_chars(500)
        .build()
        .unwrap();

    let out_path = dir.path().join("long.de.md");
    let output = translate_document_to_file(input.to_str().unwrap(), out_path, &config)
        .await
        .unwrap();

    assert!(output.stats.text_chunks >= 2, "{:?}", output.stats);
    assert_eq!(output.stats.translated_images, 4);
    assert_eq!(client.image_calls.load(Ordering::SeqCst), 4);
    assert_eq!(client.max_in_flight.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn markdown_document_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_markdown_fixture(dir.path());
    let out_path = dir.path().join("out").join("doc.md");
    let client = Arc::new(ScriptedClient::new());
    let config = config_with(client.clone()).build().unwrap();

    let output = translate_document_to_file(&input, &out_path, &config)
        .await
        .unwrap();

    let written = std::fs::read_to_string(&out_path).unwrap();
    assert_eq!(written, output.document);

    let report = &output.images[0];
    assert!(report.translated);
    let asset = dir.path().join("out/assets").join(&report.asset);
    assert_eq!(std::fs::read(&asset).unwrap(), PNG);

    let stem = report.asset.trim_end_matches(".png");
    let image_ref = format!("![{stem}](assets/{})", report.asset);
    let expected = format!(
        "# Bilingual Document\n\n\
         ## Original\n\n# Title\n\nFirst paragraph.\n\n{image_ref}\n\nLast paragraph.\n\n\
         ## Translated\n\nDE: # Title\n\nDE: First paragraph.\n\n{image_ref}\n\n\
         **Translation:** \nTranslated image 137\n\nDE: Last paragraph.\n"
    );
    assert_eq!(output.document, expected);

    assert_eq!(output.stats.total_images, 1);
    assert_eq!(output.stats.translated_images, 1);
    assert_eq!(output.stats.text_chunks, 1);
    assert_eq!(output.stats.total_input_tokens, 110);
    assert!(!dir.path().join("out/doc.md.tmp").exists());
}

#[tokio::test]
async fn translated_alt_text_is_repaired() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_markdown_fixture(dir.path());
    let out_path = dir.path().join("doc.de.md");
    let client = Arc::new(ScriptedClient::new().mangling_markers());
    let config = config_with(client).build().unwrap();

    let output = translate_document_to_file(&input, &out_path, &config)
        .await
        .unwrap();

    let translated = output.document.split("## Translated").nth(1).unwrap();
    assert!(translated.contains("**Translation:** \nTranslated image 137"));
    assert!(!translated.contains("![Bild]"));
}

#[tokio::test]
async fn images_can_be_left_untranslated() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_markdown_fixture(dir.path());
    let client = Arc::new(ScriptedClient::new());
    let config = config_with(client.clone())
        .translate_images(false)
        .build()
        .unwrap();

    let output = translate_document_to_file(&input, dir.path().join("doc.de.md"), &config)
        .await
        .unwrap();

    assert_eq!(client.image_calls.load(Ordering::SeqCst), 0);
    assert!(!output.document.contains("**Translation:**"));
    assert_eq!(output.images[0].attempts, 0);
    assert!(output.images[0].error.is_none());
    assert!(dir.path().join("assets").join(&output.images[0].asset).exists());
}

#[tokio::test]
async fn text_failure_is_fatal_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_markdown_fixture(dir.path());
    let out_path = dir.path().join("doc.de.md");
    let client = Arc::new(ScriptedClient::new().failing_text());
    let config = config_with(client).build().unwrap();

    let err = translate_document_to_file(&input, &out_path, &config)
        .await
        .unwrap_err();

    assert!(matches!(err, DocTranslateError::TextTranslationFailed { attempts: 1, .. }));
    assert!(!out_path.exists());
}

#[tokio::test]
async fn empty_document_uses_placeholder_without_calls() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("empty.txt");
    std::fs::write(&input, "  \n\n").unwrap();
    let client = Arc::new(ScriptedClient::new());
    let config = config_with(client.clone()).build().unwrap();

    let out_path = dir.path().join("e.md");
    let output = translate_document_to_file(input.to_str().unwrap(), out_path, &config)
        .await
        .unwrap();

    assert_eq!(client.text_calls.load(Ordering::SeqCst), 0);
    assert_eq!(output.original_text, EMPTY_DOCUMENT_TEXT);
    assert_eq!(output.document.matches(EMPTY_DOCUMENT_TEXT).count(), 2);
}

#[tokio::test]
async fn summary_and_html_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("note.txt");
    std::fs::write(&input, "Hello there.\n").unwrap();
    let client = Arc::new(ScriptedClient::new());
    let config = config_with(client)
        .include_summary(true)
        .output_format(OutputFormat::Html)
        .build()
        .unwrap();

    let out_path = dir.path().join("note.html");
    let output = translate_document_to_file(input.to_str().unwrap(), out_path, &config)
        .await
        .unwrap();

    assert_eq!(output.summary.as_deref(), Some("Short summary."));
    assert!(output.document.starts_with("<!DOCTYPE html>"));
    assert!(output.document.contains("<h2>Summary</h2>"));
    assert!(output.document.contains("DE: Hello there."));
}

#[tokio::test]
async fn unsupported_input_is_rejected_before_any_call() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("slides.pptx");
    std::fs::write(&input, b"PK").unwrap();
    let client = Arc::new(ScriptedClient::new());
    let config = config_with(client.clone()).build().unwrap();

    let err = translate_document_to_file(input.to_str().unwrap(), dir.path().join("x.md"), &config)
        .await
        .unwrap_err();

    assert!(matches!(err, DocTranslateError::UnsupportedFormat { .. }));
    assert_eq!(client.text_calls.load(Ordering::SeqCst), 0);
}
