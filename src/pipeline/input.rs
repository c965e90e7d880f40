//! Input resolution: normalise a user-supplied path or URL to a local file
//! and decide which format reader handles it.
//!
//! URL inputs are downloaded into a `TempDir` that lives as long as the
//! [`ResolvedInput`], so the readers always work on a real path and the
//! download is cleaned up on drop. The format comes from the file extension,
//! falling back to the `Content-Type` header for URLs without one.

use crate::document::DocumentFormat;
use crate::error::DocTranslateError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// The resolved input: a local file plus its format.
#[derive(Debug)]
pub enum ResolvedInput {
    /// Input was already a local file.
    Local { path: PathBuf, format: DocumentFormat },
    /// Input was a URL, downloaded to a temp directory kept alive here.
    Downloaded {
        path: PathBuf,
        format: DocumentFormat,
        _temp_dir: TempDir,
    },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local { path, .. } => path,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }

    pub fn format(&self) -> DocumentFormat {
        match self {
            ResolvedInput::Local { format, .. }
            | ResolvedInput::Downloaded { format, .. } => *format,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Detect the document format of a path from its extension.
pub fn detect_format(path: &Path) -> Result<DocumentFormat, DocTranslateError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    DocumentFormat::from_extension(ext).ok_or_else(|| DocTranslateError::UnsupportedFormat {
        path: path.to_path_buf(),
        extension: ext.to_string(),
    })
}

/// Resolve the input string to a local file of a supported format.
///
/// Rejects files above `max_bytes` and `.pdf` files without the `%PDF` magic.
pub async fn resolve_input(
    input: &str,
    timeout_secs: u64,
    max_bytes: u64,
) -> Result<ResolvedInput, DocTranslateError> {
    if is_url(input) {
        download_url(input, timeout_secs, max_bytes).await
    } else {
        resolve_local(input, max_bytes)
    }
}

fn resolve_local(path_str: &str, max_bytes: u64) -> Result<ResolvedInput, DocTranslateError> {
    let path = PathBuf::from(path_str);

    if !path.is_file() {
        return Err(DocTranslateError::FileNotFound { path });
    }
    let format = detect_format(&path)?;

    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(DocTranslateError::PermissionDenied { path });
        }
        Err(_) => return Err(DocTranslateError::FileNotFound { path }),
    };

    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    if size > max_bytes {
        return Err(DocTranslateError::InputTooLarge {
            path,
            size,
            limit: max_bytes,
        });
    }

    if format == DocumentFormat::Pdf {
        let mut magic = [0u8; 4];
        if file.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
            return Err(DocTranslateError::NotAPdf { path, magic });
        }
    }

    debug!("Resolved local {} document: {}", format.name(), path.display());
    Ok(ResolvedInput::Local { path, format })
}

async fn download_url(
    url: &str,
    timeout_secs: u64,
    max_bytes: u64,
) -> Result<ResolvedInput, DocTranslateError> {
    info!("Downloading document from: {}", url);
    let failed = |reason: String| DocTranslateError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            DocTranslateError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let filename = extract_filename(url, content_type.as_deref());
    let temp_dir = TempDir::new().map_err(|e| DocTranslateError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);
    let format = detect_format(&file_path)?;

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    if bytes.len() as u64 > max_bytes {
        return Err(DocTranslateError::InputTooLarge {
            path: file_path,
            size: bytes.len() as u64,
            limit: max_bytes,
        });
    }
    if format == DocumentFormat::Pdf && bytes.len() >= 4 && &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(DocTranslateError::NotAPdf {
            path: file_path,
            magic,
        });
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| DocTranslateError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());
    Ok(ResolvedInput::Downloaded {
        path: file_path,
        format,
        _temp_dir: temp_dir,
    })
}

/// File name from the last URL path segment, else one built from the content type.
fn extract_filename(url: &str, content_type: Option<&str>) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase())
        .unwrap_or_default();
    let ext = match mime.as_str() {
        "application/pdf" => "pdf",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "text/markdown" | "text/x-markdown" => "md",
        "text/plain" => "txt",
        // Web pages without an extension are the common case for URL input.
        _ => "html",
    };
    format!("downloaded.{ext}")
}
