//! Input resolution and validation: get the uploaded report card into memory.
//!
//! Uploads arrive three ways: as a local path (CLI), as an HTTP(S) URL (CLI),
//! or as base64 inside a JSON request (HTTP service). All three end up as a
//! [`PdfUpload`], and [`PdfUpload::validate`] applies the same checks to each
//! before any parsing happens: non-empty, declared `application/pdf`, within
//! the size cap, and starting with the `%PDF` magic bytes.

use crate::config::AnalysisConfig;
use crate::error::GradeLensError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The only MIME type the pipeline accepts.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// An uploaded report card held in memory.
#[derive(Clone)]
pub struct PdfUpload {
    pub file_name: String,
    /// MIME type as declared by the uploader, not sniffed.
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for PdfUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfUpload")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl PdfUpload {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Decode an upload that arrived as base64 text.
    pub fn from_base64(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        content: &str,
    ) -> Result<Self, GradeLensError> {
        let bytes = STANDARD
            .decode(content.trim())
            .map_err(|e| GradeLensError::InvalidInput {
                reason: format!("file content is not valid base64: {e}"),
            })?;
        Ok(Self::new(file_name, mime_type, bytes))
    }

    /// Reject uploads the pipeline must not spend work on.
    pub fn validate(&self, max_bytes: usize) -> Result<(), GradeLensError> {
        if self.bytes.is_empty() {
            return Err(GradeLensError::InvalidInput {
                reason: format!("'{}' is empty", self.file_name),
            });
        }
        let declared = self
            .mime_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        if declared != PDF_MIME_TYPE {
            return Err(GradeLensError::InvalidInput {
                reason: format!(
                    "expected a file of type {PDF_MIME_TYPE}, got '{}'",
                    self.mime_type
                ),
            });
        }
        if self.bytes.len() > max_bytes {
            return Err(GradeLensError::InvalidInput {
                reason: format!(
                    "'{}' is {} bytes; the limit is {} bytes",
                    self.file_name,
                    self.bytes.len(),
                    max_bytes
                ),
            });
        }
        if !self.bytes.starts_with(b"%PDF") {
            let magic: Vec<u8> = self.bytes.iter().take(4).copied().collect();
            return Err(GradeLensError::UnsupportedFormat {
                detail: format!("'{}' does not start with %PDF (first bytes: {magic:?})", self.file_name),
            });
        }
        Ok(())
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Guess the declared MIME type from a file name.
pub fn mime_type_for(file_name: &str) -> &'static str {
    if file_name.to_ascii_lowercase().ends_with(".pdf") {
        PDF_MIME_TYPE
    } else {
        "application/octet-stream"
    }
}

/// Resolve a local path or URL to an in-memory upload.
///
/// The result is not validated; callers run [`PdfUpload::validate`].
pub async fn resolve_upload(
    input: &str,
    config: &AnalysisConfig,
) -> Result<PdfUpload, GradeLensError> {
    if is_url(input) {
        download_url(input, config.download_timeout_secs).await
    } else {
        read_local(input).await
    }
}

async fn read_local(path_str: &str) -> Result<PdfUpload, GradeLensError> {
    let path = PathBuf::from(path_str);
    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => GradeLensError::FileNotFound { path: path.clone() },
        std::io::ErrorKind::PermissionDenied => {
            GradeLensError::PermissionDenied { path: path.clone() }
        }
        _ => GradeLensError::InvalidInput {
            reason: format!("cannot read '{}': {e}", path.display()),
        },
    })?;

    let file_name = file_name_of(&path);
    debug!("Read local report card: {} ({} bytes)", path.display(), bytes.len());
    Ok(PdfUpload::new(file_name.clone(), mime_type_for(&file_name), bytes))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report.pdf".to_string())
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<PdfUpload, GradeLensError> {
    info!("Downloading report card from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| GradeLensError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            GradeLensError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            GradeLensError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(GradeLensError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let file_name = filename_from_url(url);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| GradeLensError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    // Servers often send PDFs as octet-stream; fall back to the extension.
    let mime_type = match content_type {
        Some(ct) if ct.starts_with(PDF_MIME_TYPE) => PDF_MIME_TYPE.to_string(),
        _ => mime_type_for(&file_name).to_string(),
    };

    info!("Downloaded {} bytes", bytes.len());
    Ok(PdfUpload::new(file_name, mime_type, bytes.to_vec()))
}

/// Extract a reasonable filename from the URL path.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "report.pdf".to_string()
}
