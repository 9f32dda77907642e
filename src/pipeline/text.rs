//! Text extraction: pull the raw text layer out of a PDF via pdfium.
//!
//! pdfium is a C++ library with process-global state and is not async-safe,
//! so every call goes through `tokio::task::spawn_blocking`
//! ([`extract_text_blocking_safe`]). The `thread_safe` feature of
//! pdfium-render serialises concurrent calls from different requests.
//!
//! Scanned report cards have no text layer at all; that is reported as
//! [`GradeLensError::EmptyDocument`] here so no model call is ever made for
//! them.

use crate::error::GradeLensError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Reads the text layer of a PDF.
pub trait TextExtractor: Send + Sync {
    /// Page texts joined with newlines, in page order.
    ///
    /// Blank output is an error ([`GradeLensError::EmptyDocument`]), never an
    /// empty `Ok`.
    fn extract_text(&self, pdf_bytes: &[u8]) -> Result<String, GradeLensError>;
}

/// [`TextExtractor`] backed by pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumTextExtractor {
    lib_path: Option<PathBuf>,
}

impl PdfiumTextExtractor {
    pub fn new(lib_path: Option<PathBuf>) -> Self {
        Self { lib_path }
    }
}

impl TextExtractor for PdfiumTextExtractor {
    fn extract_text(&self, pdf_bytes: &[u8]) -> Result<String, GradeLensError> {
        let pdfium = bind_pdfium(self.lib_path.as_deref())?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(|e| GradeLensError::UnsupportedFormat {
                detail: format!("{:?}", e),
            })?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        let mut texts = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            let text = page
                .text()
                .map_err(|e| GradeLensError::UnsupportedFormat {
                    detail: format!("page {}: {:?}", idx + 1, e),
                })?
                .all();
            debug!("Page {}: {} chars of text", idx + 1, text.len());
            texts.push(text);
        }

        non_empty(texts.join("\n"))
    }
}

/// Reject text with nothing but whitespace in it.
pub fn non_empty(text: String) -> Result<String, GradeLensError> {
    if text.trim().is_empty() {
        Err(GradeLensError::EmptyDocument)
    } else {
        Ok(text)
    }
}

/// Run a [`TextExtractor`] off the async worker threads.
pub async fn extract_text_blocking_safe(
    extractor: Arc<dyn TextExtractor>,
    pdf_bytes: Vec<u8>,
) -> Result<String, GradeLensError> {
    tokio::task::spawn_blocking(move || extractor.extract_text(&pdf_bytes))
        .await
        .map_err(|e| GradeLensError::Internal(format!("Text extraction task panicked: {}", e)))?
}

/// Bind to a pdfium library.
///
/// Search order: explicit path, `PDFIUM_LIB_PATH`, the working directory,
/// then the system library path.
pub fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, GradeLensError> {
    let mut attempts: Vec<String> = Vec::new();

    let explicit = lib_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

    if let Some(path) = explicit {
        let path = if path.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&path)
        } else {
            path
        };
        match Pdfium::bind_to_library(&path) {
            Ok(bindings) => return Ok(Pdfium::new(bindings)),
            Err(e) => attempts.push(format!("{}: {:?}", path.display(), e)),
        }
    }

    let local = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&local) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(e) => attempts.push(format!("{}: {:?}", local.display(), e)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(e) => {
            attempts.push(format!("system library: {:?}", e));
            Err(GradeLensError::PdfiumBindingFailed(attempts.join("; ")))
        }
    }
}
