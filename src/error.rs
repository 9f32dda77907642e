//! Error types for the gradelens library.
//!
//! Every pipeline step fails fast: the first error aborts the remaining
//! stages and no partially populated [`crate::output::AnalysisRecord`] is
//! ever returned. That makes a single fatal enum, [`GradeLensError`], enough
//! for the whole library.
//!
//! The outermost boundary ([`crate::analyze::ReportPipeline::analyze_upload`],
//! the HTTP handlers, the CLI) turns these into a uniform
//! `success + message` shape. [`GradeLensError::kind`] and
//! [`GradeLensError::is_retryable`] tell that boundary whether the same input
//! is worth submitting again: model output is non-deterministic, so a
//! malformed reply may well succeed on a second call, whereas a scanned
//! image-only PDF never will.

use crate::progress::Stage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the gradelens library.
#[derive(Debug, Error)]
pub enum GradeLensError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Missing file, wrong declared MIME type, oversize upload, bad payload.
    #[error("Invalid upload: {reason}")]
    InvalidInput { reason: String },

    /// Input path does not exist.
    #[error("Report card not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Document errors ───────────────────────────────────────────────────
    /// The PDF opened fine but contains no extractable text (image-only scan).
    #[error("No readable text found in the PDF.\nUpload a text-based report card rather than a scanned image.")]
    EmptyDocument,

    /// The bytes are not a PDF the engine can open.
    #[error("Unsupported document: {detail}\nUpload an unencrypted PDF report card.")]
    UnsupportedFormat { detail: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// Structured extraction returned unparseable or schema-invalid JSON.
    #[error("Could not read the marks from the AI response: {detail}\nPlease try again.")]
    MalformedAiResponse { detail: String },

    /// Narrative analysis was invalid and strict mode forbids a substitute.
    #[error("The AI analysis was incomplete: {detail}\nPlease try again.")]
    IncompleteAnalysis { detail: String },

    /// A model call did not answer within the configured timeout.
    #[error("Language model timed out after {secs}s during {stage}\nPlease try again, or raise --api-timeout.")]
    ModelTimeout { stage: Stage, secs: u64 },

    /// A model call failed at the transport or provider level.
    #[error("Language model request failed during {stage}: {message}")]
    ModelUnavailable { stage: Stage, message: String },

    /// No language-model provider could be constructed.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, place the platform library in the\n\
working directory, or install it system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Output errors ─────────────────────────────────────────────────────
    /// The downloadable report could not be produced.
    #[error("Failed to generate the report: {detail}")]
    Render { detail: String },

    /// Could not write a rendered report to disk.
    #[error("Failed to write report file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`GradeLensError`], safe to send to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    InvalidInput,
    EmptyDocument,
    UnsupportedFormat,
    MalformedAiResponse,
    IncompleteAnalysis,
    ModelTimeout,
    ModelUnavailable,
    Render,
    Configuration,
    Internal,
}

impl GradeLensError {
    /// Classify this error for the presentation layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. }
            | Self::FileNotFound { .. }
            | Self::PermissionDenied { .. }
            | Self::DownloadFailed { .. }
            | Self::DownloadTimeout { .. } => ErrorKind::InvalidInput,
            Self::EmptyDocument => ErrorKind::EmptyDocument,
            Self::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            Self::MalformedAiResponse { .. } => ErrorKind::MalformedAiResponse,
            Self::IncompleteAnalysis { .. } => ErrorKind::IncompleteAnalysis,
            Self::ModelTimeout { .. } => ErrorKind::ModelTimeout,
            Self::ModelUnavailable { .. } => ErrorKind::ModelUnavailable,
            Self::Render { .. } | Self::OutputWriteFailed { .. } => ErrorKind::Render,
            Self::ProviderNotConfigured { .. }
            | Self::PdfiumBindingFailed(_)
            | Self::InvalidConfig(_) => ErrorKind::Configuration,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether resubmitting the same input may succeed.
    ///
    /// The pipeline never retries on its own; this only informs the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::MalformedAiResponse
                | ErrorKind::IncompleteAnalysis
                | ErrorKind::ModelTimeout
                | ErrorKind::ModelUnavailable
                | ErrorKind::Render
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_timeout_display() {
        let e = GradeLensError::ModelTimeout {
            stage: Stage::ExtractStudent,
            secs: 60,
        };
        let msg = e.to_string();
        assert!(msg.contains("60s"), "got: {msg}");
        assert!(msg.contains("student data extraction"), "got: {msg}");
    }

    #[test]
    fn invalid_input_display() {
        let e = GradeLensError::InvalidInput {
            reason: "expected application/pdf, got image/png".into(),
        };
        assert!(e.to_string().contains("image/png"));
    }

    #[test]
    fn model_failures_are_retryable() {
        assert!(GradeLensError::MalformedAiResponse {
            detail: "not json".into()
        }
        .is_retryable());
        assert!(GradeLensError::IncompleteAnalysis {
            detail: "empty strengths".into()
        }
        .is_retryable());
        assert!(GradeLensError::Render {
            detail: "font".into()
        }
        .is_retryable());
    }

    #[test]
    fn document_failures_are_not_retryable() {
        assert!(!GradeLensError::EmptyDocument.is_retryable());
        assert!(!GradeLensError::UnsupportedFormat {
            detail: "bad header".into()
        }
        .is_retryable());
        assert!(!GradeLensError::InvalidInput {
            reason: "empty".into()
        }
        .is_retryable());
    }

    #[test]
    fn kind_serialises_camel_case() {
        let json = serde_json::to_string(&ErrorKind::MalformedAiResponse).unwrap();
        assert_eq!(json, "\"malformedAiResponse\"");
    }
}
