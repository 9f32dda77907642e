//! Progress-callback trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its stages.
//!
//! The stages run strictly one after another, so callbacks are never invoked
//! concurrently for the same run. The trait is still `Send + Sync` because a
//! server shares one configuration across many concurrent requests.
//!
//! # Example
//!
//! ```rust
//! use gradelens::{AnalysisConfig, PipelineProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct Log;
//!
//! impl PipelineProgressCallback for Log {
//!     fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
//!         eprintln!("{stage} done in {elapsed_ms}ms");
//!     }
//! }
//!
//! let config = AnalysisConfig::builder()
//!     .progress_callback(Arc::new(Log) as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One step of the report-assembly pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    /// PDF bytes → plain text.
    ReadText,
    /// Plain text → StudentRecord via the language model.
    ExtractStudent,
    /// StudentRecord → strengths / improvements / recommendations.
    AnalyzeNarrative,
    /// Grades + narrative → AnalysisRecord.
    Assemble,
    /// AnalysisRecord → downloadable document.
    Render,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::ReadText => "text extraction",
            Stage::ExtractStudent => "student data extraction",
            Stage::AnalyzeNarrative => "narrative analysis",
            Stage::Assemble => "report assembly",
            Stage::Render => "report rendering",
        };
        f.write_str(label)
    }
}

/// Called by the pipeline as it moves through its stages.
///
/// All methods default to no-ops so implementors override only what they
/// care about.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once before the first stage.
    fn on_pipeline_start(&self) {}

    /// Called just before a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage finishes successfully.
    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// Called when a stage fails; the pipeline aborts right after.
    fn on_stage_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }

    /// Called when resilient mode replaced the model's narrative with the
    /// deterministic fallback.
    fn on_fallback_used(&self, reason: &str) {
        let _ = reason;
    }

    /// Called once after the last stage, or after the failing one.
    fn on_pipeline_complete(&self, success: bool) {
        let _ = success;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
