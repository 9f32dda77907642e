//! # gradelens
//!
//! Turn a school report card PDF into a graded, annotated analysis.
//!
//! A report card is a small PDF with a student's identity block and a table
//! of marks. This crate reads its text layer and asks a language model to
//! pull out the marks as JSON. It grades every subject against a fixed
//! threshold table, asks the model for strengths, improvements and
//! recommendations, and renders the result as a downloadable report.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      validate upload (MIME, size, %PDF magic)
//!  ├─ 2. Text       pdfium text layer (spawn_blocking); empty → error, no model call
//!  ├─ 3. Student    LLM extraction → schema-checked StudentRecord
//!  ├─ 4. Narrative  LLM analysis (strict) or deterministic fallback (resilient)
//!  ├─ 5. Assemble   per-subject grades, overall grade, chart series
//!  └─ 6. Render     plain text or A4 PDF, named <Student_Name>_Report.<ext>
//! ```
//!
//! Every stage fails fast: the result is a complete [`AnalysisRecord`] or a
//! [`GradeLensError`], never a partial record.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gradelens::{analyze_file, AnalysisConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from PERPLEXITY_API_KEY / OPENAI_API_KEY / …
//!     let config = AnalysisConfig::default();
//!     let record = analyze_file("report_card.pdf", config).await?;
//!     println!("{}: {}% ({})", record.student_name,
//!         record.overall_percentage, record.overall_grade);
//!     for s in &record.subjects {
//!         println!("  {} {}/{} {}", s.name, s.marks_obtained, s.max_marks, s.grade);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Testing without a model
//!
//! [`ReportPipeline::new`] takes its collaborators as trait objects, so a
//! [`ScriptedModel`] and any [`TextExtractor`] stand in for the real model
//! and pdfium; a [`FixedClock`] makes ids and timestamps reproducible.
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `gradelens` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | on      | HTTP API in [`server`] (axum + tower-http) |
//!
//! Disable both when using only the library:
//! ```toml
//! gradelens = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod clock;
pub mod config;
pub mod error;
pub mod grade;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{analyze_file, write_report, ReportPipeline};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, NarrativeMode, ReportFormat};
pub use error::{ErrorKind, GradeLensError};
pub use grade::{grade_for, GRADE_THRESHOLDS};
pub use output::{
    AnalysisOutcome, AnalysisRecord, DownloadOutcome, ExtractedSubject, NarrativeAnalysis,
    NarrativeSource, PerformancePoint, RenderedReport, StudentRecord, SubjectRecord,
};
pub use pipeline::input::{resolve_upload, PdfUpload};
pub use pipeline::llm::{CompletionModel, CompletionRequest, LlmProviderModel, ScriptedModel};
pub use pipeline::narrative::fallback_analysis;
pub use pipeline::render::{renderer_for, PdfReportRenderer, ReportRenderer, TextReportRenderer};
pub use pipeline::text::{PdfiumTextExtractor, TextExtractor};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback, Stage};
