//! Pipeline stages for report-card analysis.
//!
//! Each submodule implements one step. Stages only talk through plain data
//! (`PdfUpload`, `String`, `StudentRecord`, `AnalysisRecord`), so each can
//! be tested on its own with a fake in place of pdfium or the model.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ text ──▶ student ──▶ narrative ──▶ (assemble) ──▶ render
//! (upload)  (pdfium) (LLM+json)  (LLM+json)    analyze.rs     (text/pdf)
//! ```
//!
//! 1. [`input`]     : resolve a path, URL or base64 payload; validate it
//! 2. [`text`]      : pull the text layer out with pdfium (`spawn_blocking`)
//! 3. [`student`]   : structured extraction, schema-checked
//! 4. [`narrative`] : strengths / improvements / recommendations
//! 5. [`render`]    : lay out and draw the downloadable report
//!
//! [`llm`] is the model seam used by steps 3 and 4; [`json`] locates the
//! JSON object inside a model reply.

pub mod input;
pub mod json;
pub mod llm;
pub mod narrative;
pub mod render;
pub mod student;
pub mod text;
