//! Pipeline orchestration: upload in, [`AnalysisRecord`] out.
//!
//! [`ReportPipeline`] runs the stages strictly in order (text → student data
//! → narrative → assembly) and stops at the first error, so a caller gets
//! either a complete record or an error, never a partial record. It holds no
//! mutable state: one instance can serve any number of concurrent requests.
//!
//! [`ReportPipeline::analyze_upload`] and [`ReportPipeline::download_report`]
//! are the outer boundary. They never
//! return `Err` and fold every failure into a `success: false` shape that is
//! safe to hand to a UI.

use crate::clock::{Clock, SystemClock};
use crate::config::{AnalysisConfig, ReportFormat};
use crate::error::GradeLensError;
use crate::output::{AnalysisOutcome, AnalysisRecord, DownloadOutcome, RenderedReport};
use crate::pipeline::input::{self, PdfUpload};
use crate::pipeline::llm::{CompletionModel, LlmProviderModel};
use crate::pipeline::narrative::analyze_narrative;
use crate::pipeline::render::{render_blocking_safe, renderer_for};
use crate::pipeline::student::extract_student_data;
use crate::pipeline::text::{extract_text_blocking_safe, non_empty, PdfiumTextExtractor, TextExtractor};
use crate::progress::Stage;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The analysis pipeline with its collaborators injected.
pub struct ReportPipeline {
    config: AnalysisConfig,
    extractor: Arc<dyn TextExtractor>,
    model: Arc<dyn CompletionModel>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ReportPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ReportPipeline {
    pub fn new(
        config: AnalysisConfig,
        extractor: Arc<dyn TextExtractor>,
        model: Arc<dyn CompletionModel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            extractor,
            model,
            clock,
        }
    }

    /// Production wiring: pdfium text extraction, the configured LLM
    /// provider, and the system clock.
    pub fn from_config(config: AnalysisConfig) -> Result<Self, GradeLensError> {
        let model = LlmProviderModel::from_config(&config)?;
        let extractor = PdfiumTextExtractor::new(config.pdfium_lib_path.clone());
        Ok(Self::new(
            config,
            Arc::new(extractor),
            Arc::new(model),
            Arc::new(SystemClock),
        ))
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run every stage and assemble the record.
    ///
    /// Fails fast: the first failing stage aborts the rest. An upload with
    /// no text fails before any model call is made, and a malformed
    /// extraction reply fails before the narrative call.
    pub async fn build_analysis(&self, upload: &PdfUpload) -> Result<AnalysisRecord, GradeLensError> {
        let start = Instant::now();
        info!("Starting analysis: {}", upload.file_name);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_pipeline_start();
        }

        let result = self.run_stages(upload).await;

        match &result {
            Ok(record) => info!(
                "Analysis complete: {} ({} subjects, grade {}) in {}ms",
                record.id,
                record.subjects.len(),
                record.overall_grade,
                start.elapsed().as_millis()
            ),
            Err(e) => warn!("Analysis failed after {}ms: {}", start.elapsed().as_millis(), e),
        }
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_pipeline_complete(result.is_ok());
        }
        result
    }

    async fn run_stages(&self, upload: &PdfUpload) -> Result<AnalysisRecord, GradeLensError> {
        upload.validate(self.config.max_upload_bytes)?;

        let raw_text = self
            .stage(Stage::ReadText, async {
                let text =
                    extract_text_blocking_safe(Arc::clone(&self.extractor), upload.bytes.clone())
                        .await?;
                non_empty(text)
            })
            .await?;
        debug!("Extracted {} chars of text", raw_text.len());

        let student = self
            .stage(
                Stage::ExtractStudent,
                extract_student_data(self.model.as_ref(), &raw_text, &self.config),
            )
            .await?;

        let (narrative, source) = self
            .stage(
                Stage::AnalyzeNarrative,
                analyze_narrative(
                    self.model.as_ref(),
                    &student.student_name,
                    &student.subjects,
                    student.overall_percentage,
                    &self.config,
                ),
            )
            .await?;

        self.stage(Stage::Assemble, async {
            let created_at = self.clock.now();
            let id = self.clock.analysis_id(created_at);
            let record = AnalysisRecord::assemble(id, student, narrative, source, created_at);
            record.validate()?;
            Ok::<_, GradeLensError>(record)
        })
        .await
    }

    /// Run one stage with timing, logging and progress events.
    async fn stage<T, F>(&self, stage: Stage, fut: F) -> Result<T, GradeLensError>
    where
        F: Future<Output = Result<T, GradeLensError>>,
    {
        let cb = self.config.progress_callback.as_ref();
        if let Some(cb) = cb {
            cb.on_stage_start(stage);
        }
        let start = Instant::now();
        let result = fut.await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => {
                info!("Stage {} done in {}ms", stage, elapsed_ms);
                if let Some(cb) = cb {
                    cb.on_stage_complete(stage, elapsed_ms);
                }
            }
            Err(e) => {
                warn!("Stage {} failed: {}", stage, e);
                if let Some(cb) = cb {
                    cb.on_stage_error(stage, &e.to_string());
                }
            }
        }
        result
    }

    /// [`Self::build_analysis`] folded into the boundary shape.
    pub async fn analyze_upload(&self, upload: &PdfUpload) -> AnalysisOutcome {
        self.build_analysis(upload).await.into()
    }

    /// Render a record in the given format.
    pub async fn render_report(
        &self,
        record: &AnalysisRecord,
        format: ReportFormat,
    ) -> Result<RenderedReport, GradeLensError> {
        record.validate()?;
        let renderer = renderer_for(format, &self.config);
        self.stage(Stage::Render, render_blocking_safe(renderer, record.clone()))
            .await
    }

    /// Render in the configured format, folded into the boundary shape.
    pub async fn download_report(&self, record: &AnalysisRecord) -> DownloadOutcome {
        match self.render_report(record, self.config.report_format).await {
            Ok(report) => DownloadOutcome::succeeded(&report),
            Err(e) => DownloadOutcome::failed(&e),
        }
    }
}

/// Analyse a local PDF or URL with production wiring.
pub async fn analyze_file(
    input: &str,
    config: AnalysisConfig,
) -> Result<AnalysisRecord, GradeLensError> {
    let upload = input::resolve_upload(input, &config).await?;
    let pipeline = ReportPipeline::from_config(config)?;
    pipeline.build_analysis(&upload).await
}

/// Write a rendered report to disk.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn write_report(report: &RenderedReport, path: &Path) -> Result<(), GradeLensError> {
    let write_err = |e: std::io::Error| GradeLensError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);
    tokio::fs::write(&tmp_path, &report.bytes)
        .await
        .map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    info!("Wrote {} ({} bytes)", path.display(), report.bytes.len());
    Ok(())
}
