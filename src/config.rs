//! Configuration types for report-card analysis.
//!
//! All pipeline behaviour is controlled through [`AnalysisConfig`], built via
//! its [`AnalysisConfigBuilder`]. One struct holds every knob so a server can
//! share a single configuration across requests and log it on startup.

use crate::error::GradeLensError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Default model when a provider is named without one.
pub const DEFAULT_MODEL: &str = "sonar-pro";

/// Default cap on uploaded PDFs: 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Configuration for one analysis deployment.
///
/// Built via [`AnalysisConfig::builder()`] or using
/// [`AnalysisConfig::default()`].
///
/// # Example
/// ```rust
/// use gradelens::{AnalysisConfig, NarrativeMode};
///
/// let config = AnalysisConfig::builder()
///     .model("sonar-pro")
///     .narrative_mode(NarrativeMode::Resilient)
///     .api_timeout_secs(30)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// LLM model identifier, e.g. "sonar-pro", "gpt-4.1-mini".
    /// If None, uses [`DEFAULT_MODEL`] for named providers and the provider
    /// default for auto-detected ones.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected from the
    /// environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for both model calls. Default: 0.1.
    ///
    /// Extraction must copy numbers faithfully, so the default stays close
    /// to zero.
    pub temperature: f32,

    /// Maximum tokens for the structured-extraction reply. Default: 1000.
    pub extraction_max_tokens: usize,

    /// Maximum tokens for the narrative-analysis reply. Default: 1500.
    pub analysis_max_tokens: usize,

    /// Per-model-call timeout in seconds. Default: 60.
    ///
    /// A call that exceeds it fails with
    /// [`GradeLensError::ModelTimeout`] instead of hanging the request.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// What to do when the narrative analysis is unusable. Default: Strict.
    pub narrative_mode: NarrativeMode,

    /// Largest accepted upload in bytes. Default: 10 MiB.
    pub max_upload_bytes: usize,

    /// Format of the downloadable report. Default: PDF.
    pub report_format: ReportFormat,

    /// Explicit path to the pdfium shared library.
    ///
    /// Falls back to `PDFIUM_LIB_PATH`, then the working directory, then the
    /// system library search path.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Optional stage-event sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            extraction_max_tokens: 1000,
            analysis_max_tokens: 1500,
            api_timeout_secs: 60,
            download_timeout_secs: 120,
            narrative_mode: NarrativeMode::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            report_format: ReportFormat::default(),
            pdfium_lib_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("extraction_max_tokens", &self.extraction_max_tokens)
            .field("analysis_max_tokens", &self.analysis_max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("narrative_mode", &self.narrative_mode)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("report_format", &self.report_format)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn extraction_max_tokens(mut self, n: usize) -> Self {
        self.config.extraction_max_tokens = n;
        self
    }

    pub fn analysis_max_tokens(mut self, n: usize) -> Self {
        self.config.analysis_max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn narrative_mode(mut self, mode: NarrativeMode) -> Self {
        self.config.narrative_mode = mode;
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn report_format(mut self, format: ReportFormat) -> Self {
        self.config.report_format = format;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, GradeLensError> {
        let c = &self.config;
        if c.api_timeout_secs == 0 {
            return Err(GradeLensError::InvalidConfig(
                "API timeout must be at least 1 second".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(GradeLensError::InvalidConfig(
                "Upload size cap must be greater than zero".into(),
            ));
        }
        if c.extraction_max_tokens == 0 || c.analysis_max_tokens == 0 {
            return Err(GradeLensError::InvalidConfig(
                "Token limits must be greater than zero".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Policy for an unusable narrative analysis.
///
/// | Mode | On parse failure / empty list / model failure |
/// |------|-----------------------------------------------|
/// | `Strict` | fail with [`GradeLensError::IncompleteAnalysis`] (or the model error) |
/// | `Resilient` | substitute the deterministic, data-derived fallback and mark the record `narrativeSource: "fallback"` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NarrativeMode {
    /// Surface every narrative failure to the caller. (default)
    #[default]
    Strict,
    /// Replace failures with template-based analysis.
    Resilient,
}

impl FromStr for NarrativeMode {
    type Err = GradeLensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "resilient" => Ok(Self::Resilient),
            other => Err(GradeLensError::InvalidConfig(format!(
                "unknown narrative mode '{other}' (expected strict or resilient)"
            ))),
        }
    }
}

/// Output format of the downloadable report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// A4 PDF rendered through pdfium. (default)
    #[default]
    Pdf,
    /// UTF-8 plain text, no native dependencies.
    Text,
}

impl ReportFormat {
    /// MIME type of the rendered bytes.
    pub fn mime_type(self) -> &'static str {
        match self {
            ReportFormat::Pdf => "application/pdf",
            ReportFormat::Text => "text/plain; charset=utf-8",
        }
    }

    /// Suffix appended to the sanitised student name.
    pub fn file_suffix(self) -> &'static str {
        match self {
            ReportFormat::Pdf => "_Report.pdf",
            ReportFormat::Text => "_Report.txt",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = GradeLensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "text" | "txt" => Ok(Self::Text),
            other => Err(GradeLensError::InvalidConfig(format!(
                "unknown report format '{other}' (expected pdf or text)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = AnalysisConfig::default();
        assert_eq!(c.temperature, 0.1);
        assert_eq!(c.extraction_max_tokens, 1000);
        assert_eq!(c.api_timeout_secs, 60);
        assert_eq!(c.narrative_mode, NarrativeMode::Strict);
        assert_eq!(c.report_format, ReportFormat::Pdf);
        assert_eq!(c.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = AnalysisConfig::builder().temperature(5.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        let err = AnalysisConfig::builder()
            .api_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, GradeLensError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_zero_upload_cap() {
        assert!(AnalysisConfig::builder().max_upload_bytes(0).build().is_err());
    }

    #[test]
    fn parse_modes_and_formats() {
        assert_eq!("Resilient".parse::<NarrativeMode>().unwrap(), NarrativeMode::Resilient);
        assert_eq!(" strict ".parse::<NarrativeMode>().unwrap(), NarrativeMode::Strict);
        assert!("lenient".parse::<NarrativeMode>().is_err());
        assert_eq!("txt".parse::<ReportFormat>().unwrap(), ReportFormat::Text);
        assert_eq!("PDF".parse::<ReportFormat>().unwrap(), ReportFormat::Pdf);
    }

    #[test]
    fn debug_hides_provider() {
        let dbg = format!("{:?}", AnalysisConfig::default());
        assert!(dbg.contains("AnalysisConfig"));
        assert!(dbg.contains("provider: None"));
    }

    #[test]
    fn debug_lists_timeouts_and_callback() {
        let config = AnalysisConfig::builder()
            .download_timeout_secs(45)
            .progress_callback(Arc::new(crate::progress::NoopProgressCallback))
            .build()
            .unwrap();
        let dbg = format!("{:?}", config);
        assert!(dbg.contains("download_timeout_secs: 45"));
        assert!(dbg.contains("progress_callback: Some(\"<dyn PipelineProgressCallback>\")"));
    }
}
