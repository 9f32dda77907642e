//! Records produced by the pipeline and the boundary shapes that carry them.
//!
//! Everything serialises as camelCase JSON so the records can cross an HTTP
//! boundary unchanged.

use crate::error::{ErrorKind, GradeLensError};
use crate::grade::{grade_for, percentage_of};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Value used when the report card does not mention attendance/behaviour.
pub const NOT_SPECIFIED: &str = "Not specified";

/// One subject as read off the report card, before grading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedSubject {
    pub name: String,
    pub marks_obtained: f64,
    /// Always > 0.
    pub max_marks: f64,
    #[serde(default)]
    pub remarks: String,
}

impl ExtractedSubject {
    pub fn percentage(&self) -> f64 {
        percentage_of(self.marks_obtained, self.max_marks)
    }
}

/// The identity and marks block extracted from the report card text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub student_name: String,
    pub roll_number: String,
    pub class: String,
    pub term: String,
    pub attendance: String,
    pub behaviour: String,
    pub overall_percentage: f64,
    /// Extraction order, never empty.
    pub subjects: Vec<ExtractedSubject>,
}

/// A graded subject.
///
/// `grade` is derived from the marks; use [`SubjectRecord::set_marks`] so
/// the two can never drift apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRecord {
    pub name: String,
    pub marks_obtained: f64,
    pub max_marks: f64,
    #[serde(default)]
    pub remarks: String,
    #[serde(default)]
    pub grade: String,
}

impl SubjectRecord {
    pub fn from_extracted(subject: &ExtractedSubject) -> Self {
        Self {
            name: subject.name.clone(),
            marks_obtained: subject.marks_obtained,
            max_marks: subject.max_marks,
            remarks: subject.remarks.clone(),
            grade: grade_for(subject.percentage()).to_string(),
        }
    }

    pub fn percentage(&self) -> f64 {
        percentage_of(self.marks_obtained, self.max_marks)
    }

    /// Replace the marks and recompute the grade.
    pub fn set_marks(&mut self, marks_obtained: f64, max_marks: f64) {
        self.marks_obtained = marks_obtained;
        self.max_marks = max_marks;
        self.grade = grade_for(self.percentage()).to_string();
    }
}

/// One bar of the per-subject performance chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformancePoint {
    pub subject: String,
    /// Rounded to the nearest whole percent.
    pub percentage: i64,
}

/// Strengths, improvements and recommendations for one student.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeAnalysis {
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Where the narrative lists of a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NarrativeSource {
    /// Written by the language model.
    #[default]
    Model,
    /// Deterministic templates substituted in resilient mode.
    Fallback,
}

/// The complete result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub id: String,
    pub student_name: String,
    pub roll_number: String,
    pub class: String,
    pub term: String,
    #[serde(default = "not_specified")]
    pub attendance: String,
    #[serde(default = "not_specified")]
    pub behaviour: String,
    pub overall_percentage: f64,
    #[serde(default)]
    pub overall_grade: String,
    pub subjects: Vec<SubjectRecord>,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub performance_data: Vec<PerformancePoint>,
    #[serde(default)]
    pub narrative_source: NarrativeSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Display a mark or percentage: whole numbers without a decimal point,
/// everything else with at most two decimals and no trailing zeros.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let s = format!("{:.2}", value);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn not_specified() -> String {
    NOT_SPECIFIED.to_string()
}

impl AnalysisRecord {
    /// Combine an extracted student with its narrative into a graded record.
    pub fn assemble(
        id: String,
        student: StudentRecord,
        narrative: NarrativeAnalysis,
        narrative_source: NarrativeSource,
        created_at: DateTime<Utc>,
    ) -> Self {
        let subjects: Vec<SubjectRecord> =
            student.subjects.iter().map(SubjectRecord::from_extracted).collect();
        let performance_data = performance_series(&subjects);
        Self {
            id,
            student_name: student.student_name,
            roll_number: student.roll_number,
            class: student.class,
            term: student.term,
            attendance: student.attendance,
            behaviour: student.behaviour,
            overall_grade: grade_for(student.overall_percentage).to_string(),
            overall_percentage: student.overall_percentage,
            subjects,
            strengths: narrative.strengths,
            improvements: narrative.improvements,
            recommendations: narrative.recommendations,
            performance_data,
            narrative_source,
            created_at,
            updated_at: created_at,
        }
    }

    /// Recompute every derived field from the marks.
    ///
    /// Records that arrive from outside (e.g. a re-render request) may carry
    /// stale or missing grades.
    pub fn regrade(&mut self) {
        for subject in &mut self.subjects {
            subject.grade = grade_for(subject.percentage()).to_string();
        }
        self.overall_grade = grade_for(self.overall_percentage).to_string();
        self.performance_data = performance_series(&self.subjects);
    }

    /// Check the structural invariants a renderable record must satisfy.
    pub fn validate(&self) -> Result<(), GradeLensError> {
        let invalid = |reason: String| Err(GradeLensError::InvalidInput { reason });
        if self.student_name.trim().is_empty() {
            return invalid("analysis has no student name".into());
        }
        if self.subjects.is_empty() {
            return invalid("analysis has no subjects".into());
        }
        if let Some(s) = self
            .subjects
            .iter()
            .find(|s| !(s.max_marks.is_finite() && s.max_marks > 0.0))
        {
            return invalid(format!("subject '{}' has no positive maximum marks", s.name));
        }
        Ok(())
    }
}

fn performance_series(subjects: &[SubjectRecord]) -> Vec<PerformancePoint> {
    subjects
        .iter()
        .map(|s| PerformancePoint {
            subject: s.name.clone(),
            percentage: s.percentage().round() as i64,
        })
        .collect()
}

/// A rendered, downloadable report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Result of an analysis request as seen by the presentation layer.
///
/// Either `data` is a complete record or `error` holds a short message;
/// never both, never a partial record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<AnalysisRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default)]
    pub retryable: bool,
}

impl AnalysisOutcome {
    pub fn succeeded(record: AnalysisRecord) -> Self {
        Self {
            success: true,
            report_id: Some(record.id.clone()),
            data: Some(record),
            error: None,
            error_kind: None,
            retryable: false,
        }
    }

    pub fn failed(err: &GradeLensError) -> Self {
        Self {
            success: false,
            report_id: None,
            data: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            retryable: err.is_retryable(),
        }
    }
}

impl From<Result<AnalysisRecord, GradeLensError>> for AnalysisOutcome {
    fn from(result: Result<AnalysisRecord, GradeLensError>) -> Self {
        match result {
            Ok(record) => Self::succeeded(record),
            Err(e) => Self::failed(&e),
        }
    }
}

/// Result of a download request: base64 file content plus its name and type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadOutcome {
    pub fn succeeded(report: &RenderedReport) -> Self {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        Self {
            success: true,
            file_name: Some(report.file_name.clone()),
            file_content: Some(STANDARD.encode(&report.bytes)),
            mime_type: Some(report.mime_type.clone()),
            error: None,
        }
    }

    pub fn failed(err: &GradeLensError) -> Self {
        Self {
            success: false,
            file_name: None,
            file_content: None,
            mime_type: None,
            error: Some(err.to_string()),
        }
    }
}
