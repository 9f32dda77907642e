//! Integration tests for the analysis pipeline.
//!
//! pdfium and the language model are replaced by a canned text extractor
//! and a [`ScriptedModel`], so these run offline and need no native library.

use chrono::{TimeZone, Utc};
use gradelens::{
    AnalysisConfig, ErrorKind, FixedClock, GradeLensError, NarrativeMode, NarrativeSource,
    PdfUpload, PipelineProgressCallback, ReportFormat, ReportPipeline, ScriptedModel, Stage,
    TextExtractor,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

const REPORT_TEXT: &str = "Springfield High School\nStudent: Emma Johnson  Roll: ST2024002\n\
Class: Grade 9  Term: Final Term 2024\nMathematics 85/100\nScience 92/100\nEnglish 78/100";

const STUDENT_REPLY: &str = r#"```json
{
  "studentName": "Emma Johnson",
  "rollNumber": "ST2024002",
  "class": "Grade 9",
  "term": "Final Term 2024",
  "attendance": "96%",
  "behaviour": "Excellent",
  "subjects": [
    {"name": "Mathematics", "marksObtained": 85, "maxMarks": 100, "remarks": "Consistent"},
    {"name": "Science", "marksObtained": 92, "maxMarks": 100, "remarks": ""},
    {"name": "English", "marksObtained": 78, "maxMarks": 100, "remarks": "Needs practice"}
  ],
  "overallPercentage": 85
}
```"#;

const NARRATIVE_REPLY: &str = r#"Here is the analysis:
{"strengths": ["Outstanding in Science", "Solid mathematics"],
 "improvements": ["Essay structure in English"],
 "recommendations": ["Read one book a month", "Practise timed essays", "Keep up lab work"]}"#;

/// Returns the same text for any bytes and counts its calls.
struct CannedText {
    text: String,
    calls: AtomicUsize,
}

impl CannedText {
    fn new(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

impl TextExtractor for CannedText {
    fn extract_text(&self, _pdf_bytes: &[u8]) -> Result<String, GradeLensError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 6, 10, 9, 30, 0).unwrap(),
        "analysis_test_1",
    ))
}

fn upload() -> PdfUpload {
    PdfUpload::new(
        "report_card.pdf",
        "application/pdf",
        b"%PDF-1.4 fake report card".to_vec(),
    )
}

fn pipeline(
    config: AnalysisConfig,
    text: Arc<CannedText>,
    model: Arc<ScriptedModel>,
) -> ReportPipeline {
    ReportPipeline::new(config, text, model, clock())
}

fn text_config() -> AnalysisConfig {
    AnalysisConfig::builder()
        .report_format(ReportFormat::Text)
        .build()
        .unwrap()
}

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_analysis_grades_every_subject() {
    let model = Arc::new(ScriptedModel::new().reply(STUDENT_REPLY).reply(NARRATIVE_REPLY));
    let p = pipeline(text_config(), CannedText::new(REPORT_TEXT), Arc::clone(&model));

    let record = p.build_analysis(&upload()).await.unwrap();

    assert_eq!(record.id, "analysis_test_1");
    assert_eq!(record.student_name, "Emma Johnson");
    assert_eq!(record.roll_number, "ST2024002");
    assert_eq!(record.overall_percentage, 85.0);
    assert_eq!(record.overall_grade, "A");

    let grades: Vec<(&str, &str)> = record
        .subjects
        .iter()
        .map(|s| (s.name.as_str(), s.grade.as_str()))
        .collect();
    assert_eq!(
        grades,
        vec![("Mathematics", "A"), ("Science", "A"), ("English", "B+")]
    );

    let series: Vec<i64> = record.performance_data.iter().map(|p| p.percentage).collect();
    assert_eq!(series, vec![85, 92, 78]);

    // Model list lengths are kept as written.
    assert_eq!(record.strengths.len(), 2);
    assert_eq!(record.improvements.len(), 1);
    assert_eq!(record.recommendations.len(), 3);
    assert_eq!(record.narrative_source, NarrativeSource::Model);
    assert_eq!(record.created_at, record.updated_at);
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn narrative_request_sees_extracted_marks() {
    let model = Arc::new(ScriptedModel::new().reply(STUDENT_REPLY).reply(NARRATIVE_REPLY));
    let p = pipeline(text_config(), CannedText::new(REPORT_TEXT), Arc::clone(&model));
    p.build_analysis(&upload()).await.unwrap();

    let requests = model.requests();
    assert_eq!(requests[0].stage, Stage::ExtractStudent);
    assert!(requests[0].prompt.contains("Mathematics 85/100"));
    assert_eq!(requests[1].stage, Stage::AnalyzeNarrative);
    assert!(requests[1].prompt.contains("Emma Johnson"));
    assert!(requests[1].prompt.contains("Science"));
}

#[tokio::test]
async fn outcome_wraps_record() {
    let model = Arc::new(ScriptedModel::new().reply(STUDENT_REPLY).reply(NARRATIVE_REPLY));
    let p = pipeline(text_config(), CannedText::new(REPORT_TEXT), model);

    let outcome = p.analyze_upload(&upload()).await;
    assert!(outcome.success);
    assert_eq!(outcome.report_id.as_deref(), Some("analysis_test_1"));
    assert!(outcome.error.is_none());

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["data"]["studentName"], "Emma Johnson");
    assert_eq!(json["data"]["overallGrade"], "A");
    assert_eq!(json["data"]["narrativeSource"], "model");
    assert!(json.get("error").is_none());
}

// ── Fail-fast ordering ───────────────────────────────────────────────────────

#[tokio::test]
async fn empty_text_fails_before_any_model_call() {
    let model = Arc::new(ScriptedModel::new().reply(STUDENT_REPLY));
    let p = pipeline(text_config(), CannedText::new("  \n\t "), Arc::clone(&model));

    let err = p.build_analysis(&upload()).await.unwrap_err();
    assert!(matches!(err, GradeLensError::EmptyDocument));
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn malformed_extraction_skips_narrative() {
    let model = Arc::new(ScriptedModel::new().reply("not json").reply(NARRATIVE_REPLY));
    let p = pipeline(text_config(), CannedText::new(REPORT_TEXT), Arc::clone(&model));

    let outcome = p.analyze_upload(&upload()).await;
    assert!(!outcome.success);
    assert!(outcome.data.is_none());
    assert_eq!(outcome.error_kind, Some(ErrorKind::MalformedAiResponse));
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn invalid_mime_rejected_before_extraction() {
    let text = CannedText::new(REPORT_TEXT);
    let model = Arc::new(ScriptedModel::new());
    let p = pipeline(text_config(), Arc::clone(&text), Arc::clone(&model));

    let bad = PdfUpload::new("photo.png", "image/png", b"%PDF-1.4".to_vec());
    let err = p.build_analysis(&bad).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(text.calls.load(Ordering::SeqCst), 0);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn oversize_upload_rejected() {
    let config = AnalysisConfig::builder()
        .max_upload_bytes(16)
        .build()
        .unwrap();
    let model = Arc::new(ScriptedModel::new());
    let p = pipeline(config, CannedText::new(REPORT_TEXT), model);

    let big = PdfUpload::new("big.pdf", "application/pdf", {
        let mut b = b"%PDF-1.4".to_vec();
        b.resize(64, b' ');
        b
    });
    let err = p.build_analysis(&big).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

// ── Narrative modes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn strict_mode_fails_on_incomplete_narrative() {
    let model = Arc::new(
        ScriptedModel::new()
            .reply(STUDENT_REPLY)
            .reply(r#"{"strengths": ["ok"], "improvements": [], "recommendations": ["x"]}"#),
    );
    let p = pipeline(text_config(), CannedText::new(REPORT_TEXT), model);

    let err = p.build_analysis(&upload()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IncompleteAnalysis);
}

#[tokio::test]
async fn resilient_mode_flags_fallback_feedback() {
    let config = AnalysisConfig::builder()
        .narrative_mode(NarrativeMode::Resilient)
        .report_format(ReportFormat::Text)
        .build()
        .unwrap();
    let model = Arc::new(
        ScriptedModel::new()
            .reply(STUDENT_REPLY)
            .fail(GradeLensError::ModelTimeout {
                stage: Stage::AnalyzeNarrative,
                secs: 60,
            }),
    );
    let p = pipeline(config, CannedText::new(REPORT_TEXT), model);

    let record = p.build_analysis(&upload()).await.unwrap();
    assert_eq!(record.narrative_source, NarrativeSource::Fallback);
    assert_eq!(record.strengths.len(), 5);
    assert_eq!(record.improvements.len(), 5);
    assert_eq!(record.recommendations.len(), 7);
    assert!(record.strengths.iter().any(|s| s.contains("Science")));
    assert!(record.improvements.iter().any(|s| s.contains("English")));

    let report = p.download_report(&record).await;
    let text = String::from_utf8(
        base64_decode(report.file_content.as_deref().unwrap()),
    )
    .unwrap();
    assert!(text.contains("Note:"));
}

#[tokio::test]
async fn resilient_mode_still_fails_on_bad_extraction() {
    let config = AnalysisConfig::builder()
        .narrative_mode(NarrativeMode::Resilient)
        .build()
        .unwrap();
    let model = Arc::new(ScriptedModel::new().reply(r#"{"studentName": "A", "subjects": []}"#));
    let p = pipeline(config, CannedText::new(REPORT_TEXT), model);

    let err = p.build_analysis(&upload()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedAiResponse);
}

// ── Reports ──────────────────────────────────────────────────────────────────

fn base64_decode(s: &str) -> Vec<u8> {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    STANDARD.decode(s).unwrap()
}

#[tokio::test]
async fn text_report_download_is_idempotent() {
    let model = Arc::new(ScriptedModel::new().reply(STUDENT_REPLY).reply(NARRATIVE_REPLY));
    let p = pipeline(text_config(), CannedText::new(REPORT_TEXT), model);
    let record = p.build_analysis(&upload()).await.unwrap();

    let first = p.download_report(&record).await;
    let second = p.download_report(&record).await;
    assert!(first.success);
    assert_eq!(first, second);
    assert_eq!(first.file_name.as_deref(), Some("Emma_Johnson_Report.txt"));

    let text = String::from_utf8(base64_decode(first.file_content.as_deref().unwrap())).unwrap();
    assert!(text.contains("Science: 92/100 (92%) - Grade A"));
    assert!(text.contains("1. Outstanding in Science"));
    assert!(text.contains("Report ID analysis_test_1"));
    assert!(!text.contains("Note:"));
}

#[tokio::test]
async fn download_of_invalid_record_fails_softly() {
    let model = Arc::new(ScriptedModel::new().reply(STUDENT_REPLY).reply(NARRATIVE_REPLY));
    let p = pipeline(text_config(), CannedText::new(REPORT_TEXT), model);
    let mut record = p.build_analysis(&upload()).await.unwrap();
    record.subjects.clear();

    let outcome = p.download_report(&record).await;
    assert!(!outcome.success);
    assert!(outcome.file_content.is_none());
    assert!(outcome.error.is_some());
}

// ── Progress events ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

impl Recorder {
    fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }
}

impl PipelineProgressCallback for Recorder {
    fn on_pipeline_start(&self) {
        self.push("start".into());
    }
    fn on_stage_start(&self, stage: Stage) {
        self.push(format!("begin {stage}"));
    }
    fn on_stage_complete(&self, stage: Stage, _elapsed_ms: u64) {
        self.push(format!("done {stage}"));
    }
    fn on_stage_error(&self, stage: Stage, _error: &str) {
        self.push(format!("error {stage}"));
    }
    fn on_pipeline_complete(&self, success: bool) {
        self.push(format!("complete {success}"));
    }
}

#[tokio::test]
async fn progress_events_follow_stage_order() {
    let recorder = Arc::new(Recorder::default());
    let config = AnalysisConfig::builder()
        .progress_callback(Arc::clone(&recorder) as Arc<dyn PipelineProgressCallback>)
        .build()
        .unwrap();
    let model = Arc::new(ScriptedModel::new().reply(STUDENT_REPLY).reply(NARRATIVE_REPLY));
    let p = pipeline(config, CannedText::new(REPORT_TEXT), model);
    p.build_analysis(&upload()).await.unwrap();

    let events = recorder.0.lock().unwrap().clone();
    let expected: Vec<String> = std::iter::once("start".to_string())
        .chain(
            [
                Stage::ReadText,
                Stage::ExtractStudent,
                Stage::AnalyzeNarrative,
                Stage::Assemble,
            ]
            .iter()
            .flat_map(|s| [format!("begin {s}"), format!("done {s}")]),
        )
        .chain(std::iter::once("complete true".to_string()))
        .collect();
    assert_eq!(events, expected);
}

#[tokio::test]
async fn progress_reports_failing_stage() {
    let recorder = Arc::new(Recorder::default());
    let config = AnalysisConfig::builder()
        .progress_callback(Arc::clone(&recorder) as Arc<dyn PipelineProgressCallback>)
        .build()
        .unwrap();
    let model = Arc::new(ScriptedModel::new().reply("not json"));
    let p = pipeline(config, CannedText::new(REPORT_TEXT), model);
    p.build_analysis(&upload()).await.unwrap_err();

    let events = recorder.0.lock().unwrap().clone();
    assert_eq!(
        events.last().map(String::as_str),
        Some("complete false")
    );
    assert!(events.contains(&format!("error {}", Stage::ExtractStudent)));
    assert!(!events.contains(&format!("begin {}", Stage::AnalyzeNarrative)));
}
