//! Structured extraction: raw report-card text → [`StudentRecord`].
//!
//! The model reply is parsed into a loose `serde_json` map first and then
//! checked field by field, so nothing unchecked reaches the record. The hard
//! checks are a non-empty student name and a non-empty subject list whose
//! entries each have a name, numeric marks and a positive maximum. Anything
//! else wrong with the reply is tolerated: missing identity fields become
//! empty strings, and out-of-range marks pass through uncorrected.

use super::json::parse_json_object;
use super::llm::{CompletionModel, CompletionRequest};
use crate::config::AnalysisConfig;
use crate::error::GradeLensError;
use crate::output::{ExtractedSubject, StudentRecord, NOT_SPECIFIED};
use crate::progress::Stage;
use crate::prompts::{extraction_prompt, EXTRACTION_SYSTEM_PROMPT};
use serde_json::{Map, Value};
use tracing::debug;

/// Ask the model for the student's data and validate the reply.
pub async fn extract_student_data(
    model: &dyn CompletionModel,
    raw_text: &str,
    config: &AnalysisConfig,
) -> Result<StudentRecord, GradeLensError> {
    let request = CompletionRequest {
        stage: Stage::ExtractStudent,
        system: EXTRACTION_SYSTEM_PROMPT.to_string(),
        prompt: extraction_prompt(raw_text),
        max_tokens: config.extraction_max_tokens,
        temperature: config.temperature,
    };
    debug!("Extraction prompt: {} chars", request.prompt.len());

    let reply = model.complete(&request).await?;
    debug!("Extraction reply: {} chars", reply.len());

    parse_student_reply(&reply)
}

/// Validate a raw extraction reply into a [`StudentRecord`].
pub fn parse_student_reply(reply: &str) -> Result<StudentRecord, GradeLensError> {
    let map = parse_json_object(reply).map_err(|e| malformed(e.to_string()))?;

    let student_name = text_field(&map, &["studentName", "name"]);
    if student_name.is_empty() {
        return Err(malformed("no student name"));
    }

    let subjects = match map.get("subjects") {
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .enumerate()
            .map(|(i, item)| parse_subject(i, item))
            .collect::<Result<Vec<_>, _>>()?,
        Some(Value::Array(_)) => return Err(malformed("subject list is empty")),
        _ => return Err(malformed("no subject list")),
    };

    let overall_percentage = match map.get("overallPercentage").and_then(number) {
        Some(p) if p != 0.0 => p,
        _ => {
            let mean = mean_percentage(&subjects);
            debug!("Overall percentage missing; using subject mean {}", mean);
            mean
        }
    };

    Ok(StudentRecord {
        student_name,
        roll_number: text_field(&map, &["rollNumber"]),
        class: text_field(&map, &["class"]),
        term: text_field(&map, &["term"]),
        attendance: or_not_specified(text_field(&map, &["attendance"])),
        behaviour: or_not_specified(text_field(&map, &["behaviour", "behavior"])),
        overall_percentage,
        subjects,
    })
}

/// Unweighted mean of subject percentages, rounded to the nearest integer.
pub fn mean_percentage(subjects: &[ExtractedSubject]) -> f64 {
    if subjects.is_empty() {
        return 0.0;
    }
    let total: f64 = subjects.iter().map(ExtractedSubject::percentage).sum();
    (total / subjects.len() as f64).round()
}

fn parse_subject(index: usize, item: &Value) -> Result<ExtractedSubject, GradeLensError> {
    let obj = item
        .as_object()
        .ok_or_else(|| malformed(format!("subject {} is not an object", index + 1)))?;

    let name = text_field(obj, &["name", "subject"]);
    if name.is_empty() {
        return Err(malformed(format!("subject {} has no name", index + 1)));
    }

    let marks_obtained = ["marksObtained", "marks"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(number))
        .ok_or_else(|| malformed(format!("subject '{name}' has no numeric marks")))?;

    let max_marks = obj
        .get("maxMarks")
        .and_then(number)
        .filter(|m| *m > 0.0)
        .ok_or_else(|| malformed(format!("subject '{name}' has no positive maximum marks")))?;

    Ok(ExtractedSubject {
        name,
        marks_obtained,
        max_marks,
        remarks: text_field(obj, &["remarks"]),
    })
}

/// A finite number, or a string holding one (a trailing `%` is allowed).
fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// First key holding a non-blank string or a number, trimmed; empty when
/// none does.
fn text_field(map: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| match map.get(*k) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_default()
}

fn or_not_specified(value: String) -> String {
    if value.is_empty() {
        NOT_SPECIFIED.to_string()
    } else {
        value
    }
}

fn malformed(detail: impl Into<String>) -> GradeLensError {
    GradeLensError::MalformedAiResponse {
        detail: detail.into(),
    }
}
