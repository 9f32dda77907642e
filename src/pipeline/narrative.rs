//! Narrative analysis: strengths, improvements and recommendations.
//!
//! ## Modes
//!
//! | mode | bad or failed model reply |
//! |------|---------------------------|
//! | [`NarrativeMode::Strict`] | error ([`GradeLensError::IncompleteAnalysis`], or the model error itself) |
//! | [`NarrativeMode::Resilient`] | [`fallback_analysis`], marked [`NarrativeSource::Fallback`] |
//!
//! A deployment picks one mode in [`AnalysisConfig`]. Fallback content is
//! always announced: a `warn!` event, a progress callback, and the
//! `narrativeSource` field of the record.

use super::json::parse_json_object;
use super::llm::{CompletionModel, CompletionRequest};
use crate::config::{AnalysisConfig, NarrativeMode};
use crate::error::GradeLensError;
use crate::output::{format_number, ExtractedSubject, NarrativeAnalysis, NarrativeSource};
use crate::progress::Stage;
use crate::prompts::{analysis_prompt, ANALYSIS_SYSTEM_PROMPT};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Ask the model for a narrative, applying the configured failure mode.
pub async fn analyze_narrative(
    model: &dyn CompletionModel,
    student_name: &str,
    subjects: &[ExtractedSubject],
    overall_percentage: f64,
    config: &AnalysisConfig,
) -> Result<(NarrativeAnalysis, NarrativeSource), GradeLensError> {
    let request = CompletionRequest {
        stage: Stage::AnalyzeNarrative,
        system: ANALYSIS_SYSTEM_PROMPT.to_string(),
        prompt: analysis_prompt(student_name, subjects, overall_percentage),
        max_tokens: config.analysis_max_tokens,
        temperature: config.temperature,
    };
    debug!("Analysis prompt: {} chars", request.prompt.len());

    let result = match model.complete(&request).await {
        Ok(reply) => {
            debug!("Analysis reply: {} chars", reply.len());
            parse_narrative_reply(&reply)
        }
        Err(e) => Err(e),
    };

    match (result, config.narrative_mode) {
        (Ok(narrative), _) => Ok((narrative, NarrativeSource::Model)),
        (Err(e), NarrativeMode::Strict) => Err(e),
        (Err(e), NarrativeMode::Resilient) => {
            let reason = e.to_string();
            warn!("Narrative analysis failed, using fallback content: {}", reason);
            if let Some(ref cb) = config.progress_callback {
                cb.on_fallback_used(&reason);
            }
            Ok((
                fallback_analysis(subjects, overall_percentage),
                NarrativeSource::Fallback,
            ))
        }
    }
}

/// Validate a raw analysis reply.
///
/// All three lists must be present and keep at least one non-blank string
/// after non-strings and blanks are dropped. Any count above zero is fine.
pub fn parse_narrative_reply(reply: &str) -> Result<NarrativeAnalysis, GradeLensError> {
    let map = parse_json_object(reply).map_err(|e| incomplete(e.to_string()))?;
    Ok(NarrativeAnalysis {
        strengths: string_list(&map, "strengths")?,
        improvements: string_list(&map, "improvements")?,
        recommendations: string_list(&map, "recommendations")?,
    })
}

fn string_list(map: &Map<String, Value>, key: &str) -> Result<Vec<String>, GradeLensError> {
    let items: Vec<String> = match map.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };
    if items.is_empty() {
        return Err(incomplete(format!("no {key} in the reply")));
    }
    Ok(items)
}

fn incomplete(detail: impl Into<String>) -> GradeLensError {
    GradeLensError::IncompleteAnalysis {
        detail: detail.into(),
    }
}

/// Qualitative label for an overall percentage.
pub fn performance_level(overall_percentage: f64) -> &'static str {
    if overall_percentage >= 85.0 {
        "excellent"
    } else if overall_percentage >= 75.0 {
        "good"
    } else if overall_percentage >= 65.0 {
        "satisfactory"
    } else {
        "needs improvement"
    }
}

/// Highest marks/max ratio; the first subject wins ties.
pub fn best_subject(subjects: &[ExtractedSubject]) -> Option<&ExtractedSubject> {
    subjects.iter().fold(None, |best, s| match best {
        Some(b) if ratio(s) <= ratio(b) => Some(b),
        _ => Some(s),
    })
}

/// Lowest marks/max ratio; the first subject wins ties.
pub fn worst_subject(subjects: &[ExtractedSubject]) -> Option<&ExtractedSubject> {
    subjects.iter().fold(None, |worst, s| match worst {
        Some(w) if ratio(s) >= ratio(w) => Some(w),
        _ => Some(s),
    })
}

fn ratio(s: &ExtractedSubject) -> f64 {
    s.marks_obtained / s.max_marks
}

/// Deterministic narrative built from the marks alone.
///
/// Always exactly 5 strengths, 5 improvements and 7 recommendations.
pub fn fallback_analysis(subjects: &[ExtractedSubject], overall_percentage: f64) -> NarrativeAnalysis {
    let (best, worst) = match (best_subject(subjects), worst_subject(subjects)) {
        (Some(b), Some(w)) => (b, w),
        _ => return generic_analysis(),
    };
    let average = subjects.iter().map(ExtractedSubject::percentage).sum::<f64>() / subjects.len() as f64;
    let level = performance_level(overall_percentage);
    let overall = format_number(overall_percentage);
    let best_pct = best.percentage().round();
    let worst_pct = worst.percentage().round();

    NarrativeAnalysis {
        strengths: vec![
            format!(
                "Strongest result in {} at {}%, showing real aptitude for the subject",
                best.name, best_pct
            ),
            format!(
                "Overall {level} performance of {overall}% reflects steady effort and understanding"
            ),
            "Results across subjects point to well-rounded academic development".to_string(),
            "Consistent scoring suggests a solid grasp of fundamental concepts".to_string(),
            "Shows sound exam preparation and time management during assessments".to_string(),
        ],
        improvements: vec![
            format!(
                "{} needs focused attention: the current {}% leaves room to improve",
                worst.name, worst_pct
            ),
            "Strengthen the weaker subjects to even out overall performance".to_string(),
            format!(
                "Build better study strategies for subjects below the {}% subject average",
                average.round()
            ),
            "Concentrate on understanding concepts rather than memorising answers".to_string(),
            "Aim for more consistent results across all subjects".to_string(),
        ],
        recommendations: vec![
            format!(
                "Give {} about 30% more study time, centred on practice problems and clearing up concepts",
                worst.name
            ),
            format!(
                "Use the confidence built in {} and carry the same study habits into other subjects",
                best.name
            ),
            "Keep a weekly revision timetable that covers every subject and weights the weaker ones".to_string(),
            "Ask teachers or a tutor for extra help in any subject scoring below 75%".to_string(),
            "Study actively: summarise, explain topics to others and draw concept maps".to_string(),
            "Sit timed mock tests to practise working under exam conditions".to_string(),
            "Set a specific, measurable target for each subject and review progress every week".to_string(),
        ],
    }
}

fn generic_analysis() -> NarrativeAnalysis {
    let list = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
    NarrativeAnalysis {
        strengths: list(&[
            "Shows consistent academic effort across subjects",
            "Demonstrates a good understanding of core concepts",
            "Keeps regular study habits and prepares for exams",
            "Applies problem-solving skills in academic work",
            "Brings a positive attitude and engagement to learning",
        ]),
        improvements: list(&[
            "Strengthen performance in the more challenging subjects",
            "Develop more effective time management for study",
            "Practise more application and analysis questions",
            "Build a firmer foundation in fundamental concepts",
            "Aim for more consistent results across all subjects",
        ]),
        recommendations: list(&[
            "Follow a structured daily study schedule with fixed time blocks",
            "Work through past exam papers and sample questions regularly",
            "Join a study group with classmates for collaborative learning",
            "Use online educational resources and interactive learning tools",
            "Set weekly academic goals and check progress against them",
            "Ask teachers for clarification as soon as a concept is unclear",
            "Focus on understanding principles rather than memorising facts",
        ]),
    }
}
