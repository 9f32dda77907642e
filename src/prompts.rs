//! Prompts for the two language-model calls.
//!
//! Both prompts pin the reply to a JSON shape; the parsers in
//! [`crate::pipeline::student`] and [`crate::pipeline::narrative`] still
//! treat whatever comes back as untrusted text.

use crate::output::ExtractedSubject;
use std::fmt::Write;

/// System message for structured extraction.
pub const EXTRACTION_SYSTEM_PROMPT: &str = "You extract structured data from school report cards. \
Reply with a single JSON object and nothing else: no prose, no markdown fences.";

/// System message for the narrative analysis.
pub const ANALYSIS_SYSTEM_PROMPT: &str = "You are an experienced teacher writing concise, specific feedback \
on a student's report card. Reply with a single JSON object and nothing else.";

/// Build the structured-extraction prompt around the raw report-card text.
///
/// The text is embedded verbatim between delimiters.
pub fn extraction_prompt(raw_text: &str) -> String {
    format!(
        r#"Extract this student's data from the report card below.

REPORT CARD TEXT:
"""
{raw_text}
"""

Return JSON with exactly these keys:
{{
  "studentName": string,            // full name of the student
  "rollNumber": string,             // roll / admission / registration number, "" if absent
  "class": string,                  // class, grade or section, "" if absent
  "term": string,                   // term or examination name, "" if absent
  "attendance": string,             // attendance as written, "" if absent
  "behaviour": string,              // conduct / behaviour remark, "" if absent
  "subjects": [
    {{ "name": string, "marksObtained": number, "maxMarks": number, "remarks": string }}
  ],
  "overallPercentage": number       // omit if the report card does not state it
}}

Rules:
- Copy numbers exactly as printed; do not estimate or round.
- Include every examined subject, in the order it appears.
- If a subject shows no maximum, use 100."#
    )
}

/// Build the narrative-analysis prompt from the extracted marks.
pub fn analysis_prompt(
    student_name: &str,
    subjects: &[ExtractedSubject],
    overall_percentage: f64,
) -> String {
    let mut table = String::new();
    for s in subjects {
        let _ = write!(
            table,
            "- {}: {}/{} ({:.0}%)",
            s.name,
            s.marks_obtained,
            s.max_marks,
            s.percentage()
        );
        if !s.remarks.trim().is_empty() {
            let _ = write!(table, " remarks: {}", s.remarks.trim());
        }
        table.push('\n');
    }

    format!(
        r#"Analyze this student's performance.

Student: {student_name}
Overall Percentage: {overall_percentage}%
Subjects:
{table}
Provide:
1. Key strengths and merits (5 points)
2. Areas for improvement (5 points)
3. Specific, actionable recommendations (7 points)

Refer to subjects by name and to actual scores. Return JSON:
{{"strengths": [string], "improvements": [string], "recommendations": [string]}}"#
    )
}
