//! Locate the JSON object inside a model reply.
//!
//! Models are told to answer with bare JSON, but replies regularly arrive
//! wrapped in ` ```json ` fences, preceded by a sentence of prose, or with a
//! leading BOM. These rules recover the object without interpreting it:
//!
//! 1. Strip invisible characters (BOM, zero-width spaces)
//! 2. Strip an outer code fence
//! 3. Slice from the first `{` to the last `}`
//!
//! Schema checks happen later, in the stage that knows the expected shape.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n?(.*?)\r?\n?```\s*$").unwrap());

static RE_INVISIBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x{200B}\x{200C}\x{200D}\x{FEFF}\x{00AD}]").unwrap());

/// Why a reply held no usable JSON object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonReplyError {
    /// No `{ ... }` span in the reply.
    NoObject,
    /// A span was found but did not parse.
    Syntax(String),
}

impl std::fmt::Display for JsonReplyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoObject => write!(f, "reply contains no JSON object"),
            Self::Syntax(e) => write!(f, "reply is not valid JSON: {e}"),
        }
    }
}

/// Slice from the first `{` to the last `}`.
pub fn extract_json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

/// Parse the JSON object embedded in a model reply.
pub fn parse_json_object(reply: &str) -> Result<Map<String, Value>, JsonReplyError> {
    let cleaned = RE_INVISIBLE.replace_all(reply, "");
    let unfenced = strip_code_fences(&cleaned);
    let candidate = extract_json_object(&unfenced).ok_or(JsonReplyError::NoObject)?;
    serde_json::from_str::<Map<String, Value>>(candidate)
        .map_err(|e| JsonReplyError::Syntax(e.to_string()))
}

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}
