//! Response parsing for loosely structured backend output.
//!
//! Generative backends give no structural guarantee, so parsing maximises
//! salvage. Attempts, in order:
//! 1. the whole text is a JSON array
//! 2. the array sits inside a fenced code block
//! 3. the array is embedded in prose (first `[` to last `]`), repaired if needed
//! 4. individual brace-delimited objects are extracted piecemeal

use crate::error::ParseError;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

/// Keys accepted as the summary field of a structured entry.
const SUMMARY_KEYS: &[&str] = &["summary", "text", "content"];
/// Keys accepted as the id field of a structured entry.
const ID_KEYS: &[&str] = &["id", "comment_id", "item_id"];

/// One element of the parsed response array.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEntry {
    /// An object with an id-like and/or summary-like field.
    Record {
        id: Option<String>,
        summary: Option<String>,
    },
    /// A bare string element.
    Text(String),
    /// Any other JSON value (number, nested array, ...).
    Other(Value),
}

impl RawEntry {
    fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) => RawEntry::Text(text),
            Value::Object(map) => {
                let id = ID_KEYS
                    .iter()
                    .find_map(|key| map.get(*key))
                    .map(value_to_text);
                let summary = SUMMARY_KEYS
                    .iter()
                    .find_map(|key| map.get(*key))
                    .map(value_to_text);
                RawEntry::Record { id, summary }
            }
            other => RawEntry::Other(other),
        }
    }

    /// The summary candidate carried by this entry, untrimmed.
    pub fn summary_text(&self) -> String {
        match self {
            RawEntry::Record { summary, .. } => summary.clone().unwrap_or_default(),
            RawEntry::Text(text) => text.clone(),
            RawEntry::Other(value) => value_to_text(value),
        }
    }

    /// The id the model echoed back, if any. Informational only.
    pub fn echoed_id(&self) -> Option<&str> {
        match self {
            RawEntry::Record { id, .. } => id.as_deref(),
            _ => None,
        }
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([}\]])").expect("valid trailing comma pattern"))
}

fn flat_object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[^{}]*\}").expect("valid object pattern"))
}

/// Parse raw backend text into ordered entries.
pub fn parse_entries(raw: &str) -> Result<Vec<RawEntry>, ParseError> {
    let values = parse_array(raw)?;
    Ok(values.into_iter().map(RawEntry::from_value).collect())
}

/// Recover a JSON array from `raw`.
pub fn parse_array(raw: &str) -> Result<Vec<Value>, ParseError> {
    let text = raw.trim();

    if let Some(values) = try_array(text) {
        return Ok(values);
    }

    if let Some(fenced) = extract_fenced(text) {
        if let Some(values) = try_array(fenced) {
            debug!("Parsed array from fenced block");
            return Ok(values);
        }
    }

    if let Some(embedded) = extract_embedded_array(text) {
        if let Some(values) = try_array(embedded) {
            debug!("Parsed array embedded in prose");
            return Ok(values);
        }
        let repaired = repair_json_syntax(embedded);
        if repaired != embedded {
            if let Some(values) = try_array(&repaired) {
                debug!("Parsed array after syntax repair");
                return Ok(values);
            }
        }
    }

    let objects = extract_objects(text);
    if !objects.is_empty() {
        debug!(count = objects.len(), "Recovered individual objects");
        return Ok(objects);
    }

    Err(ParseError::from_raw(text))
}

fn try_array(text: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(values)) => Some(values),
        _ => None,
    }
}

/// Contents of the first fenced code block (```json or bare ```).
fn extract_fenced(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_ticks = &text[open + 3..];
    // Skip an optional language tag on the opening line.
    let body_start = match after_ticks.find('\n') {
        Some(newline) if after_ticks[..newline].trim().chars().all(char::is_alphanumeric) => {
            newline + 1
        }
        _ => after_ticks
            .strip_prefix("json")
            .map(|_| 4)
            .unwrap_or(0),
    };
    let body = &after_ticks[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

/// Slice from the first `[` to the last `]`, or to the end if unclosed.
fn extract_embedded_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    match text.rfind(']') {
        Some(end) if end > start => Some(&text[start..=end]),
        _ => Some(&text[start..]),
    }
}

/// Remove trailing commas and control characters, and make sure the text is bracketed.
pub fn repair_json_syntax(text: &str) -> String {
    let without_commas = trailing_comma_re().replace_all(text, "$1");
    let mut repaired: String = without_commas
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect();
    let trimmed = repaired.trim();
    if !trimmed.starts_with('[') {
        repaired.insert(0, '[');
    }
    if !repaired.trim_end().ends_with(']') {
        repaired.push(']');
    }
    repaired
}

/// Every flat `{...}` object that parses on its own. All-or-nothing: one bad
/// object means the salvage fails.
fn extract_objects(text: &str) -> Vec<Value> {
    let candidates: Vec<&str> = flat_object_re()
        .find_iter(text)
        .map(|m| m.as_str())
        .collect();
    let parsed: Result<Vec<Value>, _> = candidates
        .iter()
        .map(|candidate| serde_json::from_str::<Value>(candidate))
        .collect();
    parsed.unwrap_or_default()
}
