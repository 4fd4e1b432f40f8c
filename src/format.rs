//! Result formatting.
//!
//! Turns ranked matches into the human-readable text returned to clients.
//! Payloads come from an ingestion pipeline outside this crate and are not
//! uniform, so each displayed field is looked up through an ordered chain of
//! candidates and ends in a fixed default:
//!
//! | Field | Lookup order |
//! |-------|--------------|
//! | title | `title` → `metadata.title` → `"Untitled Section"` |
//! | type  | `type` → `metadata.type` → `"Unknown"` |
//! | body  | `text` → `content` → `"No content available"` |
//!
//! A candidate is skipped when it is missing, `null`, `false`, `0` or `""`.

use serde_json::{Map, Value};

use crate::qdrant::{CollectionDescriptor, ScoredPoint};

pub const UNTITLED: &str = "Untitled Section";
pub const UNKNOWN_TYPE: &str = "Unknown";
pub const NO_CONTENT: &str = "No content available";

/// Display text plus the matches it was rendered from.
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedResult {
    pub text: String,
    /// The input matches, unmodified. Empty when nothing matched.
    pub results: Vec<ScoredPoint>,
}

pub fn header(corpus_label: &str) -> String {
    format!("Here's what I found in the {}:\n\n", corpus_label)
}

pub fn no_results_message(corpus_label: &str) -> String {
    format!(
        "I couldn't find any relevant information in the {}. \
         Please try rephrasing your question or providing more details.",
        corpus_label
    )
}

/// Render `matches` in input order as numbered sections.
pub fn format_matches(matches: Vec<ScoredPoint>, corpus_label: &str) -> FormattedResult {
    if matches.is_empty() {
        return FormattedResult {
            text: no_results_message(corpus_label),
            results: Vec::new(),
        };
    }

    let mut text = header(corpus_label);
    for (index, point) in matches.iter().enumerate() {
        text.push_str(&render_section(index, point));
    }

    FormattedResult {
        text,
        results: matches,
    }
}

/// `## <n>. <title> (<type>, Score: <score>)\n\n<body>\n\n`, `n` 1-based.
pub fn render_section(index: usize, point: &ScoredPoint) -> String {
    let empty = Map::new();
    let payload = point.payload.as_ref().unwrap_or(&empty);
    format!(
        "## {}. {} ({}, Score: {})\n\n{}\n\n",
        index + 1,
        title_of(payload),
        type_of(payload),
        format_score(point.score),
        body_of(payload)
    )
}

/// Two decimals, halves rounded away from zero (`{:.2}` alone rounds them to even).
pub fn format_score(score: f64) -> String {
    format!("{:.2}", (score * 100.0).round() / 100.0)
}

pub fn title_of(payload: &Map<String, Value>) -> String {
    first_present(&[payload.get("title"), metadata_field(payload, "title")])
        .unwrap_or_else(|| UNTITLED.to_string())
}

pub fn type_of(payload: &Map<String, Value>) -> String {
    first_present(&[payload.get("type"), metadata_field(payload, "type")])
        .unwrap_or_else(|| UNKNOWN_TYPE.to_string())
}

pub fn body_of(payload: &Map<String, Value>) -> String {
    first_present(&[payload.get("text"), payload.get("content")])
        .unwrap_or_else(|| NO_CONTENT.to_string())
}

fn metadata_field<'a>(payload: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    payload
        .get("metadata")
        .and_then(Value::as_object)
        .and_then(|metadata| metadata.get(key))
}

fn first_present(candidates: &[Option<&Value>]) -> Option<String> {
    candidates
        .iter()
        .flatten()
        .find(|value| is_present(value))
        .map(|value| display_value(value))
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Bulleted collection names, or `None found.` when there are none.
pub fn render_collection_list(names: &[String]) -> String {
    if names.is_empty() {
        return "None found.".to_string();
    }
    names
        .iter()
        .map(|name| format!("- {}", name))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn collections_text(names: &[String]) -> String {
    format!(
        "Available Qdrant Collections:\n{}",
        render_collection_list(names)
    )
}

pub fn collection_info_text(info: &CollectionDescriptor) -> String {
    info.to_string()
}
