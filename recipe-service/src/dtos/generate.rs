//! Request body for the generation endpoints.
//!
//! The body is checked as raw JSON so each failure maps to its own client
//! message, and nothing reaches the model unless every check passes.

use crate::models::{HistoryEntry, HistoryPart, Role};
use serde_json::{Map, Value};
use thiserror::Error;

const PROMPT_REQUIRED: &str = "Prompt is required and must be a non-empty string.";
const HISTORY_NOT_ARRAY: &str = "History must be an array if provided.";
const HISTORY_NOT_ARRAY_STREAM: &str = "History must be an array.";
const HISTORY_ITEM_FORMAT: &str =
    "Invalid history item format. Expected {role: string, parts: [{text: string}]}";
const HISTORY_ITEM_ROLE: &str = "History item role must be 'user' or 'model'.";
const HISTORY_ITEM_PARTS: &str = "History item parts must contain objects with a 'text' string.";
const HISTORY_FORMAT_STREAM: &str =
    "Invalid history format. Each item must be { role: 'user' | 'model', parts: [{ text: string }] }";

/// Rejected request body; the message is returned to the client verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct InvalidRequest(&'static str);

impl InvalidRequest {
    pub fn message(&self) -> &'static str {
        self.0
    }
}

/// Which endpoint's rules apply. The streaming endpoint reports every
/// history problem with one message and also rejects blank part text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Buffered,
    Streaming,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub history: Vec<HistoryEntry>,
}

impl GenerateRequest {
    pub fn from_value(body: &Value, mode: ValidationMode) -> Result<Self, InvalidRequest> {
        let prompt = match body.get("prompt") {
            Some(Value::String(prompt)) if !prompt.trim().is_empty() => prompt.clone(),
            _ => return Err(InvalidRequest(PROMPT_REQUIRED)),
        };

        let history = match body.get("history") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| parse_entry(item, mode))
                .collect::<Result<_, _>>()?,
            Some(_) => {
                return Err(InvalidRequest(match mode {
                    ValidationMode::Buffered => HISTORY_NOT_ARRAY,
                    ValidationMode::Streaming => HISTORY_NOT_ARRAY_STREAM,
                }))
            }
        };

        Ok(Self { prompt, history })
    }
}

fn parse_entry(item: &Value, mode: ValidationMode) -> Result<HistoryEntry, InvalidRequest> {
    let fail = |buffered: &'static str| {
        InvalidRequest(match mode {
            ValidationMode::Buffered => buffered,
            ValidationMode::Streaming => HISTORY_FORMAT_STREAM,
        })
    };

    let object = item.as_object().ok_or_else(|| fail(HISTORY_ITEM_FORMAT))?;
    let raw_role = object
        .get("role")
        .filter(|role| is_present(role))
        .ok_or_else(|| fail(HISTORY_ITEM_FORMAT))?;
    let parts = object
        .get("parts")
        .and_then(Value::as_array)
        .ok_or_else(|| fail(HISTORY_ITEM_FORMAT))?;

    let role = match raw_role.as_str() {
        Some("user") => Role::User,
        Some("model") => Role::Model,
        _ => return Err(fail(HISTORY_ITEM_ROLE)),
    };

    let parts = parts
        .iter()
        .map(|part| part_text(part, mode).ok_or_else(|| fail(HISTORY_ITEM_PARTS)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(HistoryEntry { role, parts })
}

fn part_text(part: &Value, mode: ValidationMode) -> Option<HistoryPart> {
    let text = part.as_object().and_then(text_field)?;
    if mode == ValidationMode::Streaming && text.trim().is_empty() {
        return None;
    }
    Some(HistoryPart {
        text: text.to_string(),
    })
}

fn text_field(object: &Map<String, Value>) -> Option<&str> {
    object.get("text").and_then(Value::as_str)
}

/// A role counts as supplied unless it is null, false, zero or empty.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
