//! Classification of a complete model answer.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::change::GenerateResult;
use crate::error::AiError;

/// Key under which the model describes its drawing plan.
pub const STRATEGY_KEY: &str = "long_description_of_strategy";

/// What the model chose to answer with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "responseType", rename_all = "lowercase")]
pub enum AiResponse {
    Chat {
        content: String,
    },
    Drawing {
        #[serde(rename = "long_description_of_strategy")]
        strategy: String,
        /// Raw events, decoded one by one so a bad event stays local.
        events: Vec<Value>,
    },
}

/// Unified-mode result with drawing events already decoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "responseType", rename_all = "lowercase")]
pub enum ProcessedResponse {
    Chat {
        content: String,
    },
    Drawing {
        result: GenerateResult,
        strategy: String,
        events: Vec<Value>,
    },
}

static FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```(?:json|JSON)?\s*(.*?)\s*```\s*$").expect("valid fence regex")
});

/// Removes a markdown code fence wrapped around the whole answer.
pub fn strip_code_fence(text: &str) -> &str {
    match FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => text.trim(),
    }
}

fn parse_object(text: &str) -> Result<Map<String, Value>, AiError> {
    match serde_json::from_str::<Value>(strip_code_fence(text))? {
        Value::Object(map) => Ok(map),
        other => Err(AiError::Schema(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> Result<String, AiError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(AiError::Schema(format!(
            "`{key}` must be a string, got {}",
            json_kind(other)
        ))),
    }
}

fn events_field(map: &mut Map<String, Value>) -> Result<Vec<Value>, AiError> {
    match map.remove("events") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(events)) => Ok(events),
        Some(other) => Err(AiError::Schema(format!(
            "`events` must be an array, got {}",
            json_kind(&other)
        ))),
    }
}

/// Classifies a complete answer as chat or drawing.
///
/// The `responseType` field decides the variant; any other shape of answer
/// is an error. Individual events are not validated here.
pub fn classify(text: &str) -> Result<AiResponse, AiError> {
    let mut map = parse_object(text)?;
    let kind = match map.get("responseType") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(AiError::Schema(format!(
                "`responseType` must be a string, got {}",
                json_kind(other)
            )));
        }
        None => return Err(AiError::Schema("missing `responseType`".into())),
    };
    match kind.as_str() {
        "chat" => Ok(AiResponse::Chat {
            content: string_field(&map, "content")?,
        }),
        "drawing" => Ok(AiResponse::Drawing {
            strategy: string_field(&map, STRATEGY_KEY)?,
            events: events_field(&mut map)?,
        }),
        other => Err(AiError::Schema(format!("unknown responseType `{other}`"))),
    }
}

/// Extracts the event list from a drawing-only answer.
///
/// Accepts either a bare array or an object with an `events` field;
/// `responseType` is not required.
pub fn parse_events(text: &str) -> Result<Vec<Value>, AiError> {
    match serde_json::from_str::<Value>(strip_code_fence(text))? {
        Value::Array(events) => Ok(events),
        Value::Object(mut map) => events_field(&mut map),
        other => Err(AiError::Schema(format!(
            "expected events, got {}",
            json_kind(&other)
        ))),
    }
}
