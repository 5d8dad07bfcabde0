//! JSON encoding of a [`Configuration`].
//!
//! Two on-disk shapes are supported:
//!
//! - `flat`: `{"key": value, ...}`
//! - `envelope`: `{"data": {"item": [{"key": "...", "value": ...}, ...]}}`,
//!   the shape served by the remote configuration endpoint.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::Configuration;

/// Errors produced while decoding or encoding config JSON.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected shape: {0}")]
    Shape(String),
}

/// Persisted JSON shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    #[default]
    Flat,
    Envelope,
}

#[derive(Deserialize)]
struct Envelope {
    data: EnvelopeData,
}

#[derive(Deserialize)]
struct EnvelopeData {
    #[serde(rename = "item")]
    items: Vec<EnvelopeItem>,
}

#[derive(Deserialize)]
struct EnvelopeItem {
    key: String,
    value: Value,
}

/// Decode `bytes` in the given format.
///
/// In the envelope shape a repeated key keeps the last item's value.
pub fn decode(format: Format, bytes: &[u8]) -> Result<Configuration, CodecError> {
    let value: Value = serde_json::from_slice(bytes)?;

    match format {
        Format::Flat => match value {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(CodecError::Shape(format!(
                "expected a JSON object, found {}",
                value_kind(&other)
            ))),
        },
        Format::Envelope => {
            let envelope: Envelope = serde_json::from_value(value)
                .map_err(|e| CodecError::Shape(format!("expected data.item envelope: {e}")))?;
            Ok(envelope
                .data
                .items
                .into_iter()
                .map(|item| (item.key, item.value))
                .collect())
        }
    }
}

/// Encode `config` as indented JSON with a trailing newline.
pub fn encode(format: Format, config: &Configuration) -> Result<Vec<u8>, CodecError> {
    let mut bytes = match format {
        Format::Flat => serde_json::to_vec_pretty(config)?,
        Format::Envelope => {
            let items: Vec<Value> = config
                .iter()
                .map(|(key, value)| json!({ "key": key, "value": value }))
                .collect();
            serde_json::to_vec_pretty(&json!({ "data": { "item": items } }))?
        }
    };
    bytes.push(b'\n');
    Ok(bytes)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
