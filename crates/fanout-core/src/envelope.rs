//! Outbound payload re-encoding.
//!
//! Each delivered item must be a JSON object. The server identity is added
//! under `"from"`, replacing any value the payload already carried.

use serde_json::{Map, Value};

use crate::error::EnvelopeError;

/// Field carrying the originating server identity.
pub const ORIGIN_FIELD: &str = "from";

/// Decode `payload` as a JSON object, add `"from": origin` and re-encode.
pub fn attach_origin(payload: &[u8], origin: &str) -> Result<String, EnvelopeError> {
    if payload.is_empty() {
        return Err(EnvelopeError::Empty);
    }
    let value: Value = serde_json::from_slice(payload).map_err(EnvelopeError::InvalidJson)?;
    let mut object: Map<String, Value> = match value {
        Value::Object(object) => object,
        other => return Err(EnvelopeError::NotAnObject(kind(&other))),
    };
    let _ = object.insert(ORIGIN_FIELD.to_string(), Value::String(origin.to_string()));
    serde_json::to_string(&object).map_err(EnvelopeError::Encode)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
