//! Built-in request body parsers

use crate::core::error::{FacadeError, Result};
use serde_json::{Map, Value};

pub fn json(body: &[u8]) -> Result<Value> {
    serde_json::from_slice(body).map_err(|e| FacadeError::parse("application/json", e))
}

/// One JSON value per non-blank line, collected into an array
pub fn jsonl(body: &[u8]) -> Result<Value> {
    let text = std::str::from_utf8(body).map_err(|e| FacadeError::parse("application/jsonl", e))?;

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|e| FacadeError::parse("application/jsonl", e))
        })
        .collect::<Result<Vec<Value>>>()
        .map(Value::Array)
}

/// Form fields as an object of strings; repeated keys keep the last value
pub fn form(body: &[u8]) -> Result<Value> {
    let map: Map<String, Value> = url::form_urlencoded::parse(body)
        .into_owned()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();
    Ok(Value::Object(map))
}
