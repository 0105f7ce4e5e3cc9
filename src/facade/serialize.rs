//! Built-in serializers
//!
//! `custom` keeps the full envelope; `plain` drops it for formats where a
//! wrapper is not idiomatic (CSV, JSON Lines, plain text).

use crate::core::error::{ErrorContext, Result};
use crate::facade::envelope::ResponseEnvelope;
use serde_json::{json, Value};

pub fn custom(envelope: &ResponseEnvelope) -> Result<Value> {
    let links = serde_json::to_value(&envelope.links).context("Failed to serialize links")?;

    Ok(json!({
        "data": envelope.data.clone().unwrap_or(Value::Null),
        "error": envelope.error,
        "links": links,
        "status": envelope.status,
    }))
}

pub fn plain(envelope: &ResponseEnvelope) -> Result<Value> {
    Ok(match &envelope.error {
        Some(message) => Value::String(message.clone()),
        None => envelope.data.clone().unwrap_or(Value::Null),
    })
}
