//! Conversion between typed caller objects and generic records.
//!
//! Field names come from the type's serde mapping (`#[serde(rename = ..)]`),
//! so the mapping is fixed at compile time. Records round-trip through JSON
//! text, so field types must be representable in JSON.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, StorageError};

/// Generic field map exchanged with repositories
pub type Record = Map<String, Value>;

/// Convert a struct or string-keyed map into a [`Record`].
///
/// Fails with `InvalidInput` when the value does not serialize to an object.
pub fn to_record<T: Serialize + ?Sized>(object: &T) -> Result<Record> {
    match serde_json::to_value(object)? {
        Value::Object(record) => Ok(record),
        other => Err(StorageError::invalid_input(format!(
            "object should be a struct or a string-keyed map, got {}",
            json_type_name(&other)
        ))),
    }
}

/// Decode a [`Record`] into the destination type
pub fn from_record<T: DeserializeOwned>(record: &Record) -> Result<T> {
    let text = serde_json::to_string(record)?;
    serde_json::from_str(&text).map_err(|e| {
        StorageError::invalid_input(format!("cannot decode record into target type: {}", e))
    })
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
