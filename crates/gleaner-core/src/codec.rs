//! Shared (de)serialization of structured payloads.
//!
//! `details` / `specs` are stored as JSON objects of strings (jsonb columns),
//! staged results as whole JSON documents. Every backend goes through these
//! functions so a row written by one component reads back identically in any
//! other.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::{ExtractionResult, FieldMap};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("expected a JSON object of strings, got {0}")]
    NotAnObject(String),

    #[error("field {key:?} is not a string: {value}")]
    NonStringValue { key: String, value: String },

    #[error("invalid staged result: {0}")]
    Result(#[from] serde_json::Error),
}

pub fn encode_fields(fields: &FieldMap) -> Value {
    let map: Map<String, Value> = fields
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    Value::Object(map)
}

pub fn decode_fields(value: Value) -> Result<FieldMap, CodecError> {
    let Value::Object(map) = value else {
        return Err(CodecError::NotAnObject(value.to_string()));
    };
    map.into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => Ok((key, s)),
            other => Err(CodecError::NonStringValue {
                key,
                value: other.to_string(),
            }),
        })
        .collect()
}

/// `None` and JSON `null` both mean "no table".
pub fn encode_optional_fields(fields: Option<&FieldMap>) -> Option<Value> {
    fields.map(encode_fields)
}

pub fn decode_optional_fields(value: Option<Value>) -> Result<Option<FieldMap>, CodecError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => decode_fields(v).map(Some),
    }
}

pub fn encode_result(result: &ExtractionResult) -> Result<Value, CodecError> {
    Ok(serde_json::to_value(result)?)
}

pub fn decode_result(value: Value) -> Result<ExtractionResult, CodecError> {
    Ok(serde_json::from_value(value)?)
}
