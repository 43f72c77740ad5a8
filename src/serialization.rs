//! Value codec.
//!
//! Every backend goes through this module to turn caller values into
//! storage form and back. The networked backend keeps encoded JSON bytes;
//! the in-process backend keeps the structured [`Value`] tree. Both decode
//! through serde, so a value read back has the same shape whichever
//! backend stored it.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Encode a value to bytes for a byte-oriented store.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::SerializationError(e.to_string()))
}

/// Decode bytes produced by [`encode`] into the caller's target type.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::DeserializationError(e.to_string()))
}

/// Convert a value to its structured form.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::SerializationError(e.to_string()))
}

/// Decode a structured value into the caller's target type.
pub fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T> {
    T::deserialize(value).map_err(|e| Error::DeserializationError(e.to_string()))
}

/// Serialize a partial value and require it to be a field mapping.
pub(crate) fn to_fields<T: Serialize + ?Sized>(partial: &T) -> Result<Map<String, Value>> {
    match to_value(partial)? {
        Value::Object(fields) => Ok(fields),
        other => Err(Error::TypeMismatch(format!(
            "partial value must be a field mapping, got {}",
            kind_of(&other)
        ))),
    }
}

/// Merge `fields` into an existing stored value.
///
/// New keys are inserted, existing keys overwritten, absent keys left
/// untouched. Fails with [`Error::TypeMismatch`] when `existing` is not a
/// mapping, leaving it as it was.
pub(crate) fn merge_fields(existing: Value, fields: &Map<String, Value>) -> Result<Value> {
    match existing {
        Value::Object(mut map) => {
            for (k, v) in fields {
                map.insert(k.clone(), v.clone());
            }
            Ok(Value::Object(map))
        }
        other => Err(Error::TypeMismatch(format!(
            "stored value is {}, not a field mapping",
            kind_of(&other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a mapping",
    }
}

/// A stored payload that has not been decoded yet.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Payload {
    /// Bytes as held by a byte-oriented store.
    #[cfg_attr(not(feature = "redis"), allow(dead_code))]
    Encoded(Vec<u8>),
    /// Structured value as held by the in-process store.
    Structured(Value),
}

impl Payload {
    pub(crate) fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        match self {
            Payload::Encoded(bytes) => decode(bytes),
            Payload::Structured(value) => from_value(value),
        }
    }
}
