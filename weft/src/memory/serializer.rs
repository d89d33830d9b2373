//! Type-tagged serialization of channel values and pending writes.
//!
//! Stored blobs are `(type, bytes)` pairs:
//! - `"json"`: JSON-encoded value
//! - `"bytes"`: raw bytes, surfaced as a JSON array of numbers
//! - `"null"`: JSON null, no bytes
//! - `"empty"`: the channel had no value at that version; skipped when hydrating

use serde_json::Value;

use crate::memory::checkpointer::CheckpointError;

pub const TYPE_JSON: &str = "json";
pub const TYPE_BYTES: &str = "bytes";
pub const TYPE_NULL: &str = "null";
pub const TYPE_EMPTY: &str = "empty";

/// One serialized value with its type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedData {
    pub type_tag: String,
    pub data: Vec<u8>,
}

impl TypedData {
    pub fn new(type_tag: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            type_tag: type_tag.into(),
            data,
        }
    }

    /// Marker for a channel version that has no value.
    pub fn empty() -> Self {
        Self::new(TYPE_EMPTY, Vec::new())
    }

    pub fn is_empty_marker(&self) -> bool {
        self.type_tag == TYPE_EMPTY
    }
}

/// Serializer used by checkpoint backends for blobs and writes.
pub trait TypedSerializer: Send + Sync {
    fn dumps_typed(&self, value: &Value) -> Result<TypedData, CheckpointError>;

    /// `Ok(None)` for the empty marker.
    fn loads_typed(&self, data: &TypedData) -> Result<Option<Value>, CheckpointError>;
}

/// JSON serializer; the default for both backends.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl TypedSerializer for JsonSerializer {
    fn dumps_typed(&self, value: &Value) -> Result<TypedData, CheckpointError> {
        if value.is_null() {
            return Ok(TypedData::new(TYPE_NULL, Vec::new()));
        }
        serde_json::to_vec(value)
            .map(|data| TypedData::new(TYPE_JSON, data))
            .map_err(|e| CheckpointError::Serialization(e.to_string()))
    }

    fn loads_typed(&self, data: &TypedData) -> Result<Option<Value>, CheckpointError> {
        match data.type_tag.as_str() {
            TYPE_EMPTY => Ok(None),
            TYPE_NULL => Ok(Some(Value::Null)),
            TYPE_BYTES => Ok(Some(Value::from(data.data.clone()))),
            TYPE_JSON => serde_json::from_slice(&data.data)
                .map(Some)
                .map_err(|e| CheckpointError::Serialization(e.to_string())),
            other => Err(CheckpointError::Serialization(format!(
                "unknown type tag: {}",
                other
            ))),
        }
    }
}
