//! JSON codec

use serde_json::Value;

use crate::domain::serialization::{CodecId, Serializer};
use crate::domain::CacheError;

pub const JSON_CODEC: CodecId = CodecId::new("json");

/// Encodes structured cache data as JSON text
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl Serializer for JsonSerializer {
    fn codec(&self) -> CodecId {
        JSON_CODEC
    }

    fn encode(&self, value: &Value) -> Result<String, CacheError> {
        serde_json::to_string(value)
            .map_err(|e| CacheError::serialization(format!("Failed to encode JSON: {}", e)))
    }

    fn decode(&self, data: &str) -> Result<Value, CacheError> {
        serde_json::from_str(data)
            .map_err(|e| CacheError::serialization(format!("Failed to decode JSON: {}", e)))
    }
}
