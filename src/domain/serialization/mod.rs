//! Serialization capability injected into cache bins

use std::fmt;

use serde_json::Value;

use crate::domain::CacheError;

/// Identifies the codec that produced an encoded payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodecId(&'static str);

impl CodecId {
    pub const fn new(id: &'static str) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Encodes structured values to strings and back
///
/// Used whenever the data written to a bin is not already a plain string.
pub trait Serializer: Send + Sync + fmt::Debug {
    /// Codec identifier recorded with encoded payloads
    fn codec(&self) -> CodecId;

    fn encode(&self, value: &Value) -> Result<String, CacheError>;

    fn decode(&self, data: &str) -> Result<Value, CacheError>;
}
