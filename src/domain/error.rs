use thiserror::Error;

/// Errors raised by the cache, checksum, lock and flood backends
///
/// Logical invalidation (expired, stale checksum, pre-watermark) is never an
/// error: those records are simply absent.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Contract violation: {message}")]
    Contract { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl CacheError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn contract(message: impl Into<String>) -> Self {
        Self::Contract {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// True when the store itself failed; callers should bypass caching for
    /// the operation instead of treating it as a miss.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::Store { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error() {
        let error = CacheError::store("connection reset");
        assert_eq!(error.to_string(), "Store error: connection reset");
        assert!(error.is_store_error());
    }

    #[test]
    fn test_contract_error() {
        let error = CacheError::contract("Cache tags must not contain whitespace");
        assert_eq!(
            error.to_string(),
            "Contract violation: Cache tags must not contain whitespace"
        );
        assert!(!error.is_store_error());
    }

    #[test]
    fn test_configuration_error() {
        let error = CacheError::configuration("Redis host is required");
        assert_eq!(error.to_string(), "Configuration error: Redis host is required");
    }
}
