//! Error types for the cache engine
//!
//! The engine is fail-open: tier-level failures are logged and downgraded to
//! misses inside the operation layer, so only input-validation errors ever
//! reach callers of the public contract.

use crate::level::CacheLevel;
use std::time::Duration;
use thiserror::Error;

/// Unified error type for the cache engine
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Input Validation Errors (surfaced to callers)
    // =========================================================================
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Invalid key structure: {0}")]
    InvalidKeyStructure(String),

    #[error("Unsafe cache input: {0}")]
    UnsafeCacheInput(String),

    // =========================================================================
    // Tier Errors (caught at the operation boundary)
    // =========================================================================
    #[error("Tier unavailable: {level} - {reason}")]
    TierUnavailable { level: CacheLevel, reason: String },

    #[error("Operation not supported by tier {level}: {operation}")]
    TierUnsupported {
        level: CacheLevel,
        operation: &'static str,
    },

    // =========================================================================
    // Concurrency Errors (internal signaling only)
    // =========================================================================
    #[error("Stampede lock timeout for key {key_hash} after {waited:?}")]
    LockTimeout { key_hash: String, waited: Duration },

    // =========================================================================
    // Serialization Errors
    // =========================================================================
    #[error("Serialization failure: {0}")]
    SerializationFailure(#[from] serde_json::Error),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Check if this error is an input-validation error
    ///
    /// Input errors are raised before any tier I/O and are the only errors
    /// the public contract propagates to callers.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidKeyFormat(_)
                | Error::InvalidKeyStructure(_)
                | Error::UnsafeCacheInput(_)
        )
    }

    /// Check if this error originated inside a tier transport
    ///
    /// Tier errors are swallowed by the operation layer: the affected tier
    /// is treated as a miss/no-op and the overall operation continues.
    pub fn is_tier_error(&self) -> bool {
        matches!(
            self,
            Error::TierUnavailable { .. } | Error::TierUnsupported { .. }
        )
    }

    /// Check if this error is the internal lock-timeout signal
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, Error::LockTimeout { .. })
    }
}

/// Result type alias for the cache engine
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let input = Error::InvalidKeyFormat("empty key".into());
        assert!(input.is_input_error());
        assert!(!input.is_tier_error());

        let tier = Error::TierUnavailable {
            level: CacheLevel::Memory,
            reason: "connection refused".into(),
        };
        assert!(tier.is_tier_error());
        assert!(!tier.is_input_error());

        let lock = Error::LockTimeout {
            key_hash: "abc123".into(),
            waited: Duration::from_millis(500),
        };
        assert!(lock.is_lock_timeout());
        assert!(!lock.is_input_error());
    }

    #[test]
    fn test_error_display() {
        let err = Error::TierUnsupported {
            level: CacheLevel::Database,
            operation: "delete_by_pattern",
        };
        assert!(err.to_string().contains("database"));
        assert!(err.to_string().contains("delete_by_pattern"));
    }
}
