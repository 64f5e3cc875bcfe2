//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.
//!
//! Cache misses are not errors: lookups return `Option` and `None` is the
//! normal absent result. Errors are reserved for configuration mistakes,
//! malformed keys, and storage backend failures.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Invalid configuration (unknown eviction policy, non-positive limit,
    /// insufficient TTL context). Fatal and reported immediately.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Structurally invalid cache key (cyclic or excessively nested
    /// structure, unsupported id type). Rejected before any merge.
    #[error("Malformed key: {0}")]
    MalformedKey(String),

    /// Storage backend failure (e.g. quota exceeded). Propagated unchanged,
    /// never retried or hidden by the core.
    #[error("Backend error: {0}")]
    Backend(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::Configuration("unknown eviction policy: lfru".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: unknown eviction policy: lfru"
        );
    }

    #[test]
    fn test_malformed_key_display() {
        let err = CacheError::MalformedKey("key nesting exceeds limit".to_string());
        assert!(err.to_string().starts_with("Malformed key:"));
    }

    #[test]
    fn test_backend_error_display() {
        let err = CacheError::Backend("quota exceeded".to_string());
        assert_eq!(err.to_string(), "Backend error: quota exceeded");
    }
}
