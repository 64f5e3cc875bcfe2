//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;

use crate::error::{CacheError, Result};

/// Core cache configuration parameters.
///
/// All values can be configured via environment variables with sensible
/// defaults. Backend selection and retry/sync settings belong to the
/// composing layers, not to this core.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default TTL in milliseconds for entries without an explicit TTL
    pub default_ttl_ms: u64,
    /// Maximum number of items the cache can hold (None = unbounded)
    pub max_items: Option<usize>,
    /// Maximum total size in bytes of tracked items (None = unbounded)
    pub max_size_bytes: Option<usize>,
    /// Eviction policy name (lru, mru, lfu, fifo, random, arc, two-queue)
    pub eviction_policy: String,
    /// Background cleanup sweep interval in milliseconds
    pub cleanup_interval_ms: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 300000)
    /// - `MAX_ITEMS` - Maximum cached items (default: 1000)
    /// - `MAX_SIZE_BYTES` - Maximum tracked bytes (default: unbounded)
    /// - `EVICTION_POLICY` - Eviction policy name (default: "lru")
    /// - `CLEANUP_INTERVAL_MS` - Sweep frequency in milliseconds (default: 1000)
    pub fn from_env() -> Self {
        Self {
            default_ttl_ms: env::var("DEFAULT_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300_000),
            max_items: env::var("MAX_ITEMS").ok().and_then(|v| v.parse().ok()).or(Some(1000)),
            max_size_bytes: env::var("MAX_SIZE_BYTES").ok().and_then(|v| v.parse().ok()),
            eviction_policy: env::var("EVICTION_POLICY").unwrap_or_else(|_| "lru".to_string()),
            cleanup_interval_ms: env::var("CLEANUP_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
        }
    }

    /// Validates the configuration, failing fast on values that must be
    /// positive and on structurally empty settings.
    pub fn validate(&self) -> Result<()> {
        if self.default_ttl_ms == 0 {
            return Err(CacheError::Configuration(
                "default_ttl_ms must be positive".to_string(),
            ));
        }
        if self.max_items == Some(0) {
            return Err(CacheError::Configuration(
                "max_items must be positive when set".to_string(),
            ));
        }
        if self.max_size_bytes == Some(0) {
            return Err(CacheError::Configuration(
                "max_size_bytes must be positive when set".to_string(),
            ));
        }
        if self.cleanup_interval_ms == 0 {
            return Err(CacheError::Configuration(
                "cleanup_interval_ms must be positive".to_string(),
            ));
        }
        if self.eviction_policy.is_empty() {
            return Err(CacheError::Configuration(
                "eviction_policy must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_ttl_ms: 300_000,
            max_items: Some(1000),
            max_size_bytes: None,
            eviction_policy: "lru".to_string(),
            cleanup_interval_ms: 1000,
        }
    }
}
