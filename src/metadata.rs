//! Cache Metadata Module
//!
//! Per-key bookkeeping shared by the eviction, TTL, and store layers, plus
//! the provider contract through which those layers read and mutate it.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;

// == Cache Item Metadata ==
/// Bookkeeping for a single cached key.
///
/// Metadata exists iff the slot exists; it is mutated on every access and
/// write so that eviction strategies always see current recency/frequency
/// state.
#[derive(Debug, Clone, Serialize)]
pub struct CacheItemMetadata {
    /// Canonical key this metadata belongs to
    pub key: String,
    /// Insertion timestamp (Unix milliseconds)
    pub added_at: u64,
    /// Last access timestamp (Unix milliseconds)
    pub last_accessed_at: u64,
    /// Number of accesses since insertion
    pub access_count: u64,
    /// Estimated size of the stored value in bytes
    pub estimated_size_bytes: usize,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
    /// TTL in milliseconds the expiration was derived from
    pub ttl: Option<u64>,
}

impl CacheItemMetadata {
    /// Creates metadata for a freshly inserted key.
    pub fn new(key: impl Into<String>, estimated_size_bytes: usize) -> Self {
        let now = current_timestamp_ms();
        Self {
            key: key.into(),
            added_at: now,
            last_accessed_at: now,
            access_count: 0,
            estimated_size_bytes,
            expires_at: None,
            ttl: None,
        }
    }

    /// Records an access: bumps the counter and refreshes the access time.
    pub fn record_access(&mut self) {
        self.access_count += 1;
        self.last_accessed_at = current_timestamp_ms();
    }

    /// Checks whether the entry has expired.
    ///
    /// An entry is expired when the current time is greater than or equal
    /// to its expiration time; entries without a TTL never expire.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => current_timestamp_ms() >= expires,
            None => false,
        }
    }

    /// Returns remaining TTL in milliseconds, or None if no expiration set.
    ///
    /// Returns `Some(0)` once the entry has expired.
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at.map(|expires| {
            let now = current_timestamp_ms();
            expires.saturating_sub(now)
        })
    }
}

// == Cache Slot ==
/// A storage slot: either a value with its metadata, or a metadata-only
/// placeholder created before the item itself exists (e.g. a pre-seeded
/// TTL). The tagged variant replaces any null-value sentinel.
#[derive(Debug, Clone)]
pub enum CacheSlot {
    /// Value present together with its metadata
    Occupied {
        /// The cached structured value
        value: Value,
        /// Bookkeeping for the key
        metadata: CacheItemMetadata,
    },
    /// Explicitly created placeholder carrying metadata but no value
    MetadataOnly {
        /// Bookkeeping for the key
        metadata: CacheItemMetadata,
    },
}

impl CacheSlot {
    /// Returns the slot's metadata.
    pub fn metadata(&self) -> &CacheItemMetadata {
        match self {
            CacheSlot::Occupied { metadata, .. } => metadata,
            CacheSlot::MetadataOnly { metadata } => metadata,
        }
    }

    /// Returns the slot's metadata mutably.
    pub fn metadata_mut(&mut self) -> &mut CacheItemMetadata {
        match self {
            CacheSlot::Occupied { metadata, .. } => metadata,
            CacheSlot::MetadataOnly { metadata } => metadata,
        }
    }

    /// Returns the stored value, if the slot holds one.
    pub fn value(&self) -> Option<&Value> {
        match self {
            CacheSlot::Occupied { value, .. } => Some(value),
            CacheSlot::MetadataOnly { .. } => None,
        }
    }
}

// == Size Accounting ==
/// Current occupancy of a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SizeInfo {
    /// Number of tracked keys
    pub item_count: usize,
    /// Sum of tracked estimated sizes in bytes
    pub size_bytes: usize,
}

/// Configured capacity limits of a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SizeLimits {
    /// Maximum item count (None = unbounded)
    pub max_items: Option<usize>,
    /// Maximum total size in bytes (None = unbounded)
    pub max_size_bytes: Option<usize>,
}

// == Metadata Provider ==
/// Contract through which the eviction and TTL layers observe and mutate
/// per-key metadata. Implemented by the storage backend that owns the slot
/// table; the consuming layers hold no metadata of their own.
pub trait MetadataProvider {
    /// Returns the metadata for a key, if tracked.
    fn get_metadata(&self, key: &str) -> Option<&CacheItemMetadata>;

    /// Inserts or replaces the metadata for a key.
    fn set_metadata(&mut self, metadata: CacheItemMetadata);

    /// Removes the metadata for a key.
    fn delete_metadata(&mut self, key: &str);

    /// Returns the full key → metadata mapping.
    fn all_metadata(&self) -> HashMap<String, CacheItemMetadata>;

    /// Drops all tracked metadata.
    fn clear_metadata(&mut self);

    /// Current occupancy, always equal to the sum over tracked metadata.
    fn current_size(&self) -> SizeInfo;

    /// Configured capacity limits.
    fn size_limits(&self) -> SizeLimits;
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Estimates the in-cache footprint of a structured value.
///
/// Uses the serialized length, which is stable for identical values and
/// cheap enough for write-path accounting.
pub fn estimate_size_bytes(value: &Value) -> usize {
    serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0)
}
