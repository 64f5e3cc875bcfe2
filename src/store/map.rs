//! Cache Map Module
//!
//! In-memory storage backend: the slot table, size accounting, and the
//! metadata-provider contract consumed by the eviction and TTL layers.
//! Capacity pressure is resolved here, on the write path, before a new
//! slot is admitted.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::eviction::{EvictionContext, EvictionManager, StrategyConfig};
use crate::metadata::{
    estimate_size_bytes, CacheItemMetadata, CacheSlot, MetadataProvider, SizeInfo, SizeLimits,
};
use crate::store::stats::CacheStats;
use crate::ttl::{TtlManager, TtlManagerConfig};

// == Backend Capabilities ==
/// What a storage backend can do, stated up front.
///
/// Composing code branches on these flags instead of probing behavior at
/// runtime.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BackendCapabilities {
    /// Entries can carry expirations
    pub supports_ttl: bool,
    /// The backend resolves capacity pressure itself
    pub supports_eviction: bool,
    /// The backend supports predicate queries over its keys
    pub supports_pattern_query: bool,
    /// Data survives process restart
    pub persistent: bool,
}

// == Slot Table ==
/// The slot map plus its size counters.
///
/// Counters are maintained on every mutation so that `current_size` always
/// equals the sum over tracked metadata.
#[derive(Debug, Clone, Default)]
struct SlotTable {
    slots: HashMap<String, CacheSlot>,
    size: SizeInfo,
    limits: SizeLimits,
}

impl SlotTable {
    fn insert_slot(&mut self, key: String, slot: CacheSlot) {
        let added = slot.metadata().estimated_size_bytes;
        if let Some(old) = self.slots.insert(key, slot) {
            self.size.size_bytes = self.size.size_bytes - old.metadata().estimated_size_bytes + added;
        } else {
            self.size.item_count += 1;
            self.size.size_bytes += added;
        }
    }

    fn remove_slot(&mut self, key: &str) -> Option<CacheSlot> {
        let slot = self.slots.remove(key)?;
        self.size.item_count -= 1;
        self.size.size_bytes -= slot.metadata().estimated_size_bytes;
        Some(slot)
    }
}

impl MetadataProvider for SlotTable {
    fn get_metadata(&self, key: &str) -> Option<&CacheItemMetadata> {
        self.slots.get(key).map(|slot| slot.metadata())
    }

    fn set_metadata(&mut self, metadata: CacheItemMetadata) {
        let key = metadata.key.clone();
        match self.slots.get_mut(&key) {
            Some(slot) => {
                let old = slot.metadata().estimated_size_bytes;
                let new = metadata.estimated_size_bytes;
                *slot.metadata_mut() = metadata;
                self.size.size_bytes = self.size.size_bytes - old + new;
            }
            None => {
                // Metadata for an absent value is an explicit placeholder.
                self.insert_slot(key, CacheSlot::MetadataOnly { metadata });
            }
        }
    }

    fn delete_metadata(&mut self, key: &str) {
        // Metadata existence tracks slot existence; dropping one drops both.
        self.remove_slot(key);
    }

    fn all_metadata(&self) -> HashMap<String, CacheItemMetadata> {
        self.slots
            .iter()
            .map(|(key, slot)| (key.clone(), slot.metadata().clone()))
            .collect()
    }

    fn clear_metadata(&mut self) {
        self.slots.clear();
        self.size = SizeInfo::default();
    }

    fn current_size(&self) -> SizeInfo {
        self.size
    }

    fn size_limits(&self) -> SizeLimits {
        self.limits
    }
}

// == Cache Map ==
/// In-memory key → slot store with eviction, TTL stamping, and stats.
///
/// A clone is a fully independent copy: data and configuration carry over,
/// no mutable state is shared with the original.
#[derive(Clone)]
pub struct CacheMap {
    table: SlotTable,
    eviction: EvictionManager,
    ttl: TtlManager,
    stats: CacheStats,
}

impl CacheMap {
    /// Creates a map from the core configuration with default strategy
    /// tuning.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_strategy_config(config, &StrategyConfig::default())
    }

    /// Creates a map with explicit per-strategy tuning.
    pub fn with_strategy_config(config: &Config, strategy: &StrategyConfig) -> Result<Self> {
        config.validate()?;
        let capacity_hint = config.max_items.unwrap_or(1024);
        Ok(Self {
            table: SlotTable {
                slots: HashMap::new(),
                size: SizeInfo::default(),
                limits: SizeLimits {
                    max_items: config.max_items,
                    max_size_bytes: config.max_size_bytes,
                },
            },
            eviction: EvictionManager::new(&config.eviction_policy, capacity_hint, strategy)?,
            ttl: TtlManager::new(TtlManagerConfig {
                default_ttl_ms: config.default_ttl_ms,
                auto_cleanup: false,
                cleanup_interval_ms: config.cleanup_interval_ms,
                validate_on_access: true,
            }),
            stats: CacheStats::new(),
        })
    }

    /// This backend's capability flags.
    pub fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            supports_ttl: true,
            supports_eviction: true,
            supports_pattern_query: true,
            persistent: false,
        }
    }

    // == Get ==
    /// Retrieves a value, recording the access.
    ///
    /// Metadata-only placeholders and absent keys are both misses.
    /// Expiration is not consulted here; the layering above decides what
    /// expired means for its callers.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        let value = match self.table.slots.get_mut(key) {
            Some(slot) => {
                let value = slot.value().cloned();
                if value.is_some() {
                    slot.metadata_mut().record_access();
                }
                value
            }
            None => None,
        };

        match value {
            Some(value) => {
                self.eviction.on_item_accessed(key);
                self.stats.record_hit();
                Some(value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Returns the raw slot without recording an access or touching
    /// expiry. For stale-while-revalidate callers.
    pub fn peek(&self, key: &str) -> Option<&CacheSlot> {
        self.table.slots.get(key)
    }

    /// Checks for a value-bearing slot without access side effects.
    pub fn contains(&self, key: &str) -> bool {
        self.table
            .slots
            .get(key)
            .map(|slot| slot.value().is_some())
            .unwrap_or(false)
    }

    // == Set ==
    /// Stores a value, resolving capacity pressure first.
    ///
    /// Overwrites create a fresh entry: timestamps, counters, and the
    /// expiration are all re-derived relative to "now". Returns the keys
    /// evicted to make room. Fails with a backend error when the store is
    /// over capacity and eviction could not relieve it.
    pub fn set(&mut self, key: &str, value: Value, ttl_ms: Option<u64>) -> Result<Vec<String>> {
        let new_item_size = estimate_size_bytes(&value);
        let replacing = self.table.slots.contains_key(key);

        let mut evicted = Vec::new();
        if !replacing {
            let context = EvictionContext {
                current_size: self.table.current_size(),
                limits: self.table.size_limits(),
                new_item_size,
            };
            for victim in self.eviction.select_for_eviction(&self.table, &context) {
                if self.table.remove_slot(&victim).is_some() {
                    debug!(key = %victim, "evicted under capacity pressure");
                    self.stats.record_eviction();
                    evicted.push(victim);
                }
            }

            let context = EvictionContext {
                current_size: self.table.current_size(),
                limits: self.table.size_limits(),
                new_item_size,
            };
            if context.overflow().is_some() {
                return Err(CacheError::Backend(
                    "cache full and eviction could not free capacity".to_string(),
                ));
            }
        }

        let metadata = CacheItemMetadata::new(key, new_item_size);
        self.table
            .insert_slot(key.to_string(), CacheSlot::Occupied { value, metadata });
        self.ttl.on_item_added(key, &mut self.table, ttl_ms);
        self.eviction.on_item_added(key);
        self.stats.set_total_entries(self.table.slots.len());

        Ok(evicted)
    }

    /// Creates a metadata-only placeholder carrying a pre-seeded TTL for a
    /// key whose value does not exist yet.
    pub fn seed_metadata(&mut self, key: &str, ttl_ms: Option<u64>) {
        if self.table.slots.contains_key(key) {
            return;
        }
        self.table.set_metadata(CacheItemMetadata::new(key, 0));
        self.ttl.on_item_added(key, &mut self.table, ttl_ms);
        self.stats.set_total_entries(self.table.slots.len());
    }

    // == Delete ==
    /// Removes a slot. Returns false when the key was absent.
    pub fn delete(&mut self, key: &str) -> bool {
        let removed = self.table.remove_slot(key).is_some();
        if removed {
            self.eviction.on_item_removed(key);
            self.stats.set_total_entries(self.table.slots.len());
        }
        removed
    }

    // == Query ==
    /// Returns the keys whose slot satisfies the predicate.
    pub fn query(&self, predicate: impl Fn(&str, &CacheSlot) -> bool) -> Vec<String> {
        let mut keys: Vec<String> = self
            .table
            .slots
            .iter()
            .filter(|(key, slot)| predicate(key, slot))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    // == Clear ==
    /// Drops every slot. Idempotent.
    pub fn clear(&mut self) {
        let keys: Vec<String> = self.table.slots.keys().cloned().collect();
        for key in &keys {
            self.eviction.on_item_removed(key);
        }
        self.table.clear_metadata();
        self.stats.set_total_entries(0);
    }

    // == Expiry Support ==
    /// Keys whose expiration has passed. Detection only.
    pub fn find_expired(&self) -> Vec<String> {
        self.ttl.find_expired_items(&self.table)
    }

    /// True when the key exists and its expiration has passed.
    pub fn is_expired(&self, key: &str) -> bool {
        self.ttl.is_expired(key, &self.table)
    }

    /// Removes an expired slot, counting it as an expiration rather than
    /// an eviction. Returns false when the key was absent.
    pub fn remove_expired(&mut self, key: &str) -> bool {
        let removed = self.table.remove_slot(key).is_some();
        if removed {
            self.eviction.on_item_removed(key);
            self.stats.record_expired_removal();
            self.stats.set_total_entries(self.table.slots.len());
        }
        removed
    }

    // == Accessors ==
    /// Current number of slots.
    pub fn len(&self) -> usize {
        self.table.slots.len()
    }

    /// Returns true when no slots are tracked.
    pub fn is_empty(&self) -> bool {
        self.table.slots.is_empty()
    }

    /// All tracked keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.table.slots.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Performance counters snapshot.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.table.slots.len());
        stats
    }

    /// Active eviction policy name.
    pub fn eviction_policy(&self) -> &'static str {
        self.eviction.policy_name()
    }

    /// The TTL manager, e.g. for attaching a sweep handle.
    pub fn ttl_manager_mut(&mut self) -> &mut TtlManager {
        &mut self.ttl
    }
}

impl std::fmt::Debug for CacheMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheMap")
            .field("len", &self.table.slots.len())
            .field("size", &self.table.size)
            .field("limits", &self.table.limits)
            .field("eviction", &self.eviction)
            .finish()
    }
}

// Metadata-provider contract, delegated to the slot table.
impl MetadataProvider for CacheMap {
    fn get_metadata(&self, key: &str) -> Option<&CacheItemMetadata> {
        self.table.get_metadata(key)
    }

    fn set_metadata(&mut self, metadata: CacheItemMetadata) {
        self.table.set_metadata(metadata);
    }

    fn delete_metadata(&mut self, key: &str) {
        self.table.delete_metadata(key);
    }

    fn all_metadata(&self) -> HashMap<String, CacheItemMetadata> {
        self.table.all_metadata()
    }

    fn clear_metadata(&mut self) {
        self.table.clear_metadata();
    }

    fn current_size(&self) -> SizeInfo {
        self.table.current_size()
    }

    fn size_limits(&self) -> SizeLimits {
        self.table.size_limits()
    }
}
