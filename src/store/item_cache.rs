//! Item Cache Module
//!
//! The item layer: structured values addressed by hierarchical keys, with
//! per-item TTL and self-healing expiry on read.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use crate::eviction::StrategyConfig;
use crate::key::{matches_location_filter, CacheKey, KeyNormalizer, LocationRef};
use crate::metadata::MetadataProvider;
use crate::store::map::CacheMap;
use crate::store::stats::CacheStats;

// == Entry Stats ==
/// Entry-state breakdown of the item layer.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EntryStats {
    /// All tracked entries
    pub total: usize,
    /// Entries that would currently be served
    pub valid: usize,
    /// Entries past their expiration, pending cleanup
    pub expired: usize,
}

// == Raw Entry ==
/// Value plus timestamps, read without any expiry side effect.
///
/// For stale-while-revalidate callers that serve past the staleness
/// threshold while refreshing in the background.
#[derive(Debug, Clone)]
pub struct RawEntry {
    /// The cached value
    pub value: Value,
    /// Insertion timestamp (Unix milliseconds)
    pub added_at: u64,
    /// Last access timestamp (Unix milliseconds)
    pub last_accessed_at: u64,
    /// Expiration timestamp, None = no expiration
    pub expires_at: Option<u64>,
}

// == Item Cache ==
/// Key → item store over the in-memory backend.
///
/// `get` treats an expired entry as absent and lazily deletes it; `set`
/// always re-derives the expiration relative to "now", so an overwrite
/// refreshes the TTL.
#[derive(Debug, Clone)]
pub struct ItemCache {
    map: CacheMap,
    /// Canonical form → structured key, for location matching
    keys: HashMap<String, CacheKey>,
    /// Re-entrancy guard against duplicate expiry cleanup of one key
    cleanup_in_flight: HashSet<String>,
}

impl ItemCache {
    /// Creates an item cache from the core configuration.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_strategy_config(config, &StrategyConfig::default())
    }

    /// Creates an item cache with explicit eviction tuning.
    pub fn with_strategy_config(config: &Config, strategy: &StrategyConfig) -> Result<Self> {
        Ok(Self {
            map: CacheMap::with_strategy_config(config, strategy)?,
            keys: HashMap::new(),
            cleanup_in_flight: HashSet::new(),
        })
    }

    // == Set ==
    /// Stores an item under its key with an optional per-item TTL (the
    /// layer default applies otherwise). Returns the canonical keys
    /// evicted to make room.
    pub fn set(&mut self, key: &CacheKey, value: Value, ttl_ms: Option<u64>) -> Result<Vec<String>> {
        let canonical = KeyNormalizer::normalize(key);
        let evicted = self.map.set(&canonical, value, ttl_ms)?;
        for victim in &evicted {
            self.keys.remove(victim);
        }
        self.keys.insert(canonical, key.clone());
        Ok(evicted)
    }

    // == Get ==
    /// Retrieves an item, treating expired entries as absent and lazily
    /// deleting them.
    pub fn get(&mut self, key: &CacheKey) -> Option<Value> {
        let canonical = KeyNormalizer::normalize(key);
        self.get_canonical(&canonical)
    }

    /// Canonical-key variant of [`get`](Self::get), used by composing
    /// layers that already hold the normalized form.
    pub(crate) fn get_canonical(&mut self, canonical: &str) -> Option<Value> {
        if self.map.is_expired(canonical) {
            self.expire_entry(canonical);
        }
        self.map.get(canonical)
    }

    /// Removes one expired entry behind the per-key re-entrancy guard.
    fn expire_entry(&mut self, canonical: &str) {
        if !self.cleanup_in_flight.insert(canonical.to_string()) {
            return;
        }
        if self.map.remove_expired(canonical) {
            debug!(key = %canonical, "expired entry removed on read");
            self.keys.remove(canonical);
        }
        self.cleanup_in_flight.remove(canonical);
    }

    // == Has ==
    /// Checks presence without healing: expired entries report absent.
    pub fn has(&self, key: &CacheKey) -> bool {
        let canonical = KeyNormalizer::normalize(key);
        self.map.contains(&canonical) && !self.map.is_expired(&canonical)
    }

    // == Raw Access ==
    /// Returns the raw entry without recording an access or triggering
    /// expiry.
    pub fn raw(&self, key: &CacheKey) -> Option<RawEntry> {
        let canonical = KeyNormalizer::normalize(key);
        let slot = self.map.peek(&canonical)?;
        let value = slot.value()?.clone();
        let meta = slot.metadata();
        Some(RawEntry {
            value,
            added_at: meta.added_at,
            last_accessed_at: meta.last_accessed_at,
            expires_at: meta.expires_at,
        })
    }

    /// True once 80% of the entry's TTL has elapsed.
    ///
    /// Signals stale-while-revalidate; a hard miss only happens at full
    /// expiry.
    pub fn is_stale(&self, key: &CacheKey) -> bool {
        let canonical = KeyNormalizer::normalize(key);
        let meta = match self.map.get_metadata(&canonical) {
            Some(meta) => meta,
            None => return false,
        };
        match (meta.expires_at, meta.ttl) {
            (Some(expires_at), Some(ttl)) => {
                let stale_at = expires_at.saturating_sub(ttl / 5);
                crate::metadata::current_timestamp_ms() >= stale_at
            }
            _ => false,
        }
    }

    // == Delete ==
    /// Removes an item. Returns false when absent.
    pub fn delete(&mut self, key: &CacheKey) -> bool {
        let canonical = KeyNormalizer::normalize(key);
        self.delete_canonical(&canonical)
    }

    pub(crate) fn delete_canonical(&mut self, canonical: &str) -> bool {
        let removed = self.map.delete(canonical);
        if removed {
            self.keys.remove(canonical);
        }
        removed
    }

    // == Clear ==
    /// Drops every item. Idempotent.
    pub fn clear(&mut self) {
        self.map.clear();
        self.keys.clear();
    }

    // == Cleanup ==
    /// Removes all expired entries, returning how many were removed.
    /// Calling it again immediately reports zero.
    pub fn cleanup(&mut self) -> usize {
        let expired = self.map.find_expired();
        let mut removed = 0;
        for canonical in expired {
            if !self.cleanup_in_flight.insert(canonical.clone()) {
                continue;
            }
            if self.map.remove_expired(&canonical) {
                self.keys.remove(&canonical);
                removed += 1;
            }
            self.cleanup_in_flight.remove(&canonical);
        }
        if removed > 0 {
            debug!(removed, "item cleanup pass");
        }
        removed
    }

    // == Stats ==
    /// Entry-state breakdown: total, valid, and expired-but-present.
    pub fn entry_stats(&self) -> EntryStats {
        let mut stats = EntryStats::default();
        for (canonical, _) in self.map.all_metadata() {
            stats.total += 1;
            if self.map.is_expired(&canonical) {
                stats.expired += 1;
            } else {
                stats.valid += 1;
            }
        }
        stats
    }

    /// Performance counters of the underlying map.
    pub fn stats(&self) -> CacheStats {
        self.map.stats()
    }

    // == Location Matching ==
    /// Canonical keys of all primary (location-less) items.
    pub fn primary_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .keys
            .iter()
            .filter(|(_, key)| key.is_primary())
            .map(|(canonical, _)| canonical.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Canonical keys of items whose location chain starts with the given
    /// prefix.
    pub fn keys_under_location(&self, prefix: &[LocationRef]) -> Vec<String> {
        let mut keys: Vec<String> = self
            .keys
            .iter()
            .filter(|(_, key)| matches_location_filter(prefix, key.locations()))
            .map(|(canonical, _)| canonical.clone())
            .collect();
        keys.sort();
        keys
    }

    // == Accessors ==
    /// Number of tracked entries (valid or expired).
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true when no entries are tracked.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Bytes tracked by the item layer.
    pub fn size_bytes(&self) -> usize {
        self.map.current_size().size_bytes
    }

    /// Capability flags of the underlying backend.
    pub fn capabilities(&self) -> crate::store::BackendCapabilities {
        self.map.capabilities()
    }

    /// Active eviction policy name.
    pub fn eviction_policy(&self) -> &'static str {
        self.map.eviction_policy()
    }

    /// The underlying backend, for composing layers.
    pub(crate) fn map_mut(&mut self) -> &mut CacheMap {
        &mut self.map
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread::sleep;
    use std::time::Duration;

    fn cache() -> ItemCache {
        ItemCache::new(&Config::default()).unwrap()
    }

    fn user(id: i64) -> CacheKey {
        CacheKey::primary("user", id)
    }

    #[test]
    fn test_item_set_and_get() {
        let mut items = cache();
        items.set(&user(1), json!({"name": "ada"}), None).unwrap();

        assert_eq!(items.get(&user(1)), Some(json!({"name": "ada"})));
    }

    #[test]
    fn test_item_get_respects_key_normalization() {
        let mut items = cache();
        items.set(&user(1), json!(1), None).unwrap();

        // A string encoding of the same id addresses the same entry.
        let textual = CacheKey::primary("user", "1");
        assert_eq!(items.get(&textual), Some(json!(1)));
    }

    #[test]
    fn test_item_expired_entry_is_absent_and_healed() {
        let mut items = cache();
        items.set(&user(1), json!(1), Some(20)).unwrap();

        assert_eq!(items.get(&user(1)), Some(json!(1)));
        sleep(Duration::from_millis(40));

        assert_eq!(items.get(&user(1)), None);
        // Lazy deletion happened: nothing left to clean up.
        assert_eq!(items.len(), 0);
        assert_eq!(items.cleanup(), 0);
    }

    #[test]
    fn test_item_overwrite_refreshes_ttl() {
        let mut items = cache();
        items.set(&user(1), json!(1), Some(200)).unwrap();
        sleep(Duration::from_millis(150));

        // Overwrite re-derives expiry from now; entry outlives the first TTL.
        items.set(&user(1), json!(2), Some(200)).unwrap();
        sleep(Duration::from_millis(150));

        assert_eq!(items.get(&user(1)), Some(json!(2)));
    }

    #[test]
    fn test_item_raw_access_has_no_side_effects() {
        let mut items = cache();
        items.set(&user(1), json!(1), Some(20)).unwrap();
        sleep(Duration::from_millis(40));

        // Raw read still sees the expired value and does not delete it.
        let raw = items.raw(&user(1)).unwrap();
        assert_eq!(raw.value, json!(1));
        assert!(raw.expires_at.is_some());
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_item_is_stale_at_80_percent() {
        let mut items = cache();
        items.set(&user(1), json!(1), Some(500)).unwrap();

        assert!(!items.is_stale(&user(1)));
        sleep(Duration::from_millis(430));

        assert!(items.is_stale(&user(1)));
        // Stale but not yet expired: still served.
        assert_eq!(items.get(&user(1)), Some(json!(1)));
    }

    #[test]
    fn test_item_has_reports_expired_as_absent() {
        let mut items = cache();
        items.set(&user(1), json!(1), Some(20)).unwrap();

        assert!(items.has(&user(1)));
        sleep(Duration::from_millis(40));
        assert!(!items.has(&user(1)));
        // has() does not heal.
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_item_cleanup_counts_and_is_idempotent() {
        let mut items = cache();
        items.set(&user(1), json!(1), Some(20)).unwrap();
        items.set(&user(2), json!(2), Some(10_000)).unwrap();
        sleep(Duration::from_millis(40));

        assert_eq!(items.cleanup(), 1);
        assert_eq!(items.cleanup(), 0);
        assert!(items.has(&user(2)));
    }

    #[test]
    fn test_item_entry_stats() {
        let mut items = cache();
        items.set(&user(1), json!(1), Some(20)).unwrap();
        items.set(&user(2), json!(2), Some(10_000)).unwrap();
        sleep(Duration::from_millis(40));

        let stats = items.entry_stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.valid, 1);
        assert_eq!(stats.expired, 1);
    }

    #[test]
    fn test_item_clear_twice_is_idempotent() {
        let mut items = cache();
        items.set(&user(1), json!(1), None).unwrap();

        items.clear();
        items.clear();
        assert!(items.is_empty());
    }

    #[test]
    fn test_item_location_indexes() {
        let mut items = cache();
        let nested = CacheKey::composite(
            "order",
            1,
            vec![LocationRef::new("customer", 7), LocationRef::new("site", 2)],
        );
        items.set(&user(1), json!(1), None).unwrap();
        items.set(&nested, json!(2), None).unwrap();

        assert_eq!(items.primary_keys(), vec!["p:user:1".to_string()]);

        let under_customer = items.keys_under_location(&[LocationRef::new("customer", "7")]);
        assert_eq!(under_customer.len(), 1);
        assert!(under_customer[0].starts_with("c:order:1"));
    }
}
