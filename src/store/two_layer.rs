//! Two-Layer Cache Module
//!
//! The facade composing the item layer, the query-result layer, and the
//! storage backend. Every item mutation fans out to the query layer:
//! any stored result whose membership references the mutated key is
//! invalidated before the write completes, so no subsequently served
//! result can carry stale data for that key.

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use crate::events::{CacheEvent, CacheEventHub, SubscriptionHandle};
use crate::eviction::StrategyConfig;
use crate::key::{CacheKey, KeyNormalizer, LocationRef};
use crate::store::item_cache::{EntryStats, ItemCache, RawEntry};
use crate::store::map::BackendCapabilities;
use crate::store::query_cache::{QueryCache, QueryResult};
use crate::store::stats::CacheStats;
use crate::ttl::{TtlCalculator, TtlContext};

// == Layer Sizes ==
/// Byte and count accounting, kept separate per layer so capacity-aware
/// eviction sees item weight without query bookkeeping noise.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LayerSizes {
    /// Entries in the item layer
    pub item_count: usize,
    /// Bytes tracked by the item layer
    pub item_bytes: usize,
    /// Results in the query layer
    pub query_count: usize,
    /// Bytes of query bookkeeping
    pub query_bytes: usize,
}

// == Two Layer Cache ==
/// Item store + query-result store behind one write-consistent facade.
#[derive(Debug, Clone)]
pub struct TwoLayerCache {
    items: ItemCache,
    queries: QueryCache,
    events: CacheEventHub,
}

impl TwoLayerCache {
    /// Creates a cache from the core configuration with default eviction
    /// tuning and TTL policy.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_policies(config, &StrategyConfig::default(), TtlCalculator::default())
    }

    /// Creates a cache with explicit eviction tuning and TTL policy.
    pub fn with_policies(
        config: &Config,
        strategy: &StrategyConfig,
        calculator: TtlCalculator,
    ) -> Result<Self> {
        Ok(Self {
            items: ItemCache::with_strategy_config(config, strategy)?,
            queries: QueryCache::new(calculator),
            events: CacheEventHub::new(),
        })
    }

    // == Item Operations ==
    /// Writes an item, then invalidates every stored query result whose
    /// membership contains the key (exact membership, not pattern).
    ///
    /// Backend failures propagate unchanged; nothing is written or
    /// invalidated when the store rejects the write.
    pub fn set(&mut self, key: &CacheKey, value: Value, ttl_ms: Option<u64>) -> Result<()> {
        let canonical = KeyNormalizer::normalize(key);
        let evicted = self.items.set(key, value, ttl_ms)?;

        for victim in evicted {
            self.queries.invalidate_queries_containing_item(&victim);
            self.events.emit(&CacheEvent::Evicted { key: victim });
        }

        let invalidated = self.queries.invalidate_queries_containing_item(&canonical);
        if invalidated > 0 {
            debug!(key = %canonical, invalidated, "write fan-out");
        }
        self.events.emit(&CacheEvent::Set { key: canonical });
        Ok(())
    }

    /// Retrieves an item, lazily expiring it when its TTL has passed.
    pub fn get(&mut self, key: &CacheKey) -> Option<Value> {
        self.items.get(key)
    }

    /// Checks item presence; expired entries report absent.
    pub fn has(&self, key: &CacheKey) -> bool {
        self.items.has(key)
    }

    /// Raw read: value plus timestamps, no access recording, no expiry
    /// side effect. For stale-while-revalidate callers.
    pub fn get_raw(&self, key: &CacheKey) -> Option<RawEntry> {
        self.items.raw(key)
    }

    /// True once 80% of the item's TTL has elapsed.
    pub fn is_stale(&self, key: &CacheKey) -> bool {
        self.items.is_stale(key)
    }

    /// Invalidates every query result referencing the key, then removes
    /// the item. Returns false when the item was absent (the query
    /// fan-out still runs).
    pub fn delete(&mut self, key: &CacheKey) -> bool {
        let canonical = KeyNormalizer::normalize(key);
        self.queries.invalidate_queries_containing_item(&canonical);
        let removed = self.items.delete(key);
        if removed {
            self.events.emit(&CacheEvent::Deleted { key: canonical });
        }
        removed
    }

    // == Query Operations ==
    /// Caches a query result under its fingerprint with a
    /// completeness-aware TTL.
    pub fn set_query_result(
        &mut self,
        fingerprint: &str,
        item_keys: Vec<String>,
        context: &TtlContext,
        filter: Option<Vec<LocationRef>>,
        params: Option<Value>,
    ) -> Result<()> {
        self.queries
            .set_result(fingerprint, item_keys, context, filter, params)
    }

    /// Retrieves a query result, lazily dropping it when expired.
    pub fn get_query_result(&mut self, fingerprint: &str) -> Option<&QueryResult> {
        self.queries.get_result(fingerprint)
    }

    /// Checks for a live query result.
    pub fn has_query_result(&self, fingerprint: &str) -> bool {
        self.queries.has_result(fingerprint)
    }

    /// Drops every query result whose fingerprint matches the pattern
    /// (regex, substring fallback).
    pub fn invalidate_query_pattern(&mut self, pattern: &str) -> usize {
        self.queries.invalidate_pattern(pattern)
    }

    // == Location Invalidation ==
    /// Invalidates a location subtree.
    ///
    /// An empty path invalidates all primary (location-less) items, each
    /// with its exact query fan-out. A non-empty path removes the items
    /// under that prefix and then clears the entire query-result store:
    /// correctness over precision, since location-filtered results cannot
    /// be matched by membership alone.
    ///
    /// Returns the number of items removed.
    pub fn invalidate_location(&mut self, path: &[LocationRef]) -> usize {
        if path.is_empty() {
            let victims = self.items.primary_keys();
            for canonical in &victims {
                self.queries.invalidate_queries_containing_item(canonical);
                self.items.delete_canonical(canonical);
                self.events.emit(&CacheEvent::Deleted {
                    key: canonical.clone(),
                });
            }
            victims.len()
        } else {
            let victims = self.items.keys_under_location(path);
            for canonical in &victims {
                self.items.delete_canonical(canonical);
                self.events.emit(&CacheEvent::Deleted {
                    key: canonical.clone(),
                });
            }
            self.queries.clear();
            victims.len()
        }
    }

    // == Maintenance ==
    /// Removes expired entries from both layers, returning the combined
    /// count. A second immediate call reports zero.
    pub fn cleanup(&mut self) -> usize {
        self.items.cleanup() + self.queries.cleanup()
    }

    /// Drops everything from both layers. Idempotent.
    pub fn clear(&mut self) {
        self.items.clear();
        self.queries.clear();
    }

    /// Attaches the handle of a spawned periodic sweep so shutdown can
    /// stop it.
    pub fn attach_sweep(&mut self, handle: JoinHandle<()>) {
        self.items.map_mut().ttl_manager_mut().attach_sweep(handle);
    }

    /// Stops any attached periodic sweep. Idempotent.
    pub fn destroy(&mut self) {
        self.items.map_mut().ttl_manager_mut().destroy();
    }

    // == Events ==
    /// Registers a mutation listener.
    pub fn subscribe(
        &mut self,
        listener: impl Fn(&CacheEvent) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.events.subscribe(listener)
    }

    /// Registers a mutation listener with a per-subscription error hook.
    pub fn subscribe_with_error_hook(
        &mut self,
        listener: impl Fn(&CacheEvent) + Send + Sync + 'static,
        error_hook: impl Fn(&CacheEvent) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.events.subscribe_with_error_hook(listener, error_hook)
    }

    /// Removes a listener.
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        self.events.unsubscribe(handle)
    }

    /// Drops repeatedly failing listeners.
    pub fn prune_subscriptions(&mut self) -> usize {
        self.events.prune()
    }

    // == Diagnostics ==
    /// Per-layer size accounting.
    pub fn sizes(&self) -> LayerSizes {
        LayerSizes {
            item_count: self.items.len(),
            item_bytes: self.items.size_bytes(),
            query_count: self.queries.len(),
            query_bytes: self.queries.bookkeeping_bytes(),
        }
    }

    /// Entry-state breakdown of the item layer.
    pub fn entry_stats(&self) -> EntryStats {
        self.items.entry_stats()
    }

    /// Performance counters of the item layer.
    pub fn stats(&self) -> CacheStats {
        self.items.stats()
    }

    /// Active eviction policy name.
    pub fn eviction_policy(&self) -> &'static str {
        self.items.eviction_policy()
    }

    /// Capability flags of the storage backend.
    pub fn capabilities(&self) -> BackendCapabilities {
        self.items.capabilities()
    }
}
