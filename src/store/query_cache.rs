//! Query Cache Module
//!
//! The query-result layer: fingerprint → result-set store with
//! completeness-aware TTL and pattern invalidation. Keeping result TTLs
//! shorter for partial sets is the primary defense against serving a
//! filtered result long after its membership went stale.

use std::collections::HashMap;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::key::LocationRef;
use crate::metadata::current_timestamp_ms;
use crate::ttl::{TtlCalculator, TtlContext};

// == Query Result ==
/// Metadata recorded alongside a cached result set.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResultMetadata {
    /// The query type (e.g. collection name)
    pub query_type: String,
    /// Whether this is the complete, unfiltered result set
    pub is_complete: bool,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp, None = no expiration
    pub expires_at: Option<u64>,
    /// Location filter the query ran under, if any
    pub filter: Option<Vec<LocationRef>>,
    /// Opaque query parameters, if any
    pub params: Option<Value>,
}

/// A cached query result: ordered member keys plus metadata.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    /// Canonical keys of the member items, in result order
    pub item_keys: Vec<String>,
    /// Result metadata
    pub metadata: QueryResultMetadata,
}

impl QueryResult {
    /// Whether the result has passed its expiration.
    pub fn is_expired(&self) -> bool {
        match self.metadata.expires_at {
            Some(expires) => current_timestamp_ms() >= expires,
            None => false,
        }
    }

    /// Whether the result references the given canonical key.
    pub fn contains_item(&self, canonical_key: &str) -> bool {
        self.item_keys.iter().any(|k| k == canonical_key)
    }

    fn bookkeeping_bytes(&self) -> usize {
        let keys: usize = self.item_keys.iter().map(|k| k.len()).sum();
        let params = self
            .metadata
            .params
            .as_ref()
            .map(crate::metadata::estimate_size_bytes)
            .unwrap_or(0);
        keys + params
    }
}

// == Query Cache ==
/// Fingerprint → result-set store.
#[derive(Debug, Clone)]
pub struct QueryCache {
    results: HashMap<String, QueryResult>,
    calculator: TtlCalculator,
    bookkeeping_bytes: usize,
}

impl QueryCache {
    /// Creates a query cache using the given TTL policy.
    pub fn new(calculator: TtlCalculator) -> Self {
        Self {
            results: HashMap::new(),
            calculator,
            bookkeeping_bytes: 0,
        }
    }

    // == Set Result ==
    /// Caches a result set under its fingerprint.
    ///
    /// The TTL is resolved from the query context, so a complete result
    /// outlives an otherwise-identical partial one. Errors from an
    /// insufficient context propagate unchanged.
    pub fn set_result(
        &mut self,
        fingerprint: &str,
        item_keys: Vec<String>,
        context: &TtlContext,
        filter: Option<Vec<LocationRef>>,
        params: Option<Value>,
    ) -> Result<()> {
        let computed = self.calculator.compute(context)?;
        let now = current_timestamp_ms();

        let result = QueryResult {
            item_keys,
            metadata: QueryResultMetadata {
                query_type: context.query_type.clone().unwrap_or_default(),
                is_complete: context.is_complete.unwrap_or(false),
                created_at: now,
                expires_at: (computed.final_ttl_ms > 0).then(|| now + computed.final_ttl_ms),
                filter,
                params,
            },
        };

        self.remove(fingerprint);
        self.bookkeeping_bytes += result.bookkeeping_bytes();
        self.results.insert(fingerprint.to_string(), result);
        Ok(())
    }

    // == Get Result ==
    /// Retrieves a result, lazily dropping it when expired.
    pub fn get_result(&mut self, fingerprint: &str) -> Option<&QueryResult> {
        if self
            .results
            .get(fingerprint)
            .map(QueryResult::is_expired)
            .unwrap_or(false)
        {
            self.remove(fingerprint);
            return None;
        }
        self.results.get(fingerprint)
    }

    /// Checks for a live (non-expired) result without removing anything.
    pub fn has_result(&self, fingerprint: &str) -> bool {
        self.results
            .get(fingerprint)
            .map(|result| !result.is_expired())
            .unwrap_or(false)
    }

    // == Invalidation ==
    /// Drops one result. Returns false when absent.
    pub fn invalidate(&mut self, fingerprint: &str) -> bool {
        self.remove(fingerprint)
    }

    /// Drops every result whose fingerprint matches the pattern.
    ///
    /// The pattern is tried as a regex; an invalid regex falls back to
    /// substring matching instead of failing.
    pub fn invalidate_pattern(&mut self, pattern: &str) -> usize {
        let matching: Vec<String> = match Regex::new(pattern) {
            Ok(regex) => self
                .results
                .keys()
                .filter(|fp| regex.is_match(fp))
                .cloned()
                .collect(),
            Err(_) => {
                warn!(pattern, "invalid invalidation regex, using substring match");
                self.results
                    .keys()
                    .filter(|fp| fp.contains(pattern))
                    .cloned()
                    .collect()
            }
        };

        for fingerprint in &matching {
            self.remove(fingerprint);
        }
        matching.len()
    }

    /// Fingerprints of all results whose membership includes the key.
    pub fn find_queries_containing_item(&self, canonical_key: &str) -> Vec<String> {
        let mut fingerprints: Vec<String> = self
            .results
            .iter()
            .filter(|(_, result)| result.contains_item(canonical_key))
            .map(|(fp, _)| fp.clone())
            .collect();
        fingerprints.sort();
        fingerprints
    }

    /// Drops every result whose membership includes the key. This is the
    /// fan-out from one item mutation to the query layer.
    pub fn invalidate_queries_containing_item(&mut self, canonical_key: &str) -> usize {
        let fingerprints = self.find_queries_containing_item(canonical_key);
        let count = fingerprints.len();
        for fingerprint in fingerprints {
            self.remove(&fingerprint);
        }
        if count > 0 {
            debug!(key = %canonical_key, invalidated = count, "query fan-out invalidation");
        }
        count
    }

    // == Clear / Cleanup ==
    /// Drops every result. Idempotent.
    pub fn clear(&mut self) {
        self.results.clear();
        self.bookkeeping_bytes = 0;
    }

    /// Removes expired results, returning how many were removed.
    pub fn cleanup(&mut self) -> usize {
        let expired: Vec<String> = self
            .results
            .iter()
            .filter(|(_, result)| result.is_expired())
            .map(|(fp, _)| fp.clone())
            .collect();
        let count = expired.len();
        for fingerprint in expired {
            self.remove(&fingerprint);
        }
        count
    }

    // == Accessors ==
    /// Number of stored results, live or expired.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns true when no results are stored.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Bytes of query bookkeeping (member-key lists and params), tracked
    /// separately from item bytes.
    pub fn bookkeeping_bytes(&self) -> usize {
        self.bookkeeping_bytes
    }

    fn remove(&mut self, fingerprint: &str) -> bool {
        match self.results.remove(fingerprint) {
            Some(result) => {
                self.bookkeeping_bytes = self
                    .bookkeeping_bytes
                    .saturating_sub(result.bookkeeping_bytes());
                true
            }
            None => false,
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ttl::TtlCalculatorConfig;
    use serde_json::json;
    use std::thread::sleep;
    use std::time::Duration;

    fn cache() -> QueryCache {
        QueryCache::new(TtlCalculator::new(TtlCalculatorConfig::default()))
    }

    fn cache_with_ttls(complete_ms: u64, partial_ms: u64) -> QueryCache {
        QueryCache::new(TtlCalculator::new(TtlCalculatorConfig {
            default_complete_query_ttl_ms: Some(complete_ms),
            default_partial_query_ttl_ms: Some(partial_ms),
            ..TtlCalculatorConfig::default()
        }))
    }

    fn keys(ids: &[i64]) -> Vec<String> {
        ids.iter().map(|id| format!("p:user:{}", id)).collect()
    }

    #[test]
    fn test_query_set_and_get() {
        let mut queries = cache();
        queries
            .set_result(
                "all:users:{}",
                keys(&[1, 2]),
                &TtlContext::for_query("users", true),
                None,
                None,
            )
            .unwrap();

        let result = queries.get_result("all:users:{}").unwrap();
        assert_eq!(result.item_keys, keys(&[1, 2]));
        assert!(result.metadata.is_complete);
    }

    #[test]
    fn test_query_complete_outlives_partial() {
        let mut queries = cache();
        queries
            .set_result(
                "all:users:{}",
                keys(&[1]),
                &TtlContext::for_query("users", true),
                None,
                None,
            )
            .unwrap();
        queries
            .set_result(
                "facet:users:active",
                keys(&[1]),
                &TtlContext::for_query("users", false).with_facet("active"),
                None,
                None,
            )
            .unwrap();

        let complete = queries.get_result("all:users:{}").unwrap().metadata.clone();
        let partial = queries
            .get_result("facet:users:active")
            .unwrap()
            .metadata
            .clone();

        assert!(complete.expires_at.unwrap() > partial.expires_at.unwrap());
    }

    #[test]
    fn test_query_expired_result_is_lazily_dropped() {
        let mut queries = cache_with_ttls(10_000, 20);
        queries
            .set_result(
                "facet:users:active",
                keys(&[1]),
                &TtlContext::for_query("users", false),
                None,
                None,
            )
            .unwrap();

        assert!(queries.has_result("facet:users:active"));
        sleep(Duration::from_millis(40));

        assert!(!queries.has_result("facet:users:active"));
        assert!(queries.get_result("facet:users:active").is_none());
        assert_eq!(queries.len(), 0);
    }

    #[test]
    fn test_query_insufficient_context_propagates() {
        let mut queries = cache();
        let result = queries.set_result("bad", vec![], &TtlContext::default(), None, None);
        assert!(result.is_err());
    }

    #[test]
    fn test_query_invalidate_pattern_regex() {
        let mut queries = cache();
        for fp in ["all:users:{}", "facet:users:active", "all:orders:{}"] {
            queries
                .set_result(fp, keys(&[1]), &TtlContext::for_query("q", true), None, None)
                .unwrap();
        }

        let removed = queries.invalidate_pattern("^all:");
        assert_eq!(removed, 2);
        assert!(queries.has_result("facet:users:active"));
    }

    #[test]
    fn test_query_invalidate_pattern_falls_back_to_substring() {
        let mut queries = cache();
        queries
            .set_result(
                "facet:users:active[1",
                keys(&[1]),
                &TtlContext::for_query("q", true),
                None,
                None,
            )
            .unwrap();
        queries
            .set_result(
                "all:orders:{}",
                keys(&[1]),
                &TtlContext::for_query("q", true),
                None,
                None,
            )
            .unwrap();

        // "[1" is an invalid regex; substring matching still works.
        let removed = queries.invalidate_pattern("[1");
        assert_eq!(removed, 1);
        assert!(queries.has_result("all:orders:{}"));
    }

    #[test]
    fn test_query_membership_fan_out() {
        let mut queries = cache();
        queries
            .set_result(
                "q1",
                keys(&[1, 2]),
                &TtlContext::for_query("users", true),
                None,
                None,
            )
            .unwrap();
        queries
            .set_result(
                "q2",
                keys(&[2, 3]),
                &TtlContext::for_query("users", true),
                None,
                None,
            )
            .unwrap();

        assert_eq!(
            queries.find_queries_containing_item("p:user:1"),
            vec!["q1".to_string()]
        );

        let invalidated = queries.invalidate_queries_containing_item("p:user:2");
        assert_eq!(invalidated, 2);
        assert!(queries.is_empty());
    }

    #[test]
    fn test_query_clear_is_idempotent() {
        let mut queries = cache();
        queries
            .set_result(
                "q1",
                keys(&[1]),
                &TtlContext::for_query("users", true),
                None,
                Some(json!({"page": 1})),
            )
            .unwrap();
        assert!(queries.bookkeeping_bytes() > 0);

        queries.clear();
        queries.clear();
        assert!(queries.is_empty());
        assert_eq!(queries.bookkeeping_bytes(), 0);
    }

    #[test]
    fn test_query_cleanup_counts_expired() {
        let mut queries = cache_with_ttls(10_000, 20);
        queries
            .set_result(
                "short",
                keys(&[1]),
                &TtlContext::for_query("users", false),
                None,
                None,
            )
            .unwrap();
        queries
            .set_result(
                "long",
                keys(&[1]),
                &TtlContext::for_query("users", true),
                None,
                None,
            )
            .unwrap();
        sleep(Duration::from_millis(40));

        assert_eq!(queries.cleanup(), 1);
        assert_eq!(queries.cleanup(), 0);
        assert!(queries.has_result("long"));
    }

    #[test]
    fn test_query_bookkeeping_bytes_follow_membership() {
        let mut queries = cache();
        queries
            .set_result(
                "q1",
                keys(&[1, 2, 3]),
                &TtlContext::for_query("users", true),
                None,
                None,
            )
            .unwrap();
        let full = queries.bookkeeping_bytes();

        queries.invalidate("q1");
        assert_eq!(queries.bookkeeping_bytes(), full - keys(&[1, 2, 3]).iter().map(|k| k.len()).sum::<usize>());
    }
}
