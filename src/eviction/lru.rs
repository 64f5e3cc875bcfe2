//! LRU Eviction Strategy
//!
//! Evicts the entries with the smallest last-access timestamp first.

use crate::eviction::{select_by_rank, EvictionContext, EvictionStrategy};
use crate::metadata::MetadataProvider;

// == LRU Strategy ==
/// Least Recently Used: victims are the keys touched longest ago.
///
/// Stateless; recency is read from the provider's metadata at decision
/// time, so the lifecycle hooks are no-ops.
#[derive(Debug, Clone, Default)]
pub struct LruStrategy;

impl LruStrategy {
    /// Creates a new LRU strategy.
    pub fn new() -> Self {
        Self
    }
}

impl EvictionStrategy for LruStrategy {
    fn select_for_eviction(
        &mut self,
        provider: &dyn MetadataProvider,
        context: &EvictionContext,
    ) -> Vec<String> {
        let overflow = match context.overflow() {
            Some(overflow) => overflow,
            None => return Vec::new(),
        };
        select_by_rank(provider, overflow, |meta| meta.last_accessed_at as i128)
    }

    fn on_item_added(&mut self, _key: &str) {}

    fn on_item_accessed(&mut self, _key: &str) {}

    fn on_item_removed(&mut self, _key: &str) {}

    fn name(&self) -> &'static str {
        "lru"
    }

    fn box_clone(&self) -> Box<dyn EvictionStrategy> {
        Box::new(self.clone())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::eviction::testing::MapProvider;

    #[test]
    fn test_lru_evicts_least_recently_accessed() {
        let mut provider = MapProvider::with_max_items(3);
        provider.seed("a", 0, 300, 5, 10);
        provider.seed("b", 0, 100, 5, 10);
        provider.seed("c", 0, 200, 5, 10);

        let mut strategy = LruStrategy::new();
        let victims = strategy.select_for_eviction(&provider, &provider.context(10));

        assert_eq!(victims, vec!["b".to_string()]);
    }

    #[test]
    fn test_lru_no_eviction_under_capacity() {
        let mut provider = MapProvider::with_max_items(10);
        provider.seed("a", 0, 100, 1, 10);

        let mut strategy = LruStrategy::new();
        let victims = strategy.select_for_eviction(&provider, &provider.context(10));

        assert!(victims.is_empty());
    }

    #[test]
    fn test_lru_empty_store_returns_empty() {
        let provider = MapProvider::with_max_items(0);

        let mut strategy = LruStrategy::new();
        let victims = strategy.select_for_eviction(&provider, &provider.context(1));

        assert!(victims.is_empty());
    }
}
