//! FIFO Eviction Strategy
//!
//! Evicts the earliest-inserted entries, ignoring the access pattern.

use crate::eviction::{select_by_rank, EvictionContext, EvictionStrategy};
use crate::metadata::MetadataProvider;

// == FIFO Strategy ==
/// First In First Out: victims are the oldest insertions regardless of how
/// often or recently they were accessed.
#[derive(Debug, Clone, Default)]
pub struct FifoStrategy;

impl FifoStrategy {
    /// Creates a new FIFO strategy.
    pub fn new() -> Self {
        Self
    }
}

impl EvictionStrategy for FifoStrategy {
    fn select_for_eviction(
        &mut self,
        provider: &dyn MetadataProvider,
        context: &EvictionContext,
    ) -> Vec<String> {
        let overflow = match context.overflow() {
            Some(overflow) => overflow,
            None => return Vec::new(),
        };
        select_by_rank(provider, overflow, |meta| meta.added_at as i128)
    }

    fn on_item_added(&mut self, _key: &str) {}

    fn on_item_accessed(&mut self, _key: &str) {}

    fn on_item_removed(&mut self, _key: &str) {}

    fn name(&self) -> &'static str {
        "fifo"
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
    fn test_fifo_evicts_earliest_inserted() {
        let mut provider = MapProvider::with_max_items(3);
        provider.seed("a", 100, 900, 50, 10);
        provider.seed("b", 50, 999, 99, 10);
        provider.seed("c", 200, 100, 1, 10);

        let mut strategy = FifoStrategy::new();
        let victims = strategy.select_for_eviction(&provider, &provider.context(10));

        // "b" was inserted first; its heavy recent access is irrelevant.
        assert_eq!(victims, vec!["b".to_string()]);
    }

    #[test]
    fn test_fifo_no_eviction_under_capacity() {
        let mut provider = MapProvider::with_max_items(10);
        provider.seed("a", 0, 0, 0, 10);

        let mut strategy = FifoStrategy::new();
        let victims = strategy.select_for_eviction(&provider, &provider.context(10));

        assert!(victims.is_empty());
    }
}
