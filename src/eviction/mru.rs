//! MRU Eviction Strategy
//!
//! Evicts the entries with the largest last-access timestamp first.

use crate::eviction::{select_by_rank, EvictionContext, EvictionStrategy};
use crate::metadata::MetadataProvider;

// == MRU Strategy ==
/// Most Recently Used: victims are the keys touched most recently.
///
/// Useful for scan-heavy workloads where freshly touched keys are the
/// least likely to be needed again.
#[derive(Debug, Clone, Default)]
pub struct MruStrategy;

impl MruStrategy {
    /// Creates a new MRU strategy.
    pub fn new() -> Self {
        Self
    }
}

impl EvictionStrategy for MruStrategy {
    fn select_for_eviction(
        &mut self,
        provider: &dyn MetadataProvider,
        context: &EvictionContext,
    ) -> Vec<String> {
        let overflow = match context.overflow() {
            Some(overflow) => overflow,
            None => return Vec::new(),
        };
        // Negate so the most recent access ranks lowest.
        select_by_rank(provider, overflow, |meta| -(meta.last_accessed_at as i128))
    }

    fn on_item_added(&mut self, _key: &str) {}

    fn on_item_accessed(&mut self, _key: &str) {}

    fn on_item_removed(&mut self, _key: &str) {}

    fn name(&self) -> &'static str {
        "mru"
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
    fn test_mru_evicts_most_recently_accessed() {
        let mut provider = MapProvider::with_max_items(3);
        provider.seed("a", 0, 300, 5, 10);
        provider.seed("b", 0, 100, 5, 10);
        provider.seed("c", 0, 200, 5, 10);

        let mut strategy = MruStrategy::new();
        let victims = strategy.select_for_eviction(&provider, &provider.context(10));

        assert_eq!(victims, vec!["a".to_string()]);
    }

    #[test]
    fn test_mru_no_eviction_under_capacity() {
        let mut provider = MapProvider::with_max_items(10);
        provider.seed("a", 0, 100, 1, 10);

        let mut strategy = MruStrategy::new();
        let victims = strategy.select_for_eviction(&provider, &provider.context(10));

        assert!(victims.is_empty());
    }
}
