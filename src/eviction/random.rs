//! Random Eviction Strategy
//!
//! Evicts uniformly chosen entries.

use rand::seq::SliceRandom;
use rand::thread_rng;

use crate::eviction::{take_until_satisfied, EvictionContext, EvictionStrategy};
use crate::metadata::MetadataProvider;

// == Random Strategy ==
/// Uniform random eviction over the live entries.
///
/// Over many trials every entry must be selectable with non-negligible
/// probability, which a uniform shuffle guarantees.
#[derive(Debug, Clone, Default)]
pub struct RandomStrategy;

impl RandomStrategy {
    /// Creates a new random strategy.
    pub fn new() -> Self {
        Self
    }
}

impl EvictionStrategy for RandomStrategy {
    fn select_for_eviction(
        &mut self,
        provider: &dyn MetadataProvider,
        context: &EvictionContext,
    ) -> Vec<String> {
        let overflow = match context.overflow() {
            Some(overflow) => overflow,
            None => return Vec::new(),
        };

        let mut candidates: Vec<(String, usize)> = provider
            .all_metadata()
            .into_iter()
            .map(|(key, meta)| (key, meta.estimated_size_bytes))
            .collect();
        candidates.shuffle(&mut thread_rng());

        take_until_satisfied(candidates.into_iter(), overflow)
    }

    fn on_item_added(&mut self, _key: &str) {}

    fn on_item_accessed(&mut self, _key: &str) {}

    fn on_item_removed(&mut self, _key: &str) {}

    fn name(&self) -> &'static str {
        "random"
    }

    fn box_clone(&self) -> Box<dyn EvictionStrategy> {
        Box::new(self.clone())
    }
}
