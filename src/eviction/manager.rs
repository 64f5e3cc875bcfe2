//! Eviction Manager Module
//!
//! Thin ownership wrapper around exactly one configured strategy.

use crate::error::Result;
use crate::eviction::{create_strategy, EvictionContext, EvictionStrategy, StrategyConfig};
use crate::metadata::MetadataProvider;

// == Eviction Manager ==
/// Owns one strategy instance and delegates to it.
///
/// Holds no eviction state of its own; the enabled flag and policy name
/// exist for diagnostics and for switching eviction off without tearing
/// the store down.
#[derive(Clone)]
pub struct EvictionManager {
    strategy: Box<dyn EvictionStrategy>,
    enabled: bool,
}

impl EvictionManager {
    /// Builds a manager for the named policy.
    ///
    /// Unknown policy names fail fast with a configuration error.
    pub fn new(policy: &str, capacity_hint: usize, config: &StrategyConfig) -> Result<Self> {
        Ok(Self {
            strategy: create_strategy(policy, capacity_hint, config)?,
            enabled: true,
        })
    }

    /// Active policy name.
    pub fn policy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Whether eviction currently runs.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables or disables eviction.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Delegates victim selection; disabled managers select nothing.
    pub fn select_for_eviction(
        &mut self,
        provider: &dyn MetadataProvider,
        context: &EvictionContext,
    ) -> Vec<String> {
        if !self.enabled {
            return Vec::new();
        }
        self.strategy.select_for_eviction(provider, context)
    }

    /// Forwards an insertion to the strategy.
    pub fn on_item_added(&mut self, key: &str) {
        self.strategy.on_item_added(key);
    }

    /// Forwards an access to the strategy.
    pub fn on_item_accessed(&mut self, key: &str) {
        self.strategy.on_item_accessed(key);
    }

    /// Forwards a removal to the strategy.
    pub fn on_item_removed(&mut self, key: &str) {
        self.strategy.on_item_removed(key);
    }
}

impl std::fmt::Debug for EvictionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvictionManager")
            .field("policy", &self.policy_name())
            .field("enabled", &self.enabled)
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crate::eviction::testing::MapProvider;

    #[test]
    fn test_manager_reports_policy_name() {
        let manager = EvictionManager::new("fifo", 16, &StrategyConfig::default()).unwrap();
        assert_eq!(manager.policy_name(), "fifo");
        assert!(manager.is_enabled());
    }

    #[test]
    fn test_manager_unknown_policy_fails() {
        let result = EvictionManager::new("nope", 16, &StrategyConfig::default());
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }

    #[test]
    fn test_disabled_manager_selects_nothing() {
        let mut provider = MapProvider::with_max_items(1);
        provider.seed("a", 0, 0, 0, 10);
        provider.seed("b", 1, 1, 0, 10);

        let mut manager = EvictionManager::new("lru", 16, &StrategyConfig::default()).unwrap();
        manager.set_enabled(false);

        let victims = manager.select_for_eviction(&provider, &provider.context(10));
        assert!(victims.is_empty());
    }

    #[test]
    fn test_enabled_manager_delegates() {
        let mut provider = MapProvider::with_max_items(2);
        provider.seed("old", 0, 0, 0, 10);
        provider.seed("new", 1, 100, 0, 10);

        let mut manager = EvictionManager::new("lru", 16, &StrategyConfig::default()).unwrap();
        let victims = manager.select_for_eviction(&provider, &provider.context(10));

        assert_eq!(victims, vec!["old".to_string()]);
    }
}
