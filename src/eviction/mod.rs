//! Eviction Module
//!
//! Pluggable eviction policies. Each strategy selects victim keys from the
//! per-key metadata exposed by the storage backend; the backend itself
//! performs the deletions.

mod arc;
mod fifo;
mod lfu;
mod lru;
mod manager;
mod mru;
mod random;
mod two_queue;

// Re-export public types
pub use arc::ArcStrategy;
pub use fifo::FifoStrategy;
pub use lfu::LfuStrategy;
pub use lru::LruStrategy;
pub use manager::EvictionManager;
pub use mru::MruStrategy;
pub use random::RandomStrategy;
pub use two_queue::TwoQueueStrategy;

use std::collections::VecDeque;

use crate::error::{CacheError, Result};
use crate::metadata::{CacheItemMetadata, MetadataProvider, SizeInfo, SizeLimits};

// == Eviction Context ==
/// Capacity snapshot handed to a strategy at decision time.
#[derive(Debug, Clone, Copy)]
pub struct EvictionContext {
    /// Current occupancy of the store
    pub current_size: SizeInfo,
    /// Configured capacity limits
    pub limits: SizeLimits,
    /// Estimated size of the item about to be inserted
    pub new_item_size: usize,
}

/// How much must be freed to admit the pending item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow {
    /// Item slots that must be freed
    pub items: usize,
    /// Bytes that must be freed
    pub bytes: usize,
}

impl EvictionContext {
    /// Returns the overflow the pending insert would cause, or None when
    /// the store has room. Strategies run only on Some.
    pub fn overflow(&self) -> Option<Overflow> {
        let items = match self.limits.max_items {
            Some(max) => (self.current_size.item_count + 1).saturating_sub(max),
            None => 0,
        };
        let bytes = match self.limits.max_size_bytes {
            Some(max) => (self.current_size.size_bytes + self.new_item_size).saturating_sub(max),
            None => 0,
        };
        if items == 0 && bytes == 0 {
            None
        } else {
            Some(Overflow { items, bytes })
        }
    }
}

// == Eviction Strategy Contract ==
/// Common contract for all eviction policies.
///
/// `select_for_eviction` never errors: when nothing qualifies it returns an
/// empty list. Lifecycle hooks keep stateful strategies (ARC, 2Q, LFU
/// sketch) in sync with the store; stateless strategies ignore them.
pub trait EvictionStrategy: Send + Sync {
    /// Selects victim keys sufficient to relieve the context's overflow.
    fn select_for_eviction(
        &mut self,
        provider: &dyn MetadataProvider,
        context: &EvictionContext,
    ) -> Vec<String>;

    /// Notifies the strategy that a key was inserted.
    fn on_item_added(&mut self, key: &str);

    /// Notifies the strategy that a key was read.
    fn on_item_accessed(&mut self, key: &str);

    /// Notifies the strategy that a key was removed (delete or expiry).
    fn on_item_removed(&mut self, key: &str);

    /// Policy name for diagnostics.
    fn name(&self) -> &'static str;

    /// Clones the strategy behind its trait object, so that owning caches
    /// can be cloned into independent copies.
    fn box_clone(&self) -> Box<dyn EvictionStrategy>;
}

impl Clone for Box<dyn EvictionStrategy> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

// == Factory ==
/// Optional per-strategy tuning knobs.
#[derive(Debug, Clone, Default)]
pub struct StrategyConfig {
    /// LFU: enable the probabilistic sketch with this decay interval in
    /// milliseconds. 0 keeps the deterministic per-key counters.
    pub lfu_decay_interval_ms: u64,
    /// ARC/2Q ghost list capacity. Defaults to the main capacity.
    pub ghost_capacity: Option<usize>,
}

/// Constructs a strategy by policy name.
///
/// Unknown names are a fatal configuration error, reported immediately.
pub fn create_strategy(
    policy: &str,
    capacity_hint: usize,
    config: &StrategyConfig,
) -> Result<Box<dyn EvictionStrategy>> {
    match policy {
        "lru" => Ok(Box::new(LruStrategy::new())),
        "mru" => Ok(Box::new(MruStrategy::new())),
        "lfu" => Ok(Box::new(LfuStrategy::new(
            capacity_hint,
            config.lfu_decay_interval_ms,
        ))),
        "fifo" => Ok(Box::new(FifoStrategy::new())),
        "random" => Ok(Box::new(RandomStrategy::new())),
        "arc" => Ok(Box::new(ArcStrategy::new(
            capacity_hint,
            config.ghost_capacity,
        ))),
        "two-queue" | "2q" => Ok(Box::new(TwoQueueStrategy::new(
            capacity_hint,
            config.ghost_capacity,
        ))),
        other => Err(CacheError::Configuration(format!(
            "unknown eviction policy: {}",
            other
        ))),
    }
}

// == Rank Selection Helper ==
/// Selects victims by sorting live metadata on a rank value and taking the
/// lowest-ranked entries until the overflow is relieved.
///
/// Shared by the metadata-driven strategies (LRU, MRU, LFU, FIFO).
pub(crate) fn select_by_rank(
    provider: &dyn MetadataProvider,
    overflow: Overflow,
    rank: impl Fn(&CacheItemMetadata) -> i128,
) -> Vec<String> {
    let mut ranked: Vec<(i128, String, usize)> = provider
        .all_metadata()
        .into_iter()
        .map(|(key, meta)| (rank(&meta), key, meta.estimated_size_bytes))
        .collect();
    ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    take_until_satisfied(ranked.into_iter().map(|(_, key, size)| (key, size)), overflow)
}

/// Drains candidates in order until both the item and byte overflow are
/// covered, returning the selected keys.
pub(crate) fn take_until_satisfied(
    candidates: impl Iterator<Item = (String, usize)>,
    overflow: Overflow,
) -> Vec<String> {
    let mut victims = Vec::new();
    let mut items_freed = 0usize;
    let mut bytes_freed = 0usize;

    for (key, size) in candidates {
        if items_freed >= overflow.items && bytes_freed >= overflow.bytes {
            break;
        }
        items_freed += 1;
        bytes_freed += size;
        victims.push(key);
    }

    victims
}

// == Key List ==
/// Access-ordered key list used by the queue-based strategies.
///
/// Keys are stored in a VecDeque where:
/// - Front = Most recently used
/// - Back = Least recently used
#[derive(Debug, Default, Clone)]
pub(crate) struct KeyList {
    order: VecDeque<String>,
}

impl KeyList {
    /// Creates a new empty list.
    pub(crate) fn new() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }

    /// Marks a key as recently used (moves to front).
    pub(crate) fn touch(&mut self, key: &str) {
        self.remove(key);
        self.order.push_front(key.to_string());
    }

    /// Removes a key from the list.
    pub(crate) fn remove(&mut self, key: &str) {
        self.order.retain(|k| k != key);
    }

    /// Returns and removes the least recently used key.
    pub(crate) fn pop_oldest(&mut self) -> Option<String> {
        self.order.pop_back()
    }

    /// Checks if a key is present.
    pub(crate) fn contains(&self, key: &str) -> bool {
        self.order.iter().any(|k| k == key)
    }

    /// Returns the number of tracked keys.
    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    /// Drops keys from the least-recent side until at most `cap` remain.
    pub(crate) fn truncate_to(&mut self, cap: usize) {
        while self.order.len() > cap {
            self.order.pop_back();
        }
    }
}


// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn context(count: usize, max_items: usize) -> EvictionContext {
        EvictionContext {
            current_size: SizeInfo {
                item_count: count,
                size_bytes: 0,
            },
            limits: SizeLimits {
                max_items: Some(max_items),
                max_size_bytes: None,
            },
            new_item_size: 0,
        }
    }

    #[test]
    fn test_overflow_none_when_under_capacity() {
        assert_eq!(context(1, 3).overflow(), None);
    }

    #[test]
    fn test_overflow_counts_pending_insert() {
        // 3 items at max 3: inserting a 4th overflows by one.
        assert_eq!(
            context(3, 3).overflow(),
            Some(Overflow { items: 1, bytes: 0 })
        );
    }

    #[test]
    fn test_overflow_bytes() {
        let ctx = EvictionContext {
            current_size: SizeInfo {
                item_count: 1,
                size_bytes: 900,
            },
            limits: SizeLimits {
                max_items: None,
                max_size_bytes: Some(1000),
            },
            new_item_size: 200,
        };

        assert_eq!(ctx.overflow(), Some(Overflow { items: 0, bytes: 100 }));
    }

    #[test]
    fn test_factory_unknown_policy_is_configuration_error() {
        let result = create_strategy("lfru", 16, &StrategyConfig::default());
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }

    #[test]
    fn test_factory_known_policies() {
        for policy in ["lru", "mru", "lfu", "fifo", "random", "arc", "two-queue"] {
            let strategy = create_strategy(policy, 16, &StrategyConfig::default());
            assert!(strategy.is_ok(), "policy {} should construct", policy);
        }
    }

    #[test]
    fn test_take_until_satisfied_stops_early() {
        let candidates = vec![
            ("a".to_string(), 10),
            ("b".to_string(), 10),
            ("c".to_string(), 10),
        ];
        let victims =
            take_until_satisfied(candidates.into_iter(), Overflow { items: 1, bytes: 0 });

        assert_eq!(victims, vec!["a".to_string()]);
    }

    #[test]
    fn test_take_until_satisfied_covers_bytes() {
        let candidates = vec![
            ("a".to_string(), 10),
            ("b".to_string(), 10),
            ("c".to_string(), 10),
        ];
        let victims =
            take_until_satisfied(candidates.into_iter(), Overflow { items: 0, bytes: 15 });

        assert_eq!(victims.len(), 2);
    }

    #[test]
    fn test_key_list_touch_moves_to_front() {
        let mut list = KeyList::new();
        list.touch("a");
        list.touch("b");
        list.touch("a");

        assert_eq!(list.pop_oldest(), Some("b".to_string()));
        assert_eq!(list.pop_oldest(), Some("a".to_string()));
    }

    #[test]
    fn test_key_list_truncate_drops_oldest() {
        let mut list = KeyList::new();
        list.touch("a");
        list.touch("b");
        list.touch("c");
        list.truncate_to(2);

        assert_eq!(list.len(), 2);
        assert!(!list.contains("a"));
    }
}
