//! 2Q Eviction Strategy
//!
//! Two-queue policy: new entries are probationary, a re-access before
//! eviction promotes to the hot queue, and a ghost queue turns a fast
//! re-insertion of a recently evicted key into a promotion.

use tracing::debug;

use crate::eviction::{select_by_rank, EvictionContext, EvictionStrategy, KeyList};
use crate::metadata::MetadataProvider;

// == Two Queue Strategy ==
/// TwoQueue (2Q).
///
/// `recent` is a probationary FIFO holding first-time keys; `hot` is an
/// LRU of keys that earned a second access. Eviction drains `recent`
/// first. Keys evicted from probation are remembered in the bounded
/// `ghost` queue; re-inserting a ghosted key goes straight to `hot`.
#[derive(Debug, Clone)]
pub struct TwoQueueStrategy {
    ghost_capacity: usize,
    /// Probationary FIFO of first-time keys
    recent: KeyList,
    /// Hot LRU of re-accessed keys
    hot: KeyList,
    /// Ghosts of keys evicted from probation
    ghost: KeyList,
}

impl TwoQueueStrategy {
    /// Creates a 2Q strategy. The ghost queue defaults to the main
    /// capacity when no override is given.
    pub fn new(capacity_hint: usize, ghost_capacity: Option<usize>) -> Self {
        Self {
            ghost_capacity: ghost_capacity.unwrap_or(capacity_hint.max(1)).max(1),
            recent: KeyList::new(),
            hot: KeyList::new(),
            ghost: KeyList::new(),
        }
    }

    /// Pops the next victim: probationary keys first, then hot LRU.
    fn next_victim(&mut self) -> Option<String> {
        if let Some(victim) = self.recent.pop_oldest() {
            self.ghost.touch(&victim);
            self.ghost.truncate_to(self.ghost_capacity);
            return Some(victim);
        }
        self.hot.pop_oldest()
    }

    /// Number of probationary slots currently in use.
    pub fn probationary_len(&self) -> usize {
        self.recent.len()
    }
}

impl EvictionStrategy for TwoQueueStrategy {
    fn select_for_eviction(
        &mut self,
        provider: &dyn MetadataProvider,
        context: &EvictionContext,
    ) -> Vec<String> {
        let overflow = match context.overflow() {
            Some(overflow) => overflow,
            None => return Vec::new(),
        };

        let mut victims = Vec::new();
        let mut items_freed = 0usize;
        let mut bytes_freed = 0usize;

        while items_freed < overflow.items || bytes_freed < overflow.bytes {
            let victim = match self.next_victim() {
                Some(victim) => victim,
                None => break,
            };
            let size = match provider.get_metadata(&victim) {
                Some(meta) => meta.estimated_size_bytes,
                None => continue,
            };
            items_freed += 1;
            bytes_freed += size;
            victims.push(victim);
        }

        // Untracked keys remain evictable via recency ranking.
        if items_freed < overflow.items || bytes_freed < overflow.bytes {
            let remainder = super::Overflow {
                items: overflow.items.saturating_sub(items_freed),
                bytes: overflow.bytes.saturating_sub(bytes_freed),
            };
            let extra = select_by_rank(provider, remainder, |meta| meta.last_accessed_at as i128);
            for key in extra {
                if !victims.contains(&key) {
                    victims.push(key);
                }
            }
        }

        debug!(victims = victims.len(), "2q eviction decision");
        victims
    }

    fn on_item_added(&mut self, key: &str) {
        if self.ghost.contains(key) {
            // Fast re-insertion of a recently evicted key is a promotion.
            self.ghost.remove(key);
            self.hot.touch(key);
        } else if self.hot.contains(key) {
            self.hot.touch(key);
        } else {
            self.recent.touch(key);
        }
    }

    fn on_item_accessed(&mut self, key: &str) {
        if self.recent.contains(key) {
            // Re-access before eviction promotes out of probation.
            self.recent.remove(key);
            self.hot.touch(key);
        } else if self.hot.contains(key) {
            self.hot.touch(key);
        }
    }

    fn on_item_removed(&mut self, key: &str) {
        self.recent.remove(key);
        self.hot.remove(key);
    }

    fn name(&self) -> &'static str {
        "two-queue"
    }

    fn box_clone(&self) -> Box<dyn EvictionStrategy> {
        Box::new(self.clone())
    }
}
