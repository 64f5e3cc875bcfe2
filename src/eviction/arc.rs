//! ARC Eviction Strategy
//!
//! Adaptive Replacement Cache (Megiddo & Modha): two real lists split
//! between recency and frequency, two bounded ghost lists of recently
//! evicted keys, and an adaptive target that shifts the split toward
//! whichever ghost list is being re-hit.

use tracing::debug;

use crate::eviction::{select_by_rank, EvictionContext, EvictionStrategy, KeyList};
use crate::metadata::MetadataProvider;

// == ARC Strategy ==
/// Adaptive Replacement Cache.
///
/// New keys enter the recency list `t1`; a second access promotes a key to
/// the frequency list `t2`. Evicted keys are remembered (keys only) in the
/// ghost lists `b1`/`b2`; re-inserting a ghosted key adapts the target
/// split `p` toward the list that proved valuable. Ghost lists are bounded
/// at the main capacity.
#[derive(Debug, Clone)]
pub struct ArcStrategy {
    capacity: usize,
    ghost_capacity: usize,
    /// Recency list (seen exactly once)
    t1: KeyList,
    /// Frequency list (seen at least twice)
    t2: KeyList,
    /// Ghosts of keys evicted from t1
    b1: KeyList,
    /// Ghosts of keys evicted from t2
    b2: KeyList,
    /// Adaptive target size for t1
    p: usize,
}

impl ArcStrategy {
    /// Creates an ARC strategy. The ghost lists default to the main
    /// capacity when no override is given.
    pub fn new(capacity_hint: usize, ghost_capacity: Option<usize>) -> Self {
        let capacity = capacity_hint.max(1);
        Self {
            capacity,
            ghost_capacity: ghost_capacity.unwrap_or(capacity).max(1),
            t1: KeyList::new(),
            t2: KeyList::new(),
            b1: KeyList::new(),
            b2: KeyList::new(),
            p: 0,
        }
    }

    /// Pops the next victim according to the adaptive split.
    fn next_victim(&mut self) -> Option<String> {
        let prefer_t1 = self.t1.len() > 0 && (self.t1.len() > self.p || self.t2.len() == 0);
        if prefer_t1 {
            let victim = self.t1.pop_oldest()?;
            self.b1.touch(&victim);
            self.b1.truncate_to(self.ghost_capacity);
            Some(victim)
        } else if self.t2.len() > 0 {
            let victim = self.t2.pop_oldest()?;
            self.b2.touch(&victim);
            self.b2.truncate_to(self.ghost_capacity);
            Some(victim)
        } else if self.t1.len() > 0 {
            let victim = self.t1.pop_oldest()?;
            self.b1.touch(&victim);
            self.b1.truncate_to(self.ghost_capacity);
            Some(victim)
        } else {
            None
        }
    }
}

impl EvictionStrategy for ArcStrategy {
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
            // A key the store no longer tracks frees nothing.
            let size = match provider.get_metadata(&victim) {
                Some(meta) => meta.estimated_size_bytes,
                None => continue,
            };
            items_freed += 1;
            bytes_freed += size;
            victims.push(victim);
        }

        // Keys the lists never saw (e.g. metadata seeded out of band) are
        // still evictable; fall back to recency ranking for the remainder.
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

        debug!(victims = victims.len(), p = self.p, "arc eviction decision");
        victims
    }

    fn on_item_added(&mut self, key: &str) {
        if self.b1.contains(key) {
            // Recency ghost hit: grow the recency target.
            let delta = (self.b2.len() / self.b1.len().max(1)).max(1);
            self.p = (self.p + delta).min(self.capacity);
            self.b1.remove(key);
            self.t2.touch(key);
        } else if self.b2.contains(key) {
            // Frequency ghost hit: shrink the recency target.
            let delta = (self.b1.len() / self.b2.len().max(1)).max(1);
            self.p = self.p.saturating_sub(delta);
            self.b2.remove(key);
            self.t2.touch(key);
        } else {
            self.t1.touch(key);
        }
    }

    fn on_item_accessed(&mut self, key: &str) {
        if self.t1.contains(key) {
            // Second access promotes from recency to frequency.
            self.t1.remove(key);
            self.t2.touch(key);
        } else if self.t2.contains(key) {
            self.t2.touch(key);
        }
    }

    fn on_item_removed(&mut self, key: &str) {
        // External removal; ghosts only remember evictions.
        self.t1.remove(key);
        self.t2.remove(key);
    }

    fn name(&self) -> &'static str {
        "arc"
    }

    fn box_clone(&self) -> Box<dyn EvictionStrategy> {
        Box::new(self.clone())
    }
}
