//! LFU Eviction Strategy
//!
//! Evicts the entries with the smallest access frequency. Supports an
//! optional probabilistic mode backed by a count-min sketch with periodic
//! counter decay, for workloads where exact per-key counters over-weight
//! stale popularity.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::eviction::{select_by_rank, EvictionContext, EvictionStrategy};
use crate::metadata::{current_timestamp_ms, MetadataProvider};

// == Count-Min Sketch ==
const SKETCH_ROWS: usize = 4;

/// Fixed-size frequency sketch with periodic halving.
///
/// Estimates are upper bounds (min over rows). Halving every decay
/// interval ages out popularity that stopped being earned.
#[derive(Debug, Clone)]
struct CmSketch {
    width: usize,
    counters: Vec<u32>,
    decay_interval_ms: u64,
    last_decay_at: u64,
}

impl CmSketch {
    fn new(capacity_hint: usize, decay_interval_ms: u64) -> Self {
        let width = (capacity_hint.max(8) * 8).next_power_of_two();
        Self {
            width,
            counters: vec![0; width * SKETCH_ROWS],
            decay_interval_ms,
            last_decay_at: current_timestamp_ms(),
        }
    }

    fn index(&self, key: &str, row: usize) -> usize {
        let mut hasher = DefaultHasher::new();
        row.hash(&mut hasher);
        key.hash(&mut hasher);
        row * self.width + (hasher.finish() as usize & (self.width - 1))
    }

    fn increment(&mut self, key: &str) {
        for row in 0..SKETCH_ROWS {
            let idx = self.index(key, row);
            self.counters[idx] = self.counters[idx].saturating_add(1);
        }
    }

    fn estimate(&self, key: &str) -> u32 {
        (0..SKETCH_ROWS)
            .map(|row| self.counters[self.index(key, row)])
            .min()
            .unwrap_or(0)
    }

    fn maybe_decay(&mut self) {
        let now = current_timestamp_ms();
        if now.saturating_sub(self.last_decay_at) < self.decay_interval_ms {
            return;
        }
        for counter in &mut self.counters {
            *counter >>= 1;
        }
        self.last_decay_at = now;
    }
}

// == LFU Strategy ==
/// Least Frequently Used.
///
/// With `decay_interval_ms == 0` the strategy is deterministic and ranks
/// keys by the exact `access_count` in the provider's metadata. A positive
/// decay interval switches to the sketch, whose counters are halved every
/// interval.
#[derive(Debug, Clone)]
pub struct LfuStrategy {
    sketch: Option<CmSketch>,
}

impl LfuStrategy {
    /// Creates an LFU strategy; `decay_interval_ms = 0` selects the
    /// deterministic mode.
    pub fn new(capacity_hint: usize, decay_interval_ms: u64) -> Self {
        let sketch = if decay_interval_ms == 0 {
            None
        } else {
            Some(CmSketch::new(capacity_hint, decay_interval_ms))
        };
        Self { sketch }
    }
}

impl EvictionStrategy for LfuStrategy {
    fn select_for_eviction(
        &mut self,
        provider: &dyn MetadataProvider,
        context: &EvictionContext,
    ) -> Vec<String> {
        let overflow = match context.overflow() {
            Some(overflow) => overflow,
            None => return Vec::new(),
        };

        if let Some(sketch) = &mut self.sketch {
            sketch.maybe_decay();
        }

        match &self.sketch {
            Some(sketch) => {
                select_by_rank(provider, overflow, |meta| sketch.estimate(&meta.key) as i128)
            }
            None => select_by_rank(provider, overflow, |meta| meta.access_count as i128),
        }
    }

    fn on_item_added(&mut self, key: &str) {
        if let Some(sketch) = &mut self.sketch {
            sketch.maybe_decay();
            sketch.increment(key);
        }
    }

    fn on_item_accessed(&mut self, key: &str) {
        if let Some(sketch) = &mut self.sketch {
            sketch.maybe_decay();
            sketch.increment(key);
        }
    }

    fn on_item_removed(&mut self, _key: &str) {}

    fn name(&self) -> &'static str {
        "lfu"
    }

    fn box_clone(&self) -> Box<dyn EvictionStrategy> {
        Box::new(self.clone())
    }
}
