//! Store Module
//!
//! The storage backend and the two cache layers built on top of it:
//! items on one side, query results on the other, composed by the
//! two-layer facade that keeps them consistent under writes.

mod item_cache;
mod map;
mod query_cache;
mod stats;
mod two_layer;

// Re-export public types
pub use item_cache::{EntryStats, ItemCache, RawEntry};
pub use map::{BackendCapabilities, CacheMap};
pub use query_cache::{QueryCache, QueryResult, QueryResultMetadata};
pub use stats::CacheStats;
pub use two_layer::{LayerSizes, TwoLayerCache};
