//! Key Module
//!
//! Hierarchical cache keys and the normalization layer that collapses
//! heterogeneous encodings of the same logical entity into one stable form.

mod normalizer;


// Re-export public types
pub use normalizer::{
    matches_location_filter, CacheKey, KeyNormalizer, KeyPart, LocationRef, MAX_KEY_DEPTH,
};
