//! TTL Module
//!
//! Staleness policy: a pure calculator resolving effective TTLs from
//! context (with time-of-day sensitivity), and a manager that tracks
//! per-key expiration through the injected metadata provider.

mod calculator;
mod manager;

// Re-export public types
pub use calculator::{
    adaptive_ttl_scale, PeakHours, TtlAdjustments, TtlCalculator, TtlCalculatorConfig,
    TtlComputation, TtlContext,
};
pub use manager::{TtlManager, TtlManagerConfig};
