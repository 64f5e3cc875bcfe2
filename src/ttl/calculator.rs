//! TTL Calculator Module
//!
//! Pure TTL resolution: no clocks are read except the hour used for the
//! peak window, and that is injectable for testing.

use std::collections::HashMap;

use chrono::Timelike;
use serde::Serialize;

use crate::error::{CacheError, Result};

/// Staleness threshold as a fraction of the effective TTL. Crossing it
/// signals stale-while-revalidate rather than a hard miss.
const STALE_FRACTION_NUM: u64 = 4;
const STALE_FRACTION_DEN: u64 = 5;

// == Peak Hours ==
/// A `[start, end)` local-hour window during which TTLs are scaled.
///
/// Wrap-around windows (e.g. 22..6) are supported.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PeakHours {
    /// First hour inside the window (0-23)
    pub start_hour: u32,
    /// First hour outside the window (0-23)
    pub end_hour: u32,
    /// Multiplier applied to the base TTL inside the window
    pub multiplier: f64,
}

impl PeakHours {
    /// Checks whether the given hour falls inside the window.
    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

// == Calculator Config ==
/// TTL policy configuration.
///
/// Base-TTL resolution order: type-specific override, then category
/// default, then facet-specific override (queries only).
#[derive(Debug, Clone)]
pub struct TtlCalculatorConfig {
    /// Category default for items
    pub default_item_ttl_ms: Option<u64>,
    /// Category default for complete query results
    pub default_complete_query_ttl_ms: Option<u64>,
    /// Category default for faceted/partial query results
    pub default_partial_query_ttl_ms: Option<u64>,
    /// Per item-type overrides
    pub item_ttl_overrides: HashMap<String, u64>,
    /// Per query-type overrides
    pub query_ttl_overrides: HashMap<String, u64>,
    /// Per facet overrides, consulted for queries when nothing above matched
    pub facet_ttl_overrides: HashMap<String, u64>,
    /// Optional peak-hour adjustment window
    pub peak_hours: Option<PeakHours>,
    /// Last-resort TTL when no override or default resolves
    pub fallback_ttl_ms: u64,
}

impl Default for TtlCalculatorConfig {
    fn default() -> Self {
        Self {
            default_item_ttl_ms: Some(300_000),
            default_complete_query_ttl_ms: Some(300_000),
            default_partial_query_ttl_ms: Some(60_000),
            item_ttl_overrides: HashMap::new(),
            query_ttl_overrides: HashMap::new(),
            facet_ttl_overrides: HashMap::new(),
            peak_hours: None,
            fallback_ttl_ms: 60_000,
        }
    }
}

// == Calculation Context ==
/// What is being cached; either an item type or a query type with its
/// completeness must be supplied.
#[derive(Debug, Clone, Default)]
pub struct TtlContext {
    /// Item type, for item writes
    pub item_type: Option<String>,
    /// Query type, for query-result writes
    pub query_type: Option<String>,
    /// Whether the query result is the complete set
    pub is_complete: Option<bool>,
    /// Facet name for filtered/partial queries
    pub facet: Option<String>,
}

impl TtlContext {
    /// Context for an item write.
    pub fn for_item(item_type: impl Into<String>) -> Self {
        Self {
            item_type: Some(item_type.into()),
            ..Self::default()
        }
    }

    /// Context for a query-result write.
    pub fn for_query(query_type: impl Into<String>, is_complete: bool) -> Self {
        Self {
            query_type: Some(query_type.into()),
            is_complete: Some(is_complete),
            ..Self::default()
        }
    }

    /// Adds a facet to a query context.
    pub fn with_facet(mut self, facet: impl Into<String>) -> Self {
        self.facet = Some(facet.into());
        self
    }
}

// == Computation Result ==
/// Observability record of what was applied.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TtlAdjustments {
    /// Whether the peak-hour multiplier was applied
    pub peak_applied: bool,
    /// The multiplier that was (or would have been) applied
    pub peak_multiplier: f64,
}

/// Output of one TTL computation.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TtlComputation {
    /// Resolved base TTL in milliseconds
    pub base_ttl_ms: u64,
    /// Effective TTL after adjustments
    pub final_ttl_ms: u64,
    /// Staleness threshold (80% of the effective TTL)
    pub stale_threshold_ms: u64,
    /// What was applied and why
    pub adjustments: TtlAdjustments,
}

// == TTL Calculator ==
/// Pure function object computing TTLs from context.
#[derive(Debug, Clone, Default)]
pub struct TtlCalculator {
    config: TtlCalculatorConfig,
}

impl TtlCalculator {
    /// Creates a calculator with the given policy.
    pub fn new(config: TtlCalculatorConfig) -> Self {
        Self { config }
    }

    /// Computes the TTL for the current local hour.
    pub fn compute(&self, context: &TtlContext) -> Result<TtlComputation> {
        self.compute_at(context, chrono::Local::now().hour())
    }

    /// Computes the TTL as of the given local hour.
    ///
    /// Fails fast when the caller supplies neither an item type nor a
    /// query type with completeness.
    pub fn compute_at(&self, context: &TtlContext, hour: u32) -> Result<TtlComputation> {
        let base_ttl_ms = self.resolve_base(context)?;

        let (final_ttl_ms, adjustments) = match self.config.peak_hours {
            Some(peak) if peak.contains(hour) => (
                scale(base_ttl_ms, peak.multiplier),
                TtlAdjustments {
                    peak_applied: true,
                    peak_multiplier: peak.multiplier,
                },
            ),
            Some(peak) => (
                base_ttl_ms,
                TtlAdjustments {
                    peak_applied: false,
                    peak_multiplier: peak.multiplier,
                },
            ),
            None => (base_ttl_ms, TtlAdjustments::default()),
        };

        Ok(TtlComputation {
            base_ttl_ms,
            final_ttl_ms,
            stale_threshold_ms: final_ttl_ms * STALE_FRACTION_NUM / STALE_FRACTION_DEN,
            adjustments,
        })
    }

    /// Resolves the base TTL per the configured precedence.
    fn resolve_base(&self, context: &TtlContext) -> Result<u64> {
        if let Some(item_type) = &context.item_type {
            let resolved = self
                .config
                .item_ttl_overrides
                .get(item_type)
                .copied()
                .or(self.config.default_item_ttl_ms)
                .unwrap_or(self.config.fallback_ttl_ms);
            return Ok(resolved);
        }

        match (&context.query_type, context.is_complete) {
            (Some(query_type), Some(is_complete)) => {
                let category_default = if is_complete {
                    self.config.default_complete_query_ttl_ms
                } else {
                    self.config.default_partial_query_ttl_ms
                };
                let facet_override = context
                    .facet
                    .as_ref()
                    .and_then(|f| self.config.facet_ttl_overrides.get(f))
                    .copied();

                Ok(self
                    .config
                    .query_ttl_overrides
                    .get(query_type)
                    .copied()
                    .or(category_default)
                    .or(facet_override)
                    .unwrap_or(self.config.fallback_ttl_ms))
            }
            _ => Err(CacheError::Configuration(
                "TTL context requires an item type, or a query type with completeness".to_string(),
            )),
        }
    }
}

// == Adaptive Helper ==
/// Scales a TTL down by the observed change rate of the underlying data.
///
/// Ten or more changes per hour quarter the TTL; two or more keep 75%;
/// slower data keeps the full TTL.
pub fn adaptive_ttl_scale(ttl_ms: u64, changes_per_hour: f64) -> u64 {
    let factor = if changes_per_hour >= 10.0 {
        0.25
    } else if changes_per_hour >= 2.0 {
        0.75
    } else {
        1.0
    };
    scale(ttl_ms, factor)
}

fn scale(ttl_ms: u64, factor: f64) -> u64 {
    (ttl_ms as f64 * factor).round() as u64
}
