//! Momentum value types.
//!
//! A [`MomentumVector`] is derived, recomputable data: never authoritative
//! state. The engine in `ctxrelay-momentum` owns the cache of these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The five per-factor scores, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MomentumFactors {
    pub temporal: f64,
    pub semantic: f64,
    pub operational: f64,
    pub depth: f64,
    pub confidence: f64,
}

impl MomentumFactors {
    /// Factor values in a fixed order: temporal, semantic, operational, depth, confidence.
    pub fn as_array(&self) -> [f64; 5] {
        [
            self.temporal,
            self.semantic,
            self.operational,
            self.depth,
            self.confidence,
        ]
    }
}

/// One momentum computation for one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentumVector {
    pub timestamp: DateTime<Utc>,
    pub context_id: String,
    pub factors: MomentumFactors,
    /// Weighted combination, clamped to `[min_momentum, 1]`
    pub overall: f64,
}
