//! Thread-safe momentum engine: computes, caches, and summarises
//! momentum vectors, and keeps a bounded transition history.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use ctxrelay_config::MomentumConfig;
use ctxrelay_core::context::Context;
use ctxrelay_core::momentum::{MomentumFactors, MomentumVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::MomentumError;
use crate::factors;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// One transition the engine was notified about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub timestamp: DateTime<Utc>,
    pub from: Option<String>,
    pub to: String,
}

/// Aggregate statistics over every cached vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MomentumStats {
    pub count: usize,
    pub mean_overall: f64,
    pub mean_factors: MomentumFactors,
    pub transitions_recorded: usize,
}

/// The momentum engine.
///
/// Thread-safe via `RwLock`. The cache holds the latest vector per context
/// id; recomputation overwrites, never merges.
pub struct MomentumEngine {
    config: MomentumConfig,
    vectors: RwLock<HashMap<String, MomentumVector>>,
    history: RwLock<VecDeque<TransitionEvent>>,
}

impl MomentumEngine {
    /// Create an engine, validating the weight table and decay parameters.
    pub fn new(config: MomentumConfig) -> Result<Self, MomentumError> {
        let sum = config.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(MomentumError::UnbalancedWeights(sum));
        }
        if config.half_life_ms.is_nan() || config.half_life_ms <= 0.0 {
            return Err(MomentumError::InvalidHalfLife(config.half_life_ms));
        }
        if !(0.0..=1.0).contains(&config.min_momentum) {
            return Err(MomentumError::InvalidFloor(config.min_momentum));
        }

        Ok(Self {
            config,
            vectors: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
        })
    }

    pub fn config(&self) -> &MomentumConfig {
        &self.config
    }

    /// Score `current` against the previously active context, as of now.
    pub fn calculate(&self, current: &Context, previous: Option<&Context>) -> MomentumVector {
        self.calculate_at(current, previous, Utc::now())
    }

    /// Score `current` as of `now` and cache the result under its id.
    pub fn calculate_at(
        &self,
        current: &Context,
        previous: Option<&Context>,
        now: DateTime<Utc>,
    ) -> MomentumVector {
        let elapsed_ms = (now - current.last_access).num_milliseconds() as f64;
        let factors = MomentumFactors {
            temporal: factors::temporal(
                elapsed_ms,
                self.config.half_life_ms,
                self.config.min_momentum,
            ),
            semantic: factors::semantic(current, previous),
            operational: factors::operational(current, previous),
            depth: factors::depth(current),
            confidence: factors::confidence(current),
        };

        let vector = MomentumVector {
            timestamp: now,
            context_id: current.id.clone(),
            overall: self.combine(&factors),
            factors,
        };

        debug!(
            context_id = %current.id,
            overall = vector.overall,
            previous = previous.map(|p| p.id.as_str()).unwrap_or("none"),
            "Momentum computed"
        );

        self.vectors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(current.id.clone(), vector.clone());
        vector
    }

    /// Weighted sum of the factors, clamped to `[min_momentum, 1]`.
    pub fn combine(&self, factors: &MomentumFactors) -> f64 {
        let weighted: f64 = factors
            .as_array()
            .iter()
            .zip(self.config.weights.as_array())
            .map(|(factor, weight)| factor * weight)
            .sum();
        weighted.clamp(self.config.min_momentum, 1.0)
    }

    /// The latest vector cached for a context.
    pub fn get(&self, context_id: &str) -> Option<MomentumVector> {
        self.vectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(context_id)
            .cloned()
    }

    /// Drop the cached vector for a context.
    pub fn forget(&self, context_id: &str) -> bool {
        self.vectors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(context_id)
            .is_some()
    }

    /// Record a transition. The oldest entries are dropped past `max_history`.
    pub fn record_transition(&self, from: Option<&str>, to: &str, at: DateTime<Utc>) {
        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        history.push_back(TransitionEvent {
            timestamp: at,
            from: from.map(str::to_string),
            to: to.to_string(),
        });
        while history.len() > self.config.max_history {
            history.pop_front();
        }
    }

    /// Transition history, oldest first.
    pub fn history(&self) -> Vec<TransitionEvent> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Count and means over every cached vector.
    pub fn stats(&self) -> MomentumStats {
        let vectors = self.vectors.read().unwrap_or_else(PoisonError::into_inner);
        let transitions_recorded = self
            .history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();

        let count = vectors.len();
        if count == 0 {
            return MomentumStats {
                transitions_recorded,
                ..MomentumStats::default()
            };
        }

        let n = count as f64;
        let mut sums = [0.0f64; 5];
        let mut overall = 0.0;
        for vector in vectors.values() {
            overall += vector.overall;
            for (sum, value) in sums.iter_mut().zip(vector.factors.as_array()) {
                *sum += value;
            }
        }

        MomentumStats {
            count,
            mean_overall: overall / n,
            mean_factors: MomentumFactors {
                temporal: sums[0] / n,
                semantic: sums[1] / n,
                operational: sums[2] / n,
                depth: sums[3] / n,
                confidence: sums[4] / n,
            },
            transitions_recorded,
        }
    }
}

impl Default for MomentumEngine {
    fn default() -> Self {
        Self {
            config: MomentumConfig::default(),
            vectors: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ctxrelay_config::MomentumWeights;
    use serde_json::json;

    fn ctx(app: &str, state: serde_json::Value) -> Context {
        Context::new(app, state.as_object().cloned().unwrap())
    }

    #[test]
    fn rejects_unbalanced_weights() {
        let config = MomentumConfig {
            weights: MomentumWeights {
                temporal: 0.5,
                ..MomentumWeights::default()
            },
            ..MomentumConfig::default()
        };
        assert!(matches!(
            MomentumEngine::new(config),
            Err(MomentumError::UnbalancedWeights(_))
        ));
    }

    #[test]
    fn rejects_non_positive_half_life() {
        let config = MomentumConfig {
            half_life_ms: 0.0,
            ..MomentumConfig::default()
        };
        assert!(matches!(
            MomentumEngine::new(config),
            Err(MomentumError::InvalidHalfLife(_))
        ));
    }

    #[test]
    fn fresh_context_without_previous() {
        let engine = MomentumEngine::default();
        let c = ctx("chatgpt", json!({"task": "research"}));
        let v = engine.calculate_at(&c, None, c.last_access);

        assert_eq!(v.factors.temporal, 1.0);
        assert_eq!(v.factors.semantic, 1.0);
        assert_eq!(v.factors.operational, 1.0);
        assert_eq!(v.factors.depth, 0.0);
        assert_eq!(v.factors.confidence, 0.5);
        // 0.25 + 0.30 + 0.20 + 0 + 0.05
        assert!((v.overall - 0.80).abs() < 1e-9);
    }

    #[test]
    fn temporal_factor_decays_with_elapsed_time() {
        let engine = MomentumEngine::default();
        let c = ctx("app", json!({}));
        let later = c.last_access + Duration::milliseconds(30_000);
        let v = engine.calculate_at(&c, None, later);
        assert!((v.factors.temporal - 0.5).abs() < 1e-9);
    }

    #[test]
    fn overall_stays_within_bounds() {
        let engine = MomentumEngine::default();
        let floor = engine.config().min_momentum;
        for &value in &[0.0, 0.01, 0.3, 0.77, 1.0] {
            let factors = MomentumFactors {
                temporal: value,
                semantic: value,
                operational: value,
                depth: value,
                confidence: value,
            };
            let overall = engine.combine(&factors);
            assert!(overall >= floor && overall <= 1.0, "{overall}");
        }
        assert_eq!(engine.combine(&MomentumFactors::default()), floor);
    }

    #[test]
    fn recomputation_overwrites_cache() {
        let engine = MomentumEngine::default();
        let c = ctx("app", json!({}));
        engine.calculate_at(&c, None, c.last_access);
        let later = c.last_access + Duration::milliseconds(60_000);
        let second = engine.calculate_at(&c, None, later);

        assert_eq!(engine.stats().count, 1);
        assert_eq!(engine.get(&c.id), Some(second));
    }

    #[test]
    fn history_is_bounded() {
        let engine = MomentumEngine::new(MomentumConfig {
            max_history: 3,
            ..MomentumConfig::default()
        })
        .unwrap();
        for i in 0..5 {
            engine.record_transition(Some(&format!("c{i}")), &format!("c{}", i + 1), Utc::now());
        }
        let history = engine.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].to, "c3");
        assert_eq!(history[2].to, "c5");
    }

    #[test]
    fn stats_average_over_cached_vectors() {
        let engine = MomentumEngine::default();
        let a = ctx("app", json!({"confidence": 0.9}));
        let b = ctx("app", json!({}));
        engine.calculate_at(&a, None, a.last_access);
        engine.calculate_at(&b, None, b.last_access);

        let stats = engine.stats();
        assert_eq!(stats.count, 2);
        assert!((stats.mean_factors.confidence - 0.7).abs() < 1e-9);
        assert!((stats.mean_factors.temporal - 1.0).abs() < 1e-9);
        assert!(stats.mean_overall > 0.0);
    }

    #[test]
    fn empty_stats_are_zero() {
        let engine = MomentumEngine::default();
        let stats = engine.stats();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean_overall, 0.0);
    }

    #[test]
    fn forget_removes_vector() {
        let engine = MomentumEngine::default();
        let c = ctx("app", json!({}));
        engine.calculate(&c, None);
        assert!(engine.forget(&c.id));
        assert!(engine.get(&c.id).is_none());
        assert!(!engine.forget(&c.id));
    }
}
