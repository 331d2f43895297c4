//! Momentum engine for ctxrelay.
//!
//! Scores how "live" a context is with five factors in `[0, 1]`:
//! temporal decay (half-life physics), semantic similarity to the previous
//! context, operational continuity, reasoning depth, and stated confidence.
//! The weighted combination is cached per context and summarised by
//! [`MomentumEngine::stats`].

pub mod engine;
pub mod factors;

pub use engine::{MomentumEngine, MomentumStats, TransitionEvent};

/// Errors from the momentum subsystem.
#[derive(Debug, thiserror::Error)]
pub enum MomentumError {
    #[error("weights must sum to 1.0, got {0:.4}")]
    UnbalancedWeights(f64),

    #[error("half-life must be positive, got {0}")]
    InvalidHalfLife(f64),

    #[error("min momentum must be within [0, 1], got {0}")]
    InvalidFloor(f64),
}
