//! Answer housekeeping for ctxrelay.
//!
//! Scores candidate answers on eight keyword and pattern heuristics, picks
//! the best one, and can rewrite an answer into a sectioned, elaborated form.
//! Nothing here understands language; it counts words and matches patterns.

pub mod amplify;
pub mod housekeeper;
pub mod scoring;
pub mod text;

pub use housekeeper::{FilterLogEntry, FilteredAnswer, Housekeeper, HousekeeperStats, RankedAnswer};
pub use scoring::{AnswerScore, AnswerScorer, QuestionKind};

/// Housekeeper errors.
#[derive(Debug, thiserror::Error)]
pub enum HousekeeperError {
    #[error("No candidate answers to filter")]
    NoCandidates,

    #[error("answer weights must sum to 1.0, got {0:.4}")]
    UnbalancedWeights(f64),

    #[error("Invalid scoring pattern: {0}")]
    InvalidPattern(String),
}
