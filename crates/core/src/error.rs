//! Error types for the ctxrelay domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the façade aggregates them.

use thiserror::Error;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("No active context")]
    NoActiveContext,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Eviction of context {context_id} failed: {reason}")]
    EvictionFailed { context_id: String, reason: String },

    #[error("Context store rejected {context_id}: {reason}")]
    Persist { context_id: String, reason: String },
}

/// Errors a [`ContextStore`](crate::ContextStore) surfaces to its callers.
///
/// Environmental failures (disk, crypto) are absorbed inside the store, so
/// only argument-class problems ever reach this type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Context has no id")]
    MissingId,

    #[error("Storage error: {0}")]
    Storage(String),
}
