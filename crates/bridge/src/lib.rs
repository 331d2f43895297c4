//! Context bridge for ctxrelay.
//!
//! Owns the live context registry and the transition ledger. Every switch of
//! the active context is recorded once, scored by the momentum engine, and
//! persisted through the injected [`ContextStore`](ctxrelay_core::ContextStore).

pub mod bridge;

pub use bridge::{BridgeStats, ContextBridge};
