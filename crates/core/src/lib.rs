//! # ctxrelay Core
//!
//! Domain types, traits, and error definitions for the ctxrelay context
//! substrate. This crate has **no framework dependencies**: it defines the
//! domain model that the bridge, momentum, vault, and housekeeper crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Persistence is expressed as a trait here ([`ContextStore`]) and implemented
//! in `ctxrelay-vault`. The bridge only ever sees the trait, which keeps the
//! dependency graph pointing inward and lets tests swap in a memory-only store.

pub mod context;
pub mod error;
pub mod momentum;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use context::{Context, StateMap, TransitionData, TransitionRecord};
pub use error::{BridgeError, StoreError};
pub use momentum::{MomentumFactors, MomentumVector};
pub use store::ContextStore;
