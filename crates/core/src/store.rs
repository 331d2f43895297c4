//! ContextStore trait: durable storage for contexts.
//!
//! The bridge persists through this trait; `ctxrelay-vault` provides the
//! encrypted on-disk implementation.

use crate::context::Context;
use crate::error::StoreError;

/// Durable storage for [`Context`] records.
///
/// Implementations absorb environmental failures (I/O, crypto) and report
/// them through logs and return values. Only argument errors are returned
/// as `Err`.
pub trait ContextStore: Send + Sync {
    /// The store name (e.g., "vault", "memory").
    fn name(&self) -> &str;

    /// Save (insert or replace) a context.
    fn save_context(&self, context: &Context) -> Result<(), StoreError>;

    /// Load a context by id. `None` when absent or unreadable.
    fn load_context(&self, id: &str) -> Option<Context>;

    /// Delete a context. Returns whether anything was removed.
    fn delete_context(&self, id: &str) -> bool;

    /// Ids of every context currently held.
    fn context_ids(&self) -> Vec<String>;
}
