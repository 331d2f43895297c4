//! Durable, encrypted persistence for contexts.
//!
//! The [`Vault`] keeps one AES-256-GCM sealed unit per context, takes
//! rotating full snapshots on a timer, and can restore any snapshot.

pub mod cipher;
mod scheduler;
pub mod snapshot;
pub mod vault;

pub use cipher::{Cipher, CipherError, Envelope};
pub use snapshot::BackupSnapshot;
pub use vault::{BackupOutcome, Vault, VaultOptions, VaultStats};

/// Vault errors.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Context has no id")]
    MissingId,

    #[error("Context id is not storable: {0}")]
    InvalidId(String),

    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt unit: {0}")]
    Corrupt(String),
}
