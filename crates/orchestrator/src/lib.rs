//! Composition root for ctxrelay.
//!
//! [`ContextRelay`] builds one instance of each subsystem from an
//! [`AppConfig`], injects the shared pieces explicitly, and exposes the
//! operations callers (the CLI, a UI) need as one façade.

use std::sync::Arc;

use ctxrelay_bridge::{BridgeStats, ContextBridge};
use ctxrelay_config::{AppConfig, ConfigError};
use ctxrelay_core::context::{Context, StateMap, TransitionData};
use ctxrelay_core::error::BridgeError;
use ctxrelay_core::momentum::MomentumVector;
use ctxrelay_housekeeper::{FilteredAnswer, Housekeeper, HousekeeperError, HousekeeperStats};
use ctxrelay_momentum::{MomentumEngine, MomentumError, MomentumStats};
use ctxrelay_vault::{Vault, VaultError, VaultOptions, VaultStats};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Errors surfaced by the façade.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Momentum error: {0}")]
    Momentum(#[from] MomentumError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Housekeeper error: {0}")]
    Housekeeper(#[from] HousekeeperError),
}

/// Aggregate statistics across all four subsystems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayStats {
    pub bridge: BridgeStats,
    pub momentum: MomentumStats,
    pub housekeeper: HousekeeperStats,
    pub vault: VaultStats,
}

/// The context relay façade.
pub struct ContextRelay {
    vault: Arc<Vault>,
    momentum: Arc<MomentumEngine>,
    bridge: ContextBridge,
    housekeeper: Housekeeper,
}

impl ContextRelay {
    /// Open the vault described by `config` and wire everything to it.
    ///
    /// Contexts already in the vault are loaded into the bridge.
    pub fn from_config(config: &AppConfig) -> Result<Self, RelayError> {
        config.validate()?;
        let vault = Arc::new(Vault::open(VaultOptions::from_config(config))?);
        Self::with_vault(config, vault)
    }

    /// Wire the subsystems around an already opened vault.
    pub fn with_vault(config: &AppConfig, vault: Arc<Vault>) -> Result<Self, RelayError> {
        let momentum = Arc::new(MomentumEngine::new(config.momentum.clone())?);
        let housekeeper = Housekeeper::new(config.housekeeper.clone())?;
        let mut bridge = ContextBridge::new(config.bridge.clone(), momentum.clone(), vault.clone());
        bridge.replace_contexts(vault.contexts());

        info!(
            contexts = bridge.len(),
            fallback = vault.is_fallback(),
            "Context relay ready"
        );

        Ok(Self {
            vault,
            momentum,
            bridge,
            housekeeper,
        })
    }

    /// Start periodic backups. Requires a Tokio runtime.
    pub fn start(&self) -> bool {
        self.vault.start_auto_backup()
    }

    pub fn create_context(&mut self, app_id: &str, state: StateMap) -> Result<String, RelayError> {
        Ok(self.bridge.create_context(app_id, state)?)
    }

    /// Switch to `context_id`, pulling it back from the vault if it was evicted.
    pub fn transition(&mut self, context_id: &str, data: TransitionData) -> bool {
        if self.bridge.get_context(context_id).is_none() {
            self.bridge.rehydrate(context_id);
        }
        self.bridge.transition(context_id, data)
    }

    pub fn update_state(&mut self, update: StateMap) -> Result<(), RelayError> {
        Ok(self.bridge.update_state(update)?)
    }

    pub fn get_state(&self) -> Option<&StateMap> {
        self.bridge.get_state()
    }

    pub fn get_active_context(&self) -> Option<&Context> {
        self.bridge.get_active_context()
    }

    pub fn current_momentum(&self) -> Option<MomentumVector> {
        self.bridge.current_momentum()
    }

    pub fn filter_answers<S: AsRef<str>>(
        &self,
        candidates: &[S],
        question: &str,
    ) -> Result<FilteredAnswer, RelayError> {
        Ok(self.housekeeper.filter_answers(candidates, question)?)
    }

    pub fn amplify(&self, answer: &str, question: &str) -> String {
        self.housekeeper.amplify(answer, question)
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            bridge: self.bridge.stats(),
            momentum: self.momentum.stats(),
            housekeeper: self.housekeeper.stats(),
            vault: self.vault.stats(),
        }
    }

    /// Flush live contexts, then snapshot the vault.
    pub fn backup(&self) -> Option<i64> {
        self.bridge.persist_all();
        self.vault.backup()
    }

    pub fn list_backups(&self) -> Vec<i64> {
        self.vault.list_backups()
    }

    /// Restore a snapshot (`None` = newest) and reload the bridge from it.
    pub fn restore(&mut self, timestamp: Option<i64>) -> bool {
        if !self.vault.restore(timestamp) {
            return false;
        }
        self.bridge.replace_contexts(self.vault.contexts());
        true
    }

    /// Flush every live context, stop the timer, and take a final backup.
    pub async fn shutdown(&self) -> Option<i64> {
        let flushed = self.bridge.persist_all();
        let timestamp = self.vault.shutdown().await;
        info!(flushed, final_backup = ?timestamp, "Context relay shut down");
        timestamp
    }

    pub fn bridge(&self) -> &ContextBridge {
        &self.bridge
    }

    pub fn vault(&self) -> &Arc<Vault> {
        &self.vault
    }

    pub fn momentum(&self) -> &Arc<MomentumEngine> {
        &self.momentum
    }

    pub fn housekeeper(&self) -> &Housekeeper {
        &self.housekeeper
    }
}
