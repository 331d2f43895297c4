//! Periodic auto-backup task.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::vault::{BackupOutcome, Vault};

/// Handle to a running auto-backup loop.
///
/// The loop holds only a weak reference, so dropping the last `Arc<Vault>`
/// ends it on the next tick even if `stop` is never called.
pub(crate) struct BackupScheduler {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl BackupScheduler {
    pub(crate) fn spawn(vault: Weak<Vault>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let Some(vault) = vault.upgrade() else { break };
                        match tokio::task::spawn_blocking(move || vault.try_backup()).await {
                            Ok(BackupOutcome::Written(ts)) => debug!(timestamp = ts, "Scheduled backup written"),
                            Ok(BackupOutcome::Skipped) => debug!("Scheduled backup skipped"),
                            Ok(BackupOutcome::Disabled) => break,
                            Ok(BackupOutcome::Failed) => warn!("Scheduled backup failed"),
                            Err(e) => warn!(error = %e, "Scheduled backup task panicked"),
                        }
                    }
                }
            }
            debug!("Auto-backup loop exited");
        });

        Self {
            shutdown: Some(shutdown_tx),
            handle,
        }
    }

    /// Signal the loop and wait for it, including any in-flight backup.
    pub(crate) async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Auto-backup task ended abnormally");
        }
    }
}
