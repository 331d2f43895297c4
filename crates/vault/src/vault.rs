//! The vault: durable, optionally encrypted storage for contexts.
//!
//! Layout under the vault root:
//!
//! ```text
//! contexts/<id>.json          one unit per context (envelope or raw JSON)
//! backups/backup-<ts>.json    immutable snapshots, newest `max_backups` kept
//! vault.key                   generated key (hex) when none is supplied
//! ```
//!
//! Contexts are loaded into memory on open and written through on every
//! save. Environmental failures (disk, crypto) never escape: they are logged
//! and reported through return values, and an unusable root degrades the
//! vault to memory-only operation with backups disabled.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use ctxrelay_config::AppConfig;
use ctxrelay_core::context::Context;
use ctxrelay_core::error::StoreError;
use ctxrelay_core::store::ContextStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::VaultError;
use crate::cipher::{Cipher, Envelope};
use crate::scheduler::BackupScheduler;
use crate::snapshot::{self, BackupSnapshot};

const CONTEXTS_DIR: &str = "contexts";
const BACKUPS_DIR: &str = "backups";
const KEY_FILE: &str = "vault.key";
const PROBE_FILE: &str = ".probe";

/// How a vault is opened.
#[derive(Clone)]
pub struct VaultOptions {
    pub root: PathBuf,
    pub encrypt: bool,
    /// Hex key. When `None` the key is read from (or generated into) `vault.key`.
    pub key: Option<String>,
    pub max_backups: usize,
    pub auto_backup: bool,
    pub backup_interval: Duration,
}

impl std::fmt::Debug for VaultOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultOptions")
            .field("root", &self.root)
            .field("encrypt", &self.encrypt)
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .field("max_backups", &self.max_backups)
            .field("auto_backup", &self.auto_backup)
            .field("backup_interval", &self.backup_interval)
            .finish()
    }
}

impl VaultOptions {
    /// Encrypted vault at `root` with default retention and schedule.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            encrypt: true,
            key: None,
            max_backups: 10,
            auto_backup: true,
            backup_interval: Duration::from_secs(300),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            root: config.storage.resolved_path(),
            encrypt: config.storage.encrypt,
            key: config.storage.encryption_key.clone(),
            max_backups: config.backup.max_backups,
            auto_backup: config.backup.enabled,
            backup_interval: Duration::from_secs(config.backup.interval_secs),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn unencrypted(mut self) -> Self {
        self.encrypt = false;
        self
    }

    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups;
        self
    }

    pub fn with_backup_interval(mut self, interval: Duration) -> Self {
        self.backup_interval = interval;
        self
    }
}

/// Result of one backup attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    /// Snapshot written under this timestamp
    Written(i64),
    /// Another backup was in flight; nothing written
    Skipped,
    /// Memory-only mode; backups are off
    Disabled,
    /// The write failed (logged)
    Failed,
}

impl BackupOutcome {
    pub fn timestamp(self) -> Option<i64> {
        match self {
            Self::Written(ts) => Some(ts),
            _ => None,
        }
    }
}

/// Point-in-time vault statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultStats {
    pub storage_path: PathBuf,
    pub contexts: usize,
    pub backups: usize,
    pub max_backups: usize,
    pub encrypted: bool,
    /// True when the storage medium was unavailable at open
    pub fallback_mode: bool,
    pub auto_backup_running: bool,
    pub last_backup: Option<i64>,
    pub backups_written: u64,
    pub write_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    last_backup: Option<i64>,
    backups_written: u64,
    write_failures: u64,
}

/// Encrypted key-value persistence for contexts.
pub struct Vault {
    root: PathBuf,
    cipher: Option<Cipher>,
    fallback: bool,
    max_backups: usize,
    auto_backup: bool,
    backup_interval: Duration,
    contexts: RwLock<HashMap<String, Context>>,
    /// Held for the whole of a backup or restore; the timer only `try_lock`s it
    backup_guard: Mutex<()>,
    counters: Mutex<Counters>,
    scheduler: Mutex<Option<BackupScheduler>>,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("root", &self.root)
            .field("encrypted", &self.cipher.is_some())
            .field("fallback", &self.fallback)
            .field("contexts", &self.len())
            .finish()
    }
}

impl Vault {
    /// Open (or create) a vault.
    ///
    /// Only an invalid supplied key is an error. An unusable storage root
    /// or stored key puts the vault into memory-only fallback mode instead.
    pub fn open(options: VaultOptions) -> Result<Self, VaultError> {
        let mut available = match prepare_storage(&options.root) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    path = %options.root.display(),
                    error = %e,
                    "Vault storage unavailable, falling back to memory-only mode"
                );
                false
            }
        };

        let cipher = if options.encrypt {
            let (cipher, key_stored) =
                resolve_cipher(&options.root, options.key.as_deref(), available)?;
            if !key_stored {
                available = false;
            }
            Some(cipher)
        } else {
            None
        };

        let vault = Self {
            root: options.root,
            cipher,
            fallback: !available,
            max_backups: options.max_backups.max(1),
            auto_backup: options.auto_backup && available,
            backup_interval: options.backup_interval,
            contexts: RwLock::new(HashMap::new()),
            backup_guard: Mutex::new(()),
            counters: Mutex::new(Counters::default()),
            scheduler: Mutex::new(None),
        };

        if available {
            let loaded = vault.load_all_units();
            let last_backup = vault.list_backups().last().copied();
            vault.counters().last_backup = last_backup;
            info!(
                path = %vault.root.display(),
                contexts = loaded,
                encrypted = vault.cipher.is_some(),
                "Vault opened"
            );
        }

        Ok(vault)
    }

    /// A memory-only vault: no disk, no encryption, no backups.
    pub fn in_memory() -> Self {
        Self {
            root: PathBuf::new(),
            cipher: None,
            fallback: true,
            max_backups: 1,
            auto_backup: false,
            backup_interval: Duration::from_secs(300),
            contexts: RwLock::new(HashMap::new()),
            backup_guard: Mutex::new(()),
            counters: Mutex::new(Counters::default()),
            scheduler: Mutex::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    fn counters(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn contexts_dir(&self) -> PathBuf {
        self.root.join(CONTEXTS_DIR)
    }

    fn backups_dir(&self) -> PathBuf {
        self.root.join(BACKUPS_DIR)
    }

    fn unit_path(&self, id: &str) -> PathBuf {
        self.contexts_dir().join(format!("{id}.json"))
    }

    // ── Context units ────────────────────────────────────────────────

    /// Save a context in memory and, unless in fallback mode, on disk.
    pub fn save_context(&self, context: &Context) -> Result<(), VaultError> {
        if context.id.is_empty() {
            return Err(VaultError::MissingId);
        }
        if !is_safe_id(&context.id) {
            return Err(VaultError::InvalidId(context.id.clone()));
        }

        self.contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(context.id.clone(), context.clone());

        if !self.fallback {
            if let Err(e) = self.write_unit(context) {
                self.counters().write_failures += 1;
                error!(context_id = %context.id, error = %e, "Failed to persist context");
            }
        }
        Ok(())
    }

    /// Look a context up in memory, then on disk.
    ///
    /// Absent, unreadable, and undecryptable units all yield `None`.
    pub fn load_context(&self, id: &str) -> Option<Context> {
        if let Some(found) = self
            .contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
        {
            return Some(found.clone());
        }

        if self.fallback || !is_safe_id(id) {
            return None;
        }

        let bytes = match std::fs::read(self.unit_path(id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(context_id = %id, error = %e, "Failed to read context unit");
                return None;
            }
        };

        match self.decode::<Context>(&bytes) {
            Ok(context) if context.id == id => {
                self.contexts
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(context.id.clone(), context.clone());
                Some(context)
            }
            Ok(context) => {
                warn!(context_id = %id, found = %context.id, "Context unit id mismatch");
                None
            }
            Err(e) => {
                warn!(context_id = %id, error = %e, "Discarding unreadable context unit");
                None
            }
        }
    }

    /// Remove a context from memory and disk.
    pub fn delete_context(&self, id: &str) -> bool {
        let in_memory = self
            .contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some();

        let on_disk = if self.fallback || !is_safe_id(id) {
            false
        } else {
            match std::fs::remove_file(self.unit_path(id)) {
                Ok(()) => true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
                Err(e) => {
                    warn!(context_id = %id, error = %e, "Failed to delete context unit");
                    false
                }
            }
        };

        if in_memory || on_disk {
            debug!(context_id = %id, "Context deleted from vault");
        }
        in_memory || on_disk
    }

    /// Ids of every context held in memory, sorted.
    pub fn context_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Every held context, ordered by id.
    pub fn contexts(&self) -> Vec<Context> {
        let mut all: Vec<Context> = self
            .contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Backups ──────────────────────────────────────────────────────

    /// Write a snapshot of every held context, then rotate.
    ///
    /// Waits for any in-flight backup to finish first. Returns the snapshot
    /// timestamp, or `None` in fallback mode or when the write failed.
    pub fn backup(&self) -> Option<i64> {
        if self.fallback {
            debug!("Backup skipped: vault is in memory-only mode");
            return None;
        }
        let _guard = self
            .backup_guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.backup_locked().timestamp()
    }

    /// Like [`backup`](Self::backup), but gives up immediately if another
    /// backup is in flight. Used by the timer so ticks never overlap.
    pub fn try_backup(&self) -> BackupOutcome {
        if self.fallback {
            return BackupOutcome::Disabled;
        }
        let _guard = match self.backup_guard.try_lock() {
            Ok(guard) => guard,
            Err(std::sync::TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(std::sync::TryLockError::WouldBlock) => {
                debug!("Backup tick skipped: previous backup still in flight");
                return BackupOutcome::Skipped;
            }
        };
        self.backup_locked()
    }

    fn backup_locked(&self) -> BackupOutcome {
        let timestamp = self.next_backup_timestamp();
        let snapshot = BackupSnapshot {
            timestamp,
            contexts: self.contexts(),
        };
        let count = snapshot.contexts.len();

        let result = self.encode(&snapshot).and_then(|bytes| {
            let path = self.backups_dir().join(snapshot::file_name(timestamp));
            write_atomic(&path, &bytes)
        });

        if let Err(e) = result {
            self.counters().write_failures += 1;
            error!(error = %e, "Backup failed");
            return BackupOutcome::Failed;
        }

        {
            let mut counters = self.counters();
            counters.last_backup = Some(timestamp);
            counters.backups_written += 1;
        }
        let removed = self.rotate();
        info!(timestamp, contexts = count, rotated = removed, "Backup written");
        BackupOutcome::Written(timestamp)
    }

    /// Strictly greater than every existing snapshot, so names never collide.
    fn next_backup_timestamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let newest_on_disk = self.list_backups().last().copied();
        let newest_seen = self.counters().last_backup;
        match newest_on_disk.max(newest_seen) {
            Some(newest) if newest >= now => newest + 1,
            _ => now,
        }
    }

    /// Delete the oldest snapshots beyond `max_backups`. Returns how many went.
    fn rotate(&self) -> usize {
        let timestamps = self.list_backups();
        let mut removed = 0;
        for ts in snapshot::rotation_victims(&timestamps, self.max_backups) {
            let path = self.backups_dir().join(snapshot::file_name(*ts));
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(timestamp = ts, error = %e, "Failed to rotate backup"),
            }
        }
        removed
    }

    /// Snapshot timestamps on disk, oldest first.
    pub fn list_backups(&self) -> Vec<i64> {
        if self.fallback {
            return Vec::new();
        }
        let entries = match std::fs::read_dir(self.backups_dir()) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to list backups");
                return Vec::new();
            }
        };

        let mut timestamps: Vec<i64> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| snapshot::parse_file_name(&entry.file_name().to_string_lossy()))
            .collect();
        timestamps.sort_unstable();
        timestamps
    }

    /// Replace every held context with the contents of a snapshot.
    ///
    /// `None` picks the newest snapshot. Returns `false` when there is no
    /// such snapshot or it cannot be read or decrypted; the current contexts
    /// are left untouched in that case. On success the context units on disk
    /// are rewritten to mirror the snapshot.
    pub fn restore(&self, timestamp: Option<i64>) -> bool {
        if self.fallback {
            warn!("Restore unavailable: vault is in memory-only mode");
            return false;
        }
        let _guard = self
            .backup_guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(timestamp) = timestamp.or_else(|| self.list_backups().last().copied()) else {
            warn!("Restore failed: no backups exist");
            return false;
        };

        let path = self.backups_dir().join(snapshot::file_name(timestamp));
        let snapshot = match std::fs::read(&path)
            .map_err(VaultError::from)
            .and_then(|bytes| self.decode::<BackupSnapshot>(&bytes))
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(timestamp, error = %e, "Restore failed");
                return false;
            }
        };

        let restored: HashMap<String, Context> = snapshot
            .contexts
            .into_iter()
            .filter(|c| is_safe_id(&c.id))
            .map(|c| (c.id.clone(), c))
            .collect();
        let count = restored.len();

        let previous = std::mem::replace(
            &mut *self
                .contexts
                .write()
                .unwrap_or_else(PoisonError::into_inner),
            restored.clone(),
        );

        for id in previous.keys().filter(|id| !restored.contains_key(*id)) {
            if let Err(e) = std::fs::remove_file(self.unit_path(id)) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(context_id = %id, error = %e, "Failed to remove stale context unit");
                }
            }
        }
        for context in restored.values() {
            if let Err(e) = self.write_unit(context) {
                self.counters().write_failures += 1;
                error!(context_id = %context.id, error = %e, "Failed to persist restored context");
            }
        }

        info!(timestamp, contexts = count, "Vault restored from backup");
        true
    }

    // ── Auto-backup lifecycle ────────────────────────────────────────

    /// Start the periodic backup task. Must run inside a Tokio runtime.
    ///
    /// Returns `false` when auto-backup is disabled, the vault is in
    /// fallback mode, no runtime is available, or the task already runs.
    pub fn start_auto_backup(self: &Arc<Self>) -> bool {
        if !self.auto_backup {
            debug!("Auto-backup disabled");
            return false;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("Auto-backup requires a Tokio runtime; not started");
            return false;
        }

        let mut slot = self.scheduler.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(BackupScheduler::spawn(
            Arc::downgrade(self),
            self.backup_interval,
        ));
        info!(interval_secs = self.backup_interval.as_secs_f64(), "Auto-backup started");
        true
    }

    pub fn auto_backup_running(&self) -> bool {
        self.scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Cancel the periodic task and wait for any in-flight tick to finish.
    pub async fn stop_auto_backup(&self) {
        let scheduler = self
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(scheduler) = scheduler {
            scheduler.stop().await;
            info!("Auto-backup stopped");
        }
    }

    /// Stop the timer, then take one final synchronous backup.
    pub async fn shutdown(&self) -> Option<i64> {
        self.stop_auto_backup().await;
        let timestamp = self.backup();
        info!(final_backup = ?timestamp, "Vault shut down");
        timestamp
    }

    pub fn stats(&self) -> VaultStats {
        let counters = self.counters();
        VaultStats {
            storage_path: self.root.clone(),
            contexts: self.len(),
            backups: self.list_backups().len(),
            max_backups: self.max_backups,
            encrypted: self.cipher.is_some(),
            fallback_mode: self.fallback,
            auto_backup_running: self.auto_backup_running(),
            last_backup: counters.last_backup,
            backups_written: counters.backups_written,
            write_failures: counters.write_failures,
        }
    }

    // ── Encoding ─────────────────────────────────────────────────────

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, VaultError> {
        let json = serde_json::to_vec(value)?;
        match &self.cipher {
            Some(cipher) => Ok(serde_json::to_vec_pretty(&cipher.encrypt(&json)?)?),
            None => Ok(json),
        }
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, VaultError> {
        match &self.cipher {
            Some(cipher) => {
                let envelope: Envelope = serde_json::from_slice(bytes)
                    .map_err(|e| VaultError::Corrupt(format!("not an envelope: {e}")))?;
                let plaintext = cipher.decrypt(&envelope)?;
                serde_json::from_slice(&plaintext)
                    .map_err(|e| VaultError::Corrupt(format!("bad payload: {e}")))
            }
            None => serde_json::from_slice(bytes)
                .map_err(|e| VaultError::Corrupt(format!("bad payload: {e}"))),
        }
    }

    fn write_unit(&self, context: &Context) -> Result<(), VaultError> {
        let bytes = self.encode(context)?;
        write_atomic(&self.unit_path(&context.id), &bytes)
    }

    /// Load every readable unit on disk into memory. Returns the count.
    fn load_all_units(&self) -> usize {
        let entries = match std::fs::read_dir(self.contexts_dir()) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to list context units");
                return 0;
            }
        };

        let mut loaded = HashMap::new();
        for entry in entries.filter_map(|entry| entry.ok()) {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let decoded = std::fs::read(&path)
                .map_err(VaultError::from)
                .and_then(|bytes| self.decode::<Context>(&bytes));
            match decoded {
                Ok(context) if is_safe_id(&context.id) => {
                    loaded.insert(context.id.clone(), context);
                }
                Ok(context) => {
                    warn!(context_id = %context.id, "Skipping context unit with unsafe id");
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable context unit");
                }
            }
        }

        let count = loaded.len();
        *self.contexts.write().unwrap_or_else(PoisonError::into_inner) = loaded;
        count
    }
}

impl ContextStore for Vault {
    fn name(&self) -> &str {
        "vault"
    }

    fn save_context(&self, context: &Context) -> Result<(), StoreError> {
        Vault::save_context(self, context).map_err(|e| match e {
            VaultError::MissingId => StoreError::MissingId,
            other => StoreError::Storage(other.to_string()),
        })
    }

    fn load_context(&self, id: &str) -> Option<Context> {
        Vault::load_context(self, id)
    }

    fn delete_context(&self, id: &str) -> bool {
        Vault::delete_context(self, id)
    }

    fn context_ids(&self) -> Vec<String> {
        Vault::context_ids(self)
    }
}

/// Ids become file names, so only a conservative character set is allowed.
fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Create the directory layout and prove the root is writable.
fn prepare_storage(root: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(root.join(CONTEXTS_DIR))?;
    std::fs::create_dir_all(root.join(BACKUPS_DIR))?;
    let probe = root.join(PROBE_FILE);
    std::fs::write(&probe, b"ok")?;
    std::fs::remove_file(&probe)
}

/// Pick the vault key: supplied, stored in `vault.key`, or freshly generated.
///
/// The boolean reports whether the key is durable. A generated key that
/// cannot be stored would make every unit unreadable after a restart, so the
/// caller drops to memory-only mode in that case.
fn resolve_cipher(
    root: &Path,
    supplied: Option<&str>,
    storage_available: bool,
) -> Result<(Cipher, bool), VaultError> {
    if let Some(key) = supplied {
        return Ok((Cipher::from_hex(key)?, true));
    }

    if !storage_available {
        return Ok((Cipher::from_hex(&Cipher::generate_key_hex())?, false));
    }

    let key_path = root.join(KEY_FILE);
    match std::fs::read_to_string(&key_path) {
        Ok(stored) => match Cipher::from_hex(stored.trim()) {
            Ok(cipher) => return Ok((cipher, true)),
            Err(e) => {
                warn!(path = %key_path.display(), error = %e, "Stored vault key is unusable");
                return Ok((Cipher::from_hex(&Cipher::generate_key_hex())?, false));
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(error = %e, "Failed to read vault key");
            return Ok((Cipher::from_hex(&Cipher::generate_key_hex())?, false));
        }
    }

    let generated = Cipher::generate_key_hex();
    let cipher = Cipher::from_hex(&generated)?;
    match write_key_file(&key_path, &generated) {
        Ok(()) => {
            info!(path = %key_path.display(), "Generated new vault key");
            Ok((cipher, true))
        }
        Err(e) => {
            error!(error = %e, "Failed to store generated vault key");
            Ok((cipher, false))
        }
    }
}

fn write_key_file(path: &Path, key_hex: &str) -> std::io::Result<()> {
    std::fs::write(path, key_hex)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

/// Write to a sibling temp file, then rename over the target.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), VaultError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxrelay_core::context::StateMap;
    use serde_json::json;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize)]
    struct Probe {
        value: u32,
    }

    fn key() -> String {
        "5a".repeat(32)
    }

    fn open(dir: &TempDir) -> Vault {
        Vault::open(VaultOptions::new(dir.path()).with_key(key())).unwrap()
    }

    fn ctx(app: &str, state: serde_json::Value) -> Context {
        Context::new(app, state.as_object().cloned().unwrap())
    }

    #[test]
    fn save_and_load_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let vault = open(&dir);
        let c = ctx("chatgpt", json!({"task": "research"}));
        vault.save_context(&c).unwrap();
        assert_eq!(vault.load_context(&c.id), Some(c.clone()));

        let reopened = open(&dir);
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.load_context(&c.id), Some(c));
    }

    #[test]
    fn units_on_disk_are_encrypted_envelopes() {
        let dir = TempDir::new().unwrap();
        let vault = open(&dir);
        let c = ctx("claude", json!({"secret": "launch codes"}));
        vault.save_context(&c).unwrap();

        let raw = std::fs::read_to_string(vault.unit_path(&c.id)).unwrap();
        assert!(!raw.contains("launch codes"));
        let envelope: Envelope = serde_json::from_str(&raw).unwrap();
        assert!(!envelope.iv.is_empty());
        assert!(!envelope.auth_tag.is_empty());
    }

    #[test]
    fn unencrypted_units_are_raw_json() {
        let dir = TempDir::new().unwrap();
        let vault = Vault::open(VaultOptions::new(dir.path()).unencrypted()).unwrap();
        let c = ctx("claude", json!({"note": "plain text"}));
        vault.save_context(&c).unwrap();

        let raw = std::fs::read_to_string(vault.unit_path(&c.id)).unwrap();
        assert!(raw.contains("plain text"));
        assert!(!dir.path().join(KEY_FILE).exists());
    }

    #[test]
    fn generated_key_is_stored_and_reused() {
        let dir = TempDir::new().unwrap();
        let vault = Vault::open(VaultOptions::new(dir.path())).unwrap();
        let c = ctx("gemini", json!({"k": 1}));
        vault.save_context(&c).unwrap();

        let stored = std::fs::read_to_string(dir.path().join(KEY_FILE)).unwrap();
        assert_eq!(stored.len(), 64);

        let reopened = Vault::open(VaultOptions::new(dir.path())).unwrap();
        assert_eq!(reopened.load_context(&c.id), Some(c));
    }

    #[test]
    fn corrupt_stored_key_degrades_to_memory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(KEY_FILE), "garbage-not-hex").unwrap();

        let vault = Vault::open(VaultOptions::new(dir.path())).unwrap();
        assert!(vault.is_fallback());
        assert!(vault.is_encrypted());

        let c = ctx("claude", json!({"k": 1}));
        vault.save_context(&c).unwrap();
        assert_eq!(vault.load_context(&c.id), Some(c.clone()));
        assert!(!vault.unit_path(&c.id).exists());
        assert!(vault.backup().is_none());
        assert_eq!(
            std::fs::read_to_string(dir.path().join(KEY_FILE)).unwrap(),
            "garbage-not-hex"
        );
    }

    #[test]
    fn invalid_supplied_key_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = Vault::open(VaultOptions::new(dir.path()).with_key("xyz")).unwrap_err();
        assert!(matches!(err, VaultError::Cipher(_)));
    }

    #[test]
    fn missing_id_is_a_validation_error() {
        let vault = Vault::in_memory();
        let c = Context::with_id("", "app", StateMap::new());
        assert!(matches!(vault.save_context(&c), Err(VaultError::MissingId)));
    }

    #[test]
    fn path_like_ids_are_rejected() {
        let vault = Vault::in_memory();
        let c = Context::with_id("../escape", "app", StateMap::new());
        assert!(matches!(vault.save_context(&c), Err(VaultError::InvalidId(_))));
    }

    #[test]
    fn corrupt_unit_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let vault = open(&dir);
        std::fs::write(vault.unit_path("broken"), b"{not json").unwrap();
        assert!(vault.load_context("broken").is_none());
        assert!(vault.load_context("never-existed").is_none());
    }

    #[test]
    fn wrong_key_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let c = ctx("app", json!({"x": 1}));
        open(&dir).save_context(&c).unwrap();

        let other = Vault::open(VaultOptions::new(dir.path()).with_key("7b".repeat(32))).unwrap();
        assert_eq!(other.len(), 0);
        assert!(other.load_context(&c.id).is_none());
    }

    #[test]
    fn tampered_unit_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let vault = open(&dir);
        let c = ctx("app", json!({"x": 1}));
        vault.save_context(&c).unwrap();

        let path = vault.unit_path(&c.id);
        let mut envelope: Envelope =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let mut bytes = hex::decode(&envelope.ciphertext).unwrap();
        bytes[0] ^= 0xff;
        envelope.ciphertext = hex::encode(bytes);
        std::fs::write(&path, serde_json::to_vec(&envelope).unwrap()).unwrap();

        let reopened = open(&dir);
        assert!(reopened.load_context(&c.id).is_none());
    }

    #[test]
    fn plaintext_unit_is_rejected_when_encrypted() {
        let dir = TempDir::new().unwrap();
        let vault = open(&dir);
        let c = ctx("app", json!({"x": 1}));
        std::fs::write(vault.unit_path(&c.id), serde_json::to_vec(&c).unwrap()).unwrap();
        assert!(vault.load_context(&c.id).is_none());
    }

    #[test]
    fn delete_removes_memory_and_disk() {
        let dir = TempDir::new().unwrap();
        let vault = open(&dir);
        let c = ctx("app", json!({}));
        vault.save_context(&c).unwrap();

        assert!(vault.delete_context(&c.id));
        assert!(!vault.unit_path(&c.id).exists());
        assert!(vault.load_context(&c.id).is_none());
        assert!(!vault.delete_context(&c.id));
    }

    #[test]
    fn rotation_keeps_newest_backups() {
        let dir = TempDir::new().unwrap();
        let vault =
            Vault::open(VaultOptions::new(dir.path()).with_key(key()).with_max_backups(3)).unwrap();
        vault.save_context(&ctx("app", json!({}))).unwrap();

        let written: Vec<i64> = (0..4).map(|_| vault.backup().unwrap()).collect();
        assert!(written.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(vault.list_backups(), written[1..].to_vec());
        assert_eq!(vault.stats().backups, 3);
    }

    #[test]
    fn backup_files_are_encrypted() {
        let dir = TempDir::new().unwrap();
        let vault = open(&dir);
        vault
            .save_context(&ctx("app", json!({"memo": "hidden snapshot"})))
            .unwrap();
        let ts = vault.backup().unwrap();

        let raw =
            std::fs::read_to_string(dir.path().join(BACKUPS_DIR).join(snapshot::file_name(ts)))
                .unwrap();
        assert!(!raw.contains("hidden snapshot"));
        assert!(raw.contains("auth_tag"));
    }

    #[test]
    fn restore_latest_replaces_contexts() {
        let dir = TempDir::new().unwrap();
        let vault = open(&dir);
        let kept = ctx("app", json!({"v": 1}));
        vault.save_context(&kept).unwrap();
        vault.backup().unwrap();

        let later = ctx("app", json!({"v": 2}));
        vault.save_context(&later).unwrap();
        assert_eq!(vault.len(), 2);

        assert!(vault.restore(None));
        assert_eq!(vault.context_ids(), vec![kept.id.clone()]);
        assert!(!vault.unit_path(&later.id).exists());

        let reopened = open(&dir);
        assert_eq!(reopened.contexts(), vec![kept]);
    }

    #[test]
    fn restore_specific_timestamp() {
        let dir = TempDir::new().unwrap();
        let vault = open(&dir);
        let first = ctx("app", json!({"n": 1}));
        vault.save_context(&first).unwrap();
        let ts1 = vault.backup().unwrap();

        let second = ctx("app", json!({"n": 2}));
        vault.save_context(&second).unwrap();
        vault.backup().unwrap();

        assert!(vault.restore(Some(ts1)));
        assert_eq!(vault.contexts(), vec![first]);
    }

    #[test]
    fn restore_without_backups_fails() {
        let dir = TempDir::new().unwrap();
        let vault = open(&dir);
        assert!(!vault.restore(None));
        assert!(!vault.restore(Some(12345)));
    }

    #[test]
    fn restore_with_wrong_key_fails_and_keeps_state() {
        let dir = TempDir::new().unwrap();
        let vault = open(&dir);
        vault.save_context(&ctx("app", json!({}))).unwrap();
        vault.backup().unwrap();
        drop(vault);

        // The units are unreadable under the new key, so nothing loads.
        let other = Vault::open(VaultOptions::new(dir.path()).with_key("0f".repeat(32))).unwrap();
        let survivor = ctx("app", json!({"alive": true}));
        other.save_context(&survivor).unwrap();

        assert!(!other.restore(None));
        assert_eq!(other.contexts(), vec![survivor]);
    }

    #[test]
    fn unusable_root_falls_back_to_memory() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file in the way").unwrap();

        let vault = Vault::open(VaultOptions::new(&blocker)).unwrap();
        let stats = vault.stats();
        assert!(stats.fallback_mode);
        assert_eq!(stats.backups, 0);

        let c = ctx("app", json!({"x": 1}));
        vault.save_context(&c).unwrap();
        assert_eq!(vault.load_context(&c.id), Some(c));
        assert_eq!(vault.backup(), None);
        assert_eq!(vault.try_backup(), BackupOutcome::Disabled);
        assert!(!vault.restore(None));
    }

    #[test]
    fn in_memory_vault_reports_fallback() {
        let vault = Vault::in_memory();
        assert!(vault.is_fallback());
        assert!(!vault.is_encrypted());
        assert!(vault.list_backups().is_empty());
    }

    #[test]
    fn try_backup_skips_while_in_flight() {
        let dir = TempDir::new().unwrap();
        let vault = open(&dir);
        let guard = vault.backup_guard.lock().unwrap();
        assert_eq!(vault.try_backup(), BackupOutcome::Skipped);
        drop(guard);
        assert!(matches!(vault.try_backup(), BackupOutcome::Written(_)));
    }

    #[test]
    fn encode_decode_roundtrip_for_arbitrary_payloads() {
        let dir = TempDir::new().unwrap();
        let vault = open(&dir);
        for value in [0u32, 1, 42, u32::MAX] {
            let bytes = vault.encode(&Probe { value }).unwrap();
            let back: Probe = vault.decode(&bytes).unwrap();
            assert_eq!(back.value, value);
        }
    }

    #[test]
    fn context_store_trait_maps_errors() {
        let vault = Vault::in_memory();
        let store: &dyn ContextStore = &vault;
        let c = Context::with_id("", "app", StateMap::new());
        assert_eq!(store.save_context(&c), Err(StoreError::MissingId));
        assert_eq!(store.name(), "vault");
    }

    #[tokio::test]
    async fn shutdown_takes_final_backup_that_restores_exactly() {
        let dir = TempDir::new().unwrap();
        let vault = Arc::new(open(&dir));
        let a = ctx("chatgpt", json!({"task": "research"}));
        let b = ctx("claude", json!({"steps": [1, 2]}));
        vault.save_context(&a).unwrap();
        vault.save_context(&b).unwrap();
        assert!(vault.start_auto_backup());

        let ts = vault.shutdown().await;
        assert!(ts.is_some());
        assert!(!vault.auto_backup_running());
        let expected = vault.contexts();
        drop(vault);

        // Wipe the per-context units so only the snapshot can bring them back.
        std::fs::remove_dir_all(dir.path().join(CONTEXTS_DIR)).unwrap();

        let fresh = open(&dir);
        assert!(fresh.is_empty());
        assert!(fresh.restore(None));
        assert_eq!(fresh.contexts(), expected);
    }

    #[tokio::test]
    async fn auto_backup_writes_on_interval() {
        let dir = TempDir::new().unwrap();
        let vault = Arc::new(
            Vault::open(
                VaultOptions::new(dir.path())
                    .with_key(key())
                    .with_backup_interval(Duration::from_millis(40)),
            )
            .unwrap(),
        );
        vault.save_context(&ctx("app", json!({}))).unwrap();
        assert!(vault.start_auto_backup());
        assert!(!vault.start_auto_backup());

        tokio::time::sleep(Duration::from_millis(200)).await;
        vault.stop_auto_backup().await;

        let written = vault.stats().backups_written;
        assert!(written >= 1, "expected at least one timed backup, got {written}");
    }

    #[test]
    fn auto_backup_needs_runtime() {
        let dir = TempDir::new().unwrap();
        let vault = Arc::new(open(&dir));
        assert!(!vault.start_auto_backup());
    }
}
