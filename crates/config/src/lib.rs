//! Configuration loading, validation, and management for ctxrelay.
//!
//! Loads configuration from `~/.ctxrelay/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ctxrelay/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Vault storage and encryption
    #[serde(default)]
    pub storage: StorageConfig,

    /// Automatic backup schedule and retention
    #[serde(default)]
    pub backup: BackupConfig,

    /// Momentum engine tuning
    #[serde(default)]
    pub momentum: MomentumConfig,

    /// Context bridge limits
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Answer scoring weights
    #[serde(default)]
    pub housekeeper: HousekeeperConfig,
}

fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Vault directory. Defaults to `~/.ctxrelay/vault` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Hex-encoded 32-byte key. Generated and stored in the vault when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            encrypt: true,
            encryption_key: None,
        }
    }
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("path", &self.path)
            .field("encrypt", &self.encrypt)
            .field("encryption_key", &redact(&self.encryption_key))
            .finish()
    }
}

impl StorageConfig {
    /// The configured vault directory, or the default one.
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("vault"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_backup_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
}

fn default_backup_interval() -> u64 {
    300
}
fn default_max_backups() -> usize {
    10
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_backup_interval(),
            max_backups: default_max_backups(),
        }
    }
}

/// Per-factor weights for the momentum score. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentumWeights {
    pub temporal: f64,
    pub semantic: f64,
    pub operational: f64,
    pub depth: f64,
    pub confidence: f64,
}

impl MomentumWeights {
    pub fn sum(&self) -> f64 {
        self.temporal + self.semantic + self.operational + self.depth + self.confidence
    }

    /// Weights in the same order as `MomentumFactors::as_array`.
    pub fn as_array(&self) -> [f64; 5] {
        [
            self.temporal,
            self.semantic,
            self.operational,
            self.depth,
            self.confidence,
        ]
    }
}

impl Default for MomentumWeights {
    fn default() -> Self {
        Self {
            temporal: 0.25,
            semantic: 0.30,
            operational: 0.20,
            depth: 0.15,
            confidence: 0.10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumConfig {
    /// Half-life of the temporal factor, in milliseconds
    #[serde(default = "default_half_life_ms")]
    pub half_life_ms: f64,

    /// Floor for the temporal factor and the overall score
    #[serde(default = "default_min_momentum")]
    pub min_momentum: f64,

    /// Maximum transition history entries kept by the engine
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    #[serde(default)]
    pub weights: MomentumWeights,
}

fn default_half_life_ms() -> f64 {
    30_000.0
}
fn default_min_momentum() -> f64 {
    0.1
}
fn default_max_history() -> usize {
    100
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            half_life_ms: default_half_life_ms(),
            min_momentum: default_min_momentum(),
            max_history: default_max_history(),
            weights: MomentumWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Maximum live contexts held in memory before eviction
    #[serde(default = "default_max_contexts")]
    pub max_contexts: usize,

    /// Save mutated contexts to the vault after every bridge operation
    #[serde(default = "default_true")]
    pub persist_on_change: bool,
}

fn default_max_contexts() -> usize {
    1000
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_contexts: default_max_contexts(),
            persist_on_change: true,
        }
    }
}

/// Per-factor weights for answer scoring. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnswerWeights {
    pub relevance: f64,
    pub completeness: f64,
    pub structure: f64,
    pub confidence: f64,
    pub contradiction: f64,
    pub context_alignment: f64,
    pub specificity: f64,
    pub evidence: f64,
}

impl AnswerWeights {
    pub fn sum(&self) -> f64 {
        self.relevance
            + self.completeness
            + self.structure
            + self.confidence
            + self.contradiction
            + self.context_alignment
            + self.specificity
            + self.evidence
    }
}

impl Default for AnswerWeights {
    fn default() -> Self {
        Self {
            relevance: 0.20,
            completeness: 0.15,
            structure: 0.10,
            confidence: 0.10,
            contradiction: 0.10,
            context_alignment: 0.10,
            specificity: 0.15,
            evidence: 0.10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HousekeeperConfig {
    /// Candidates scoring below this are counted as rejected
    #[serde(default = "default_rejection_threshold")]
    pub rejection_threshold: f64,

    /// Maximum filter log entries retained
    #[serde(default = "default_max_log_entries")]
    pub max_log_entries: usize,

    #[serde(default)]
    pub weights: AnswerWeights,
}

fn default_rejection_threshold() -> f64 {
    0.4
}
fn default_max_log_entries() -> usize {
    1000
}

impl Default for HousekeeperConfig {
    fn default() -> Self {
        Self {
            rejection_threshold: default_rejection_threshold(),
            max_log_entries: default_max_log_entries(),
            weights: AnswerWeights::default(),
        }
    }
}

const WEIGHT_TOLERANCE: f64 = 1e-6;

impl AppConfig {
    /// Load configuration from the default path (~/.ctxrelay/config.toml).
    ///
    /// Environment variables override file values:
    /// - `CTXRELAY_STORAGE_PATH`
    /// - `CTXRELAY_ENCRYPTION_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(path) = std::env::var("CTXRELAY_STORAGE_PATH") {
            config.storage.path = Some(PathBuf::from(path));
        }

        if let Ok(key) = std::env::var("CTXRELAY_ENCRYPTION_KEY") {
            config.storage.encryption_key = Some(key);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ctxrelay")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(key) = &self.storage.encryption_key {
            if key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ConfigError::ValidationError(
                    "storage.encryption_key must be 64 hex characters (32 bytes)".into(),
                ));
            }
        }

        if self.backup.interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "backup.interval_secs must be > 0".into(),
            ));
        }

        if self.backup.max_backups == 0 {
            return Err(ConfigError::ValidationError(
                "backup.max_backups must be >= 1".into(),
            ));
        }

        if self.momentum.half_life_ms.is_nan() || self.momentum.half_life_ms <= 0.0 {
            return Err(ConfigError::ValidationError(
                "momentum.half_life_ms must be > 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.momentum.min_momentum) {
            return Err(ConfigError::ValidationError(
                "momentum.min_momentum must be between 0.0 and 1.0".into(),
            ));
        }

        if (self.momentum.weights.sum() - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::ValidationError(format!(
                "momentum.weights must sum to 1.0 (got {:.4})",
                self.momentum.weights.sum()
            )));
        }

        if self.bridge.max_contexts == 0 {
            return Err(ConfigError::ValidationError(
                "bridge.max_contexts must be >= 1".into(),
            ));
        }

        if (self.housekeeper.weights.sum() - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::ValidationError(format!(
                "housekeeper.weights must sum to 1.0 (got {:.4})",
                self.housekeeper.weights.sum()
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
