//! End-to-end integration tests for the ctxrelay context substrate.
//!
//! These tests drive the façade and the subsystems together against real
//! on-disk vaults: context lifecycle, momentum scoring, encrypted
//! persistence, backup rotation, restore, and answer housekeeping.

use std::sync::Arc;
use std::time::Duration;

use ctxrelay_bridge::ContextBridge;
use ctxrelay_config::{AppConfig, BridgeConfig};
use ctxrelay_core::context::{StateMap, TransitionData};
use ctxrelay_core::store::ContextStore;
use ctxrelay_housekeeper::HousekeeperError;
use ctxrelay_momentum::MomentumEngine;
use ctxrelay_orchestrator::{ContextRelay, RelayError};
use ctxrelay_vault::{Envelope, Vault, VaultOptions};
use serde_json::json;
use tempfile::TempDir;

// ── Helpers ──────────────────────────────────────────────────────────────

const KEY: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90";

fn state(value: serde_json::Value) -> StateMap {
    value.as_object().cloned().unwrap()
}

fn config_at(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.path = Some(dir.path().to_path_buf());
    config.storage.encryption_key = Some(KEY.into());
    config
}

fn vault_at(dir: &TempDir) -> Vault {
    Vault::open(VaultOptions::new(dir.path()).with_key(KEY)).unwrap()
}

// ── E2E: Context lifecycle ───────────────────────────────────────────────

#[test]
fn e2e_create_transition_back_and_forth() {
    let dir = TempDir::new().unwrap();
    let mut relay = ContextRelay::from_config(&config_at(&dir)).unwrap();

    let first = relay
        .create_context("app1", state(json!({"task": "research"})))
        .unwrap();
    let second = relay.create_context("app2", StateMap::new()).unwrap();

    let before = relay.bridge().ledger().len();
    assert!(relay.transition(&second, TransitionData::default()));
    assert!(relay.transition(&first, TransitionData::default()));

    assert_eq!(relay.bridge().ledger().len(), before + 2);
    assert_eq!(relay.get_active_context().unwrap().id, first);
    assert_eq!(relay.get_state().unwrap()["task"], "research");
}

#[test]
fn e2e_unknown_context_and_missing_active_are_reported() {
    let dir = TempDir::new().unwrap();
    let mut relay = ContextRelay::from_config(&config_at(&dir)).unwrap();

    assert!(!relay.transition("does-not-exist", TransitionData::default()));
    assert!(relay.get_state().is_none());
    assert!(matches!(
        relay.update_state(state(json!({"x": 1}))),
        Err(RelayError::Bridge(_))
    ));
}

#[test]
fn e2e_transition_scores_momentum_against_previous() {
    let dir = TempDir::new().unwrap();
    let mut relay = ContextRelay::from_config(&config_at(&dir)).unwrap();

    let a = relay
        .create_context(
            "chatgpt",
            state(json!({"task": "research rust ownership", "confidence": 0.8})),
        )
        .unwrap();
    let b = relay
        .create_context(
            "chatgpt",
            state(json!({"task": "research rust ownership", "confidence": 0.8})),
        )
        .unwrap();
    relay.transition(&a, TransitionData::default());
    relay.transition(&b, TransitionData::default());

    let vector = relay.current_momentum().unwrap();
    assert_eq!(vector.context_id, b);
    assert!((vector.factors.semantic - 1.0).abs() < 1e-9);
    assert_eq!(vector.factors.operational, 0.9);
    let floor = relay.momentum().config().min_momentum;
    assert!(vector.overall >= floor && vector.overall <= 1.0);
}

// ── E2E: Encrypted persistence ───────────────────────────────────────────

#[test]
fn e2e_bridge_persists_encrypted_units() {
    let dir = TempDir::new().unwrap();
    let id = {
        let mut relay = ContextRelay::from_config(&config_at(&dir)).unwrap();
        let id = relay
            .create_context("claude", state(json!({"secret": "quarterly numbers"})))
            .unwrap();
        relay.transition(&id, TransitionData::default());
        id
    };

    let raw = std::fs::read_to_string(dir.path().join("contexts").join(format!("{id}.json")))
        .unwrap();
    assert!(!raw.contains("quarterly numbers"));
    let envelope: Envelope = serde_json::from_str(&raw).unwrap();
    assert_eq!(envelope.iv.len(), 24);
    assert_eq!(envelope.auth_tag.len(), 32);

    let vault = vault_at(&dir);
    let loaded = vault.load_context(&id).unwrap();
    assert_eq!(loaded.state["secret"], "quarterly numbers");
    assert_eq!(loaded.access_count, 1);
}

#[test]
fn e2e_eviction_flushes_to_vault_and_rehydrates() {
    let dir = TempDir::new().unwrap();
    let vault = Arc::new(vault_at(&dir));
    let mut bridge = ContextBridge::new(
        BridgeConfig {
            max_contexts: 2,
            persist_on_change: false,
        },
        Arc::new(MomentumEngine::default()),
        vault.clone(),
    );

    let oldest = bridge
        .create_context("app", state(json!({"n": 1})))
        .unwrap();
    let middle = bridge.create_context("app", StateMap::new()).unwrap();
    bridge.transition(&middle, TransitionData::default());
    bridge.create_context("app", StateMap::new()).unwrap();

    assert!(bridge.get_context(&oldest).is_none());
    assert_eq!(vault.load_context(&oldest).unwrap().state["n"], 1);
    assert!(bridge.rehydrate(&oldest));
    assert!(bridge.transition(&oldest, TransitionData::default()));
}

// ── E2E: Backups ─────────────────────────────────────────────────────────

#[test]
fn e2e_rotation_keeps_newest_snapshots() {
    let dir = TempDir::new().unwrap();
    let mut config = config_at(&dir);
    config.backup.max_backups = 3;
    let mut relay = ContextRelay::from_config(&config).unwrap();
    relay.create_context("app", StateMap::new()).unwrap();

    let written: Vec<i64> = (0..4).map(|_| relay.backup().unwrap()).collect();
    assert_eq!(relay.list_backups(), written[1..].to_vec());
}

#[tokio::test]
async fn e2e_shutdown_backup_restores_on_fresh_vault() {
    let dir = TempDir::new().unwrap();
    let expected = {
        let mut relay = ContextRelay::from_config(&config_at(&dir)).unwrap();
        let a = relay
            .create_context("chatgpt", state(json!({"task": "research"})))
            .unwrap();
        let b = relay
            .create_context("claude", state(json!({"steps": ["outline", "draft"]})))
            .unwrap();
        relay.transition(&a, TransitionData::default());
        relay.transition(&b, TransitionData::with_reason("drafting"));
        relay.update_state(state(json!({"status": "in progress"}))).unwrap();
        assert!(relay.start());

        assert!(relay.shutdown().await.is_some());
        relay.vault().contexts()
    };

    std::fs::remove_dir_all(dir.path().join("contexts")).unwrap();

    let fresh = vault_at(&dir);
    assert!(fresh.is_empty());
    assert!(fresh.restore(None));
    assert_eq!(fresh.contexts(), expected);
}

#[tokio::test]
async fn e2e_auto_backup_runs_on_timer() {
    let dir = TempDir::new().unwrap();
    let vault = Arc::new(
        Vault::open(
            VaultOptions::new(dir.path())
                .with_key(KEY)
                .with_backup_interval(Duration::from_millis(30)),
        )
        .unwrap(),
    );
    let mut relay = ContextRelay::with_vault(&AppConfig::default(), vault.clone()).unwrap();
    relay.create_context("app", StateMap::new()).unwrap();
    assert!(relay.start());

    tokio::time::sleep(Duration::from_millis(150)).await;
    relay.shutdown().await;

    assert!(vault.stats().backups_written >= 2);
    assert!(!vault.auto_backup_running());
}

#[test]
fn e2e_restore_with_wrong_key_fails() {
    let dir = TempDir::new().unwrap();
    {
        let mut relay = ContextRelay::from_config(&config_at(&dir)).unwrap();
        relay.create_context("app", StateMap::new()).unwrap();
        relay.backup().unwrap();
    }

    let mut config = config_at(&dir);
    config.storage.encryption_key = Some("ff".repeat(32));
    let mut relay = ContextRelay::from_config(&config).unwrap();
    assert!(relay.bridge().is_empty());
    assert!(!relay.restore(None));
}

#[test]
fn e2e_unusable_storage_degrades_to_memory() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("occupied");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let mut config = AppConfig::default();
    config.storage.path = Some(blocker);
    let mut relay = ContextRelay::from_config(&config).unwrap();

    let id = relay.create_context("app", StateMap::new()).unwrap();
    assert!(relay.transition(&id, TransitionData::default()));
    assert!(relay.backup().is_none());

    let stats = relay.stats();
    assert!(stats.vault.fallback_mode);
    assert_eq!(stats.vault.backups, 0);
    assert_eq!(stats.vault.contexts, 1);
}

// ── E2E: Housekeeping ────────────────────────────────────────────────────

#[test]
fn e2e_filter_picks_substantive_answer() {
    let relay = ContextRelay::with_vault(&AppConfig::default(), Arc::new(Vault::in_memory()))
        .unwrap();
    let candidates = [
        "short",
        "The borrow checker enforces that each value has one owner, therefore data races \
         cannot compile. For example, two `&mut` borrows of the same Vec are rejected.",
        "It depends on various things, maybe.",
    ];

    let result = relay
        .filter_answers(&candidates, "Why can't safe Rust have data races?")
        .unwrap();
    assert_eq!(result.answer, candidates[1]);
    assert_eq!(result.ranking.len(), 3);

    let again = relay
        .filter_answers(&candidates, "Why can't safe Rust have data races?")
        .unwrap();
    assert_eq!(result.ranking, again.ranking);

    let stats = relay.stats().housekeeper;
    assert_eq!(stats.filtered, 2);
}

#[test]
fn e2e_filter_rejects_empty_candidates() {
    let relay = ContextRelay::with_vault(&AppConfig::default(), Arc::new(Vault::in_memory()))
        .unwrap();
    let none: Vec<String> = Vec::new();
    assert!(matches!(
        relay.filter_answers(&none, "What is X?"),
        Err(RelayError::Housekeeper(HousekeeperError::NoCandidates))
    ));

    let short = relay.filter_answers(&["short"], "What is X?").unwrap();
    assert!(short.score.completeness < 1.0);
}

#[test]
fn e2e_amplify_produces_sectioned_text() {
    let relay = ContextRelay::with_vault(&AppConfig::default(), Arc::new(Vault::in_memory()))
        .unwrap();
    let answer = "Tokio is an async runtime. It schedules tasks on a work-stealing pool.";
    let out = relay.amplify(answer, "What is Tokio?");

    assert!(out.starts_with("## Introduction\nTokio is an async runtime."));
    assert!(out.contains("## Details\nIt schedules tasks"));
    assert!(out.contains("## Deeper Analysis"));
    assert!(out.contains("Key takeaways: tokio"));
    assert_eq!(out, relay.amplify(answer, "What is Tokio?"));
    assert_eq!(relay.stats().housekeeper.amplified, 2);
}

#[test]
fn e2e_vault_is_a_context_store() {
    let dir = TempDir::new().unwrap();
    let vault = vault_at(&dir);
    let store: &dyn ContextStore = &vault;
    assert_eq!(store.name(), "vault");
    assert!(store.context_ids().is_empty());
    assert!(store.load_context("nothing").is_none());
}
