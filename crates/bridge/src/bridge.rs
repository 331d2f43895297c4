//! The context bridge: registry, active pointer, and transition ledger.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use ctxrelay_config::BridgeConfig;
use ctxrelay_core::context::{Context, StateMap, TransitionData, TransitionRecord};
use ctxrelay_core::error::BridgeError;
use ctxrelay_core::momentum::MomentumVector;
use ctxrelay_core::store::ContextStore;
use ctxrelay_momentum::MomentumEngine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Point-in-time bridge statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStats {
    pub contexts: usize,
    pub active_context: Option<String>,
    pub transitions: usize,
    pub evictions: u64,
}

/// Registry of live contexts plus the append-only transition ledger.
///
/// The bridge is the single writer for the contexts it holds: every
/// mutation goes through `&mut self`. Contexts are moved out of the
/// registry only after they have been flushed to the store.
pub struct ContextBridge {
    config: BridgeConfig,
    momentum: Arc<MomentumEngine>,
    store: Arc<dyn ContextStore>,
    contexts: HashMap<String, Context>,
    active: Option<String>,
    ledger: Vec<TransitionRecord>,
    evictions: u64,
}

impl ContextBridge {
    pub fn new(
        config: BridgeConfig,
        momentum: Arc<MomentumEngine>,
        store: Arc<dyn ContextStore>,
    ) -> Self {
        Self {
            config,
            momentum,
            store,
            contexts: HashMap::new(),
            active: None,
            ledger: Vec::new(),
            evictions: 0,
        }
    }

    pub fn momentum(&self) -> &Arc<MomentumEngine> {
        &self.momentum
    }

    pub fn store(&self) -> &Arc<dyn ContextStore> {
        &self.store
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Register a new context for `app_id` and return its id.
    ///
    /// When the registry is full, the least recently accessed inactive
    /// context is flushed to the store and evicted first.
    pub fn create_context(
        &mut self,
        app_id: &str,
        initial_state: StateMap,
    ) -> Result<String, BridgeError> {
        if app_id.trim().is_empty() {
            return Err(BridgeError::InvalidArgument("app_id must not be empty".into()));
        }

        self.make_room(1)?;

        let context = Context::new(app_id, initial_state);
        let id = context.id.clone();
        if self.config.persist_on_change {
            self.store
                .save_context(&context)
                .map_err(|e| BridgeError::Persist {
                    context_id: id.clone(),
                    reason: e.to_string(),
                })?;
        }
        self.contexts.insert(id.clone(), context);

        info!(context_id = %id, app_id, live = self.contexts.len(), "Context created");
        Ok(id)
    }

    /// Make `target_id` the active context.
    ///
    /// Returns `false` when the target is not registered; nothing changes in
    /// that case.
    pub fn transition(&mut self, target_id: &str, data: TransitionData) -> bool {
        if !self.contexts.contains_key(target_id) {
            warn!(context_id = %target_id, "Transition to unknown context refused");
            return false;
        }

        let now = Utc::now();
        let from = self.active.clone();
        let previous = from
            .as_deref()
            .filter(|prev| *prev != target_id)
            .and_then(|prev| self.contexts.get(prev))
            .cloned();

        let carried = match (&previous, data.transfer_state) {
            (Some(prev), true) => {
                let target_state = &self.contexts[target_id].state;
                prev.state
                    .iter()
                    .filter(|(key, _)| !target_state.contains_key(*key))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect::<StateMap>()
            }
            _ => StateMap::new(),
        };

        let record = TransitionRecord {
            timestamp: now,
            from: from.clone(),
            to: target_id.to_string(),
            transferred: !carried.is_empty(),
            reason: data.reason,
        };

        if let Some(prev) = previous.as_ref().and_then(|p| self.contexts.get_mut(&p.id)) {
            prev.transitions.push(record.clone());
        }

        let carried_keys = carried.len();
        let target = self
            .contexts
            .get_mut(target_id)
            .map(|target| {
                target.merge_state(carried);
                target.transitions.push(record.clone());
                target.touch();
                target.clone()
            });
        let Some(target) = target else {
            return false;
        };

        self.ledger.push(record);
        self.active = Some(target_id.to_string());

        self.momentum
            .record_transition(from.as_deref(), target_id, now);
        let vector = self.momentum.calculate(&target, previous.as_ref());

        info!(
            from = from.as_deref().unwrap_or("none"),
            to = %target_id,
            carried_keys,
            momentum = vector.overall,
            "Context transition"
        );

        if self.config.persist_on_change {
            self.persist_quietly(&target);
            if let Some(prev) = previous.and_then(|p| self.contexts.get(&p.id)) {
                self.persist_quietly(prev);
            }
        }
        true
    }

    /// Shallow-merge `update` into the active context's state.
    ///
    /// With `persist_on_change` the merged context is saved first; if the
    /// store refuses it, the live context is left unchanged.
    pub fn update_state(&mut self, update: StateMap) -> Result<(), BridgeError> {
        let active_id = self.active.clone().ok_or(BridgeError::NoActiveContext)?;
        let current = self
            .contexts
            .get(&active_id)
            .ok_or(BridgeError::NoActiveContext)?;

        let keys = update.len();
        let mut merged = current.clone();
        merged.merge_state(update);
        merged.touch();

        if self.config.persist_on_change {
            self.store
                .save_context(&merged)
                .map_err(|e| BridgeError::Persist {
                    context_id: active_id.clone(),
                    reason: e.to_string(),
                })?;
        }

        debug!(context_id = %active_id, keys, "State updated");
        self.contexts.insert(active_id, merged);
        Ok(())
    }

    /// Remove a context from the registry after flushing it to the store.
    ///
    /// The stored copy is kept. Returns `Ok(false)` for an unknown id.
    pub fn remove_context(&mut self, id: &str) -> Result<bool, BridgeError> {
        let Some(context) = self.contexts.get(id) else {
            return Ok(false);
        };
        self.store
            .save_context(context)
            .map_err(|e| BridgeError::Persist {
                context_id: id.to_string(),
                reason: e.to_string(),
            })?;

        self.contexts.remove(id);
        self.momentum.forget(id);
        if self.active.as_deref() == Some(id) {
            self.active = None;
        }
        debug!(context_id = %id, "Context removed from bridge");
        Ok(true)
    }

    /// Bring a context back from the store into the registry.
    ///
    /// Returns `true` if the context is live afterwards.
    pub fn rehydrate(&mut self, id: &str) -> bool {
        if self.contexts.contains_key(id) {
            return true;
        }
        let Some(context) = self.store.load_context(id) else {
            debug!(context_id = %id, "Nothing to rehydrate");
            return false;
        };
        if let Err(e) = self.make_room(1) {
            warn!(context_id = %id, error = %e, "Rehydration aborted");
            return false;
        }
        self.contexts.insert(context.id.clone(), context);
        debug!(context_id = %id, "Context rehydrated from store");
        true
    }

    /// Replace the whole registry, e.g. after a vault restore.
    ///
    /// The ledger is history and is kept. The active pointer survives only
    /// if its context is among the new ones.
    pub fn replace_contexts(&mut self, contexts: Vec<Context>) {
        let previous = std::mem::replace(
            &mut self.contexts,
            contexts.into_iter().map(|c| (c.id.clone(), c)).collect(),
        );
        for id in previous.keys().filter(|id| !self.contexts.contains_key(*id)) {
            self.momentum.forget(id);
        }
        if let Some(active) = &self.active {
            if !self.contexts.contains_key(active) {
                self.active = None;
            }
        }
        if let Err(e) = self.make_room(0) {
            warn!(error = %e, "Registry still over capacity after replacement");
        }
        info!(contexts = self.contexts.len(), "Bridge registry replaced");
    }

    /// Save every live context. Returns how many the store accepted.
    pub fn persist_all(&self) -> usize {
        let mut ids: Vec<&String> = self.contexts.keys().collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| self.contexts.get(id))
            .filter(|context| self.persist_quietly(context))
            .count()
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn get_state(&self) -> Option<&StateMap> {
        self.get_active_context().map(|c| &c.state)
    }

    pub fn get_active_context(&self) -> Option<&Context> {
        self.active.as_ref().and_then(|id| self.contexts.get(id))
    }

    pub fn active_context_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn get_context(&self, id: &str) -> Option<&Context> {
        self.contexts.get(id)
    }

    /// Latest momentum vector for the active context.
    pub fn current_momentum(&self) -> Option<MomentumVector> {
        self.active.as_ref().and_then(|id| self.momentum.get(id))
    }

    /// Every transition, oldest first.
    pub fn ledger(&self) -> &[TransitionRecord] {
        &self.ledger
    }

    pub fn context_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.contexts.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            contexts: self.contexts.len(),
            active_context: self.active.clone(),
            transitions: self.ledger.len(),
            evictions: self.evictions,
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Evict until `incoming` more contexts fit under `max_contexts`.
    fn make_room(&mut self, incoming: usize) -> Result<(), BridgeError> {
        let limit = self.config.max_contexts.max(1);
        while self.contexts.len() + incoming > limit {
            let Some(victim) = self.eviction_candidate() else {
                return Err(BridgeError::EvictionFailed {
                    context_id: self.active.clone().unwrap_or_default(),
                    reason: "no inactive context left to evict".into(),
                });
            };
            self.evict(&victim)?;
        }
        Ok(())
    }

    /// Least recently accessed inactive context; ties go to the oldest.
    fn eviction_candidate(&self) -> Option<String> {
        self.contexts
            .values()
            .filter(|c| self.active.as_deref() != Some(c.id.as_str()))
            .min_by(|a, b| {
                a.last_access
                    .cmp(&b.last_access)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            })
            .map(|c| c.id.clone())
    }

    fn evict(&mut self, id: &str) -> Result<(), BridgeError> {
        let Some(context) = self.contexts.get(id) else {
            return Ok(());
        };
        self.store
            .save_context(context)
            .map_err(|e| BridgeError::EvictionFailed {
                context_id: id.to_string(),
                reason: e.to_string(),
            })?;

        self.contexts.remove(id);
        self.momentum.forget(id);
        self.evictions += 1;
        info!(context_id = %id, store = self.store.name(), "Context flushed and evicted");
        Ok(())
    }

    fn persist_quietly(&self, context: &Context) -> bool {
        match self.store.save_context(context) {
            Ok(()) => true,
            Err(e) => {
                warn!(context_id = %context.id, error = %e, "Failed to persist context");
                false
            }
        }
    }
}
