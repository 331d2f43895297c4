//! Context and transition domain types.
//!
//! A [`Context`] is one unit of conversational state owned by one external
//! application. Contexts flow Bridge → Momentum Engine (scoring) and
//! Bridge → Vault (persistence).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form state payload. No schema beyond being a string-keyed mapping.
pub type StateMap = serde_json::Map<String, serde_json::Value>;

/// One unit of conversational state tied to one external application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Unique identifier, assigned at creation
    pub id: String,

    /// Owning external application (platform)
    pub app_id: String,

    /// Free-form payload, shallow-merged by updates
    #[serde(default)]
    pub state: StateMap,

    /// When this context was created
    pub created_at: DateTime<Utc>,

    /// Refreshed on every read or mutation through the bridge
    pub last_access: DateTime<Utc>,

    /// Incremented on access, never decremented
    #[serde(default)]
    pub access_count: u64,

    /// Transition records where this context is the source or the target
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<TransitionRecord>,
}

impl Context {
    /// Create a fresh context with a new UUID.
    pub fn new(app_id: impl Into<String>, state: StateMap) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), app_id, state)
    }

    /// Create a context with an explicit id (used by restores and tests).
    pub fn with_id(id: impl Into<String>, app_id: impl Into<String>, state: StateMap) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            app_id: app_id.into(),
            state,
            created_at: now,
            last_access: now,
            access_count: 0,
            transitions: Vec::new(),
        }
    }

    /// Record an access: bump the counter and refresh `last_access`.
    pub fn touch(&mut self) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_access = Utc::now();
    }

    /// Shallow-merge `update` into the state. Top-level keys are replaced.
    pub fn merge_state(&mut self, update: StateMap) {
        for (key, value) in update {
            self.state.insert(key, value);
        }
    }

    /// Every context id this context has been linked to by a transition.
    pub fn linked_ids(&self) -> impl Iterator<Item = &str> {
        self.transitions.iter().flat_map(|t| {
            t.from
                .as_deref()
                .into_iter()
                .chain(std::iter::once(t.to.as_str()))
        })
    }

    /// Serialized form of the state, used by the keyword heuristics.
    pub fn state_text(&self) -> String {
        serde_json::to_string(&self.state).unwrap_or_default()
    }
}

/// Immutable record of one switch of the active context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub timestamp: DateTime<Utc>,

    /// Previously active context (None for the first transition)
    pub from: Option<String>,

    pub to: String,

    /// Whether state was carried over from `from` into `to`
    #[serde(default)]
    pub transferred: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Caller-supplied data accompanying a transition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Copy state keys missing from the target over from the previous context
    #[serde(default)]
    pub transfer_state: bool,
}

impl TransitionData {
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            transfer_state: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(value: serde_json::Value) -> StateMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn new_context_starts_untouched() {
        let ctx = Context::new("chatgpt", state(json!({"task": "research"})));
        assert!(!ctx.id.is_empty());
        assert_eq!(ctx.app_id, "chatgpt");
        assert_eq!(ctx.access_count, 0);
        assert!(ctx.transitions.is_empty());
        assert_eq!(ctx.created_at, ctx.last_access);
    }

    #[test]
    fn ids_are_unique() {
        let a = Context::new("app", StateMap::new());
        let b = Context::new("app", StateMap::new());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn touch_increments_and_refreshes() {
        let mut ctx = Context::new("app", StateMap::new());
        let before = ctx.last_access;
        ctx.touch();
        ctx.touch();
        assert_eq!(ctx.access_count, 2);
        assert!(ctx.last_access >= before);
    }

    #[test]
    fn merge_state_is_shallow() {
        let mut ctx = Context::new("app", state(json!({"a": 1, "nested": {"x": 1, "y": 2}})));
        ctx.merge_state(state(json!({"b": 2, "nested": {"z": 3}})));
        assert_eq!(ctx.state["a"], json!(1));
        assert_eq!(ctx.state["b"], json!(2));
        assert_eq!(ctx.state["nested"], json!({"z": 3}));
    }

    #[test]
    fn linked_ids_cover_both_ends() {
        let mut ctx = Context::with_id("b", "app", StateMap::new());
        ctx.transitions.push(TransitionRecord {
            timestamp: Utc::now(),
            from: Some("a".into()),
            to: "b".into(),
            transferred: false,
            reason: None,
        });
        ctx.transitions.push(TransitionRecord {
            timestamp: Utc::now(),
            from: None,
            to: "c".into(),
            transferred: false,
            reason: None,
        });
        let ids: Vec<&str> = ctx.linked_ids().collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn context_serialization_roundtrip() {
        let ctx = Context::new("claude", state(json!({"topic": "rust ownership"})));
        let json = serde_json::to_string(&ctx).unwrap();
        assert!(json.contains("rust ownership"));
        let back: Context = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ctx);
    }
}
