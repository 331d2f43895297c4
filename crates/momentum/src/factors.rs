//! The five momentum factors as pure functions.
//!
//! Each factor maps to `[0, 1]`. The heuristics are deliberately simple
//! bag-of-words and key-set comparisons over the context state.

use std::collections::BTreeSet;

use ctxrelay_core::context::{Context, StateMap};

/// Words ignored by keyword extraction.
pub const STOP_WORDS: &[&str] = &[
    "about", "also", "been", "being", "could", "does", "each", "from", "have", "into", "just",
    "more", "most", "much", "only", "other", "over", "same", "should", "some", "such", "than",
    "that", "their", "them", "then", "there", "these", "they", "this", "those", "very", "were",
    "what", "when", "where", "which", "while", "will", "with", "would", "your",
];

/// State keys whose contents count as reasoning steps.
pub const DEPTH_KEYS: &[&str] = &["steps", "reasoning", "chain", "analysis", "conclusions"];

/// Discourse connectives that signal a continuing line of reasoning.
pub const CONTINUITY_MARKERS: &[&str] = &[
    "therefore",
    "consequently",
    "furthermore",
    "moreover",
    "thus",
    "hence",
    "as a result",
    "building on",
    "following from",
];

/// Minimum token length kept by [`extract_keywords`].
const MIN_KEYWORD_LEN: usize = 4;

const SAME_APP: f64 = 0.9;
const SHARED_TRANSITIONS: f64 = 0.7;
const UNRELATED: f64 = 0.3;
const TRANSITION_OVERLAP_THRESHOLD: f64 = 0.3;

const NEUTRAL_CONFIDENCE: f64 = 0.5;
const ACCESS_BONUS_PER_HIT: f64 = 0.05;
const MAX_ACCESS_BONUS: f64 = 0.3;

/// Standard half-life decay: `exp(-ln2 / half_life * elapsed)`, floored at `min`.
///
/// Negative elapsed time (clock skew) is treated as zero.
pub fn temporal(elapsed_ms: f64, half_life_ms: f64, min: f64) -> f64 {
    let elapsed = elapsed_ms.max(0.0);
    let decay = (-(std::f64::consts::LN_2 / half_life_ms) * elapsed).exp();
    decay.clamp(min, 1.0)
}

/// `|A ∩ B| / |A ∪ B|`. Two empty sets score 0.
pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// `|A ∩ B| / max(|A|, |B|)`. Two empty sets score 0.
pub fn overlap<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    let largest = a.len().max(b.len());
    if largest == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / largest as f64
}

/// Lower-cased alphanumeric tokens of length ≥ 4, minus stop words.
pub fn extract_keywords(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= MIN_KEYWORD_LEN)
        .filter(|token| !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect()
}

fn key_set(state: &StateMap) -> BTreeSet<&str> {
    state.keys().map(String::as_str).collect()
}

/// Similarity of the two state mappings: 60% key-set Jaccard, 40% keyword overlap.
///
/// No previous context means no basis for comparison, so continuity is assumed.
pub fn semantic(current: &Context, previous: Option<&Context>) -> f64 {
    let Some(previous) = previous else {
        return 1.0;
    };

    let keys = jaccard(&key_set(&current.state), &key_set(&previous.state));
    let keywords = overlap(
        &extract_keywords(&current.state_text()),
        &extract_keywords(&previous.state_text()),
    );

    (0.6 * keys + 0.4 * keywords).clamp(0.0, 1.0)
}

/// Continuity of the working environment between two contexts.
pub fn operational(current: &Context, previous: Option<&Context>) -> f64 {
    let Some(previous) = previous else {
        return 1.0;
    };

    if current.app_id == previous.app_id {
        return SAME_APP;
    }

    let current_ids: BTreeSet<&str> = current.linked_ids().collect();
    let previous_ids: BTreeSet<&str> = previous.linked_ids().collect();
    if overlap(&current_ids, &previous_ids) > TRANSITION_OVERLAP_THRESHOLD {
        SHARED_TRANSITIONS
    } else {
        UNRELATED
    }
}

/// Number of reasoning steps recorded under the well-known depth keys.
pub fn reasoning_steps(state: &StateMap) -> usize {
    DEPTH_KEYS
        .iter()
        .filter_map(|key| state.get(*key))
        .map(|value| match value {
            serde_json::Value::Array(items) => items.len(),
            serde_json::Value::Object(map) => map.len(),
            serde_json::Value::Null => 0,
            _ => 1,
        })
        .sum()
}

/// Whether the serialized state contains any continuity marker.
pub fn has_continuity_markers(text: &str) -> bool {
    let lowered = text.to_lowercase();
    CONTINUITY_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Reasoning depth: step count out of 10, plus 0.2 for continuity markers.
pub fn depth(context: &Context) -> f64 {
    let steps = (reasoning_steps(&context.state) as f64 / 10.0).min(1.0);
    let bonus = if has_continuity_markers(&context.state_text()) {
        0.2
    } else {
        0.0
    };
    (steps + bonus).min(1.0)
}

/// Stated confidence (or certainty), boosted by repeated access.
pub fn confidence(context: &Context) -> f64 {
    let stated = context
        .state
        .get("confidence")
        .or_else(|| context.state.get("certainty"))
        .and_then(serde_json::Value::as_f64);

    match stated {
        None => NEUTRAL_CONFIDENCE,
        Some(value) => {
            let bonus = (context.access_count as f64 * ACCESS_BONUS_PER_HIT).min(MAX_ACCESS_BONUS);
            (value.clamp(0.0, 1.0) + bonus).min(1.0)
        }
    }
}
