//! Tokenising helpers shared by scoring and amplification.

use std::collections::BTreeSet;

/// Words never treated as keywords.
pub const STOP_WORDS: &[&str] = &[
    "about", "also", "after", "because", "been", "before", "being", "between", "both", "could",
    "describe", "does", "each", "explain", "from", "have", "here", "into", "just", "like", "more",
    "most", "much", "only", "other", "over", "some", "such", "tell", "than", "that", "their",
    "them", "then", "there", "these", "they", "this", "those", "very", "want", "were", "what",
    "when", "where", "which", "while", "will", "with", "would", "your",
];

const MIN_KEYWORD_LEN: usize = 4;

/// Lower-cased keywords in order of first appearance, without duplicates.
pub fn keywords(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= MIN_KEYWORD_LEN)
        .filter(|token| !STOP_WORDS.contains(token))
        .filter(|token| !token.chars().all(|c| c.is_ascii_digit()))
        .filter(|token| seen.insert(token.to_string()))
        .map(str::to_string)
        .collect()
}

/// Keyword set, for overlap checks.
pub fn keyword_set(text: &str) -> BTreeSet<String> {
    keywords(text).into_iter().collect()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Split prose into trimmed sentences on `.`, `!` or `?` followed by whitespace.
pub fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().is_none_or(|(_, next)| next.is_whitespace());
            if at_boundary {
                let end = i + c.len_utf8();
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    out.push(sentence);
                }
                start = end;
            }
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

/// Case-insensitive count of each phrase's occurrences in `text`.
pub fn count_phrases(text: &str, phrases: &[&str]) -> usize {
    let lowered = text.to_lowercase();
    phrases
        .iter()
        .map(|phrase| lowered.matches(phrase).count())
        .sum()
}
