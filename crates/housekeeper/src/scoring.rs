//! Eight-factor answer scoring.
//!
//! Every factor is a cheap keyword, pattern, or length heuristic in
//! `[0, 1]`. Empty text scores 0 on every factor; nothing here can fail
//! once the scorer is built.

use ctxrelay_config::AnswerWeights;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::HousekeeperError;
use crate::text;

/// Word count at which completeness peaks.
pub const OPTIMAL_WORDS: usize = 150;
const COMPLETENESS_FLOOR: f64 = 0.5;
/// Words past the optimum over which completeness decays to its floor.
const COMPLETENESS_DECAY_SPAN: f64 = 600.0;

const WEIGHT_TOLERANCE: f64 = 1e-6;

const CONFIDENT_MARKERS: &[&str] = &[
    "clearly",
    "definitely",
    "certainly",
    "in fact",
    "precisely",
    "specifically",
    "demonstrates",
    "proven",
    "guarantees",
];

const HEDGE_MARKERS: &[&str] = &[
    "maybe",
    "perhaps",
    "might",
    "possibly",
    "probably",
    "i think",
    "i believe",
    "not sure",
    "unclear",
    "it seems",
];

const PROCEDURAL_SIGNALS: &[&str] = &["first", "then", "next", "finally", "step"];
const CAUSAL_SIGNALS: &[&str] = &[
    "because",
    "since",
    "due to",
    "therefore",
    "as a result",
    "leads to",
    "causes",
];
const DEFINITIONAL_SIGNALS: &[&str] = &[" is ", " are ", "refers to", "means", "defined as", "known as"];
const COMPARATIVE_SIGNALS: &[&str] = &[
    "whereas",
    "unlike",
    "compared",
    "both",
    "on the other hand",
    " than ",
    "while",
];

/// What kind of answer a question calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    Procedural,
    Causal,
    Definitional,
    Comparative,
    General,
}

impl QuestionKind {
    pub fn classify(question: &str) -> Self {
        let lowered = question.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has = |w: &str| words.contains(&w);

        if has("compare") || has("difference") || has("vs") || has("versus") {
            Self::Comparative
        } else if has("how") {
            Self::Procedural
        } else if has("why") {
            Self::Causal
        } else if has("what") || has("define") || has("who") || has("meaning") {
            Self::Definitional
        } else {
            Self::General
        }
    }

    fn signals(self) -> &'static [&'static str] {
        match self {
            Self::Procedural => PROCEDURAL_SIGNALS,
            Self::Causal => CAUSAL_SIGNALS,
            Self::Definitional => DEFINITIONAL_SIGNALS,
            Self::Comparative => COMPARATIVE_SIGNALS,
            Self::General => &[],
        }
    }
}

/// Per-factor scores for one candidate answer, plus the weighted overall.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerScore {
    pub relevance: f64,
    pub completeness: f64,
    pub structure: f64,
    pub confidence: f64,
    /// 1.0 means no internal contradiction signals
    pub contradiction: f64,
    pub context_alignment: f64,
    pub specificity: f64,
    pub evidence: f64,
    pub overall: f64,
}

impl AnswerScore {
    /// The eight factors in weight-table order.
    pub fn factors(&self) -> [f64; 8] {
        [
            self.relevance,
            self.completeness,
            self.structure,
            self.confidence,
            self.contradiction,
            self.context_alignment,
            self.specificity,
            self.evidence,
        ]
    }
}

fn weight_array(weights: &AnswerWeights) -> [f64; 8] {
    [
        weights.relevance,
        weights.completeness,
        weights.structure,
        weights.confidence,
        weights.contradiction,
        weights.context_alignment,
        weights.specificity,
        weights.evidence,
    ]
}

struct Patterns {
    list_item: Regex,
    heading: Regex,
    contrast: Regex,
    number: Regex,
    inline_code: Regex,
    citation: Regex,
    evidence: Regex,
    generic: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, HousekeeperError> {
        let re = |pattern: &str| {
            Regex::new(pattern).map_err(|e| HousekeeperError::InvalidPattern(e.to_string()))
        };
        Ok(Self {
            list_item: re(r"(?m)^\s*(?:[-*•]|\d+[.)])\s+\S")?,
            heading: re(r"(?m)^\s*#{1,6}\s+\S")?,
            contrast: re(
                r"(?i)\b(?:however|but|although|though|nevertheless|nonetheless|conversely|on the contrary)\b",
            )?,
            number: re(r"\b\d+(?:[.,]\d+)*%?")?,
            inline_code: re(r"`[^`\n]+`")?,
            citation: re(r"\[\d+\]|https?://\S+|\(\w[^()]*\d{4}\)")?,
            evidence: re(
                r"(?i)\b(?:according to|research|study|studies|data|evidence|for example|for instance|e\.g\.|measured|benchmark|survey|source)",
            )?,
            generic: re(r"(?i)\b(?:in general|it depends|various|many things|and so on|etc|stuff)\b")?,
        })
    }
}

/// Scores answers against a question with a fixed weight table.
pub struct AnswerScorer {
    weights: [f64; 8],
    patterns: Patterns,
}

impl std::fmt::Debug for AnswerScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerScorer")
            .field("weights", &self.weights)
            .finish_non_exhaustive()
    }
}

impl AnswerScorer {
    pub fn new(weights: &AnswerWeights) -> Result<Self, HousekeeperError> {
        let sum = weights.sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(HousekeeperError::UnbalancedWeights(sum));
        }
        Ok(Self {
            weights: weight_array(weights),
            patterns: Patterns::compile()?,
        })
    }

    /// Score one answer.
    pub fn score(&self, answer: &str, question: &str) -> AnswerScore {
        if answer.trim().is_empty() {
            return AnswerScore::default();
        }

        let mut score = AnswerScore {
            relevance: relevance(answer, question),
            completeness: completeness(text::word_count(answer)),
            structure: self.structure(answer),
            confidence: confidence(answer),
            contradiction: self.contradiction(answer),
            context_alignment: context_alignment(answer, QuestionKind::classify(question)),
            specificity: self.specificity(answer),
            evidence: self.evidence(answer),
            overall: 0.0,
        };
        score.overall = self.combine(&score.factors());
        score
    }

    fn combine(&self, factors: &[f64; 8]) -> f64 {
        factors
            .iter()
            .zip(self.weights)
            .map(|(factor, weight)| factor * weight)
            .sum::<f64>()
            .clamp(0.0, 1.0)
    }

    /// Lists, headings, paragraphs, and sentence count.
    fn structure(&self, answer: &str) -> f64 {
        let mut score = 0.0;
        if self.patterns.list_item.is_match(answer) {
            score += 0.3;
        }
        if self.patterns.heading.is_match(answer) {
            score += 0.2;
        }
        let paragraphs = answer
            .split("\n\n")
            .filter(|p| !p.trim().is_empty())
            .count();
        if paragraphs >= 2 {
            score += 0.2;
        }
        let sentences = text::sentences(answer).len();
        score += (sentences as f64 * 0.1).min(0.3);
        score.min(1.0)
    }

    /// Each contrast connective costs 0.2.
    fn contradiction(&self, answer: &str) -> f64 {
        let contrasts = self.patterns.contrast.find_iter(answer).count();
        (1.0 - contrasts as f64 * 0.2).max(0.0)
    }

    /// Concrete detail (numbers, names, code) minus vague filler.
    fn specificity(&self, answer: &str) -> f64 {
        let concrete = self.patterns.number.find_iter(answer).count()
            + self.patterns.inline_code.find_iter(answer).count()
            + proper_nouns(answer);
        let vague = self.patterns.generic.find_iter(answer).count();
        ((concrete as f64 / 5.0).min(1.0) - vague as f64 * 0.1).clamp(0.0, 1.0)
    }

    fn evidence(&self, answer: &str) -> f64 {
        let hits = self.patterns.evidence.find_iter(answer).count()
            + self.patterns.citation.find_iter(answer).count();
        (hits as f64 * 0.25).min(1.0)
    }
}

/// Share of the question's keywords the answer mentions.
pub fn relevance(answer: &str, question: &str) -> f64 {
    let wanted = text::keyword_set(question);
    if wanted.is_empty() {
        return 0.5;
    }
    let found = text::keyword_set(answer);
    wanted.intersection(&found).count() as f64 / wanted.len() as f64
}

/// Linear up to the optimum, then a gentle decay to the floor.
pub fn completeness(word_count: usize) -> f64 {
    if word_count == 0 {
        return 0.0;
    }
    if word_count <= OPTIMAL_WORDS {
        return word_count as f64 / OPTIMAL_WORDS as f64;
    }
    let excess = (word_count - OPTIMAL_WORDS) as f64;
    (1.0 - excess / COMPLETENESS_DECAY_SPAN).max(COMPLETENESS_FLOOR)
}

/// Neutral 0.5, raised by assertive markers and lowered by hedges.
pub fn confidence(answer: &str) -> f64 {
    let assertive = text::count_phrases(answer, CONFIDENT_MARKERS) as f64;
    let hedges = text::count_phrases(answer, HEDGE_MARKERS) as f64;
    (0.5 + assertive * 0.1 - hedges * 0.15).clamp(0.0, 1.0)
}

/// How well the answer's shape matches what the question asks for.
pub fn context_alignment(answer: &str, kind: QuestionKind) -> f64 {
    if kind == QuestionKind::General {
        return 0.5;
    }
    let padded = format!(" {} ", answer.to_lowercase());
    let hits = kind
        .signals()
        .iter()
        .filter(|signal| padded.contains(*signal))
        .count();
    match hits {
        0 => 0.3,
        1 => 0.7,
        _ => 1.0,
    }
}

/// Capitalised words that do not open a sentence.
fn proper_nouns(answer: &str) -> usize {
    let mut count = 0;
    let mut sentence_start = true;
    for word in answer.split_whitespace() {
        let clean = word.trim_matches(|c: char| !c.is_alphanumeric());
        let capitalised = clean.chars().next().is_some_and(char::is_uppercase)
            && clean.chars().count() > 1;
        if capitalised && !sentence_start {
            count += 1;
        }
        sentence_start = word.ends_with(['.', '!', '?', ':']);
    }
    count
}
