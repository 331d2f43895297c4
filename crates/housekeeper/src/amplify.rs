//! Six-stage answer amplification.
//!
//! The pipeline is fully deterministic: concepts are ranked by frequency
//! with first appearance breaking ties, and every added sentence comes from
//! a fixed template.

use crate::text;

/// Concepts carried through the pipeline.
const MAX_CONCEPTS: usize = 5;
const FALLBACK_CONCEPT: &str = "the topic";

/// Intermediate result of stage four.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sections {
    pub introduction: String,
    pub body: String,
    pub depth: String,
}

/// Stage 1: the most frequent keywords of the question and answer.
pub fn extract_concepts(answer: &str, question: &str) -> Vec<String> {
    let combined = format!("{question} {answer}");
    let order = text::keywords(&combined);
    let lowered = combined.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    let mut ranked: Vec<(usize, usize, String)> = order
        .into_iter()
        .enumerate()
        .map(|(first_seen, word)| {
            let freq = tokens.iter().filter(|t| **t == word).count();
            (freq, first_seen, word)
        })
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    ranked
        .into_iter()
        .take(MAX_CONCEPTS)
        .map(|(_, _, word)| word)
        .collect()
}

/// Stage 2: link each concept to the next.
pub fn reasoning_chain(concepts: &[String]) -> Vec<String> {
    concepts
        .windows(2)
        .map(|pair| format!("{} leads to {}", pair[0], pair[1]))
        .collect()
}

/// Stage 3: three templated elaborations.
pub fn elaborations(concepts: &[String]) -> [String; 3] {
    let first = concepts.first().map_or(FALLBACK_CONCEPT, String::as_str);
    let second = concepts.get(1).map_or(FALLBACK_CONCEPT, String::as_str);
    let last = concepts.last().map_or(FALLBACK_CONCEPT, String::as_str);
    [
        format!("Looking closely at {first} clarifies the foundation of this answer."),
        format!("The relationship between {first} and {second} shapes how the parts fit together."),
        format!("Applying {last} in practice shows where the reasoning holds and where it needs care."),
    ]
}

/// Stage 4: first sentence as introduction, the rest as body, plus a depth
/// section built from the chain and elaborations.
pub fn restructure(answer: &str, chain: &[String], elaborations: &[String; 3]) -> Sections {
    let sentences = text::sentences(answer);
    let introduction = sentences.first().map(|s| s.to_string()).unwrap_or_default();
    let body = sentences.get(1..).unwrap_or_default().join(" ");

    let mut depth: Vec<String> = chain.iter().map(|link| format!("- {link}")).collect();
    depth.extend(elaborations.iter().cloned());

    Sections {
        introduction,
        body,
        depth: depth.join("\n"),
    }
}

/// Stage 5: the closing takeaways line.
pub fn key_takeaways(concepts: &[String]) -> String {
    if concepts.is_empty() {
        return format!("Key takeaways: {FALLBACK_CONCEPT}.");
    }
    let top: Vec<&str> = concepts.iter().take(3).map(String::as_str).collect();
    format!("Key takeaways: {}.", top.join(", "))
}

/// Stage 6: concatenate every section.
pub fn compose(sections: &Sections, takeaways: &str) -> String {
    let mut parts = vec![format!("## Introduction\n{}", sections.introduction)];
    if !sections.body.is_empty() {
        parts.push(format!("## Details\n{}", sections.body));
    }
    parts.push(format!("## Deeper Analysis\n{}", sections.depth));
    parts.push(takeaways.to_string());
    parts.join("\n\n")
}

/// Run all six stages. Blank answers are returned unchanged.
pub fn amplify(answer: &str, question: &str) -> String {
    if answer.trim().is_empty() {
        return answer.to_string();
    }
    let concepts = extract_concepts(answer, question);
    let chain = reasoning_chain(&concepts);
    let elaborated = elaborations(&concepts);
    let sections = restructure(answer, &chain, &elaborated);
    compose(&sections, &key_takeaways(&concepts))
}
