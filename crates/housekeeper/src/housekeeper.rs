//! The housekeeper: ranks candidate answers and keeps a bounded filter log.

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use ctxrelay_config::HousekeeperConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::HousekeeperError;
use crate::amplify;
use crate::scoring::{AnswerScore, AnswerScorer};

/// One candidate in the final ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedAnswer {
    /// Position in the caller's candidate list
    pub index: usize,
    pub answer: String,
    pub score: AnswerScore,
}

/// The winning answer and how it was chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredAnswer {
    pub answer: String,
    pub score: AnswerScore,
    /// Winner's overall plus its margin over the runner-up, capped at 1
    pub confidence: f64,
    /// Every candidate, best first
    pub ranking: Vec<RankedAnswer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterLogEntry {
    pub timestamp: DateTime<Utc>,
    pub question: String,
    pub candidates: usize,
    /// Candidates whose overall fell below the rejection threshold
    pub rejected: usize,
    pub winner_index: usize,
    pub winner_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HousekeeperStats {
    pub filtered: u64,
    pub rejected: u64,
    pub amplified: u64,
    pub mean_winner_score: f64,
}

#[derive(Debug, Default)]
struct Counters {
    filtered: u64,
    rejected: u64,
    amplified: u64,
    winner_score_sum: f64,
}

pub struct Housekeeper {
    config: HousekeeperConfig,
    scorer: AnswerScorer,
    log: RwLock<VecDeque<FilterLogEntry>>,
    counters: RwLock<Counters>,
}

impl Housekeeper {
    pub fn new(config: HousekeeperConfig) -> Result<Self, HousekeeperError> {
        let scorer = AnswerScorer::new(&config.weights)?;
        Ok(Self {
            config,
            scorer,
            log: RwLock::new(VecDeque::new()),
            counters: RwLock::new(Counters::default()),
        })
    }

    pub fn config(&self) -> &HousekeeperConfig {
        &self.config
    }

    pub fn score_answer(&self, answer: &str, question: &str) -> AnswerScore {
        self.scorer.score(answer, question)
    }

    /// Rank `candidates` for `question` and return the best one.
    ///
    /// Ties keep the caller's order. Fails only for an empty candidate list.
    pub fn filter_answers<S: AsRef<str>>(
        &self,
        candidates: &[S],
        question: &str,
    ) -> Result<FilteredAnswer, HousekeeperError> {
        if candidates.is_empty() {
            return Err(HousekeeperError::NoCandidates);
        }

        let mut ranking: Vec<RankedAnswer> = candidates
            .iter()
            .enumerate()
            .map(|(index, candidate)| {
                let answer = candidate.as_ref();
                RankedAnswer {
                    index,
                    answer: answer.to_string(),
                    score: self.scorer.score(answer, question),
                }
            })
            .collect();
        ranking.sort_by(|a, b| b.score.overall.total_cmp(&a.score.overall));

        let winner = &ranking[0];
        let margin = ranking
            .get(1)
            .map_or(0.0, |runner_up| winner.score.overall - runner_up.score.overall);
        let confidence = (winner.score.overall + margin).min(1.0);
        let rejected = ranking
            .iter()
            .filter(|r| r.score.overall < self.config.rejection_threshold)
            .count();

        self.record(FilterLogEntry {
            timestamp: Utc::now(),
            question: question.to_string(),
            candidates: ranking.len(),
            rejected,
            winner_index: winner.index,
            winner_score: winner.score.overall,
        });

        info!(
            candidates = ranking.len(),
            rejected,
            winner = winner.index,
            score = winner.score.overall,
            "Answers filtered"
        );

        let answer = winner.answer.clone();
        let score = winner.score;
        Ok(FilteredAnswer {
            answer,
            score,
            confidence,
            ranking,
        })
    }

    /// Rewrite `answer` through the six-stage amplification pipeline.
    pub fn amplify(&self, answer: &str, question: &str) -> String {
        let amplified = amplify::amplify(answer, question);
        self.counters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .amplified += 1;
        debug!(
            input_words = answer.split_whitespace().count(),
            output_words = amplified.split_whitespace().count(),
            "Answer amplified"
        );
        amplified
    }

    /// Filter log, oldest first.
    pub fn log(&self) -> Vec<FilterLogEntry> {
        self.log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> HousekeeperStats {
        let counters = self.counters.read().unwrap_or_else(PoisonError::into_inner);
        let mean_winner_score = if counters.filtered == 0 {
            0.0
        } else {
            counters.winner_score_sum / counters.filtered as f64
        };
        HousekeeperStats {
            filtered: counters.filtered,
            rejected: counters.rejected,
            amplified: counters.amplified,
            mean_winner_score,
        }
    }

    fn record(&self, entry: FilterLogEntry) {
        {
            let mut counters = self.counters.write().unwrap_or_else(PoisonError::into_inner);
            counters.filtered += 1;
            counters.rejected += entry.rejected as u64;
            counters.winner_score_sum += entry.winner_score;
        }

        let mut log = self.log.write().unwrap_or_else(PoisonError::into_inner);
        log.push_back(entry);
        while log.len() > self.config.max_log_entries {
            log.pop_front();
        }
    }
}
