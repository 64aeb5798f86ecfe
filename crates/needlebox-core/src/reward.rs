//! Reward evaluation for finished episodes.
//!
//! `total_reward = correctness - step_penalty * steps - token_penalty * tokens`.
//! Scoring is pure: the same outcome and ground truth always score the same.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::outcome::EpisodeOutcome;

/// How a final answer is compared with the ground truth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMatch {
    /// Byte-for-byte equality.
    Exact,
    /// Equality after trimming, lowercasing and collapsing whitespace.
    #[default]
    Normalized,
    /// F1 over normalized whitespace tokens, in `[0, 1]`.
    TokenF1,
}

impl AnswerMatch {
    pub fn score(&self, predicted: &str, truth: &str) -> f64 {
        match self {
            AnswerMatch::Exact => f64::from(u8::from(predicted == truth)),
            AnswerMatch::Normalized => f64::from(u8::from(normalize(predicted) == normalize(truth))),
            AnswerMatch::TokenF1 => token_f1(predicted, truth),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardWeights {
    pub step_penalty: f64,
    pub token_penalty: f64,
    pub answer_match: AnswerMatch,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            step_penalty: 0.0,
            token_penalty: 0.0,
            answer_match: AnswerMatch::Normalized,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardRecord {
    pub correctness: f64,
    pub step_penalty: f64,
    pub token_penalty: f64,
    pub total_reward: f64,
    pub steps: usize,
    pub tokens: u64,
}

/// Score an outcome. Episodes that did not end in an answer get zero
/// correctness but still pay their penalties.
pub fn score(outcome: &EpisodeOutcome, ground_truth: &str, weights: &RewardWeights) -> RewardRecord {
    let correctness = match (&outcome.final_answer, outcome.is_answered()) {
        (Some(answer), true) => weights.answer_match.score(&answer.value, ground_truth),
        _ => 0.0,
    };
    let steps = outcome.steps();
    let tokens = outcome.transcript.estimated_tokens();
    let step_penalty = weights.step_penalty * steps as f64;
    let token_penalty = weights.token_penalty * tokens as f64;
    RewardRecord {
        correctness,
        step_penalty,
        token_penalty,
        total_reward: correctness - step_penalty - token_penalty,
        steps,
        tokens,
    }
}

pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn token_f1(predicted: &str, truth: &str) -> f64 {
    let predicted = normalize(predicted);
    let truth = normalize(truth);
    let p: Vec<&str> = predicted.split(' ').filter(|t| !t.is_empty()).collect();
    let t: Vec<&str> = truth.split(' ').filter(|t| !t.is_empty()).collect();
    if p.is_empty() && t.is_empty() {
        return 1.0;
    }
    if p.is_empty() || t.is_empty() {
        return 0.0;
    }

    let mut remaining: HashMap<&str, usize> = HashMap::new();
    for tok in &t {
        *remaining.entry(*tok).or_default() += 1;
    }
    let mut overlap = 0usize;
    for tok in &p {
        if let Some(n) = remaining.get_mut(tok) {
            if *n > 0 {
                *n -= 1;
                overlap += 1;
            }
        }
    }
    if overlap == 0 {
        return 0.0;
    }
    let precision = overlap as f64 / p.len() as f64;
    let recall = overlap as f64 / t.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{FinalAnswer, TerminationReason};
    use crate::transcript::Transcript;
    use chrono::Utc;
    use needlebox_sandbox::{Action, ExecutionResult};
    use std::time::Duration;
    use uuid::Uuid;

    fn outcome(reason: TerminationReason, answer: Option<&str>, turns: usize) -> EpisodeOutcome {
        let mut transcript = Transcript::new();
        for _ in 0..turns {
            // 8 + 3 chars => 2 + 1 tokens per turn
            transcript.push(
                Action::search("print 42"),
                ExecutionResult::ok("42\n", false, Duration::ZERO),
                Duration::ZERO,
            );
        }
        let now = Utc::now();
        EpisodeOutcome {
            episode_id: Uuid::new_v4(),
            final_answer: answer.map(|v| FinalAnswer {
                value: v.into(),
                turn_index_at_emission: turns,
            }),
            transcript,
            termination_reason: reason,
            detail: None,
            started_at: now,
            finished_at: now,
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn test_correct_answer_no_penalties() {
        let o = outcome(TerminationReason::Answered, Some("42"), 1);
        let r = score(&o, "42", &RewardWeights::default());
        assert_eq!(r.correctness, 1.0);
        assert_eq!(r.total_reward, 1.0);
        assert_eq!(r.steps, 1);
    }

    #[test]
    fn test_penalties_are_subtracted() {
        let o = outcome(TerminationReason::Answered, Some("42"), 2);
        let weights = RewardWeights {
            step_penalty: 0.1,
            token_penalty: 0.01,
            answer_match: AnswerMatch::Exact,
        };
        let r = score(&o, "42", &weights);
        assert_eq!(r.tokens, 6);
        assert!((r.step_penalty - 0.2).abs() < 1e-9);
        assert!((r.token_penalty - 0.06).abs() < 1e-9);
        assert!((r.total_reward - 0.74).abs() < 1e-9);
    }

    #[test]
    fn test_unanswered_scores_zero_correctness() {
        let o = outcome(TerminationReason::MaxStepsExceeded, None, 3);
        let weights = RewardWeights {
            step_penalty: 0.5,
            ..RewardWeights::default()
        };
        let r = score(&o, "42", &weights);
        assert_eq!(r.correctness, 0.0);
        assert!((r.total_reward + 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_scoring_is_idempotent() {
        let o = outcome(TerminationReason::Answered, Some("42"), 1);
        let w = RewardWeights::default();
        assert_eq!(score(&o, "42", &w), score(&o, "42", &w));
    }

    #[test]
    fn test_match_modes() {
        assert_eq!(AnswerMatch::Exact.score(" 42", "42"), 0.0);
        assert_eq!(AnswerMatch::Normalized.score("  Hello\tWORLD ", "hello world"), 1.0);
        assert_eq!(AnswerMatch::Normalized.score("Needle not found", "XYZ1ABC"), 0.0);
        let f1 = AnswerMatch::TokenF1.score("the blue whale", "blue whale");
        assert!((f1 - 0.8).abs() < 1e-9);
        assert_eq!(AnswerMatch::TokenF1.score("", ""), 1.0);
        assert_eq!(AnswerMatch::TokenF1.score("a", "b"), 0.0);
    }

    #[test]
    fn test_answer_match_serde() {
        let m: AnswerMatch = serde_json::from_str("\"token_f1\"").unwrap();
        assert_eq!(m, AnswerMatch::TokenF1);
    }
}
