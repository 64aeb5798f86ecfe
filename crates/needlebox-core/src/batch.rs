//! Concurrent batch runner with aggregate statistics.
//!
//! Each task runs as an independent episode on its own tokio task; a
//! semaphore caps how many run at once. Episodes share nothing but the
//! global metrics counters.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::info;
use uuid::Uuid;

use crate::config::EpisodeConfig;
use crate::error::{NeedleboxError, PolicyError, Result};
use crate::metrics::METRICS;
use crate::orchestrator::run_episode;
use crate::outcome::TerminationReason;
use crate::policy::PolicyAdapter;
use crate::reward::RewardRecord;
use crate::transcript::Context;

/// One question over one context.
#[derive(Debug, Clone)]
pub struct BatchTask {
    pub label: String,
    pub context: Context,
    pub question: String,
    pub ground_truth: String,
}

impl BatchTask {
    pub fn new(
        label: impl Into<String>,
        context: impl Into<Context>,
        question: impl Into<String>,
        ground_truth: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            context: context.into(),
            question: question.into(),
            ground_truth: ground_truth.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Episodes allowed to run at the same time.
    pub max_concurrent: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_concurrent: 4 }
    }
}

/// Per-episode line of a batch report.
#[derive(Debug, Clone, Serialize)]
pub struct EpisodeRecord {
    pub label: String,
    pub policy: String,
    /// `None` when no episode could be started for the task.
    pub episode_id: Option<Uuid>,
    pub termination_reason: TerminationReason,
    pub predicted_answer: Option<String>,
    pub ground_truth: String,
    pub reward: RewardRecord,
    pub steps: usize,
    pub runtime: Duration,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub episodes: usize,
    /// Share of episodes whose answer scored full correctness.
    pub accuracy: f64,
    pub mean_steps: f64,
    pub mean_runtime: Duration,
    pub mean_reward: f64,
    pub reasons: BTreeMap<TerminationReason, usize>,
}

impl BatchSummary {
    pub fn from_records(records: &[EpisodeRecord]) -> Self {
        if records.is_empty() {
            return Self::default();
        }
        let n = records.len() as f64;
        let correct = records.iter().filter(|r| r.reward.correctness >= 1.0).count();
        let total_runtime: Duration = records.iter().map(|r| r.runtime).sum();
        let mut reasons = BTreeMap::new();
        for r in records {
            *reasons.entry(r.termination_reason).or_insert(0) += 1;
        }
        Self {
            episodes: records.len(),
            accuracy: correct as f64 / n,
            mean_steps: records.iter().map(|r| r.steps as f64).sum::<f64>() / n,
            mean_runtime: total_runtime / records.len() as u32,
            mean_reward: records.iter().map(|r| r.reward.total_reward).sum::<f64>() / n,
            reasons,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub records: Vec<EpisodeRecord>,
    pub summary: BatchSummary,
}

fn zero_reward() -> RewardRecord {
    RewardRecord {
        correctness: 0.0,
        step_penalty: 0.0,
        token_penalty: 0.0,
        total_reward: 0.0,
        steps: 0,
        tokens: 0,
    }
}

fn failed_record(task: &BatchTask, policy: &str, reason: TerminationReason, detail: String) -> EpisodeRecord {
    EpisodeRecord {
        label: task.label.clone(),
        policy: policy.to_string(),
        episode_id: None,
        termination_reason: reason,
        predicted_answer: None,
        ground_truth: task.ground_truth.clone(),
        reward: zero_reward(),
        steps: 0,
        runtime: Duration::ZERO,
        detail: Some(detail),
    }
}

/// Run every task as its own episode and aggregate the results.
///
/// `policy_factory` builds a fresh adapter per task; a factory error is
/// recorded as a `PolicyError` episode with no turns. Records come back in
/// task order.
pub async fn run_batch<F>(
    tasks: Vec<BatchTask>,
    policy_factory: F,
    config: &EpisodeConfig,
    batch_config: &BatchConfig,
) -> Result<BatchReport>
where
    F: Fn(&BatchTask) -> std::result::Result<Arc<dyn PolicyAdapter>, PolicyError>,
{
    config.validate()?;
    if batch_config.max_concurrent == 0 {
        return Err(NeedleboxError::InvalidConfig(
            "max_concurrent must be at least 1".into(),
        ));
    }

    let semaphore = Arc::new(Semaphore::new(batch_config.max_concurrent));
    let config = Arc::new(config.clone());
    let mut slots = Vec::with_capacity(tasks.len());

    for task in tasks {
        let policy = match policy_factory(&task) {
            Ok(policy) => policy,
            Err(err) => {
                slots.push(Err(failed_record(
                    &task,
                    "unavailable",
                    TerminationReason::PolicyError,
                    err.to_string(),
                )));
                continue;
            }
        };
        let semaphore = Arc::clone(&semaphore);
        let config = Arc::clone(&config);
        let fallback = failed_record(
            &task,
            policy.name(),
            TerminationReason::FatalExecutionError,
            String::new(),
        );
        let handle = tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| NeedleboxError::Worker(e.to_string()))?;
            let (outcome, reward) =
                run_episode(task.context.clone(), policy.as_ref(), &task.ground_truth, &config).await?;
            Ok::<EpisodeRecord, NeedleboxError>(EpisodeRecord {
                label: task.label,
                policy: policy.name().to_string(),
                episode_id: Some(outcome.episode_id),
                termination_reason: outcome.termination_reason,
                predicted_answer: outcome.final_answer.map(|a| a.value),
                ground_truth: task.ground_truth,
                reward,
                steps: outcome.transcript.len(),
                runtime: outcome.elapsed,
                detail: outcome.detail,
            })
        });
        slots.push(Ok((handle, fallback)));
    }

    let records: Vec<EpisodeRecord> = join_all(slots.into_iter().map(|slot| async move {
        match slot {
            Err(record) => record,
            Ok((handle, fallback)) => match handle.await {
                Ok(Ok(record)) => record,
                Ok(Err(err)) => EpisodeRecord {
                    detail: Some(err.to_string()),
                    ..fallback
                },
                Err(join_err) => EpisodeRecord {
                    detail: Some(format!("episode task failed: {join_err}")),
                    ..fallback
                },
            },
        }
    }))
    .await;

    let summary = BatchSummary::from_records(&records);
    info!(
        event = "batch.finished",
        episodes = summary.episodes,
        accuracy = summary.accuracy,
        mean_steps = summary.mean_steps,
        mean_reward = summary.mean_reward,
    );
    METRICS.flush();
    Ok(BatchReport { records, summary })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(reason: TerminationReason, correctness: f64, steps: usize, ms: u64) -> EpisodeRecord {
        EpisodeRecord {
            label: "t".into(),
            policy: "p".into(),
            episode_id: None,
            termination_reason: reason,
            predicted_answer: None,
            ground_truth: "g".into(),
            reward: RewardRecord {
                correctness,
                total_reward: correctness,
                ..zero_reward()
            },
            steps,
            runtime: Duration::from_millis(ms),
            detail: None,
        }
    }

    #[test]
    fn test_summary_of_empty_batch() {
        let s = BatchSummary::from_records(&[]);
        assert_eq!(s.episodes, 0);
        assert_eq!(s.accuracy, 0.0);
    }

    #[test]
    fn test_summary_aggregates() {
        let records = vec![
            record(TerminationReason::Answered, 1.0, 1, 10),
            record(TerminationReason::Answered, 0.0, 1, 20),
            record(TerminationReason::MaxStepsExceeded, 0.0, 4, 30),
            record(TerminationReason::Answered, 1.0, 2, 40),
        ];
        let s = BatchSummary::from_records(&records);
        assert_eq!(s.episodes, 4);
        assert_eq!(s.accuracy, 0.5);
        assert_eq!(s.mean_steps, 2.0);
        assert_eq!(s.mean_runtime, Duration::from_millis(25));
        assert_eq!(s.mean_reward, 0.5);
        assert_eq!(s.reasons[&TerminationReason::Answered], 3);
        assert_eq!(s.reasons[&TerminationReason::MaxStepsExceeded], 1);
    }

    #[test]
    fn test_batch_config_default() {
        let cfg: BatchConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.max_concurrent, 4);
    }
}
