//! Episode orchestrator.
//!
//! Drives one episode through
//! `Init -> AwaitingAction -> Executing -> Observing -> (AwaitingAction | Finalized) -> Terminated`.
//!
//! Execution failures (`CapabilityViolation`, `Timeout`, `RuntimeError`) are
//! ordinary turns. Only an answer, the step cap, a policy failure, a failed
//! executor worker or cancellation end the episode.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use needlebox_sandbox::{Action, ExecutionResult, SandboxExecutor};
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use crate::config::EpisodeConfig;
use crate::error::{PolicyError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::outcome::{EpisodeOutcome, FinalAnswer, TerminationReason};
use crate::policy::{Decision, PolicyAdapter};
use crate::reward::{score, RewardRecord};
use crate::transcript::{Context, Transcript};

const CANCELLED: &str = "cancelled by operator";

/// How long a worker may run past `step_timeout` before it is abandoned.
const WORKER_GRACE: Duration = Duration::from_millis(500);

/// A joined executor worker, or `None` when it outlived its grace period.
type WorkerJoin = Option<std::result::Result<ExecutionResult, JoinError>>;

/// Operator abort for a running episode.
///
/// Clones share the same signal. Cancelling takes effect at the episode's
/// next await point; turns already recorded are kept.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Resolves once the signal is raised.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Run one episode to completion and score it.
///
/// Errors only when `config` is invalid; every runtime failure is reported
/// through the outcome's termination reason.
pub async fn run_episode(
    context: impl Into<Context>,
    policy: &dyn PolicyAdapter,
    ground_truth: &str,
    config: &EpisodeConfig,
) -> Result<(EpisodeOutcome, RewardRecord)> {
    run_episode_with_cancel(context, policy, ground_truth, config, &CancelHandle::new()).await
}

/// [`run_episode`] with an operator abort.
pub async fn run_episode_with_cancel(
    context: impl Into<Context>,
    policy: &dyn PolicyAdapter,
    ground_truth: &str,
    config: &EpisodeConfig,
    cancel: &CancelHandle,
) -> Result<(EpisodeOutcome, RewardRecord)> {
    config.validate()?;
    let context = context.into();
    let executor = SandboxExecutor::new(context.shared(), config.sandbox_config())?;
    let episode_id = Uuid::new_v4();

    let outcome = drive(episode_id, &context, executor, policy, config, cancel)
        .instrument(obs::episode_span(episode_id, policy.name()))
        .await;
    let reward = score(&outcome, ground_truth, &config.reward_weights());
    Ok((outcome, reward))
}

struct EpisodeRun {
    episode_id: Uuid,
    started_at: chrono::DateTime<Utc>,
    clock: Instant,
    transcript: Transcript,
}

impl EpisodeRun {
    fn finish(
        self,
        reason: TerminationReason,
        final_answer: Option<FinalAnswer>,
        detail: Option<String>,
    ) -> EpisodeOutcome {
        let elapsed = self.clock.elapsed();
        debug!(state = "terminated", reason = %reason);
        obs::emit_episode_finished(
            self.episode_id,
            reason,
            self.transcript.len(),
            elapsed.as_millis() as u64,
        );
        EpisodeOutcome {
            episode_id: self.episode_id,
            final_answer,
            transcript: self.transcript,
            termination_reason: reason,
            detail,
            started_at: self.started_at,
            finished_at: Utc::now(),
            elapsed,
        }
    }

    /// Record a worker's result as the next turn.
    ///
    /// A worker that outlived its grace period becomes a `Timeout` turn and
    /// keeps running detached on the blocking pool. A panicked or cancelled
    /// worker ends the episode with `FatalExecutionError`.
    fn observe(
        mut self,
        action: Action,
        joined: WorkerJoin,
        step_timeout: Duration,
        elapsed: Duration,
    ) -> ControlFlow<EpisodeOutcome, Self> {
        let result = match joined {
            Some(Ok(result)) => result,
            Some(Err(err)) => {
                let detail = format!("executor worker failed: {err}");
                return ControlFlow::Break(self.finish(
                    TerminationReason::FatalExecutionError,
                    None,
                    Some(detail),
                ));
            }
            None => {
                warn!(
                    event = "worker.abandoned",
                    step_timeout_ms = step_timeout.as_millis() as u64,
                );
                ExecutionResult::timeout(
                    format!(
                        "execution timed out after {}ms (limit {}ms); worker abandoned",
                        elapsed.as_millis(),
                        step_timeout.as_millis()
                    ),
                    elapsed,
                )
            }
        };

        debug!(state = "observing", step = self.transcript.len(), status = %result.status());
        METRICS.record_turn(result.status());
        let turn = self.transcript.push(action, result, elapsed);
        obs::emit_turn_recorded(self.episode_id, turn);
        ControlFlow::Continue(self)
    }
}

async fn drive(
    episode_id: Uuid,
    context: &Context,
    executor: SandboxExecutor,
    policy: &dyn PolicyAdapter,
    config: &EpisodeConfig,
    cancel: &CancelHandle,
) -> EpisodeOutcome {
    debug!(state = "init", context_len = context.len());
    METRICS.inc_episodes();
    obs::emit_episode_started(episode_id, policy.name(), context.len(), config.max_steps);

    let mut run = EpisodeRun {
        episode_id,
        started_at: Utc::now(),
        clock: Instant::now(),
        transcript: Transcript::new(),
    };
    let mut cancel_rx = cancel.subscribe();
    let policy_timeout = config.policy_timeout();
    let step_timeout = config.step_timeout();

    loop {
        let step = run.transcript.len();
        debug!(state = "awaiting_action", step);

        let decision = tokio::select! {
            biased;
            _ = cancelled(&mut cancel_rx) => None,
            reply = tokio::time::timeout(policy_timeout, policy.next(context, &run.transcript)) => {
                Some(reply.unwrap_or(Err(PolicyError::Timeout(policy_timeout))))
            }
        };
        let Some(decision) = decision else {
            return run.finish(TerminationReason::Cancelled, None, Some(CANCELLED.into()));
        };

        let action = match decision {
            Ok(Decision::Answer(value)) => {
                debug!(state = "finalized", step);
                let answer = FinalAnswer {
                    value,
                    turn_index_at_emission: step,
                };
                return run.finish(TerminationReason::Answered, Some(answer), None);
            }
            Ok(Decision::Act(action)) => action,
            Err(err) => {
                obs::emit_policy_error(episode_id, &err);
                return run.finish(TerminationReason::PolicyError, None, Some(err.to_string()));
            }
        };

        if step >= config.max_steps {
            let detail = format!(
                "policy requested another action after {step} step(s) (max_steps = {})",
                config.max_steps
            );
            return run.finish(TerminationReason::MaxStepsExceeded, None, Some(detail));
        }

        debug!(state = "executing", step, kind = %action.kind);
        let started = Instant::now();
        let worker = {
            let executor = executor.clone();
            let action = action.clone();
            tokio::task::spawn_blocking(move || executor.execute(&action, step_timeout))
        };
        let joined = tokio::select! {
            biased;
            _ = cancelled(&mut cancel_rx) => None,
            joined = tokio::time::timeout(step_timeout + WORKER_GRACE, worker) => Some(joined.ok()),
        };
        let Some(joined) = joined else {
            return run.finish(TerminationReason::Cancelled, None, Some(CANCELLED.into()));
        };

        run = match run.observe(action, joined, step_timeout, started.elapsed()) {
            ControlFlow::Continue(run) => run,
            ControlFlow::Break(outcome) => return outcome,
        };
    }
}
