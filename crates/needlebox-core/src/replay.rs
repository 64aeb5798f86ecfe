//! Deterministic replay of recorded transcripts.
//!
//! Re-executes every recorded action against the same context and compares
//! what a policy would have observed. Execution is deterministic for a fixed
//! context and action, so a faithful transcript replays with no divergent
//! turns and an identical observation digest.

use std::time::{Duration, Instant};

use needlebox_sandbox::SandboxExecutor;
use tracing::{info_span, warn};

use crate::config::EpisodeConfig;
use crate::error::Result;
use crate::outcome::EpisodeOutcome;
use crate::transcript::{Context, Transcript};

/// Result of replaying a transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub turn_count: usize,
    /// 1-based indices of turns whose replayed observation differs.
    pub divergent_turns: Vec<usize>,
    /// Observation digest of the recorded transcript.
    pub recorded_digest: String,
    /// Observation digest of the replayed transcript.
    pub replay_digest: String,
}

impl ReplaySummary {
    pub fn is_faithful(&self) -> bool {
        self.divergent_turns.is_empty() && self.recorded_digest == self.replay_digest
    }
}

/// Re-run each recorded action with `budget` and compare observations.
pub fn replay_transcript(
    executor: &SandboxExecutor,
    transcript: &Transcript,
    budget: Duration,
) -> ReplaySummary {
    let span = info_span!("needlebox.replay", turns = transcript.len());
    let _entered = span.enter();

    let mut replayed = Transcript::new();
    let mut divergent_turns = Vec::new();
    for turn in transcript {
        let started = Instant::now();
        let result = executor.execute(&turn.action, budget);
        if !result.same_observation(&turn.result) {
            warn!(
                event = "replay.divergence",
                index = turn.index,
                recorded = %turn.result.status(),
                replayed = %result.status(),
            );
            divergent_turns.push(turn.index);
        }
        replayed.push(turn.action.clone(), result, started.elapsed());
    }

    ReplaySummary {
        turn_count: transcript.len(),
        divergent_turns,
        recorded_digest: transcript.observation_digest(),
        replay_digest: replayed.observation_digest(),
    }
}

/// Replay a finished episode under the configuration it ran with.
pub fn replay_outcome(
    context: impl Into<Context>,
    outcome: &EpisodeOutcome,
    config: &EpisodeConfig,
) -> Result<ReplaySummary> {
    let context = context.into();
    let executor = SandboxExecutor::new(context.shared(), config.sandbox_config())?;
    Ok(replay_transcript(&executor, &outcome.transcript, config.step_timeout()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use needlebox_sandbox::{Action, ExecutionResult, SandboxConfig};

    fn executor(context: &str) -> SandboxExecutor {
        SandboxExecutor::new(context, SandboxConfig::default()).unwrap()
    }

    fn record(exec: &SandboxExecutor, bodies: &[&str]) -> Transcript {
        let mut t = Transcript::new();
        for body in bodies {
            let action = Action::search(*body);
            let result = exec.execute(&action, Duration::from_secs(5));
            t.push(action, result, Duration::ZERO);
        }
        t
    }

    #[test]
    fn test_faithful_replay() {
        let exec = executor("KEY=7 and KEY=8");
        let t = record(&exec, &["print count(\"KEY\")", "import os", "print slice(\"a\", 5)"]);
        let summary = replay_transcript(&exec, &t, Duration::from_secs(5));
        assert_eq!(summary.turn_count, 3);
        assert!(summary.is_faithful(), "{summary:?}");
    }

    #[test]
    fn test_tampered_transcript_diverges() {
        let exec = executor("KEY=7");
        let mut t = record(&exec, &["print 1"]);
        t.push(
            Action::search("print 2"),
            ExecutionResult::ok("3\n", false, Duration::ZERO),
            Duration::ZERO,
        );
        let summary = replay_transcript(&exec, &t, Duration::from_secs(5));
        assert_eq!(summary.divergent_turns, vec![2]);
        assert!(!summary.is_faithful());
    }

    #[test]
    fn test_different_context_diverges() {
        let t = record(&executor("KEY=7"), &["print group(search(r\"KEY=(\\d)\"), 1)"]);
        let summary = replay_transcript(&executor("KEY=9"), &t, Duration::from_secs(5));
        assert_eq!(summary.divergent_turns, vec![1]);
    }
}
