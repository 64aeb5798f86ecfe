//! Structured lifecycle events for episodes.
//!
//! Every event carries an `event` field (`episode.started`, `turn.recorded`,
//! ...) so log pipelines can filter on it. Set `RUST_LOG=needlebox_core=debug`
//! to also see state transitions.

use tracing::{info, warn};
use uuid::Uuid;

use crate::outcome::TerminationReason;
use crate::transcript::Turn;

/// Span covering one episode. Attach it with [`tracing::Instrument`] so it
/// follows the episode future across worker threads.
pub fn episode_span(episode_id: Uuid, policy: &str) -> tracing::Span {
    tracing::info_span!("needlebox.episode", episode_id = %episode_id, policy = %policy)
}

pub fn emit_episode_started(episode_id: Uuid, policy: &str, context_len: usize, max_steps: usize) {
    info!(
        event = "episode.started",
        episode_id = %episode_id,
        policy = %policy,
        context_len = context_len,
        max_steps = max_steps,
    );
}

pub fn emit_turn_recorded(episode_id: Uuid, turn: &Turn) {
    info!(
        event = "turn.recorded",
        episode_id = %episode_id,
        index = turn.index,
        kind = %turn.action.kind,
        status = %turn.result.status(),
        elapsed_ms = turn.elapsed.as_millis() as u64,
        truncated = turn.result.truncated(),
    );
}

pub fn emit_episode_finished(
    episode_id: Uuid,
    reason: TerminationReason,
    steps: usize,
    duration_ms: u64,
) {
    info!(
        event = "episode.finished",
        episode_id = %episode_id,
        reason = %reason,
        steps = steps,
        duration_ms = duration_ms,
    );
}

/// Warning level: the policy failed or timed out.
pub fn emit_policy_error(episode_id: Uuid, error: &dyn std::fmt::Display) {
    warn!(event = "episode.policy_error", episode_id = %episode_id, error = %error);
}
