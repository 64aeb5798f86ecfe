//! Terminal record of an episode.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::transcript::Transcript;

/// Why an episode ended. Exactly one per outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Answered,
    MaxStepsExceeded,
    FatalExecutionError,
    PolicyError,
    Cancelled,
}

impl TerminationReason {
    pub const ALL: [TerminationReason; 5] = [
        TerminationReason::Answered,
        TerminationReason::MaxStepsExceeded,
        TerminationReason::FatalExecutionError,
        TerminationReason::PolicyError,
        TerminationReason::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Answered => "answered",
            TerminationReason::MaxStepsExceeded => "max_steps_exceeded",
            TerminationReason::FatalExecutionError => "fatal_execution_error",
            TerminationReason::PolicyError => "policy_error",
            TerminationReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The answer a policy committed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub value: String,
    /// Turns recorded when the answer was emitted.
    pub turn_index_at_emission: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EpisodeOutcome {
    pub episode_id: Uuid,
    pub final_answer: Option<FinalAnswer>,
    pub transcript: Transcript,
    pub termination_reason: TerminationReason,
    /// Diagnostic for non-answer terminations.
    pub detail: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl EpisodeOutcome {
    pub fn steps(&self) -> usize {
        self.transcript.len()
    }

    pub fn is_answered(&self) -> bool {
        self.termination_reason == TerminationReason::Answered
    }

    pub fn answer(&self) -> Option<&str> {
        self.final_answer.as_ref().map(|a| a.value.as_str())
    }
}
