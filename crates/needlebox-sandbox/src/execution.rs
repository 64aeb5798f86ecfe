//! Execution controls and the structured result of running one action.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::action::ActionKind;
use super::error::{SandboxError, SandboxResult};

/// Limits applied to every action an executor runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Maximum action body length in bytes.
    pub max_action_len: usize,
    /// Captured stdout beyond this many characters is dropped and the result
    /// is flagged `truncated`.
    pub max_output_chars: usize,
    /// Action kinds the executor will run at all.
    pub allowed_kinds: BTreeSet<ActionKind>,
    /// Compiled-size limit handed to the regex engine (bytes).
    pub regex_size_limit: usize,
    /// Largest string value a snippet may build (bytes).
    pub max_value_len: usize,
    /// Largest list value a snippet may build.
    pub max_list_len: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_action_len: 4096,
            max_output_chars: 100_000,
            allowed_kinds: [ActionKind::Search, ActionKind::Slice, ActionKind::Summarize]
                .into_iter()
                .collect(),
            regex_size_limit: 1 << 20,
            max_value_len: 1 << 22,
            max_list_len: 100_000,
        }
    }
}

impl SandboxConfig {
    /// Reject limits of zero and an empty kind allow-list.
    pub fn validate(&self) -> SandboxResult<()> {
        if self.max_action_len == 0 {
            return Err(SandboxError::InvalidConfig(
                "max_action_len must be positive".into(),
            ));
        }
        if self.allowed_kinds.is_empty() {
            return Err(SandboxError::InvalidConfig(
                "allowed_kinds must not be empty".into(),
            ));
        }
        if self.regex_size_limit == 0 || self.max_value_len == 0 || self.max_list_len == 0 {
            return Err(SandboxError::InvalidConfig(
                "value and pattern limits must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Replace the kind allow-list.
    pub fn with_allowed_kinds(mut self, kinds: impl IntoIterator<Item = ActionKind>) -> Self {
        self.allowed_kinds = kinds.into_iter().collect();
        self
    }
}

/// Wall-clock budget for a single execution, checked cooperatively.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    /// Start the clock now.
    pub fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    /// Time since [`Deadline::start`].
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn expired(&self) -> bool {
        self.started.elapsed() >= self.budget
    }

    /// `Err(Timeout)` once the budget is spent.
    pub fn check(&self) -> SandboxResult<()> {
        let elapsed = self.started.elapsed();
        if elapsed >= self.budget {
            return Err(SandboxError::Timeout {
                elapsed_ms: elapsed.as_millis() as u64,
                limit_ms: self.budget.as_millis() as u64,
            });
        }
        Ok(())
    }
}

/// Outcome class of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Ok,
    RuntimeError,
    Timeout,
    CapabilityViolation,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Ok => write!(f, "ok"),
            ExecutionStatus::RuntimeError => write!(f, "runtime_error"),
            ExecutionStatus::Timeout => write!(f, "timeout"),
            ExecutionStatus::CapabilityViolation => write!(f, "capability_violation"),
        }
    }
}

/// Structured result of running one action.
///
/// # Invariants
///
/// `Ok` carries captured stdout and no error. Every other status carries an
/// error diagnostic and empty stdout. The fields are private so only the
/// constructors below can build a value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    status: ExecutionStatus,
    stdout: String,
    error: Option<String>,
    truncated: bool,
    elapsed: Duration,
}

impl ExecutionResult {
    /// Successful run with captured stdout.
    pub fn ok(stdout: impl Into<String>, truncated: bool, elapsed: Duration) -> Self {
        Self {
            status: ExecutionStatus::Ok,
            stdout: stdout.into(),
            error: None,
            truncated,
            elapsed,
        }
    }

    /// Parse or evaluation failure.
    pub fn runtime_error(error: impl Into<String>, elapsed: Duration) -> Self {
        Self::failed(ExecutionStatus::RuntimeError, error.into(), elapsed)
    }

    /// The run exceeded its budget.
    pub fn timeout(error: impl Into<String>, elapsed: Duration) -> Self {
        Self::failed(ExecutionStatus::Timeout, error.into(), elapsed)
    }

    /// Rejected at admission or by the capability scan; nothing ran.
    pub fn capability_violation(error: impl Into<String>, elapsed: Duration) -> Self {
        Self::failed(ExecutionStatus::CapabilityViolation, error.into(), elapsed)
    }

    fn failed(status: ExecutionStatus, error: String, elapsed: Duration) -> Self {
        Self {
            status,
            stdout: String::new(),
            error: Some(error),
            truncated: false,
            elapsed,
        }
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn is_ok(&self) -> bool {
        self.status == ExecutionStatus::Ok
    }

    /// Captured output; empty unless the status is `Ok`.
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Short diagnostic for any non-`Ok` status.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether stdout hit `max_output_chars` and was cut.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Wall-clock time spent in the executor.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Compare everything a policy can observe, ignoring wall-clock time.
    pub fn same_observation(&self, other: &ExecutionResult) -> bool {
        self.status == other.status
            && self.stdout == other.stdout
            && self.error == other.error
            && self.truncated == other.truncated
    }
}
