//! Error taxonomy for needlebox episodes.

use std::time::Duration;

/// Failures raised by a policy adapter.
///
/// Any of these ends the episode with `TerminationReason::PolicyError`; the
/// orchestrator never retries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("malformed policy reply: {0}")]
    Malformed(String),

    #[error("unsupported request: {0}")]
    Unsupported(String),

    #[error("script exhausted after {turns} turn(s)")]
    ScriptExhausted { turns: usize },

    #[error("policy did not respond within {0:?}")]
    Timeout(Duration),

    #[error("policy backend error: {0}")]
    Backend(String),
}

/// needlebox domain errors.
#[derive(Debug, thiserror::Error)]
pub enum NeedleboxError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] needlebox_sandbox::SandboxError),

    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("executor worker failed: {0}")]
    Worker(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for needlebox operations.
pub type Result<T> = std::result::Result<T, NeedleboxError>;
