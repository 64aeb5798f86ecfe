//! Error types for the sandbox layer.
//!
//! These never cross [`SandboxExecutor::execute`](crate::SandboxExecutor::execute):
//! the executor folds every variant into a tagged
//! [`ExecutionResult`](crate::ExecutionResult).

/// Errors produced while admitting, parsing or interpreting a snippet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    #[error("capability violation: {0}")]
    CapabilityViolation(String),

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: {message}")]
    Runtime { line: usize, message: String },

    #[error("execution timed out after {elapsed_ms}ms (limit {limit_ms}ms)")]
    Timeout { elapsed_ms: u64, limit_ms: u64 },

    #[error("invalid sandbox configuration: {0}")]
    InvalidConfig(String),
}

impl SandboxError {
    pub(crate) fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn runtime(line: usize, message: impl Into<String>) -> Self {
        Self::Runtime {
            line,
            message: message.into(),
        }
    }
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
