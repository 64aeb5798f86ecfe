//! Sandboxed executor: admits, parses and interprets one action against a
//! fixed context, folding every failure into an [`ExecutionResult`].

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::action::Action;
use super::admission::{admit, AdmissionVerdict};
use super::error::{SandboxError, SandboxResult};
use super::execution::{Deadline, ExecutionResult, SandboxConfig};
use super::interpreter::Interpreter;
use super::parser::parse;

/// Longest diagnostic surfaced in a result.
const MAX_DIAGNOSTIC_CHARS: usize = 300;

/// Executes actions against one episode's context.
///
/// Each call builds a fresh interpreter, so no variable or output survives
/// from one action to the next. The executor is `Send + Sync` and cheap to
/// clone.
#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    context: Arc<str>,
    config: Arc<SandboxConfig>,
}

impl SandboxExecutor {
    pub fn new(context: impl Into<Arc<str>>, config: SandboxConfig) -> SandboxResult<Self> {
        config.validate()?;
        Ok(Self {
            context: context.into(),
            config: Arc::new(config),
        })
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Run `action` with a wall-clock `budget`. Never panics on snippet input
    /// and never returns an error: every outcome is a tagged result.
    pub fn execute(&self, action: &Action, budget: Duration) -> ExecutionResult {
        let deadline = Deadline::start(budget);

        if let AdmissionVerdict::Rejected { reason } = admit(&self.config, action) {
            debug!(kind = %action.kind, reason = %reason, "action rejected at admission");
            return ExecutionResult::capability_violation(reason, deadline.elapsed());
        }

        let outcome = parse(&action.body).and_then(|program| {
            Interpreter::new(&self.context, &self.config, deadline).run(&program)
        });
        let elapsed = deadline.elapsed();

        let result = match outcome {
            Ok(out) => ExecutionResult::ok(out.stdout, out.truncated, elapsed),
            Err(err @ SandboxError::Timeout { .. }) => {
                ExecutionResult::timeout(diagnostic(&err), elapsed)
            }
            Err(err @ SandboxError::CapabilityViolation(_)) => {
                ExecutionResult::capability_violation(diagnostic(&err), elapsed)
            }
            Err(err) => ExecutionResult::runtime_error(diagnostic(&err), elapsed),
        };
        debug!(
            kind = %action.kind,
            status = %result.status(),
            elapsed_ms = elapsed.as_millis() as u64,
            stdout_len = result.stdout().len(),
            "action executed"
        );
        result
    }
}

fn diagnostic(err: &SandboxError) -> String {
    let text = err.to_string();
    if text.chars().count() <= MAX_DIAGNOSTIC_CHARS {
        return text;
    }
    let mut short: String = text.chars().take(MAX_DIAGNOSTIC_CHARS).collect();
    short.push_str("...");
    short
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ExecutionStatus;

    fn executor(context: &str) -> SandboxExecutor {
        SandboxExecutor::new(context, SandboxConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let cfg = SandboxConfig::default().with_allowed_kinds([]);
        assert!(SandboxExecutor::new("ctx", cfg).is_err());
    }

    #[test]
    fn test_ok_captures_stdout() {
        let r = executor("KEY=42").execute(
            &Action::search(r#"print group(search(r"KEY=(\d+)"), 1)"#),
            Duration::from_secs(5),
        );
        assert_eq!(r.status(), ExecutionStatus::Ok);
        assert_eq!(r.stdout(), "42\n");
    }

    #[test]
    fn test_syntax_error_maps_to_runtime_error() {
        let r = executor("").execute(&Action::search("print (1"), Duration::from_secs(5));
        assert_eq!(r.status(), ExecutionStatus::RuntimeError);
        assert!(r.error().unwrap().starts_with("line 1:"));
    }

    #[test]
    fn test_violation_never_parses() {
        let r = executor("").execute(&Action::search("import os"), Duration::from_secs(5));
        assert_eq!(r.status(), ExecutionStatus::CapabilityViolation);
        assert!(r.stdout().is_empty());
    }

    #[test]
    fn test_long_diagnostics_are_shortened() {
        let err = SandboxError::runtime(1, "x".repeat(1000));
        let d = diagnostic(&err);
        assert!(d.ends_with("..."));
        assert_eq!(d.chars().count(), MAX_DIAGNOSTIC_CHARS + 3);
    }
}
