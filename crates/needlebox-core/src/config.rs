//! Episode configuration.
//!
//! Durations are carried as milliseconds so the JSON form stays flat:
//!
//! ```json
//! { "max_steps": 5, "step_timeout_ms": 2000, "answer_match": "exact" }
//! ```
//!
//! Omitted fields take their defaults.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use needlebox_sandbox::{ActionKind, SandboxConfig};
use serde::{Deserialize, Serialize};

use crate::error::{NeedleboxError, Result};
use crate::reward::{AnswerMatch, RewardWeights};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodeConfig {
    /// Hard cap on recorded turns.
    pub max_steps: usize,
    /// Wall-clock budget per action.
    pub step_timeout_ms: u64,
    /// Budget for one policy decision.
    pub policy_timeout_ms: u64,
    pub step_penalty_weight: f64,
    pub token_penalty_weight: f64,
    pub allowed_action_kinds: BTreeSet<ActionKind>,
    pub max_action_len: usize,
    pub max_output_chars: usize,
    pub answer_match: AnswerMatch,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        let sandbox = SandboxConfig::default();
        Self {
            max_steps: 10,
            step_timeout_ms: 5_000,
            policy_timeout_ms: 60_000,
            step_penalty_weight: 0.0,
            token_penalty_weight: 0.0,
            allowed_action_kinds: sandbox.allowed_kinds,
            max_action_len: sandbox.max_action_len,
            max_output_chars: sandbox.max_output_chars,
            answer_match: AnswerMatch::default(),
        }
    }
}

impl EpisodeConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn policy_timeout(&self) -> Duration {
        Duration::from_millis(self.policy_timeout_ms)
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_policy_timeout(mut self, timeout: Duration) -> Self {
        self.policy_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sandbox limits derived from this configuration.
    pub fn sandbox_config(&self) -> SandboxConfig {
        SandboxConfig {
            max_action_len: self.max_action_len,
            max_output_chars: self.max_output_chars,
            allowed_kinds: self.allowed_action_kinds.clone(),
            ..SandboxConfig::default()
        }
    }

    pub fn reward_weights(&self) -> RewardWeights {
        RewardWeights {
            step_penalty: self.step_penalty_weight,
            token_penalty: self.token_penalty_weight,
            answer_match: self.answer_match,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(NeedleboxError::InvalidConfig(
                "max_steps must be at least 1".into(),
            ));
        }
        if self.step_timeout_ms == 0 || self.policy_timeout_ms == 0 {
            return Err(NeedleboxError::InvalidConfig(
                "timeouts must be positive".into(),
            ));
        }
        for (name, weight) in [
            ("step_penalty_weight", self.step_penalty_weight),
            ("token_penalty_weight", self.token_penalty_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(NeedleboxError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {weight}"
                )));
            }
        }
        self.sandbox_config().validate()?;
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = EpisodeConfig::default();
        assert_eq!(cfg.max_steps, 10);
        assert_eq!(cfg.step_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.policy_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.step_penalty_weight, 0.0);
        assert_eq!(cfg.max_action_len, 4096);
        assert_eq!(cfg.max_output_chars, 100_000);
        assert_eq!(cfg.answer_match, AnswerMatch::Normalized);
        assert!(cfg.allowed_action_kinds.contains(&ActionKind::Summarize));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg = EpisodeConfig::from_json_str(r#"{"max_steps": 3, "answer_match": "exact"}"#)
            .unwrap();
        assert_eq!(cfg.max_steps, 3);
        assert_eq!(cfg.answer_match, AnswerMatch::Exact);
        assert_eq!(cfg.step_timeout_ms, 5_000);
    }

    #[test]
    fn test_validate_rejects_zero_steps() {
        let err = EpisodeConfig::from_json_str(r#"{"max_steps": 0}"#).unwrap_err();
        assert!(matches!(err, NeedleboxError::InvalidConfig(_)));
    }

    #[test]
    fn test_validate_rejects_negative_weight() {
        let cfg = EpisodeConfig {
            token_penalty_weight: -0.5,
            ..EpisodeConfig::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = EpisodeConfig {
            step_penalty_weight: f64::NAN,
            ..EpisodeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_allow_list() {
        let err = EpisodeConfig::from_json_str(r#"{"allowed_action_kinds": []}"#).unwrap_err();
        assert!(matches!(err, NeedleboxError::Sandbox(_)));
    }

    #[test]
    fn test_custom_kind_from_json() {
        let cfg = EpisodeConfig::from_json_str(
            r#"{"allowed_action_kinds": ["search", {"custom": "count"}]}"#,
        )
        .unwrap();
        assert!(cfg
            .sandbox_config()
            .allowed_kinds
            .contains(&ActionKind::Custom("count".into())));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_steps": 4, "step_timeout_ms": 250}}"#).unwrap();
        let cfg = EpisodeConfig::from_json_file(file.path()).unwrap();
        assert_eq!(cfg.max_steps, 4);
        assert_eq!(cfg.step_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EpisodeConfig::from_json_file(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, NeedleboxError::Io(_)));
    }
}
