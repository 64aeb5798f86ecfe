//! Admission checks run before an action is parsed. First failure wins.

use serde::{Deserialize, Serialize};

use super::action::Action;
use super::execution::SandboxConfig;
use super::scan::scan_for_violation;

/// Outcome of admitting an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionVerdict {
    Admitted,
    Rejected { reason: String },
}

impl AdmissionVerdict {
    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmissionVerdict::Admitted)
    }
}

/// Check body length, kind allow-list, then the static capability scan.
pub fn admit(config: &SandboxConfig, action: &Action) -> AdmissionVerdict {
    if action.body.len() > config.max_action_len {
        return AdmissionVerdict::Rejected {
            reason: format!(
                "action body is {} bytes (limit {})",
                action.body.len(),
                config.max_action_len
            ),
        };
    }

    if !config.allowed_kinds.contains(&action.kind) {
        return AdmissionVerdict::Rejected {
            reason: format!("action kind {} is not allowed", action.kind),
        };
    }

    if let Some(hit) = scan_for_violation(&action.body) {
        return AdmissionVerdict::Rejected {
            reason: hit.to_string(),
        };
    }

    AdmissionVerdict::Admitted
}
