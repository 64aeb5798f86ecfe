//! Policy adapters: the decision-makers that drive an episode.
//!
//! Every policy, scripted or model-backed, sits behind [`PolicyAdapter`]. The
//! orchestrator never inspects which one it is talking to.
//!
//! # Modules
//!
//! - [`direct_pattern`]  deterministic `KEY=value` baseline
//! - [`scripted`]        replays a fixed decision list

pub mod direct_pattern;
pub mod scripted;

use async_trait::async_trait;
use needlebox_sandbox::{Action, ActionKind};
use serde::Deserialize;

use crate::error::PolicyError;
use crate::transcript::{Context, Transcript};

pub use direct_pattern::DirectPatternPolicy;
pub use scripted::ScriptedPolicy;

/// What a policy wants to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Run an action in the sandbox.
    Act(Action),
    /// Commit a final answer and end the episode.
    Answer(String),
}

/// A decision-maker consulted once per turn.
///
/// Implementations see the context and the transcript so far and return one
/// [`Decision`]. Any error ends the episode; the orchestrator never retries.
#[async_trait]
pub trait PolicyAdapter: Send + Sync {
    /// Name recorded in logs and batch reports.
    fn name(&self) -> &str;

    /// Decide the next step.
    async fn next(&self, context: &Context, transcript: &Transcript) -> Result<Decision, PolicyError>;
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireDecision {
    Action { kind: String, body: String },
    FinalAnswer { value: String },
}

/// Decode a model reply in the wire format
/// `{"type":"action","kind":"search","body":"..."}` or
/// `{"type":"final_answer","value":"..."}`.
///
/// A surrounding Markdown code fence is tolerated.
pub fn parse_decision(reply: &str) -> Result<Decision, PolicyError> {
    let trimmed = strip_fence(reply.trim());
    let wire: WireDecision =
        serde_json::from_str(trimmed).map_err(|e| PolicyError::Malformed(e.to_string()))?;
    match wire {
        WireDecision::Action { kind, body } => {
            let kind = kind
                .parse::<ActionKind>()
                .unwrap_or_else(|never| match never {});
            Ok(Decision::Act(Action::new(kind, body)))
        }
        WireDecision::FinalAnswer { value } => Ok(Decision::Answer(value)),
    }
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action() {
        let d = parse_decision(r#"{"type":"action","kind":"search","body":"print 1"}"#).unwrap();
        assert_eq!(d, Decision::Act(Action::search("print 1")));
    }

    #[test]
    fn test_parse_final_answer() {
        let d = parse_decision(r#"  {"type": "final_answer", "value": "42"}  "#).unwrap();
        assert_eq!(d, Decision::Answer("42".into()));
    }

    #[test]
    fn test_unknown_kind_becomes_custom() {
        let d = parse_decision(r#"{"type":"action","kind":"shell","body":"ls"}"#).unwrap();
        match d {
            Decision::Act(a) => assert_eq!(a.kind, ActionKind::Custom("shell".into())),
            other => panic!("expected Act, got {:?}", other),
        }
    }

    #[test]
    fn test_fenced_reply() {
        let reply = "```json\n{\"type\":\"final_answer\",\"value\":\"x\"}\n```";
        assert_eq!(parse_decision(reply).unwrap(), Decision::Answer("x".into()));
    }

    #[test]
    fn test_malformed_replies() {
        for reply in [
            "",
            "the answer is 42",
            r#"{"type":"action","body":"print 1"}"#,
            r#"{"type":"shrug"}"#,
        ] {
            assert!(
                matches!(parse_decision(reply), Err(PolicyError::Malformed(_))),
                "{reply:?} should be malformed"
            );
        }
    }
}
