//! A policy that replays a fixed list of decisions.

use async_trait::async_trait;
use needlebox_sandbox::Action;

use super::{Decision, PolicyAdapter};
use crate::error::PolicyError;
use crate::transcript::{Context, Transcript};

/// Returns `script[transcript.len()]` on every call.
///
/// Useful for tests and for replaying a recorded episode. Asking for a
/// decision past the end of the script is a [`PolicyError::ScriptExhausted`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedPolicy {
    name: String,
    script: Vec<Decision>,
}

impl ScriptedPolicy {
    pub fn new(script: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            name: "scripted".into(),
            script: script.into_iter().collect(),
        }
    }

    /// Act with each action in turn, then answer `answer`.
    pub fn actions_then_answer(
        actions: impl IntoIterator<Item = Action>,
        answer: impl Into<String>,
    ) -> Self {
        let mut script: Vec<Decision> = actions.into_iter().map(Decision::Act).collect();
        script.push(Decision::Answer(answer.into()));
        Self::new(script)
    }

    /// Repeat `action` `times` times and never answer.
    pub fn repeat(action: Action, times: usize) -> Self {
        Self::new(std::iter::repeat(Decision::Act(action)).take(times))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn len(&self) -> usize {
        self.script.len()
    }

    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }
}

#[async_trait]
impl PolicyAdapter for ScriptedPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next(&self, _context: &Context, transcript: &Transcript) -> Result<Decision, PolicyError> {
        self.script
            .get(transcript.len())
            .cloned()
            .ok_or(PolicyError::ScriptExhausted {
                turns: transcript.len(),
            })
    }
}
