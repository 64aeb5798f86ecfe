//! Episode context and the append-only transcript of turns.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use needlebox_sandbox::{Action, ExecutionResult};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Read-only text an episode is grounded in.
///
/// Cloning shares the same allocation, so a context can be handed to a
/// blocking executor worker without copying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context(Arc<str>);

impl Context {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn shared(&self) -> Arc<str> {
        Arc::clone(&self.0)
    }
}

impl Deref for Context {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Context {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Context {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One action and its observed result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    /// 1-based position in the transcript.
    pub index: usize,
    pub action: Action,
    pub result: ExecutionResult,
    pub timestamp: DateTime<Utc>,
    /// Time spent executing, including worker hand-off.
    pub elapsed: Duration,
}

/// Ordered, append-only record of an episode's turns.
///
/// Only the orchestrator appends; everyone else sees a read-only view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, action: Action, result: ExecutionResult, elapsed: Duration) -> &Turn {
        let index = self.turns.len() + 1;
        self.turns.push(Turn {
            index,
            action,
            result,
            timestamp: Utc::now(),
            elapsed,
        });
        &self.turns[index - 1]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    /// Rough token count of everything exchanged: `ceil(chars / 4)` per
    /// action body, stdout and error.
    pub fn estimated_tokens(&self) -> u64 {
        self.turns
            .iter()
            .map(|t| {
                estimate_tokens(&t.action.body)
                    + estimate_tokens(t.result.stdout())
                    + t.result.error().map(estimate_tokens).unwrap_or(0)
            })
            .sum()
    }

    /// SHA-256 over what a policy observed, excluding timestamps and elapsed
    /// times. Two episodes with the same actions and results hash the same.
    pub fn observation_digest(&self) -> String {
        let mut hasher = Sha256::new();
        for turn in &self.turns {
            hasher.update((turn.index as u64).to_le_bytes());
            feed(&mut hasher, &turn.action.kind.to_string());
            feed(&mut hasher, &turn.action.body);
            feed(&mut hasher, &turn.result.status().to_string());
            feed(&mut hasher, turn.result.stdout());
            feed(&mut hasher, turn.result.error().unwrap_or(""));
            hasher.update([u8::from(turn.result.truncated())]);
        }
        hex::encode(hasher.finalize())
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}

/// Length-prefixed so adjacent fields cannot run together.
fn feed(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}
