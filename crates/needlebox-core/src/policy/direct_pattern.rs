//! Deterministic baseline: one pattern search, then answer with what it printed.

use async_trait::async_trait;
use needlebox_sandbox::Action;
use regex::Regex;

use super::{Decision, PolicyAdapter};
use crate::error::PolicyError;
use crate::transcript::{Context, Transcript};

/// Printed by the search snippet when the key does not occur.
pub const NOT_FOUND: &str = "Needle not found";

/// Answer when the search printed nothing.
pub const NO_OUTPUT: &str = "No output from REPL";

/// Looks up `KEY=value` in the context.
///
/// Turn 1 searches for the first `KEY=([a-zA-Z0-9]+)` and prints the value or
/// [`NOT_FOUND`]. The policy then answers with the trimmed output, with
/// `Error: <diagnostic>` when the turn failed, or with [`NO_OUTPUT`].
#[derive(Debug, Clone)]
pub struct DirectPatternPolicy {
    key: String,
}

impl DirectPatternPolicy {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Build from a question of the form `What is the value of KEY?`.
    pub fn from_question(question: &str) -> Result<Self, PolicyError> {
        let re = Regex::new(r"What is the value of (.*?)\?")
            .map_err(|e| PolicyError::Backend(e.to_string()))?;
        let key = re
            .captures(question)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                PolicyError::Unsupported(format!("cannot find a key in question {question:?}"))
            })?;
        Ok(Self::new(key))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The search snippet run on turn 1.
    pub fn search_action(&self) -> Action {
        let pattern = format!("{}=([a-zA-Z0-9]+)", regex::escape(&self.key));
        Action::search(format!(
            "let m = search({})\nif m {{ print group(m, 1) }} else {{ print {} }}",
            string_literal(&pattern),
            string_literal(NOT_FOUND),
        ))
    }
}

/// Quote `text` as a snippet string literal.
fn string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

#[async_trait]
impl PolicyAdapter for DirectPatternPolicy {
    fn name(&self) -> &str {
        "direct_pattern"
    }

    async fn next(&self, _context: &Context, transcript: &Transcript) -> Result<Decision, PolicyError> {
        let Some(turn) = transcript.last() else {
            return Ok(Decision::Act(self.search_action()));
        };
        let result = &turn.result;
        let answer = if !result.is_ok() {
            format!("Error: {}", result.error().unwrap_or_default().trim())
        } else if result.stdout().is_empty() {
            NO_OUTPUT.to_string()
        } else {
            result.stdout().trim().to_string()
        };
        Ok(Decision::Answer(answer))
    }
}
