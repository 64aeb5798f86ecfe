//! Actions: the snippets a policy asks the sandbox to run.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What an action claims to do.
///
/// The tag is checked against the executor's allow-list before anything is
/// parsed. `Custom(String)` covers project-specific kinds that a deployment
/// may choose to allow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Search,
    Slice,
    Summarize,
    Custom(String),
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Search => write!(f, "search"),
            ActionKind::Slice => write!(f, "slice"),
            ActionKind::Summarize => write!(f, "summarize"),
            ActionKind::Custom(s) => write!(f, "custom({s})"),
        }
    }
}

impl FromStr for ActionKind {
    type Err = std::convert::Infallible;

    /// Unknown names become `Custom`; admission decides whether they run.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "search" => ActionKind::Search,
            "slice" => ActionKind::Slice,
            "summarize" => ActionKind::Summarize,
            other => ActionKind::Custom(other.to_string()),
        })
    }
}

/// A snippet of code plus its kind tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub body: String,
}

impl Action {
    /// Action of any kind, including a `Custom` one.
    pub fn new(kind: ActionKind, body: impl Into<String>) -> Self {
        Self {
            kind,
            body: body.into(),
        }
    }

    /// Pattern lookup over the context.
    pub fn search(body: impl Into<String>) -> Self {
        Self::new(ActionKind::Search, body)
    }

    /// Positional extraction from the context.
    pub fn slice(body: impl Into<String>) -> Self {
        Self::new(ActionKind::Slice, body)
    }

    /// Aggregate view of the context, such as counts or lengths.
    pub fn summarize(body: impl Into<String>) -> Self {
        Self::new(ActionKind::Summarize, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_covers_all_variants() {
        assert_eq!(ActionKind::Search.to_string(), "search");
        assert_eq!(ActionKind::Slice.to_string(), "slice");
        assert_eq!(ActionKind::Summarize.to_string(), "summarize");
        assert_eq!(
            ActionKind::Custom("grep".into()).to_string(),
            "custom(grep)"
        );
    }

    #[test]
    fn test_from_str_falls_back_to_custom() {
        assert_eq!("Search".parse::<ActionKind>().unwrap(), ActionKind::Search);
        assert_eq!(" slice ".parse::<ActionKind>().unwrap(), ActionKind::Slice);
        assert_eq!(
            "tokenize".parse::<ActionKind>().unwrap(),
            ActionKind::Custom("tokenize".into())
        );
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ActionKind::Summarize).unwrap();
        assert_eq!(json, "\"summarize\"");
        let back: ActionKind = serde_json::from_str("\"search\"").unwrap();
        assert_eq!(back, ActionKind::Search);
    }
}
