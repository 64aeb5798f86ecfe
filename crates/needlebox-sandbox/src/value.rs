//! Runtime values of the snippet language.

use std::fmt;

/// A regex match captured over some text. Offsets are in characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchValue {
    pub text: String,
    pub start: usize,
    pub end: usize,
    /// Capture groups; index 0 is the whole match.
    pub groups: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Match(MatchValue),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Match(_) => "match",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Match(_) => true,
        }
    }

    /// Approximate heap bytes held by the value's text.
    pub fn weight(&self) -> usize {
        match self {
            Value::None | Value::Bool(_) | Value::Int(_) => 0,
            Value::Str(s) => s.len(),
            Value::Match(m) => {
                m.text.len() + m.groups.iter().flatten().map(String::len).sum::<usize>()
            }
            Value::List(items) => items.iter().map(Value::weight).sum(),
        }
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            other => write!(f, "{other}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "none"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Match(m) => write!(f, "{}", m.text),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.fmt_nested(f)?;
                }
                write!(f, "]")
            }
        }
    }
}
