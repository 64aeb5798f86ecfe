//! The fixed operation set a snippet may call.
//!
//! Dispatch is a closed `match` on the call name; there is no lookup by
//! attribute or string evaluation, so a name missing from [`BUILTINS`] can
//! never resolve to anything.

use regex::Regex;

use super::error::{SandboxError, SandboxResult};
use super::interpreter::{Interpreter, CHECK_EVERY};
use super::value::{MatchValue, Value};

/// Broad class of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    Search,
    Slice,
    Transform,
}

pub const BUILTINS: &[(&str, OpClass)] = &[
    ("search", OpClass::Search),
    ("find_all", OpClass::Search),
    ("count", OpClass::Search),
    ("group", OpClass::Search),
    ("find", OpClass::Search),
    ("contains", OpClass::Search),
    ("escape", OpClass::Search),
    ("slice", OpClass::Slice),
    ("head", OpClass::Slice),
    ("tail", OpClass::Slice),
    ("lines", OpClass::Slice),
    ("split", OpClass::Slice),
    ("get", OpClass::Slice),
    ("start", OpClass::Slice),
    ("end", OpClass::Slice),
    ("len", OpClass::Transform),
    ("lower", OpClass::Transform),
    ("upper", OpClass::Transform),
    ("trim", OpClass::Transform),
    ("str", OpClass::Transform),
    ("int", OpClass::Transform),
    ("join", OpClass::Transform),
    ("words", OpClass::Transform),
    ("replace", OpClass::Transform),
    ("sum", OpClass::Transform),
    ("min", OpClass::Transform),
    ("max", OpClass::Transform),
    ("abs", OpClass::Transform),
    ("type", OpClass::Transform),
];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.iter().any(|(n, _)| *n == name)
}

fn arity(name: &str, args: &[Value], min: usize, max: usize, line: usize) -> SandboxResult<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(SandboxError::runtime(
            line,
            format!(
                "{name}() takes {expected} argument(s), got {}",
                args.len()
            ),
        ));
    }
    Ok(())
}

fn text_arg<'v>(name: &str, value: &'v Value, line: usize) -> SandboxResult<&'v str> {
    match value {
        Value::Str(s) => Ok(s),
        Value::Match(m) => Ok(&m.text),
        other => Err(SandboxError::runtime(
            line,
            format!("{name}() expected str, got {}", other.type_name()),
        )),
    }
}

fn int_arg(name: &str, value: &Value, line: usize) -> SandboxResult<i64> {
    match value {
        Value::Int(n) => Ok(*n),
        other => Err(SandboxError::runtime(
            line,
            format!("{name}() expected int, got {}", other.type_name()),
        )),
    }
}

fn index_arg(name: &str, value: &Value, line: usize) -> SandboxResult<usize> {
    let n = int_arg(name, value, line)?;
    usize::try_from(n)
        .map_err(|_| SandboxError::runtime(line, format!("{name}() index {n} is negative")))
}

fn match_arg<'v>(name: &str, value: &'v Value, line: usize) -> SandboxResult<&'v MatchValue> {
    match value {
        Value::Match(m) => Ok(m),
        other => Err(SandboxError::runtime(
            line,
            format!("{name}() expected match, got {}", other.type_name()),
        )),
    }
}

fn list_arg<'v>(name: &str, value: &'v Value, line: usize) -> SandboxResult<&'v [Value]> {
    match value {
        Value::List(items) => Ok(items),
        other => Err(SandboxError::runtime(
            line,
            format!("{name}() expected list, got {}", other.type_name()),
        )),
    }
}

fn to_match(caps: &regex::Captures<'_>, text: &str, chars_before: usize, from_byte: usize) -> MatchValue {
    // `chars_before` counts characters in text[..from_byte].
    let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
    let start = chars_before + text[from_byte..whole.0].chars().count();
    let end = start + text[whole.0..whole.1].chars().count();
    MatchValue {
        text: text[whole.0..whole.1].to_string(),
        start,
        end,
        groups: caps
            .iter()
            .map(|g| g.map(|m| m.as_str().to_string()))
            .collect(),
    }
}

/// Ints, with numeric strings converted.
fn ints(name: &str, items: &[Value], line: usize) -> SandboxResult<Vec<i64>> {
    items
        .iter()
        .map(|v| match v {
            Value::Str(s) => s.trim().parse::<i64>().map_err(|_| {
                SandboxError::runtime(line, format!("{name}() cannot convert {s:?} to int"))
            }),
            other => int_arg(name, other, line),
        })
        .collect()
}

impl<'a> Interpreter<'a> {
    /// Text searched by pattern builtins: the explicit argument or the context.
    fn haystack<'v>(&self, name: &str, args: &'v [Value], idx: usize, line: usize) -> SandboxResult<&'v str>
    where
        'a: 'v,
    {
        match args.get(idx) {
            Some(v) => text_arg(name, v, line),
            None => Ok(self.context),
        }
    }

    fn pattern(&mut self, name: &str, args: &[Value], line: usize) -> SandboxResult<Regex> {
        let pattern = text_arg(name, &args[0], line)?.to_string();
        self.regex(&pattern, line)
    }

    pub(crate) fn call_builtin(&mut self, name: &str, args: Vec<Value>, line: usize) -> SandboxResult<Value> {
        match name {
            "search" => {
                arity(name, &args, 1, 2, line)?;
                let re = self.pattern(name, &args, line)?;
                let text = self.haystack(name, &args, 1, line)?;
                Ok(match re.captures(text) {
                    Some(caps) => Value::Match(to_match(&caps, text, 0, 0)),
                    None => Value::None,
                })
            }
            "find_all" => {
                arity(name, &args, 1, 2, line)?;
                let re = self.pattern(name, &args, line)?;
                let text = self.haystack(name, &args, 1, line)?;
                let mut found = Vec::new();
                let (mut chars_before, mut from_byte) = (0, 0);
                for caps in re.captures_iter(text) {
                    self.deadline.check()?;
                    if found.len() >= self.config.max_list_len {
                        return Err(SandboxError::runtime(
                            line,
                            format!("find_all() produced more than {} matches", self.config.max_list_len),
                        ));
                    }
                    let m = to_match(&caps, text, chars_before, from_byte);
                    chars_before = m.start;
                    from_byte = caps.get(0).map(|g| g.start()).unwrap_or(from_byte);
                    found.push(Value::Match(m));
                }
                Ok(Value::List(found))
            }
            "count" => {
                arity(name, &args, 1, 2, line)?;
                let re = self.pattern(name, &args, line)?;
                let text = self.haystack(name, &args, 1, line)?;
                let mut n: i64 = 0;
                for _ in re.find_iter(text) {
                    self.deadline.check()?;
                    n += 1;
                }
                Ok(Value::Int(n))
            }
            "group" => {
                arity(name, &args, 1, 2, line)?;
                if matches!(args[0], Value::None) {
                    return Ok(Value::None);
                }
                let m = match_arg(name, &args[0], line)?;
                let idx = match args.get(1) {
                    Some(v) => index_arg(name, v, line)?,
                    None => 0,
                };
                match m.groups.get(idx) {
                    Some(Some(text)) => Ok(Value::Str(text.clone())),
                    Some(None) => Ok(Value::None),
                    None => Err(SandboxError::runtime(
                        line,
                        format!("group {idx} out of range; pattern has {} group(s)", m.groups.len().saturating_sub(1)),
                    )),
                }
            }
            "find" => {
                arity(name, &args, 1, 2, line)?;
                let needle = text_arg(name, &args[0], line)?;
                let text = self.haystack(name, &args, 1, line)?;
                Ok(Value::Int(match text.find(needle) {
                    Some(byte) => text[..byte].chars().count() as i64,
                    None => -1,
                }))
            }
            "contains" => {
                arity(name, &args, 2, 2, line)?;
                match &args[0] {
                    Value::List(items) => Ok(Value::Bool(items.contains(&args[1]))),
                    other => {
                        let text = text_arg(name, other, line)?;
                        let needle = text_arg(name, &args[1], line)?;
                        Ok(Value::Bool(text.contains(needle)))
                    }
                }
            }
            "escape" => {
                arity(name, &args, 1, 1, line)?;
                Ok(Value::Str(regex::escape(text_arg(name, &args[0], line)?)))
            }

            "slice" => {
                arity(name, &args, 2, 3, line)?;
                let text = text_arg(name, &args[0], line)?;
                let total = text.chars().count();
                let start = index_arg(name, &args[1], line)?;
                let end = match args.get(2) {
                    Some(v) => index_arg(name, v, line)?,
                    None => total,
                };
                if start > total {
                    return Err(SandboxError::runtime(
                        line,
                        format!("slice start {start} out of range for length {total}"),
                    ));
                }
                if end > total {
                    return Err(SandboxError::runtime(
                        line,
                        format!("slice end {end} out of range for length {total}"),
                    ));
                }
                if start > end {
                    return Err(SandboxError::runtime(
                        line,
                        format!("slice start {start} is after end {end}"),
                    ));
                }
                Ok(Value::Str(text.chars().skip(start).take(end - start).collect()))
            }
            "head" => {
                arity(name, &args, 2, 2, line)?;
                let text = text_arg(name, &args[0], line)?;
                let n = index_arg(name, &args[1], line)?;
                Ok(Value::Str(text.chars().take(n).collect()))
            }
            "tail" => {
                arity(name, &args, 2, 2, line)?;
                let text = text_arg(name, &args[0], line)?;
                let n = index_arg(name, &args[1], line)?;
                let total = text.chars().count();
                Ok(Value::Str(text.chars().skip(total.saturating_sub(n)).collect()))
            }
            "lines" => {
                arity(name, &args, 0, 1, line)?;
                let text = self.haystack(name, &args, 0, line)?;
                let items = self.collect_list(text.lines().map(|l| Value::Str(l.to_string())), line)?;
                Ok(Value::List(items))
            }
            "split" => {
                arity(name, &args, 2, 2, line)?;
                let text = text_arg(name, &args[0], line)?;
                let sep = text_arg(name, &args[1], line)?;
                if sep.is_empty() {
                    return Err(SandboxError::runtime(line, "split() separator must not be empty"));
                }
                let items = self.collect_list(text.split(sep).map(|p| Value::Str(p.to_string())), line)?;
                Ok(Value::List(items))
            }
            "get" => {
                arity(name, &args, 2, 2, line)?;
                let i = int_arg(name, &args[1], line)?;
                let resolve = |len: usize| -> SandboxResult<usize> {
                    let idx = if i < 0 { len as i64 + i } else { i };
                    if idx < 0 || idx >= len as i64 {
                        return Err(SandboxError::runtime(
                            line,
                            format!("index {i} out of range for length {len}"),
                        ));
                    }
                    Ok(idx as usize)
                };
                match &args[0] {
                    Value::List(items) => Ok(items[resolve(items.len())?].clone()),
                    other => {
                        let text = text_arg(name, other, line)?;
                        let idx = resolve(text.chars().count())?;
                        Ok(text.chars().nth(idx).map(|c| Value::Str(c.to_string())).unwrap_or(Value::None))
                    }
                }
            }
            "start" | "end" => {
                arity(name, &args, 1, 1, line)?;
                let m = match_arg(name, &args[0], line)?;
                let offset = if name == "start" { m.start } else { m.end };
                Ok(Value::Int(offset as i64))
            }

            "len" => {
                arity(name, &args, 1, 1, line)?;
                let n = match &args[0] {
                    Value::Str(s) => s.chars().count(),
                    Value::Match(m) => m.text.chars().count(),
                    Value::List(items) => items.len(),
                    other => {
                        return Err(SandboxError::runtime(
                            line,
                            format!("len() of {} is undefined", other.type_name()),
                        ))
                    }
                };
                Ok(Value::Int(n as i64))
            }
            "lower" | "upper" | "trim" => {
                arity(name, &args, 1, 1, line)?;
                let text = text_arg(name, &args[0], line)?;
                Ok(Value::Str(match name {
                    "lower" => text.to_lowercase(),
                    "upper" => text.to_uppercase(),
                    _ => text.trim().to_string(),
                }))
            }
            "str" => {
                arity(name, &args, 1, 1, line)?;
                Ok(Value::Str(args[0].to_string()))
            }
            "int" => {
                arity(name, &args, 1, 1, line)?;
                match &args[0] {
                    Value::Int(n) => Ok(Value::Int(*n)),
                    Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                    other => {
                        let text = text_arg(name, other, line)?;
                        text.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                            SandboxError::runtime(line, format!("cannot convert {text:?} to int"))
                        })
                    }
                }
            }
            "join" => {
                arity(name, &args, 1, 2, line)?;
                let items = list_arg(name, &args[0], line)?;
                let sep = match args.get(1) {
                    Some(v) => text_arg(name, v, line)?,
                    None => "",
                };
                let mut joined = String::new();
                for (i, item) in items.iter().enumerate() {
                    if i % CHECK_EVERY == 0 {
                        self.deadline.check()?;
                    }
                    let part = item.to_string();
                    let sep = if i > 0 { sep } else { "" };
                    self.reserve_str(joined.len() + sep.len() + part.len(), line)?;
                    joined.push_str(sep);
                    joined.push_str(&part);
                }
                Ok(Value::Str(joined))
            }
            "words" => {
                arity(name, &args, 1, 1, line)?;
                let text = text_arg(name, &args[0], line)?;
                let items =
                    self.collect_list(text.split_whitespace().map(|w| Value::Str(w.to_string())), line)?;
                Ok(Value::List(items))
            }
            "replace" => {
                arity(name, &args, 3, 3, line)?;
                let text = text_arg(name, &args[0], line)?;
                let from = text_arg(name, &args[1], line)?;
                let to = text_arg(name, &args[2], line)?;
                if from.is_empty() {
                    return Err(SandboxError::runtime(line, "replace() pattern must not be empty"));
                }
                let mut hits = 0usize;
                for _ in text.match_indices(from) {
                    if hits % CHECK_EVERY == 0 {
                        self.deadline.check()?;
                    }
                    hits += 1;
                }
                let projected = (text.len() - hits * from.len()).saturating_add(hits.saturating_mul(to.len()));
                self.reserve_str(projected, line)?;
                Ok(Value::Str(text.replace(from, to)))
            }
            "sum" => {
                arity(name, &args, 1, 1, line)?;
                let values = ints(name, list_arg(name, &args[0], line)?, line)?;
                values
                    .into_iter()
                    .try_fold(0i64, |acc, n| acc.checked_add(n))
                    .map(Value::Int)
                    .ok_or_else(|| SandboxError::runtime(line, "integer overflow"))
            }
            "min" | "max" => {
                arity(name, &args, 1, 2, line)?;
                let values = if args.len() == 2 {
                    ints(name, &args, line)?
                } else {
                    ints(name, list_arg(name, &args[0], line)?, line)?
                };
                let picked = if name == "min" {
                    values.into_iter().min()
                } else {
                    values.into_iter().max()
                };
                picked
                    .map(Value::Int)
                    .ok_or_else(|| SandboxError::runtime(line, format!("{name}() of empty list")))
            }
            "abs" => {
                arity(name, &args, 1, 1, line)?;
                int_arg(name, &args[0], line)?
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| SandboxError::runtime(line, "integer overflow"))
            }
            "type" => {
                arity(name, &args, 1, 1, line)?;
                Ok(Value::Str(args[0].type_name().to_string()))
            }

            other => Err(SandboxError::runtime(line, format!("unknown operation '{other}'"))),
        }
    }
}
