//! Tree-walking interpreter over a parsed snippet.
//!
//! The only state an interpreter can reach is the read-only context, its own
//! variables and its captured output. It is built fresh for every execution
//! and dropped afterwards.

use std::collections::HashMap;

use regex::Regex;

use super::error::{SandboxError, SandboxResult};
use super::execution::{Deadline, SandboxConfig};
use super::parser::{BinOp, Expr, Stmt, StmtKind, UnaryOp};
use super::value::Value;

/// Name under which the episode context is visible to snippets.
pub const CONTEXT_VAR: &str = "CONTEXT";

/// Element loops inside builtins check the deadline this often.
pub(crate) const CHECK_EVERY: usize = 1024;

/// Captured stdout of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub truncated: bool,
}

struct OutputBuffer {
    text: String,
    chars: usize,
    limit: usize,
    truncated: bool,
}

impl OutputBuffer {
    fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            chars: 0,
            limit,
            truncated: false,
        }
    }

    fn write_line(&mut self, line: &str) {
        for ch in line.chars().chain(std::iter::once('\n')) {
            if self.chars >= self.limit {
                self.truncated = true;
                return;
            }
            self.text.push(ch);
            self.chars += 1;
        }
    }
}

pub struct Interpreter<'a> {
    pub(crate) context: &'a str,
    pub(crate) config: &'a SandboxConfig,
    pub(crate) deadline: Deadline,
    vars: HashMap<String, Value>,
    output: OutputBuffer,
    patterns: HashMap<String, Regex>,
}

impl<'a> Interpreter<'a> {
    pub fn new(context: &'a str, config: &'a SandboxConfig, deadline: Deadline) -> Self {
        Self {
            context,
            config,
            deadline,
            vars: HashMap::new(),
            output: OutputBuffer::new(config.max_output_chars),
            patterns: HashMap::new(),
        }
    }

    pub fn run(mut self, program: &[Stmt]) -> SandboxResult<RunOutput> {
        self.exec_block(program)?;
        Ok(RunOutput {
            stdout: self.output.text,
            truncated: self.output.truncated,
        })
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> SandboxResult<()> {
        for stmt in stmts {
            self.exec(stmt)?;
        }
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt) -> SandboxResult<()> {
        self.deadline.check()?;
        let line = stmt.line;
        match &stmt.kind {
            StmtKind::Assign { name, expr } => {
                if name == CONTEXT_VAR {
                    return Err(SandboxError::runtime(line, "CONTEXT is read-only"));
                }
                let value = self.eval(expr, line)?;
                self.vars.insert(name.clone(), value);
            }
            StmtKind::Print(exprs) => {
                let mut parts = Vec::with_capacity(exprs.len());
                for expr in exprs {
                    parts.push(self.eval(expr, line)?.to_string());
                }
                self.output.write_line(&parts.join(" "));
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond, line)?.is_truthy() {
                    self.exec_block(then)?;
                } else {
                    self.exec_block(otherwise)?;
                }
            }
            StmtKind::Repeat { count, body } => {
                let times = match self.eval(count, line)? {
                    Value::Int(n) if n >= 0 => n,
                    Value::Int(n) => {
                        return Err(SandboxError::runtime(
                            line,
                            format!("repeat count must be non-negative, got {n}"),
                        ))
                    }
                    other => {
                        return Err(SandboxError::runtime(
                            line,
                            format!("repeat count must be int, got {}", other.type_name()),
                        ))
                    }
                };
                for _ in 0..times {
                    self.deadline.check()?;
                    self.exec_block(body)?;
                }
            }
            StmtKind::For { var, iter, body } => {
                if var == CONTEXT_VAR {
                    return Err(SandboxError::runtime(line, "CONTEXT is read-only"));
                }
                match self.eval(iter, line)? {
                    Value::List(items) => {
                        for item in items {
                            self.iterate(var, item, body)?;
                        }
                    }
                    Value::Str(s) => {
                        for ch in s.chars() {
                            self.iterate(var, Value::Str(ch.to_string()), body)?;
                        }
                    }
                    other => {
                        return Err(SandboxError::runtime(
                            line,
                            format!("cannot iterate over {}", other.type_name()),
                        ))
                    }
                }
            }
            StmtKind::Expr(expr) => {
                self.eval(expr, line)?;
            }
        }
        Ok(())
    }

    fn iterate(&mut self, var: &str, item: Value, body: &[Stmt]) -> SandboxResult<()> {
        self.deadline.check()?;
        self.vars.insert(var.to_string(), item);
        self.exec_block(body)
    }

    fn eval(&mut self, expr: &Expr, line: usize) -> SandboxResult<Value> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Var(name) if name == CONTEXT_VAR => Ok(Value::Str(self.context.to_string())),
            Expr::Var(name) => self
                .vars
                .get(name)
                .cloned()
                .ok_or_else(|| SandboxError::runtime(line, format!("unknown variable '{name}'"))),
            Expr::Call { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, line)?);
                }
                let value = self.call_builtin(name, values, line)?;
                self.guard_size(value, line)
            }
            Expr::Unary { op, expr } => {
                let value = self.eval(expr, line)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Neg => match value {
                        Value::Int(n) => n
                            .checked_neg()
                            .map(Value::Int)
                            .ok_or_else(|| SandboxError::runtime(line, "integer overflow")),
                        other => Err(SandboxError::runtime(
                            line,
                            format!("cannot negate {}", other.type_name()),
                        )),
                    },
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let left = self.eval(lhs, line)?;
                match op {
                    BinOp::And => {
                        if !left.is_truthy() {
                            return Ok(left);
                        }
                        return self.eval(rhs, line);
                    }
                    BinOp::Or => {
                        if left.is_truthy() {
                            return Ok(left);
                        }
                        return self.eval(rhs, line);
                    }
                    _ => {}
                }
                let right = self.eval(rhs, line)?;
                let value = binary_op(*op, left, right, line)?;
                self.guard_size(value, line)
            }
        }
    }

    /// Reject values larger than the configured limits.
    fn guard_size(&self, value: Value, line: usize) -> SandboxResult<Value> {
        match &value {
            Value::Str(s) => self.reserve_str(s.len(), line)?,
            Value::List(items) => {
                self.reserve_list(items.len(), line)?;
                let bytes = value.weight();
                if bytes > self.config.max_value_len {
                    return Err(SandboxError::runtime(
                        line,
                        format!(
                            "list holding {bytes} bytes exceeds limit of {}",
                            self.config.max_value_len
                        ),
                    ));
                }
            }
            _ => {}
        }
        Ok(value)
    }

    /// Fail before building a string of `bytes` bytes over the limit.
    pub(crate) fn reserve_str(&self, bytes: usize, line: usize) -> SandboxResult<()> {
        if bytes > self.config.max_value_len {
            return Err(SandboxError::runtime(
                line,
                format!(
                    "string of {bytes} bytes exceeds limit of {}",
                    self.config.max_value_len
                ),
            ));
        }
        Ok(())
    }

    fn reserve_list(&self, items: usize, line: usize) -> SandboxResult<()> {
        if items > self.config.max_list_len {
            return Err(SandboxError::runtime(
                line,
                format!(
                    "list of {items} items exceeds limit of {}",
                    self.config.max_list_len
                ),
            ));
        }
        Ok(())
    }

    /// Collect a builtin's list result, stopping at the deadline or the
    /// item limit instead of after the whole list is built.
    pub(crate) fn collect_list(
        &self,
        items: impl IntoIterator<Item = Value>,
        line: usize,
    ) -> SandboxResult<Vec<Value>> {
        let mut out = Vec::new();
        for item in items {
            if out.len() % CHECK_EVERY == 0 {
                self.deadline.check()?;
            }
            self.reserve_list(out.len() + 1, line)?;
            out.push(item);
        }
        Ok(out)
    }

    /// Compile `pattern` once per execution.
    pub(crate) fn regex(&mut self, pattern: &str, line: usize) -> SandboxResult<Regex> {
        if let Some(re) = self.patterns.get(pattern) {
            return Ok(re.clone());
        }
        let re = regex::RegexBuilder::new(pattern)
            .size_limit(self.config.regex_size_limit)
            .dfa_size_limit(self.config.regex_size_limit)
            .build()
            .map_err(|e| {
                SandboxError::runtime(
                    line,
                    format!("invalid pattern {pattern:?}: {}", describe_regex_error(&e)),
                )
            })?;
        self.patterns.insert(pattern.to_string(), re.clone());
        Ok(re)
    }
}

fn describe_regex_error(err: &regex::Error) -> String {
    match err {
        regex::Error::Syntax(text) => text
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(|l| l.trim_start_matches("error: ").to_string())
            .unwrap_or_else(|| "syntax error".to_string()),
        regex::Error::CompiledTooBig(limit) => {
            format!("compiled pattern exceeds {limit} bytes")
        }
        other => other.to_string(),
    }
}

fn binary_op(op: BinOp, left: Value, right: Value, line: usize) -> SandboxResult<Value> {
    let mismatch = |verb: &str, l: &Value, r: &Value| {
        SandboxError::runtime(
            line,
            format!("cannot {verb} {} and {}", l.type_name(), r.type_name()),
        )
    };
    match op {
        BinOp::Eq => Ok(Value::Bool(left == right)),
        BinOp::NotEq => Ok(Value::Bool(left != right)),
        BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq => {
            let ordering = match (&left, &right) {
                (Value::Int(a), Value::Int(b)) => a.cmp(b),
                (Value::Str(a), Value::Str(b)) => a.cmp(b),
                _ => return Err(mismatch("compare", &left, &right)),
            };
            Ok(Value::Bool(match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::LtEq => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinOp::Add => match (left, right) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_add(b)
                .map(Value::Int)
                .ok_or_else(|| SandboxError::runtime(line, "integer overflow")),
            (Value::Str(mut a), Value::Str(b)) => {
                a.push_str(&b);
                Ok(Value::Str(a))
            }
            (Value::List(mut a), Value::List(b)) => {
                a.extend(b);
                Ok(Value::List(a))
            }
            (l, r) => Err(mismatch("add", &l, &r)),
        },
        BinOp::Sub => match (left, right) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_sub(b)
                .map(Value::Int)
                .ok_or_else(|| SandboxError::runtime(line, "integer overflow")),
            (l, r) => Err(mismatch("subtract", &l, &r)),
        },
        BinOp::And | BinOp::Or => unreachable!("short-circuit operators are handled in eval"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use std::time::Duration;

    fn run_with(context: &str, src: &str, config: &SandboxConfig) -> SandboxResult<RunOutput> {
        let program = parse(src)?;
        Interpreter::new(context, config, Deadline::start(Duration::from_secs(5))).run(&program)
    }

    fn run(context: &str, src: &str) -> SandboxResult<RunOutput> {
        run_with(context, src, &SandboxConfig::default())
    }

    #[test]
    fn test_print_joins_with_spaces() {
        let out = run("", "print \"a\", 1, true").unwrap();
        assert_eq!(out.stdout, "a 1 true\n");
        assert!(!out.truncated);
    }

    #[test]
    fn test_if_else_branches() {
        let out = run("", "let x = 3\nif x > 2 { print \"big\" } else { print \"small\" }").unwrap();
        assert_eq!(out.stdout, "big\n");
    }

    #[test]
    fn test_or_returns_first_truthy_operand() {
        let out = run("", "print none or \"fallback\"").unwrap();
        assert_eq!(out.stdout, "fallback\n");
    }

    #[test]
    fn test_for_accumulates() {
        let out = run("", "let total = 0\nfor n in split(\"1 2 3\", \" \") { total = total + int(n) }\nprint total").unwrap();
        assert_eq!(out.stdout, "6\n");
    }

    #[test]
    fn test_for_over_split() {
        let out = run("", "for w in split(\"a,b,c\", \",\") { print upper(w) }").unwrap();
        assert_eq!(out.stdout, "A\nB\nC\n");
    }

    #[test]
    fn test_context_is_read_only() {
        let err = run("text", "CONTEXT = \"x\"").unwrap_err();
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn test_unknown_variable() {
        let err = run("", "print missing").unwrap_err();
        assert_eq!(
            err,
            SandboxError::Runtime {
                line: 1,
                message: "unknown variable 'missing'".into()
            }
        );
    }

    #[test]
    fn test_type_mismatch_on_add() {
        let err = run("", "print \"a\" + 1").unwrap_err();
        assert!(err.to_string().contains("cannot add str and int"));
    }

    #[test]
    fn test_integer_overflow_is_runtime_error() {
        let err = run("", "print 9223372036854775807 + 1").unwrap_err();
        assert!(err.to_string().contains("overflow"));
    }

    #[test]
    fn test_output_truncation() {
        let cfg = SandboxConfig {
            max_output_chars: 5,
            ..SandboxConfig::default()
        };
        let out = run_with("", "print \"abcdefgh\"\nprint \"more\"", &cfg).unwrap();
        assert_eq!(out.stdout, "abcde");
        assert!(out.truncated);
    }

    #[test]
    fn test_string_growth_is_bounded() {
        let cfg = SandboxConfig {
            max_value_len: 64,
            ..SandboxConfig::default()
        };
        let err = run_with("", "let s = \"ab\"\nrepeat 10 { s = s + s }", &cfg).unwrap_err();
        assert!(err.to_string().contains("exceeds limit"));
    }

    #[test]
    fn test_list_growth_is_bounded_by_bytes() {
        let cfg = SandboxConfig {
            max_value_len: 1024,
            ..SandboxConfig::default()
        };
        let src = "let s = \"x\"\nrepeat 9 { s = s + s }\nlet l = split(s, \",\")\nrepeat 4 { l = l + l }";
        let err = run_with("", src, &cfg).unwrap_err();
        assert!(err.to_string().contains("list holding"), "{err}");
    }

    #[test]
    fn test_for_over_long_string_honours_deadline() {
        let program = parse("let s = \"ab\"\nrepeat 20 { s = s + s }\nfor c in s { let x = c }").unwrap();
        let cfg = SandboxConfig::default();
        let started = std::time::Instant::now();
        let err = Interpreter::new("", &cfg, Deadline::start(Duration::from_millis(30)))
            .run(&program)
            .unwrap_err();
        assert!(matches!(err, SandboxError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_zero_budget_times_out_before_first_statement() {
        let program = parse("print 1").unwrap();
        let cfg = SandboxConfig::default();
        let err = Interpreter::new("", &cfg, Deadline::start(Duration::ZERO))
            .run(&program)
            .unwrap_err();
        assert!(matches!(err, SandboxError::Timeout { .. }));
    }

    #[test]
    fn test_negative_repeat_count() {
        let err = run("", "repeat -1 { print 1 }").unwrap_err();
        assert!(err.to_string().contains("non-negative"));
    }
}
