//! Recursive-descent parser producing the snippet AST.
//!
//! Grammar (statements separated by newlines or `;`):
//!
//! ```text
//! stmt    := "let" IDENT "=" expr | IDENT "=" expr
//!          | "print" [expr ("," expr)*]
//!          | "if" expr block ["else" (block | if-stmt)]
//!          | "repeat" expr block | "for" IDENT "in" expr block
//!          | expr
//! expr    := or
//! or      := and ("or" and)*
//! and     := not ("and" not)*
//! not     := "not" not | cmp
//! cmp     := sum [("=="|"!="|"<"|"<="|">"|">=") sum]
//! sum     := unary (("+"|"-") unary)*
//! unary   := "-" unary | primary
//! primary := INT | STRING | "true" | "false" | "none"
//!          | IDENT "(" [expr ("," expr)*] ")" | IDENT | "(" expr ")"
//! ```

use super::error::{SandboxError, SandboxResult};
use super::lexer::{tokenize, Spanned, Token};
use super::value::Value;

/// Nesting limit for blocks, parentheses and unary chains.
pub const MAX_NESTING: usize = 64;

/// Depth limit for an expression tree, counting every chained binary
/// operator as one level on top of any nesting.
pub const MAX_EXPR_DEPTH: usize = 256;

const KEYWORDS: &[&str] = &[
    "let", "print", "if", "else", "repeat", "for", "in", "true", "false", "none", "not", "and",
    "or",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Call { name: String, args: Vec<Expr> },
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Assign { name: String, expr: Expr },
    Print(Vec<Expr>),
    If { cond: Expr, then: Vec<Stmt>, otherwise: Vec<Stmt> },
    Repeat { count: Expr, body: Vec<Stmt> },
    For { var: String, iter: Expr, body: Vec<Stmt> },
    Expr(Expr),
}

/// Parse a full snippet.
pub fn parse(source: &str) -> SandboxResult<Vec<Stmt>> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        tree_depth: 0,
    };
    parser.program()
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    tree_depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.token)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|s| s.token.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(name)) if name == word)
    }

    fn expect(&mut self, want: Token) -> SandboxResult<()> {
        let line = self.line();
        match self.advance() {
            Some(tok) if tok == want => Ok(()),
            Some(tok) => Err(SandboxError::syntax(
                line,
                format!("expected {want}, found {tok}"),
            )),
            None => Err(SandboxError::syntax(
                line,
                format!("expected {want}, found end of input"),
            )),
        }
    }

    fn expect_name(&mut self) -> SandboxResult<String> {
        let line = self.line();
        match self.advance() {
            Some(Token::Ident(name)) if !KEYWORDS.contains(&name.as_str()) => Ok(name),
            Some(Token::Ident(name)) => Err(SandboxError::syntax(
                line,
                format!("'{name}' is a reserved word"),
            )),
            Some(tok) => Err(SandboxError::syntax(
                line,
                format!("expected a name, found {tok}"),
            )),
            None => Err(SandboxError::syntax(line, "expected a name")),
        }
    }

    fn descend(&mut self) -> SandboxResult<()> {
        if self.depth >= MAX_NESTING {
            return Err(SandboxError::syntax(
                self.line(),
                format!("nesting deeper than {MAX_NESTING} levels"),
            ));
        }
        self.deepen(1)?;
        self.depth += 1;
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.shallow(1);
    }

    /// Account for `levels` more expression-tree levels below the current node.
    fn deepen(&mut self, levels: usize) -> SandboxResult<()> {
        if self.tree_depth + levels > MAX_EXPR_DEPTH {
            return Err(SandboxError::syntax(
                self.line(),
                format!("expression deeper than {MAX_EXPR_DEPTH} levels"),
            ));
        }
        self.tree_depth += levels;
        Ok(())
    }

    fn shallow(&mut self, levels: usize) {
        self.tree_depth = self.tree_depth.saturating_sub(levels);
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Some(Token::Newline)) {
            self.pos += 1;
        }
    }

    fn program(&mut self) -> SandboxResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek() {
                None => return Ok(stmts),
                Some(Token::RBrace) => {
                    return Err(SandboxError::syntax(self.line(), "unmatched '}'"))
                }
                Some(_) => stmts.push(self.statement()?),
            }
        }
    }

    fn block(&mut self) -> SandboxResult<Vec<Stmt>> {
        self.expect(Token::LBrace)?;
        self.descend()?;
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek() {
                None => return Err(SandboxError::syntax(self.line(), "unclosed '{'")),
                Some(Token::RBrace) => {
                    self.pos += 1;
                    self.ascend();
                    return Ok(stmts);
                }
                Some(_) => stmts.push(self.statement()?),
            }
        }
    }

    fn statement(&mut self) -> SandboxResult<Stmt> {
        let line = self.line();
        let keyword = match self.peek() {
            Some(Token::Ident(word)) => Some(word.clone()),
            _ => None,
        };
        let kind = match keyword.as_deref() {
            Some("let") => {
                self.pos += 1;
                let name = self.expect_name()?;
                self.expect(Token::Assign)?;
                StmtKind::Assign {
                    name,
                    expr: self.expr()?,
                }
            }
            Some("print") => {
                self.pos += 1;
                let mut exprs = Vec::new();
                if !self.at_statement_end() {
                    exprs.push(self.expr()?);
                    while matches!(self.peek(), Some(Token::Comma)) {
                        self.pos += 1;
                        exprs.push(self.expr()?);
                    }
                }
                StmtKind::Print(exprs)
            }
            Some("if") => self.if_statement()?,
            Some("repeat") => {
                self.pos += 1;
                let count = self.expr()?;
                StmtKind::Repeat {
                    count,
                    body: self.block()?,
                }
            }
            Some("for") => {
                self.pos += 1;
                let var = self.expect_name()?;
                if !self.is_keyword("in") {
                    return Err(SandboxError::syntax(self.line(), "expected 'in'"));
                }
                self.pos += 1;
                let iter = self.expr()?;
                StmtKind::For {
                    var,
                    iter,
                    body: self.block()?,
                }
            }
            Some("else") => return Err(SandboxError::syntax(line, "'else' without 'if'")),
            Some(_) if matches!(self.peek_at(1), Some(Token::Assign)) => {
                let name = self.expect_name()?;
                self.pos += 1;
                StmtKind::Assign {
                    name,
                    expr: self.expr()?,
                }
            }
            _ => StmtKind::Expr(self.expr()?),
        };

        if !self.at_statement_end() {
            let found = self
                .peek()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "end of input".into());
            return Err(SandboxError::syntax(
                self.line(),
                format!("unexpected {found} after statement"),
            ));
        }
        Ok(Stmt { line, kind })
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek(),
            None | Some(Token::Newline) | Some(Token::RBrace)
        )
    }

    fn if_statement(&mut self) -> SandboxResult<StmtKind> {
        self.pos += 1;
        let cond = self.expr()?;
        let then = self.block()?;

        // `else` may sit on the line after the closing brace.
        let save = self.pos;
        self.skip_newlines();
        if !self.is_keyword("else") {
            self.pos = save;
            return Ok(StmtKind::If {
                cond,
                then,
                otherwise: Vec::new(),
            });
        }
        self.pos += 1;

        let otherwise = if self.is_keyword("if") {
            let line = self.line();
            self.descend()?;
            let nested = self.if_statement()?;
            self.ascend();
            vec![Stmt { line, kind: nested }]
        } else {
            self.block()?
        };
        Ok(StmtKind::If {
            cond,
            then,
            otherwise,
        })
    }

    fn expr(&mut self) -> SandboxResult<Expr> {
        self.descend()?;
        let expr = self.or_expr();
        self.ascend();
        expr
    }

    fn or_expr(&mut self) -> SandboxResult<Expr> {
        let mut lhs = self.and_expr()?;
        let mut chained = 0;
        while self.is_keyword("or") {
            self.pos += 1;
            self.deepen(1)?;
            chained += 1;
            let rhs = self.and_expr()?;
            lhs = binary(BinOp::Or, lhs, rhs);
        }
        self.shallow(chained);
        Ok(lhs)
    }

    fn and_expr(&mut self) -> SandboxResult<Expr> {
        let mut lhs = self.not_expr()?;
        let mut chained = 0;
        while self.is_keyword("and") {
            self.pos += 1;
            self.deepen(1)?;
            chained += 1;
            let rhs = self.not_expr()?;
            lhs = binary(BinOp::And, lhs, rhs);
        }
        self.shallow(chained);
        Ok(lhs)
    }

    fn not_expr(&mut self) -> SandboxResult<Expr> {
        if self.is_keyword("not") {
            self.pos += 1;
            self.descend()?;
            let inner = self.not_expr()?;
            self.ascend();
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(inner),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> SandboxResult<Expr> {
        let lhs = self.sum()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinOp::Eq,
            Some(Token::NotEq) => BinOp::NotEq,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::LtEq) => BinOp::LtEq,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::GtEq) => BinOp::GtEq,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        self.deepen(1)?;
        let rhs = self.sum();
        self.shallow(1);
        Ok(binary(op, lhs, rhs?))
    }

    fn sum(&mut self) -> SandboxResult<Expr> {
        let mut lhs = self.unary()?;
        let mut chained = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            self.deepen(1)?;
            chained += 1;
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
        self.shallow(chained);
        Ok(lhs)
    }

    fn unary(&mut self) -> SandboxResult<Expr> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.pos += 1;
            self.descend()?;
            let inner = self.unary()?;
            self.ascend();
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(inner),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> SandboxResult<Expr> {
        let line = self.line();
        match self.advance() {
            Some(Token::Int(n)) => Ok(Expr::Literal(Value::Int(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "none" => Ok(Expr::Literal(Value::None)),
                word if KEYWORDS.contains(&word) => Err(SandboxError::syntax(
                    line,
                    format!("unexpected keyword '{word}'"),
                )),
                _ if matches!(self.peek(), Some(Token::LParen)) => {
                    self.pos += 1;
                    let mut args = Vec::new();
                    if !matches!(self.peek(), Some(Token::RParen)) {
                        args.push(self.expr()?);
                        while matches!(self.peek(), Some(Token::Comma)) {
                            self.pos += 1;
                            args.push(self.expr()?);
                        }
                    }
                    self.expect(Token::RParen)?;
                    Ok(Expr::Call { name, args })
                }
                _ => Ok(Expr::Var(name)),
            },
            Some(tok) => Err(SandboxError::syntax(
                line,
                format!("unexpected {tok}"),
            )),
            None => Err(SandboxError::syntax(line, "unexpected end of input")),
        }
    }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}
