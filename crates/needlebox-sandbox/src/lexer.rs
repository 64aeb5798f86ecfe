//! Tokenizer for the snippet language.

use super::error::{SandboxError, SandboxResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Assign,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    /// Statement separator: newline or `;`.
    Newline,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "'{name}'"),
            Token::Str(_) => write!(f, "string literal"),
            Token::Int(n) => write!(f, "'{n}'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::LBrace => write!(f, "'{{'"),
            Token::RBrace => write!(f, "'}}'"),
            Token::Comma => write!(f, "','"),
            Token::Assign => write!(f, "'='"),
            Token::Eq => write!(f, "'=='"),
            Token::NotEq => write!(f, "'!='"),
            Token::Lt => write!(f, "'<'"),
            Token::LtEq => write!(f, "'<='"),
            Token::Gt => write!(f, "'>'"),
            Token::GtEq => write!(f, "'>='"),
            Token::Plus => write!(f, "'+'"),
            Token::Minus => write!(f, "'-'"),
            Token::Newline => write!(f, "end of line"),
        }
    }
}

/// A token and the 1-based source line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

pub fn tokenize(source: &str) -> SandboxResult<Vec<Spanned>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                push(&mut tokens, Token::Newline, line);
                line += 1;
                i += 1;
            }
            ';' => {
                push(&mut tokens, Token::Newline, line);
                i += 1;
            }
            c if c.is_whitespace() => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            'r' if matches!(chars.get(i + 1), Some('"') | Some('\'')) => {
                let quote = chars[i + 1];
                let start_line = line;
                let mut j = i + 2;
                let mut text = String::new();
                loop {
                    match chars.get(j) {
                        None | Some('\n') => {
                            return Err(SandboxError::syntax(
                                start_line,
                                "unterminated raw string literal",
                            ))
                        }
                        Some(&ch) if ch == quote => break,
                        Some(&ch) => text.push(ch),
                    }
                    j += 1;
                }
                push(&mut tokens, Token::Str(text), start_line);
                i = j + 1;
            }
            '"' | '\'' => {
                let (text, next) = lex_string(&chars, i, line)?;
                push(&mut tokens, Token::Str(text), line);
                i = next;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let digits: String = chars[start..i].iter().collect();
                let value = digits.parse::<i64>().map_err(|_| {
                    SandboxError::syntax(line, format!("integer literal {digits} is too large"))
                })?;
                push(&mut tokens, Token::Int(value), line);
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                push(&mut tokens, Token::Ident(ident), line);
            }
            _ => {
                let next = chars.get(i + 1).copied();
                let (token, width) = match (c, next) {
                    ('=', Some('=')) => (Token::Eq, 2),
                    ('!', Some('=')) => (Token::NotEq, 2),
                    ('<', Some('=')) => (Token::LtEq, 2),
                    ('>', Some('=')) => (Token::GtEq, 2),
                    ('=', _) => (Token::Assign, 1),
                    ('<', _) => (Token::Lt, 1),
                    ('>', _) => (Token::Gt, 1),
                    ('+', _) => (Token::Plus, 1),
                    ('-', _) => (Token::Minus, 1),
                    ('(', _) => (Token::LParen, 1),
                    (')', _) => (Token::RParen, 1),
                    ('{', _) => (Token::LBrace, 1),
                    ('}', _) => (Token::RBrace, 1),
                    (',', _) => (Token::Comma, 1),
                    (other, _) => {
                        return Err(SandboxError::syntax(
                            line,
                            format!("unexpected character '{other}'"),
                        ))
                    }
                };
                push(&mut tokens, token, line);
                i += width;
            }
        }
    }

    Ok(tokens)
}

fn push(tokens: &mut Vec<Spanned>, token: Token, line: usize) {
    tokens.push(Spanned { token, line });
}

fn lex_string(chars: &[char], open: usize, line: usize) -> SandboxResult<(String, usize)> {
    let quote = chars[open];
    let mut text = String::new();
    let mut j = open + 1;
    loop {
        match chars.get(j) {
            None | Some('\n') => {
                return Err(SandboxError::syntax(line, "unterminated string literal"))
            }
            Some(&ch) if ch == quote => return Ok((text, j + 1)),
            Some('\\') => {
                let escaped = match chars.get(j + 1) {
                    Some('n') => '\n',
                    Some('t') => '\t',
                    Some('\\') => '\\',
                    Some('"') => '"',
                    Some('\'') => '\'',
                    // Unknown escapes keep their backslash so regex classes
                    // like "\d" survive in plain literals.
                    Some(&other) => {
                        text.push('\\');
                        other
                    }
                    None => return Err(SandboxError::syntax(line, "unterminated string literal")),
                };
                text.push(escaped);
                j += 2;
            }
            Some(&ch) => {
                text.push(ch);
                j += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_let_statement() {
        assert_eq!(
            kinds("let n = count(\"a\")"),
            vec![
                Token::Ident("let".into()),
                Token::Ident("n".into()),
                Token::Assign,
                Token::Ident("count".into()),
                Token::LParen,
                Token::Str("a".into()),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_raw_string_keeps_backslashes() {
        assert_eq!(
            kinds(r#"r"KEY=(\d+)""#),
            vec![Token::Str(r"KEY=(\d+)".into())]
        );
    }

    #[test]
    fn test_escapes_in_plain_string() {
        assert_eq!(kinds(r#""a\nb\"c""#), vec![Token::Str("a\nb\"c".into())]);
    }

    #[test]
    fn test_semicolon_and_comment() {
        assert_eq!(
            kinds("print 1; print 2 # trailing"),
            vec![
                Token::Ident("print".into()),
                Token::Int(1),
                Token::Newline,
                Token::Ident("print".into()),
                Token::Int(2),
            ]
        );
    }

    #[test]
    fn test_two_char_operators() {
        assert_eq!(
            kinds("a == b != c <= d >= e"),
            vec![
                Token::Ident("a".into()),
                Token::Eq,
                Token::Ident("b".into()),
                Token::NotEq,
                Token::Ident("c".into()),
                Token::LtEq,
                Token::Ident("d".into()),
                Token::GtEq,
                Token::Ident("e".into()),
            ]
        );
    }

    #[test]
    fn test_unknown_escape_keeps_backslash() {
        assert_eq!(kinds(r#""KEY=(\d+)""#), vec![Token::Str(r"KEY=(\d+)".into())]);
    }

    #[test]
    fn test_line_numbers_advance() {
        let toks = tokenize("print 1\n\nprint 2").unwrap();
        assert_eq!(toks.last().unwrap().line, 3);
    }

    #[test]
    fn test_unterminated_string_is_syntax_error() {
        let err = tokenize("print \"abc").unwrap_err();
        assert!(matches!(err, SandboxError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("print 1 * 2").unwrap_err();
        assert!(err.to_string().contains("unexpected character '*'"));
    }

    #[test]
    fn test_integer_overflow_is_syntax_error() {
        assert!(tokenize("print 99999999999999999999999").is_err());
    }
}
