//! Tokenizer (§1 "a small, self-contained tokenizer", §6 "Source language").
//!
//! Deliberately mechanical: no incremental re-lexing, no macro expansion.
//! Produces a flat token stream; `parser.rs` turns that into a flat message
//! chain, and `shuffle.rs` renests it by operator precedence.

use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    /// An operator/punctuation run treated as an identifier for lookup
    /// purposes (`+`, `*`, `==`, `:=`, ...). Distinguished from `Ident` only
    /// so the parser can tell "was this written as a bare word or a symbol
    /// run" for diagnostics; both become ordinary message text.
    Operator(String),
    Number(f64),
    Str(String),
    /// `;` or a newline -- a terminator message (§3). The payload is `true`
    /// for an explicit `;` (which separates statements everywhere, including
    /// inside a bracketed argument list) and `false` for a bare newline
    /// (which only separates statements outside brackets -- a newline inside
    /// `(...)`/`[...]`/`{...}` is just whitespace).
    Terminator(bool),
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Eof,
}

#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub line: u32,
    pub col: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub line: u32,
    pub col: u32,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.col, self.message)
    }
}

impl std::error::Error for LexError {}

const OPERATOR_CHARS: &str = "+-*/%<>=!&|^~?:@";

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    col: u32,
    label: Arc<str>,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(source: &'a str, label: &str) -> Self {
        Self { chars: source.chars().peekable(), line: 1, col: 1, label: Arc::from(label) }
    }

    #[must_use]
    pub fn label(&self) -> Arc<str> {
        self.label.clone()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), LexError> {
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated block comment")),
                Some('*') if self.peek() == Some('/') => {
                    self.bump();
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> LexError {
        LexError { message: message.into(), line: self.line, col: self.col }
    }

    fn read_number(&mut self, first: char) -> Result<f64, LexError> {
        let mut text = String::new();
        text.push(first);
        if first == '0' && matches!(self.peek(), Some('x' | 'X')) {
            text.push(self.bump().unwrap());
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() {
                    text.push(self.bump().unwrap());
                } else {
                    break;
                }
            }
            let digits = &text[2..];
            return u64::from_str_radix(digits, 16).map(|n| n as f64).map_err(|_| self.error("invalid hex literal"));
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(self.bump().unwrap());
            } else {
                break;
            }
        }
        if self.peek() == Some('.') {
            text.push(self.bump().unwrap());
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(self.bump().unwrap());
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            text.push(self.bump().unwrap());
            if matches!(self.peek(), Some('+' | '-')) {
                text.push(self.bump().unwrap());
            }
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(self.bump().unwrap());
                } else {
                    break;
                }
            }
        }
        // Over/underflow folds to ±infinity rather than erroring (§6).
        Ok(text.parse::<f64>().unwrap_or(if text.starts_with('-') { f64::NEG_INFINITY } else { f64::INFINITY }))
    }

    fn read_string(&mut self, quote: char) -> Result<String, LexError> {
        let triple = self.peek() == Some(quote) && {
            let mut clone = self.chars.clone();
            clone.next();
            clone.next() == Some(quote)
        };
        if triple {
            self.bump();
            self.bump();
        }
        let mut out = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(self.error("unterminated string literal"));
            };
            if c == quote {
                if !triple {
                    return Ok(out);
                }
                if self.peek() == Some(quote) {
                    let mut clone = self.chars.clone();
                    clone.next();
                    if clone.next() == Some(quote) {
                        self.bump();
                        self.bump();
                        return Ok(out);
                    }
                }
                out.push(c);
                continue;
            }
            if c == '\\' && !triple {
                let escaped = self.bump().ok_or_else(|| self.error("unterminated escape"))?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => other,
                });
                continue;
            }
            out.push(c);
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<SpannedToken>, LexError> {
        let mut out = Vec::new();
        loop {
            let (line, col) = (self.line, self.col);
            let Some(c) = self.peek() else {
                out.push(SpannedToken { token: Token::Eof, line, col });
                return Ok(out);
            };
            if c == '\n' {
                self.bump();
                out.push(SpannedToken { token: Token::Terminator(false), line, col });
                continue;
            }
            if c.is_whitespace() {
                self.bump();
                continue;
            }
            if c == '/' {
                let mut clone = self.chars.clone();
                clone.next();
                match clone.next() {
                    Some('/') => {
                        self.skip_line_comment();
                        continue;
                    }
                    Some('*') => {
                        self.bump();
                        self.bump();
                        self.skip_block_comment()?;
                        continue;
                    }
                    _ => {}
                }
            }
            match c {
                ';' => {
                    self.bump();
                    out.push(SpannedToken { token: Token::Terminator(true), line, col });
                }
                ',' => {
                    self.bump();
                    out.push(SpannedToken { token: Token::Comma, line, col });
                }
                '(' => {
                    self.bump();
                    out.push(SpannedToken { token: Token::LParen, line, col });
                }
                ')' => {
                    self.bump();
                    out.push(SpannedToken { token: Token::RParen, line, col });
                }
                '[' => {
                    self.bump();
                    out.push(SpannedToken { token: Token::LBracket, line, col });
                }
                ']' => {
                    self.bump();
                    out.push(SpannedToken { token: Token::RBracket, line, col });
                }
                '{' => {
                    self.bump();
                    out.push(SpannedToken { token: Token::LBrace, line, col });
                }
                '}' => {
                    self.bump();
                    out.push(SpannedToken { token: Token::RBrace, line, col });
                }
                '\'' | '"' => {
                    self.bump();
                    let s = self.read_string(c)?;
                    out.push(SpannedToken { token: Token::Str(s), line, col });
                }
                c if c.is_ascii_digit() => {
                    self.bump();
                    let n = self.read_number(c)?;
                    out.push(SpannedToken { token: Token::Number(n), line, col });
                }
                c if is_ident_start(c) => {
                    let mut text = String::new();
                    text.push(self.bump().unwrap());
                    while let Some(c) = self.peek() {
                        if is_ident_continue(c) {
                            text.push(self.bump().unwrap());
                        } else {
                            break;
                        }
                    }
                    out.push(SpannedToken { token: Token::Ident(text), line, col });
                }
                c if OPERATOR_CHARS.contains(c) => {
                    let mut text = String::new();
                    while let Some(c) = self.peek() {
                        if OPERATOR_CHARS.contains(c) {
                            text.push(self.bump().unwrap());
                        } else {
                            break;
                        }
                    }
                    out.push(SpannedToken { token: Token::Operator(text), line, col });
                }
                other => return Err(self.error(format!("unexpected character {other:?}"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Token> {
        Lexer::new(src, "test").tokenize().unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn tokenizes_message_send_with_args() {
        assert_eq!(
            toks("foo(1, 2)"),
            vec![
                Token::Ident("foo".into()),
                Token::LParen,
                Token::Number(1.0),
                Token::Comma,
                Token::Number(2.0),
                Token::RParen,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn tokenizes_operators_as_one_run() {
        assert_eq!(toks("a == b"), vec![Token::Ident("a".into()), Token::Operator("==".into()), Token::Ident("b".into()), Token::Eof]);
    }

    #[test]
    fn tokenizes_triple_quoted_string() {
        assert_eq!(toks("\"\"\"a\nb\"\"\""), vec![Token::Str("a\nb".into()), Token::Eof]);
    }

    #[test]
    fn newline_outside_brackets_is_terminator() {
        assert_eq!(toks("a\nb"), vec![Token::Ident("a".into()), Token::Terminator(false), Token::Ident("b".into()), Token::Eof]);
    }

    #[test]
    fn semicolon_is_an_explicit_terminator() {
        assert_eq!(toks("a; b"), vec![Token::Ident("a".into()), Token::Terminator(true), Token::Ident("b".into()), Token::Eof]);
    }

    #[test]
    fn hex_literal_parses() {
        assert_eq!(toks("0xFF"), vec![Token::Number(255.0), Token::Eof]);
    }
}
