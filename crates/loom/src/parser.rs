//! Recursive-descent message-chain builder (§1 "a recursive-descent
//! message-chain builder", §6 "Source language").
//!
//! Produces a *flat* node sequence (operators included as plain nodes) which
//! `shuffle::shuffle` then renests by precedence -- the two passes together
//! implement §4.2/§6's "operator shuffling" over this crate's message
//! representation instead of over raw tokens.
//!
//! Method/block literals need no bracket syntax of their own: `method(x, x +
//! 1)` already carries its body as an *unevaluated* argument message chain
//! (§3's `args` are never evaluated by the parser), so the `method`/`block`
//! builtins (`builtins.rs`) just read `argAt(len-1)` as the body and the
//! earlier args' node text as parameter names.

use std::sync::Arc;

use crate::lexer::{LexError, Lexer, SpannedToken, Token};
use crate::message::{MessageChain, MessageNode};
use crate::shuffle::{shuffle, OperatorTable};
use crate::vm::Vm;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub col: u32,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.col, self.message)
    }
}

impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        Self { message: e.message, line: e.line, col: e.col }
    }
}

/// Parses a whole source unit into a finished, shuffled message chain.
pub fn parse(source: &str, label: &str, vm: &Vm) -> Result<MessageChain, ParseError> {
    let tokens = Lexer::new(source, label).tokenize()?;
    let mut parser = Parser { tokens, pos: 0, label: Arc::from(label), vm, table: &vm.operators };
    let flat = parser.parse_flat_until(&[])?;
    parser.expect_eof()?;
    if flat.is_empty() {
        // An empty program is a single no-op terminator (§1).
        return Ok(Arc::from(vec![MessageNode {
            text: Arc::from(";"),
            memo: None,
            args: vec![],
            label: parser.label,
            line: 1,
            col: 1,
        }]));
    }
    Ok(shuffle(&flat, parser.table))
}

struct Parser<'a> {
    tokens: Vec<SpannedToken>,
    pos: usize,
    label: Arc<str>,
    vm: &'a Vm,
    table: &'a OperatorTable,
}

/// What a nested `parse_flat_until` call should stop before consuming.
#[derive(Clone, Copy, PartialEq)]
enum Stop {
    Comma,
    RParen,
    RBracket,
    RBrace,
}

impl Stop {
    fn matches(self, token: &Token) -> bool {
        matches!(
            (self, token),
            (Self::Comma, Token::Comma) | (Self::RParen, Token::RParen) | (Self::RBracket, Token::RBracket) | (Self::RBrace, Token::RBrace)
        )
    }
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn peek_spanned(&self) -> &SpannedToken {
        &self.tokens[self.pos]
    }

    fn bump(&mut self) -> SpannedToken {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let t = self.peek_spanned();
        ParseError { message: message.into(), line: t.line, col: t.col }
    }

    fn expect_eof(&self) -> Result<(), ParseError> {
        if matches!(self.peek(), Token::Eof) {
            Ok(())
        } else {
            Err(self.error(format!("unexpected token {:?}", self.peek())))
        }
    }

    /// Whether the *bracket-nesting* contexts (parenthesized/bracketed
    /// argument lists) suppress newline-as-terminator. Top-level source and
    /// the bodies captured as raw message arguments to `method`/`block` are
    /// everything *outside* an actively-open bracket, which is exactly what
    /// `suppress` being false at the top call models; nested calls always
    /// pass `true` since they are, by construction, inside a bracket. An
    /// explicit `;` is never suppressed -- it separates statements even
    /// inside a bracketed argument list (only a bare newline is absorbed as
    /// whitespace there).
    fn parse_flat_until(&mut self, stops: &[Stop]) -> Result<Vec<MessageNode>, ParseError> {
        let suppress_newlines = !stops.is_empty();
        let mut out = Vec::new();
        loop {
            if matches!(self.peek(), Token::Eof) {
                break;
            }
            if stops.iter().any(|s| s.matches(self.peek())) {
                break;
            }
            match self.peek().clone() {
                Token::Terminator(explicit) => {
                    let t = self.bump();
                    if explicit || !suppress_newlines {
                        out.push(MessageNode { text: Arc::from(";"), memo: None, args: vec![], label: self.label.clone(), line: t.line, col: t.col });
                    }
                }
                Token::Ident(name) => {
                    let t = self.bump();
                    let args = self.maybe_parse_paren_args()?;
                    out.push(MessageNode { text: Arc::from(name), memo: None, args, label: self.label.clone(), line: t.line, col: t.col });
                }
                Token::Operator(op) => {
                    let t = self.bump();
                    out.push(MessageNode { text: Arc::from(op), memo: None, args: vec![], label: self.label.clone(), line: t.line, col: t.col });
                }
                Token::Number(n) => {
                    let t = self.bump();
                    let memo = Some(self.vm.make(crate::value::Tag::Number(n)));
                    out.push(MessageNode { text: Arc::from(n.to_string()), memo, args: vec![], label: self.label.clone(), line: t.line, col: t.col });
                }
                Token::Str(s) => {
                    let t = self.bump();
                    let memo = Some(self.vm.make(crate::value::Tag::Sequence(s.clone())));
                    out.push(MessageNode { text: Arc::from(s), memo, args: vec![], label: self.label.clone(), line: t.line, col: t.col });
                }
                Token::LParen => {
                    let t = self.bump();
                    let args = self.parse_comma_args(Stop::RParen)?;
                    self.expect(&Token::RParen)?;
                    out.push(MessageNode { text: Arc::from(""), memo: None, args, label: self.label.clone(), line: t.line, col: t.col });
                }
                Token::LBracket => {
                    let t = self.bump();
                    let args = self.parse_comma_args(Stop::RBracket)?;
                    self.expect(&Token::RBracket)?;
                    out.push(MessageNode { text: Arc::from("squareBrackets"), memo: None, args, label: self.label.clone(), line: t.line, col: t.col });
                }
                Token::LBrace => {
                    let t = self.bump();
                    let args = self.parse_comma_args(Stop::RBrace)?;
                    self.expect(&Token::RBrace)?;
                    out.push(MessageNode { text: Arc::from("curlyBrackets"), memo: None, args, label: self.label.clone(), line: t.line, col: t.col });
                }
                other => return Err(self.error(format!("unexpected token {other:?}"))),
            }
        }
        Ok(out)
    }

    /// `foo(a, b)` -- an identifier immediately followed by `(` supplies its
    /// own argument list (§6). No following `(` means no arguments.
    fn maybe_parse_paren_args(&mut self) -> Result<Vec<MessageChain>, ParseError> {
        if matches!(self.peek(), Token::LParen) {
            self.bump();
            let args = self.parse_comma_args(Stop::RParen)?;
            self.expect(&Token::RParen)?;
            Ok(args)
        } else {
            Ok(vec![])
        }
    }

    fn parse_comma_args(&mut self, closing: Stop) -> Result<Vec<MessageChain>, ParseError> {
        let mut args = Vec::new();
        if closing.matches(self.peek()) {
            return Ok(args);
        }
        loop {
            let flat = self.parse_flat_until(&[Stop::Comma, closing])?;
            args.push(shuffle(&flat, self.table));
            if matches!(self.peek(), Token::Comma) {
                self.bump();
                continue;
            }
            break;
        }
        Ok(args)
    }

    fn expect(&mut self, token: &Token) -> Result<(), ParseError> {
        if self.peek() == token {
            self.bump();
            Ok(())
        } else {
            Err(self.error(format!("expected {token:?}, found {:?}", self.peek())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_send_chain() {
        let vm = Vm::new();
        let chain = parse("a foo bar", "test", &vm).unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(&*chain[0].text, "a");
        assert_eq!(&*chain[1].text, "foo");
        assert_eq!(&*chain[2].text, "bar");
    }

    #[test]
    fn parses_call_with_args() {
        let vm = Vm::new();
        let chain = parse("foo(1, 2)", "test", &vm).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].args.len(), 2);
        assert_eq!(chain[0].args[0][0].memo.as_ref().unwrap().with_tag(|t| t.as_number()), Some(1.0));
    }

    #[test]
    fn method_body_is_unevaluated_argument() {
        let vm = Vm::new();
        let chain = parse("method(x, x + 1)", "test", &vm).unwrap();
        let args = &chain[0].args;
        assert_eq!(args.len(), 2);
        assert_eq!(&*args[0][0].text, "x");
        assert_eq!(&*args[1][0].text, "x");
        assert_eq!(&*args[1][1].text, "+");
    }

    #[test]
    fn terminators_split_top_level_statements() {
        let vm = Vm::new();
        let chain = parse("a := 1\nb := 2", "test", &vm).unwrap();
        assert!(chain.iter().any(crate::message::MessageNode::is_terminator));
    }

    #[test]
    fn newline_inside_parens_is_not_a_terminator() {
        let vm = Vm::new();
        let chain = parse("foo(1,\n2)", "test", &vm).unwrap();
        assert_eq!(chain[0].args.len(), 2);
    }

    #[test]
    fn square_brackets_sugar_to_identifier_call() {
        let vm = Vm::new();
        let chain = parse("[1, 2, 3]", "test", &vm).unwrap();
        assert_eq!(&*chain[0].text, "squareBrackets");
        assert_eq!(chain[0].args.len(), 3);
    }
}
