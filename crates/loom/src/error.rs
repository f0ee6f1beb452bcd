//! The top-level error type (§7 "Error handling design", §10).
//!
//! Mirrors the grounding crate's `ReplError`: stage-separated variants
//! instead of one opaque string, so callers (the CLI, tests) can match on
//! failure category without inspecting text.

use std::fmt;
use std::sync::Arc;

use crate::exception::ExceptionData;
use crate::parser::ParseError;

/// A top-level failure: either the source never parsed, or it parsed and ran
/// but raised an uncaught exception, or the interpreter hit its own bug.
#[derive(Debug, Clone)]
pub enum LoomError {
    /// Lexing or parsing failed before any evaluation occurred.
    Parse(ParseError),
    /// An uncaught exception reached the top frame of a coroutine (§7:
    /// "terminates that coroutine; if it reaches the main coroutine,
    /// terminates the interpreter with a diagnostic").
    Raise(Arc<ExceptionData>),
    /// A condition the interpreter itself should never produce (a broken
    /// invariant), as opposed to a language-level exception.
    Internal(String),
}

impl fmt::Display for LoomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "parse error: {e}"),
            Self::Raise(exc) => {
                write!(f, "uncaught exception ({}): {}", exc.exc_type, exc.error.with_tag(|t| t.as_sequence().unwrap_or("?").to_string()))?;
                for frame in exc.stack.iter().rev() {
                    write!(f, "\n  at {} ({}:{}:{})", frame.message_name, frame.label, frame.line, frame.col)?;
                }
                Ok(())
            }
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for LoomError {}

impl From<ParseError> for LoomError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl From<Arc<ExceptionData>> for LoomError {
    fn from(e: Arc<ExceptionData>) -> Self {
        Self::Raise(e)
    }
}
