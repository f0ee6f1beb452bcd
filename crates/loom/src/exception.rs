//! Exception payloads and the error taxonomy of §7.
//!
//! `ExcType` names *why* an exception was raised, for callers that want to
//! branch on category (the REPL's uncaught-exception printer, `catch`-style
//! user code matching on `exception type`). The exception object itself
//! (`ExceptionData`) is the thing that actually travels as a `Stop::Exception`
//! payload.

use std::sync::Arc;

use strum::{Display, EnumString, IntoStaticStr};

use crate::object::{ObjectRef, Symbol};

/// The error taxonomy of §7. `strum`'s `Display`/`EnumString` give this a
/// stable textual form for `exception type asString` and for tests, the same
/// way the grounding crate's `ExcType` does for its own exception kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
pub enum ExcType {
    /// A user- or primitive-raised condition with no more specific category.
    Exception,
    /// Raised by the evaluator when neither the slot nor `forward` resolves.
    DoesNotRespond,
    /// Raised by a typed CFunction whose receiver has the wrong tag.
    TypeMismatch,
    /// Wrong arity or type of argument to a primitive.
    Argument,
    /// An error from the external world (file, system, env).
    Io,
}

/// One frame of the stack recorded at raise time (§7 "a stack of message
/// locations").
#[derive(Debug, Clone)]
pub struct StackFrame {
    pub label: Arc<str>,
    pub line: u32,
    pub col: u32,
    /// The slot name being sent when this frame raised or propagated.
    pub message_name: Symbol,
}

/// The payload carried by `Stop::Exception` (§3 "exception").
pub struct ExceptionData {
    pub exc_type: ExcType,
    /// The `error` value -- conventionally a Sequence describing the failure,
    /// but any object is accepted since user code can raise arbitrary values.
    pub error: ObjectRef,
    pub stack: Vec<StackFrame>,
}

impl ExceptionData {
    #[must_use]
    pub fn new(exc_type: ExcType, error: ObjectRef) -> Self {
        Self { exc_type, error, stack: Vec::new() }
    }

    /// Appends a frame as the exception unwinds through each evaluator
    /// boundary, so the REPL can print a full trace (§7).
    pub fn push_frame(&mut self, frame: StackFrame) {
        self.stack.push(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exc_type_displays_as_camel_case() {
        assert_eq!(ExcType::DoesNotRespond.to_string(), "doesNotRespond");
        assert_eq!(ExcType::TypeMismatch.to_string(), "typeMismatch");
    }

    #[test]
    fn exc_type_round_trips_through_str() {
        use std::str::FromStr;
        assert_eq!(ExcType::from_str("io").unwrap(), ExcType::Io);
    }
}
