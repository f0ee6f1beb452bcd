//! The interactive convenience layer (§10 "CLI / REPL boundary").
//!
//! Not part of the core engine: a thin host-side wrapper pairing a `Vm` with
//! `Lobby` as the top-level locals, so slots set by one fragment of source
//! stay visible to the next. `loom-cli`'s line-mode REPL is built on this;
//! `doString`/`doFile`/`doMessage` (the in-language entry points used by
//! scripts themselves) live on `Object` instead, in `builtins.rs`.

use std::sync::Arc;

use crate::error::LoomError;
use crate::eval::eval_chain;
use crate::exception::{ExcType, ExceptionData};
use crate::object::ObjectRef;
use crate::parser::parse;
use crate::stop::Stop;
use crate::vm::Vm;

/// One REPL session: a `Vm` plus a monotonic fragment counter used to label
/// each `execute` call distinctly in stack traces (`repl:1`, `repl:2`, ...).
pub struct ReplSession {
    vm: &'static Vm,
    fragment: u32,
}

impl ReplSession {
    #[must_use]
    pub fn new(vm: &'static Vm) -> Self {
        Self { vm, fragment: 0 }
    }

    #[must_use]
    pub fn vm(&self) -> &'static Vm {
        self.vm
    }

    /// Parses and evaluates one fragment of source against `Lobby`, exactly
    /// as a top-level statement in a script would run. Returns the evaluated
    /// result on `Stop::None`; any other stop -- an uncaught exception, an
    /// `exit`, or a loop/return control-flow value that escaped to the top --
    /// is reported as an error rather than silently discarded, so the caller
    /// can print it (§7) and keep the session alive.
    pub fn execute(&mut self, source: &str) -> Result<ObjectRef, LoomError> {
        self.fragment += 1;
        let label = format!("repl:{}", self.fragment);
        let chain = parse(source, &label, self.vm)?;
        let (result, stop) = eval_chain(self.vm, &chain, &self.vm.lobby);
        match stop {
            Stop::None => Ok(result),
            Stop::Exception(exc) => Err(LoomError::Raise(exception_data(&exc))),
            other => {
                let payload = other.payload().cloned().unwrap_or(result);
                Err(LoomError::Internal(format!("unhandled top-level {}: {}", other.tag_name(), describe(&payload))))
            }
        }
    }
}

/// Parses and evaluates a whole source unit against `Lobby` in one shot --
/// the CLI's `doFile`/inline-`-e` entry point (§10). Unlike
/// [`ReplSession::execute`] this surfaces the raw [`Stop`] instead of folding
/// it into [`LoomError`]: the CLI needs to tell `exit`'s numeric payload
/// apart from an ordinary uncaught exception, which collapsing both into one
/// error type would lose.
pub fn run_source(vm: &'static Vm, source: &str, label: &str) -> Result<(ObjectRef, Stop), crate::parser::ParseError> {
    let chain = parse(source, label, vm)?;
    Ok(eval_chain(vm, &chain, &vm.lobby))
}

/// Recovers the `ExceptionData` out of a `Stop::Exception`'s payload object,
/// falling back to wrapping it as a generic exception if something other than
/// `raise`/`builtins::raise` produced the payload (e.g. a bare value handed
/// straight to `exit`/`raise` from user code without going through the
/// standard constructors).
fn exception_data(exc: &ObjectRef) -> Arc<ExceptionData> {
    exc.with_tag(|t| t.as_exception().cloned()).unwrap_or_else(|| Arc::new(ExceptionData::new(ExcType::Exception, exc.clone())))
}

fn describe(obj: &ObjectRef) -> String {
    obj.with_tag(|t| match t.as_number() {
        Some(n) => n.to_string(),
        None => match t.as_sequence() {
            Some(s) => s.to_string(),
            None => obj.tag_name().to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Symbol;
    use crate::value::Tag;

    #[test]
    fn slots_persist_across_fragments() {
        let vm = Vm::new().leak();
        let mut session = ReplSession::new(vm);
        session.execute("x := 40").unwrap();
        let result = session.execute("x + 2").unwrap();
        assert_eq!(result.with_tag(|t| t.as_number()), Some(42.0));
    }

    #[test]
    fn uncaught_exception_is_reported_not_swallowed() {
        let vm = Vm::new().leak();
        let mut session = ReplSession::new(vm);
        let err = session.execute("thisSlotDoesNotExist").unwrap_err();
        match err {
            LoomError::Raise(data) => assert_eq!(data.exc_type, ExcType::DoesNotRespond),
            other => panic!("expected Raise, got {other}"),
        }
    }

    #[test]
    fn parse_error_is_reported_as_parse() {
        let vm = Vm::new().leak();
        let mut session = ReplSession::new(vm);
        let err = session.execute("foo(").unwrap_err();
        assert!(matches!(err, LoomError::Parse(_)), "{err}");
    }

    #[test]
    fn fragment_labels_increment() {
        let vm = Vm::new().leak();
        let mut session = ReplSession::new(vm);
        vm.lobby.set_slot(Symbol::from("marker"), vm.make(Tag::Number(1.0)));
        session.execute("marker").unwrap();
        session.execute("marker").unwrap();
        assert_eq!(session.fragment, 2);
    }
}
