//! The cross-coroutine control-flow channel (§3 "Stop value", §4.4).
//!
//! Every evaluation step returns a `Stop` alongside its result. `Stop::None` means
//! "continue normally"; every other variant carries the payload object that
//! travels with it (the loop's break value, the raised exception, the process
//! exit code, ...). Modeling each variant with its own payload -- instead of a
//! `(StatusTag, Object)` pair the way the distilled spec frames it -- lets the
//! compiler check that every site handling a `Break` also has its value in hand,
//! with no `unwrap` on an `Option` that "should" be populated for that tag.

use crate::object::ObjectRef;

/// The outcome of evaluating one message or message chain.
#[derive(Debug, Clone)]
pub enum Stop {
    /// Evaluation completed normally; nothing to unwind.
    None,
    /// `continue` was sent: unwind to the nearest loop, carrying this value as
    /// the loop's prospective result.
    Continue(ObjectRef),
    /// `break` was sent: unwind to the nearest loop and end it with this value.
    Break(ObjectRef),
    /// `return` was sent: unwind to the nearest method activation.
    Return(ObjectRef),
    /// An exception was raised; the payload is the exception object.
    Exception(ObjectRef),
    /// `exit` was sent: unwind all the way out, terminating the coroutine (and,
    /// if it is the main coroutine, the process). Payload is the exit object
    /// (an exception-shaped object or a Number holding the process exit code).
    Exit(ObjectRef),
    /// Scheduler-internal: the coroutine should pause itself at the next poll.
    /// Never observed by user code; consumed by the coroutine's run loop.
    Pause,
    /// Scheduler-internal: wakes a paused coroutine. See §4.5 "A resume
    /// delivered before a pause causes a simple yield."
    Resume,
}

impl Stop {
    /// True for `Stop::None` -- the only status that means "keep going."
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// True for the statuses a loop body intercepts (`Continue`/`Break`).
    #[must_use]
    pub fn is_loop_local(&self) -> bool {
        matches!(self, Self::Continue(_) | Self::Break(_))
    }

    /// True for the statuses a scheduler control channel carries internally.
    #[must_use]
    pub fn is_scheduler_internal(&self) -> bool {
        matches!(self, Self::Pause | Self::Resume)
    }

    /// The payload object, if this status carries one.
    #[must_use]
    pub fn payload(&self) -> Option<&ObjectRef> {
        match self {
            Self::None | Self::Pause | Self::Resume => None,
            Self::Continue(v) | Self::Break(v) | Self::Return(v) | Self::Exception(v) | Self::Exit(v) => Some(v),
        }
    }

    /// Consumes `self`, returning the payload or `fallback` if there was none.
    #[must_use]
    pub fn into_payload_or(self, fallback: ObjectRef) -> ObjectRef {
        match self {
            Self::None | Self::Pause | Self::Resume => fallback,
            Self::Continue(v) | Self::Break(v) | Self::Return(v) | Self::Exception(v) | Self::Exit(v) => v,
        }
    }

    /// A short tag name, used in diagnostics and by the `Call` reflective record.
    #[must_use]
    pub fn tag_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Continue(_) => "continue",
            Self::Break(_) => "break",
            Self::Return(_) => "return",
            Self::Exception(_) => "exception",
            Self::Exit(_) => "exit",
            Self::Pause => "pause",
            Self::Resume => "resume",
        }
    }
}

/// Resolves the tie-break rule of §4.4: "when an outer expression raises control
/// flow while evaluating a control-flow primitive's own argument, the first
/// non-`none` stop wins."
///
/// `outer` is the stop already in hand (e.g. from evaluating a prior argument);
/// `inner` is the stop just produced. If `outer` is already non-`None` it wins,
/// otherwise `inner` does.
#[must_use]
pub fn first_non_none(outer: Stop, inner: Stop) -> Stop {
    if outer.is_none() { inner } else { outer }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::Vm;

    #[test]
    fn tie_break_prefers_first_non_none() {
        let vm = Vm::new();
        let a = Stop::Break(vm.nil.clone());
        let b = Stop::Continue(vm.nil.clone());
        match first_non_none(a, b) {
            Stop::Break(_) => {}
            other => panic!("expected Break to win, got {other:?}"),
        }
        let a = Stop::None;
        let b = Stop::Continue(vm.nil.clone());
        match first_non_none(a, b) {
            Stop::Continue(_) => {}
            other => panic!("expected Continue to win, got {other:?}"),
        }
    }
}
