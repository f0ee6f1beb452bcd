//! Futures (§3 "Future", §4.6).
//!
//! A future starts unfilled and transitions to filled exactly once. The fill
//! flag is a `compare_exchange` rather than a plain `Mutex<bool>` so the
//! "at most one coroutine may fill a future" invariant of §4.6 is enforced at
//! the atomic itself: a second `fill` call observes the CAS fail and can
//! report the double-fill as a programming error instead of silently
//! overwriting the result.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

use crate::coroutine::CoroutineHandle;
use crate::object::ObjectRef;

/// The payload behind `Tag::Future`.
pub struct FutureState {
    filled: AtomicBool,
    result: Mutex<Option<ObjectRef>>,
    /// The coroutine whose completion fills this future; `forward` registers
    /// the waiting coroutine with the scheduler against this handle (§4.6).
    producer: CoroutineHandle,
}

impl FutureState {
    #[must_use]
    pub fn new(producer: CoroutineHandle) -> Self {
        Self { filled: AtomicBool::new(false), result: Mutex::new(None), producer }
    }

    #[must_use]
    pub fn producer(&self) -> &CoroutineHandle {
        &self.producer
    }

    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.filled.load(Ordering::Acquire)
    }

    /// Fills the future exactly once. Returns `false` if it was already
    /// filled -- per §4.6 "subsequent writes are a programming error", which
    /// callers surface as an exception rather than a panic.
    pub fn fill(&self, value: ObjectRef) -> bool {
        if self.filled.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return false;
        }
        *self.result.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(value);
        true
    }

    /// The filled result, or `None` if still pending. Callers poll this
    /// between remote-stop checks exactly as §4.6 describes, rather than
    /// blocking on a condvar, so a pending future remains cancellable via a
    /// remote stop.
    #[must_use]
    pub fn result(&self) -> Option<ObjectRef> {
        self.result.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ObjectId;

    #[test]
    fn fill_then_result_round_trips() {
        let producer = crate::coroutine::CoroutineState::new(ObjectId::next());
        let fut = FutureState::new(producer);
        assert!(!fut.is_filled());
        assert!(fut.result().is_none());

        let value = crate::object::Object::plain([]);
        assert!(fut.fill(value.clone()));
        assert!(fut.is_filled());
        assert_eq!(fut.result().unwrap().id(), value.id());
    }

    #[test]
    fn second_fill_is_rejected() {
        let producer = crate::coroutine::CoroutineState::new(ObjectId::next());
        let fut = FutureState::new(producer);
        assert!(fut.fill(crate::object::Object::plain([])));
        assert!(!fut.fill(crate::object::Object::plain([])));
    }
}
