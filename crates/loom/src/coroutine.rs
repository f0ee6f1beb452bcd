//! Coroutines and their per-coroutine control channel (§3 "Coroutine", §4.5).
//!
//! Each coroutine owns a [`ControlChannel`] that *other* coroutines use to
//! inject remote stops (`pause`, `resume`, or a synthetic `return`/`exception`/
//! `exit`). The running coroutine drains it non-blockingly at every
//! inter-message poll (§4.4) and blocks on it (via the channel's condvar)
//! while paused or waiting. Per the concurrency model locked in by §4.5's
//! Design decision, a coroutine is a real `std::thread`, so "the running
//! coroutine polls its channel" is literally that thread calling
//! [`CoroutineState::poll_remote_stop`].

use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex},
};

use crate::identity::ObjectId;
use crate::stop::Stop;

/// A coroutine's lifecycle (§3: "created → started → running → (paused ⇄
/// resumed) → finished").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroutineStatus {
    Created,
    Running,
    Paused,
    Finished,
}

/// A queue of remote stops plus the condvar other coroutines wait on. Only
/// the scheduler's `pause`/`wait` logic and [`CoroutineState`] touch this
/// directly; everything else goes through the coroutine handle.
struct ControlChannel {
    queue: Mutex<VecDeque<Stop>>,
    arrived: Condvar,
}

impl ControlChannel {
    fn new() -> Self {
        Self { queue: Mutex::new(VecDeque::new()), arrived: Condvar::new() }
    }

    fn send(&self, stop: Stop) {
        let mut q = self.queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        q.push_back(stop);
        self.arrived.notify_all();
    }

    /// Non-blocking poll, used at the §4.4 inter-message boundary.
    fn try_recv(&self) -> Option<Stop> {
        self.queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner).pop_front()
    }

    /// Blocks the calling thread until a stop arrives. Used by `pause` to
    /// sleep the OS thread rather than spin.
    fn recv_blocking(&self) -> Stop {
        let mut q = self.queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        loop {
            if let Some(stop) = q.pop_front() {
                return stop;
            }
            q = self.arrived.wait(q).unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }
}

/// The language-visible Coroutine payload.
pub struct CoroutineState {
    id: ObjectId,
    status: Mutex<CoroutineStatus>,
    control: ControlChannel,
}

/// A shared handle to a coroutine -- what `Tag::Coroutine` and `CallRecord`
/// actually hold.
pub type CoroutineHandle = Arc<CoroutineState>;

impl CoroutineState {
    #[must_use]
    pub fn new(id: ObjectId) -> CoroutineHandle {
        Arc::new(Self { id, status: Mutex::new(CoroutineStatus::Created), control: ControlChannel::new() })
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub fn status(&self) -> CoroutineStatus {
        *self.status.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn set_status(&self, status: CoroutineStatus) {
        *self.status.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = status;
    }

    /// "Alive" for scheduler quiescence accounting (§4.5): started and not
    /// paused, not finished.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        matches!(self.status(), CoroutineStatus::Created | CoroutineStatus::Running)
    }

    /// Injects a remote stop for the running thread to observe at its next
    /// poll. Used by `pause`, `resume`, and cross-coroutine cancellation
    /// (`return`/`exit` delivered remotely, §4.5).
    pub fn send_remote_stop(&self, stop: Stop) {
        self.control.send(stop);
    }

    /// The §4.4 non-blocking poll performed after every non-terminator
    /// message evaluates.
    #[must_use]
    pub fn poll_remote_stop(&self) -> Option<Stop> {
        self.control.try_recv()
    }

    /// Blocks this coroutine's thread until a remote stop arrives, then marks
    /// the coroutine paused for the duration. Used by the `pause` primitive;
    /// per §4.5 "a resume delivered before a pause causes a simple yield" --
    /// callers must check for an already-queued `Resume` via
    /// `poll_remote_stop` before calling this, so that race is handled by the
    /// caller rather than by blocking here regardless.
    pub fn block_until_remote_stop(&self) -> Stop {
        self.set_status(CoroutineStatus::Paused);
        let stop = self.control.recv_blocking();
        self.set_status(CoroutineStatus::Running);
        stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_coroutine_starts_created_and_alive_is_false() {
        let co = CoroutineState::new(ObjectId::next());
        assert_eq!(co.status(), CoroutineStatus::Created);
        assert!(co.is_alive());
    }

    #[test]
    fn remote_stop_is_observed_on_poll() {
        let co = CoroutineState::new(ObjectId::next());
        assert!(co.poll_remote_stop().is_none());
        co.send_remote_stop(Stop::Pause);
        assert!(matches!(co.poll_remote_stop(), Some(Stop::Pause)));
        assert!(co.poll_remote_stop().is_none());
    }

    #[test]
    fn pause_then_resume_unblocks() {
        let co = CoroutineState::new(ObjectId::next());
        co.send_remote_stop(Stop::Resume);
        let stop = co.block_until_remote_stop();
        assert!(matches!(stop, Stop::Resume));
        assert_eq!(co.status(), CoroutineStatus::Running);
    }
}
