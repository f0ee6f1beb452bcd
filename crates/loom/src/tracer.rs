//! Execution tracing infrastructure (§1 "a `Tracer` hook trait is provided
//! so a debugger *could* be attached", §10).
//!
//! Provides a trait-based tracing system for the evaluator with zero-cost
//! abstraction. When using [`NoopTracer`], all trace methods compile away
//! entirely -- no external tracing framework (`tracing`/`log`) is pulled in;
//! a debugger or profiler is just another `VmTracer` impl.
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | Zero-cost no-op (default) |
//! | [`StderrTracer`] | Human-readable send/activate/stop log to stderr |
//! | [`ProfilingTracer`] | Per-slot-name send counts and max coroutine count |

use std::sync::Mutex;

use ahash::AHashMap;

use crate::message::MessageCursor;
use crate::object::{ObjectRef, Symbol};
use crate::stop::Stop;

/// Observes evaluator and scheduler events without influencing them. `&self`
/// rather than `&mut self`: coroutines run on independent OS threads (§4.5),
/// so a tracer shared across them must already be internally synchronized if
/// it records anything.
pub trait VmTracer: Send + Sync {
    /// Called before a non-terminator message is looked up on `target`
    /// (§4.2).
    fn on_send(&self, _target: &ObjectRef, _msg: &MessageCursor) {}

    /// Called after the slot resolved by `on_send` has been activated.
    fn on_activate(&self, _receiver: &ObjectRef, _result: &ObjectRef) {}

    /// Called whenever a non-`none` stop is produced (§4.4).
    fn on_stop(&self, _stop: &Stop) {}

    /// Called on coroutine lifecycle transitions (started, paused, resumed,
    /// finished); `event` is a short static label rather than an enum so new
    /// event kinds don't require a trait-breaking change.
    fn on_coroutine_event(&self, _event: &'static str, _coroutine_id: u64) {}
}

/// The default tracer: every hook is the trait's no-op default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// Prints a human-readable send/activate/stop log to stderr. Useful for
/// interactive debugging of a single script.
#[derive(Debug, Default)]
pub struct StderrTracer;

impl VmTracer for StderrTracer {
    fn on_send(&self, target: &ObjectRef, msg: &MessageCursor) {
        eprintln!("send   {:>6} . {}", target.id(), msg.text());
    }

    fn on_activate(&self, receiver: &ObjectRef, result: &ObjectRef) {
        eprintln!("activate   {:>6} -> {:>6} ({})", receiver.id(), result.id(), result.tag_name());
    }

    fn on_stop(&self, stop: &Stop) {
        if !stop.is_none() {
            eprintln!("stop   {}", stop.tag_name());
        }
    }

    fn on_coroutine_event(&self, event: &'static str, coroutine_id: u64) {
        eprintln!("coroutine[{coroutine_id}]   {event}");
    }
}

/// Collects per-slot-name send counts and coroutine churn, for simple "what's
/// hot" profiling without a full sampling profiler.
#[derive(Debug, Default)]
pub struct ProfilingTracer {
    sends: Mutex<AHashMap<Symbol, u64>>,
    coroutine_events: Mutex<u64>,
}

/// A sorted snapshot of a [`ProfilingTracer`]'s counters.
#[derive(Debug)]
pub struct ProfilingReport {
    /// (slot name, send count), sorted most-sent first.
    pub sends: Vec<(Symbol, u64)>,
    pub coroutine_events: u64,
}

impl ProfilingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn report(&self) -> ProfilingReport {
        let mut sends: Vec<_> =
            self.sends.lock().unwrap_or_else(std::sync::PoisonError::into_inner).iter().map(|(k, v)| (k.clone(), *v)).collect();
        sends.sort_by(|a, b| b.1.cmp(&a.1));
        ProfilingReport { sends, coroutine_events: *self.coroutine_events.lock().unwrap_or_else(std::sync::PoisonError::into_inner) }
    }
}

impl VmTracer for ProfilingTracer {
    fn on_send(&self, _target: &ObjectRef, msg: &MessageCursor) {
        *self.sends.lock().unwrap_or_else(std::sync::PoisonError::into_inner).entry(msg.text().clone()).or_insert(0) += 1;
    }

    fn on_coroutine_event(&self, _event: &'static str, _coroutine_id: u64) {
        *self.coroutine_events.lock().unwrap_or_else(std::sync::PoisonError::into_inner) += 1;
    }
}

impl std::fmt::Display for ProfilingReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== send counts ===")?;
        for (name, count) in &self.sends {
            writeln!(f, "  {name:<24} {count:>10}")?;
        }
        writeln!(f, "coroutine events: {}", self.coroutine_events)
    }
}
