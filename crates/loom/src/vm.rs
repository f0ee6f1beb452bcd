//! The interpreter instance and its scheduler (§3 "Scheduler", §4.5, §6 "Core
//! objects").
//!
//! `Vm` owns every singleton the engine needs for its whole lifetime: the
//! canonical `nil`/`true`/`false` objects, the `Lobby`/`Core`/`Addons` proto
//! graph, the operator-precedence table the shuffler consults, and the
//! scheduler coordinating coroutines. One `Vm` is one interpreter instance;
//! nothing here is global mutable state, so embedding more than one `Vm` in a
//! process (e.g. in tests) is safe.

use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex},
};

use ahash::AHashMap;

use crate::coroutine::{CoroutineHandle, CoroutineState};
use crate::identity::ObjectId;
use crate::object::{Object, ObjectRef, Symbol};
use crate::shuffle::OperatorTable;
use crate::tracer::{NoopTracer, VmTracer};
use crate::value::Tag;

/// Tracks every started-but-not-finished coroutine (§4.5). A `Mutex` +
/// `Condvar` pair, exactly per the §4.5 Design decision, rather than an async
/// reactor: `wait_for_quiescence` blocks the calling OS thread until the
/// alive count reaches zero.
pub struct Scheduler {
    alive: Mutex<Vec<CoroutineHandle>>,
    quiescent: Condvar,
    /// Coroutines parked waiting on another coroutine's future/completion
    /// (`await`, §4.5). Keyed by the producer being awaited.
    waiters: Mutex<AHashMap<ObjectId, Vec<CoroutineHandle>>>,
}

impl Scheduler {
    #[must_use]
    fn new() -> Arc<Self> {
        Arc::new(Self { alive: Mutex::new(Vec::new()), quiescent: Condvar::new(), waiters: Mutex::new(AHashMap::default()) })
    }

    /// Registers a newly created coroutine as started.
    pub fn start(&self, coro: &CoroutineHandle) {
        coro.set_status(crate::coroutine::CoroutineStatus::Running);
        self.alive.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(coro.clone());
    }

    /// Unregisters a coroutine and wakes anyone blocked on quiescence.
    pub fn finish(&self, coro: &CoroutineHandle) {
        coro.set_status(crate::coroutine::CoroutineStatus::Finished);
        let mut alive = self.alive.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        alive.retain(|c| c.id() != coro.id());
        if alive.iter().all(|c| !c.is_alive()) {
            self.quiescent.notify_all();
        }
    }

    /// Count of non-paused, non-finished coroutines (§4.5 `aliveCount`).
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.alive.lock().unwrap_or_else(std::sync::PoisonError::into_inner).iter().filter(|c| c.is_alive()).count()
    }

    /// Records that `waiter` is waiting for `target` to complete (§4.5
    /// `await`). Used by Future's `forward`/`waitOnResult` to register before
    /// polling.
    pub fn register_waiter(&self, target: ObjectId, waiter: CoroutineHandle) {
        self.waiters.lock().unwrap_or_else(std::sync::PoisonError::into_inner).entry(target).or_default().push(waiter);
    }

    /// Blocks the calling thread until `alive_count` reaches zero. Used by the
    /// CLI boundary to wait for background coroutines before exiting.
    pub fn wait_for_quiescence(&self) {
        let alive = self.alive.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let _guard = self
            .quiescent
            .wait_while(alive, |alive| alive.iter().any(crate::coroutine::CoroutineState::is_alive))
            .unwrap_or_else(std::sync::PoisonError::into_inner);
    }
}

thread_local! {
    /// The coroutine the current OS thread is executing as. Set once at
    /// thread spawn by whichever code starts a coroutine's thread (the VM
    /// bootstrap for the main coroutine, `asyncSend`/`futureSend` for spawned
    /// ones) and read by the evaluator's inter-message poll (§4.4).
    static CURRENT_COROUTINE: std::cell::RefCell<Option<CoroutineHandle>> = const { std::cell::RefCell::new(None) };
}

/// Binds `coro` as the current thread's coroutine for the duration of `f`.
pub fn with_current_coroutine<R>(coro: CoroutineHandle, f: impl FnOnce() -> R) -> R {
    CURRENT_COROUTINE.with(|cell| *cell.borrow_mut() = Some(coro));
    let result = f();
    CURRENT_COROUTINE.with(|cell| *cell.borrow_mut() = None);
    result
}

/// The running thread's coroutine, if one has been bound.
#[must_use]
pub fn current_coroutine() -> Option<CoroutineHandle> {
    CURRENT_COROUTINE.with(|cell| cell.borrow().clone())
}

/// Non-blocking poll of the current coroutine's control channel (§4.4). A
/// thread with no bound coroutine (shouldn't happen once `Vm::run` is
/// entered, but defensively) never has a pending remote stop.
#[must_use]
pub fn poll_current_remote_stop() -> Option<crate::stop::Stop> {
    current_coroutine().and_then(|c| c.poll_remote_stop())
}

/// One interpreter instance: the object-graph singletons, operator table,
/// tracer, and scheduler (§6 "Core objects").
pub struct Vm {
    pub lobby: ObjectRef,
    pub core: ObjectRef,
    pub addons: ObjectRef,
    pub base_object: ObjectRef,
    pub nil: ObjectRef,
    pub true_obj: ObjectRef,
    pub false_obj: ObjectRef,
    pub operators: OperatorTable,
    pub scheduler: Arc<Scheduler>,
    pub tracer: Arc<dyn VmTracer>,
    pub main_coroutine: CoroutineHandle,
}

impl Vm {
    /// Bootstraps a fresh interpreter: allocates the singletons and wires the
    /// proto graph described in §6 ("Lobby → (generic object with Core and
    /// Addons as protos) → Core → base-object → Lobby (closed)"), then
    /// installs the Object protocol library (§4.7) via `crate::builtins`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tracer(Arc::new(NoopTracer))
    }

    #[must_use]
    pub fn with_tracer(tracer: Arc<dyn VmTracer>) -> Self {
        let base_object = Object::plain([]);
        let core = Object::plain([base_object.clone()]);
        let addons = Object::plain([base_object.clone()]);
        let protos = Object::plain([core.clone(), addons.clone()]);
        let lobby = Object::plain([protos]);
        // Closes the cycle per §6; get_slot/is_kind_of both dedupe by
        // identity so this terminates.
        base_object.append_proto(lobby.clone());

        let nil = Object::plain([base_object.clone()]);
        let true_obj = Object::plain([base_object.clone()]);
        let false_obj = Object::plain([base_object.clone()]);

        lobby.set_slot(Symbol::from("Lobby"), lobby.clone());
        lobby.set_slot(Symbol::from("Core"), core.clone());
        lobby.set_slot(Symbol::from("Addons"), addons.clone());
        lobby.set_slot(Symbol::from("Object"), base_object.clone());
        lobby.set_slot(Symbol::from("nil"), nil.clone());
        lobby.set_slot(Symbol::from("true"), true_obj.clone());
        lobby.set_slot(Symbol::from("false"), false_obj.clone());

        let main_coroutine = CoroutineState::new(ObjectId::next());
        let scheduler = Scheduler::new();
        scheduler.start(&main_coroutine);

        let vm = Self {
            lobby,
            core,
            addons,
            base_object,
            nil,
            true_obj,
            false_obj,
            operators: OperatorTable::standard(),
            scheduler,
            tracer,
            main_coroutine,
        };
        crate::builtins::install(&vm);
        vm
    }

    /// Builds the Number/Sequence/List/Map/Block/... proto objects under
    /// `Core` and wires them as the default proto for newly tagged objects of
    /// each kind (used by `builtins::install` and by literal evaluation in
    /// `eval.rs`).
    #[must_use]
    pub fn proto_for_tag(&self, tag: &Tag) -> ObjectRef {
        let name = tag.name();
        self.core.get_local_slot(name).unwrap_or_else(|| self.base_object.clone())
    }

    /// Wraps a raw `Tag` as a fresh object with the right default proto,
    /// e.g. for a CFunction's return value (`vm.make(Tag::Number(1.0))`).
    #[must_use]
    pub fn make(&self, tag: Tag) -> ObjectRef {
        let proto = self.proto_for_tag(&tag);
        Object::new(tag, [proto])
    }

    #[must_use]
    pub fn bool_obj(&self, value: bool) -> ObjectRef {
        if value { self.true_obj.clone() } else { self.false_obj.clone() }
    }

    /// Promotes this instance to `'static` (§3: "the interpreter instance is
    /// retained for its lifetime"). The standard embedding entry point: every
    /// CFunction and coroutine thread needs a `&'static Vm` so `asyncSend`/
    /// `futureSend` can hand it to a freshly spawned `std::thread` without
    /// unsafe code. A `Vm` is never torn down mid-process, so leaking it here
    /// rather than threading a lifetime parameter through the whole evaluator
    /// is the idiomatic trade.
    #[must_use]
    pub fn leak(self) -> &'static Self {
        Box::leak(Box::new(self))
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_wires_expected_singletons() {
        let vm = Vm::new();
        assert!(vm.lobby.get_local_slot("Core").is_some());
        assert!(crate::object::is_kind_of(&vm.lobby, &vm.base_object));
        assert!(crate::object::is_kind_of(&vm.core, &vm.base_object));
    }

    #[test]
    fn make_wraps_tag_with_default_proto() {
        let vm = Vm::new();
        let n = vm.make(Tag::Number(3.0));
        assert_eq!(n.tag_name(), "Number");
    }
}
