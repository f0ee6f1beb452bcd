//! Tagged payloads (§3 "tag"/"value", §4.3, §4.7).
//!
//! A plain object has `Tag::None` and activates to itself. Every other
//! variant pairs a payload with the activation/clone-value discipline the
//! evaluator (`eval.rs`) and activation protocol (`activation.rs`) dispatch
//! on by matching the tag, not by downcasting a trait object -- there is a
//! small, closed set of payload kinds (§1 deliberately limits the primitive
//! library), so a sum type is the idiomatic fit, the same way the grounding
//! crate's bytecode `Value` is a closed enum rather than `dyn Any`.

use std::sync::Arc;

use ahash::AHashMap;

use crate::coroutine::CoroutineHandle;
use crate::exception::ExceptionData;
use crate::future::FutureState;
use crate::message::{MessageChain, MessageCursor};
use crate::object::{ObjectRef, Symbol};
use crate::stop::Stop;
use crate::vm::Vm;

/// The type-specific payload of an object, and the discriminator used for
/// `tagName`/typed-CFunction checks (§4.3).
pub enum Tag {
    /// Plain object: no payload, default activation and clone rules.
    None,
    Number(f64),
    /// UTF-8 text. Named `Sequence` per §1/§3 even though only the string
    /// case is implemented (the richer byte-sequence library is out of
    /// scope).
    Sequence(String),
    List(Vec<ObjectRef>),
    Map(AHashMap<Symbol, ObjectRef>),
    Block(Arc<Block>),
    /// The payload backing `thisMessage`/`Call message` when a message chain
    /// itself is held as a first-class value.
    Message(MessageChain),
    Call(Arc<CallRecord>),
    Coroutine(CoroutineHandle),
    Future(Arc<FutureState>),
    Exception(Arc<ExceptionData>),
    CFunction(CFunction),
}

impl Tag {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "Object",
            Self::Number(_) => "Number",
            Self::Sequence(_) => "Sequence",
            Self::List(_) => "List",
            Self::Map(_) => "Map",
            Self::Block(_) => "Block",
            Self::Message(_) => "Message",
            Self::Call(_) => "Call",
            Self::Coroutine(_) => "Coroutine",
            Self::Future(_) => "Future",
            Self::Exception(_) => "Exception",
            Self::CFunction(_) => "CFunction",
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_sequence(&self) -> Option<&str> {
        match self {
            Self::Sequence(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&Vec<ObjectRef>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&AHashMap<Symbol, ObjectRef>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_message(&self) -> Option<&MessageChain> {
        match self {
            Self::Message(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_block(&self) -> Option<&Arc<Block>> {
        match self {
            Self::Block(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_cfunction(&self) -> Option<&CFunction> {
        match self {
            Self::CFunction(f) => Some(f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_future(&self) -> Option<&Arc<FutureState>> {
        match self {
            Self::Future(f) => Some(f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_exception(&self) -> Option<&Arc<ExceptionData>> {
        match self {
            Self::Exception(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_coroutine(&self) -> Option<&CoroutineHandle> {
        match self {
            Self::Coroutine(c) => Some(c),
            _ => None,
        }
    }

    /// The per-tag "CloneValue" hook §3 requires `clone` to invoke: produces
    /// an independent payload for the object `clone`/`cloneWithoutInit`
    /// allocate. Reference-counted payloads (Block, Message, Coroutine,
    /// Future, Exception, Call) are shared rather than deep-copied -- cloning
    /// a running coroutine or an in-flight future has no sensible deep-copy
    /// semantics, so the clone shares the same underlying state, matching how
    /// cloning a callable shares its body.
    #[must_use]
    pub fn clone_value(&self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Number(n) => Self::Number(*n),
            Self::Sequence(s) => Self::Sequence(s.clone()),
            Self::List(items) => Self::List(items.clone()),
            Self::Map(m) => Self::Map(m.clone()),
            Self::Block(b) => Self::Block(b.clone()),
            Self::Message(m) => Self::Message(m.clone()),
            Self::Call(c) => Self::Call(c.clone()),
            Self::Coroutine(c) => Self::Coroutine(c.clone()),
            Self::Future(f) => Self::Future(f.clone()),
            Self::Exception(e) => Self::Exception(e.clone()),
            Self::CFunction(f) => Self::CFunction(*f),
        }
    }
}

/// The payload for a callable object (§3 "Block", §4.3).
pub struct Block {
    pub message: MessageChain,
    /// Present for a lexically-scoped closure (evaluates in this scope, not
    /// the receiver's); absent for a method (evaluates in the receiver's
    /// scope).
    pub lexical_self: Option<ObjectRef>,
    pub arg_names: Vec<Symbol>,
    /// Whether this object runs when it is the target of a message send, or
    /// is returned as a literal value instead.
    pub activatable: bool,
    /// Whether non-exception stops (return/break/continue) raised in the
    /// body propagate out of this activation transparently rather than being
    /// interpreted by it (§4.4's "Method body (Block)" column assumes this is
    /// `false` for an ordinary method).
    pub pass_stops: bool,
}

/// A reflective record of one block activation (§3 "Call").
pub struct CallRecord {
    pub sender_locals: ObjectRef,
    pub activated: ObjectRef,
    pub message: MessageCursor,
    pub receiver: ObjectRef,
    /// The proto that actually owned the slot that resolved to `activated`
    /// (what `contextWithSlot` returns).
    pub slot_context: ObjectRef,
    pub coroutine: CoroutineHandle,
}

/// A statically compiled primitive (§4.3 "CFunction tag").
///
/// `expects` implements the "typed CFunction" rule: when present, the
/// receiver's tag must satisfy it or activation raises a type-mismatch
/// exception (§7) before `func` ever runs.
#[derive(Clone, Copy)]
pub struct CFunction {
    pub name: &'static str,
    pub expects: Option<fn(&Tag) -> bool>,
    pub func: CFunctionPtr,
}

/// `f(vm, target, locals, msg) -> Object`, paired by the caller with the
/// coroutine's pending stop status, exactly as §4.3 specifies.
///
/// `vm` is `&'static` so that coroutine-spawning primitives (`asyncSend`,
/// `futureSend`) can hand it to a freshly spawned `std::thread` without
/// unsafe lifetime extension; see `Vm::leak`.
pub type CFunctionPtr = fn(&'static Vm, &ObjectRef, &ObjectRef, &MessageCursor) -> (ObjectRef, Stop);

impl CFunction {
    #[must_use]
    pub const fn new(name: &'static str, func: CFunctionPtr) -> Self {
        Self { name, expects: None, func }
    }

    #[must_use]
    pub const fn typed(name: &'static str, expects: fn(&Tag) -> bool, func: CFunctionPtr) -> Self {
        Self { name, expects: Some(expects), func }
    }
}
