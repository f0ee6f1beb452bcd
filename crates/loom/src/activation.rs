//! The activation protocol (§4.3).
//!
//! Plain objects (and every tag besides `CFunction`/`Block`) activate to
//! themselves unless they opt into the `isActivatable`+`activate` convention;
//! `CFunction` and `Block` are the two tags whose activation does real work.

use std::sync::Arc;

use crate::eval::{eval_chain, raise_type_mismatch};
use crate::future::FutureState;
use crate::message::MessageCursor;
use crate::object::{self, Object, ObjectRef, Symbol};
use crate::stop::Stop;
use crate::value::{Block, CFunction, CallRecord, Tag};
use crate::vm::Vm;

/// Dispatches activation of `value` (the object found by slot lookup), which
/// was reached by sending `cursor`'s message to `receiver` under `locals`.
/// `slot_context` is the proto that actually owned the slot (§3 "Call").
#[must_use]
pub fn activate(vm: &'static Vm, value: &ObjectRef, receiver: &ObjectRef, locals: &ObjectRef, slot_context: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    enum Kind {
        CFunction(CFunction),
        Block(Arc<Block>),
        Future(Arc<FutureState>),
        Other,
    }
    let kind = value.with_tag(|t| match t {
        Tag::CFunction(f) => Kind::CFunction(*f),
        Tag::Block(b) => Kind::Block(b.clone()),
        Tag::Future(f) => Kind::Future(f.clone()),
        _ => Kind::Other,
    });
    match kind {
        Kind::CFunction(f) => activate_cfunction(vm, &f, value, receiver, locals, cursor),
        Kind::Block(block) => activate_block(vm, &block, value, receiver, locals, slot_context, cursor),
        Kind::Future(state) => activate_future(vm, &state, value, receiver, locals, slot_context, cursor),
        Kind::Other => default_activate(vm, value, locals, cursor),
    }
}

/// §4.6: a filled future delegates activation to its stored result; an
/// unfilled one activates as itself so a subsequent failed slot lookup on it
/// falls through to the `forward` method `builtins::install` hangs off the
/// Future proto, which actually awaits and re-dispatches.
fn activate_future(
    vm: &'static Vm,
    state: &Arc<FutureState>,
    value: &ObjectRef,
    receiver: &ObjectRef,
    locals: &ObjectRef,
    slot_context: &ObjectRef,
    cursor: &MessageCursor,
) -> (ObjectRef, Stop) {
    if let Some(result) = state.result() {
        return activate(vm, &result, receiver, locals, slot_context, cursor);
    }
    default_activate(vm, value, locals, cursor)
}

fn activate_cfunction(vm: &'static Vm, f: &CFunction, _callable: &ObjectRef, receiver: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    if let Some(expects) = f.expects {
        let ok = receiver.with_tag(expects);
        if !ok {
            let exc = raise_type_mismatch(vm, f.name, receiver, cursor);
            return (exc.clone(), Stop::Exception(exc));
        }
    }
    let (result, stop) = (f.func)(vm, receiver, locals, cursor);
    vm.tracer.on_activate(receiver, &result);
    if result.id() == vm.nil.id() { (vm.nil.clone(), stop) } else { (result, stop) }
}

/// §4.3's Block activation steps 1-5.
fn activate_block(
    vm: &'static Vm,
    block: &Arc<Block>,
    callable: &ObjectRef,
    receiver: &ObjectRef,
    sender_locals: &ObjectRef,
    slot_context: &ObjectRef,
    cursor: &MessageCursor,
) -> (ObjectRef, Stop) {
    let scope = block.lexical_self.clone().unwrap_or_else(|| receiver.clone());
    let coroutine = crate::vm::current_coroutine().unwrap_or_else(|| vm.main_coroutine.clone());

    let call_record = Arc::new(CallRecord {
        sender_locals: sender_locals.clone(),
        activated: callable.clone(),
        message: cursor.clone(),
        receiver: receiver.clone(),
        slot_context: slot_context.clone(),
        coroutine,
    });
    let new_locals = Object::plain([scope]);
    new_locals.set_slot(Symbol::from("self"), block.lexical_self.clone().unwrap_or_else(|| receiver.clone()));
    new_locals.set_slot(Symbol::from("call"), Object::new(Tag::Call(call_record), [vm.base_object.clone()]));

    // Arguments are evaluated eagerly against the sender's locals (call by
    // value) for every Block/Method activation; the unevaluated message is
    // still reachable reflectively via `call message argAt(i)` for callers
    // that want macro-like access, exactly as control-flow CFunctions do.
    for (i, name) in block.arg_names.iter().enumerate() {
        let Some(arg_chain) = cursor.arg_chain(i) else { break };
        let (value, stop) = eval_chain(vm, &arg_chain, sender_locals);
        if !stop.is_none() {
            return (value, stop);
        }
        new_locals.set_slot(name.clone(), value);
    }

    let (body_result, body_stop) = eval_chain(vm, &block.message, &new_locals);

    if !block.pass_stops {
        if let Stop::Return(value) = body_stop {
            return (value, Stop::None);
        }
    }
    (body_result, body_stop)
}

/// A plain object (or any non-CFunction/Block tag) activates to itself
/// unless it opts into the `isActivatable` convention (§4.3).
fn default_activate(vm: &'static Vm, obj: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let activatable = object::get_slot(obj, "isActivatable").is_some_and(|(v, _)| is_truthy(vm, &v));
    if activatable {
        if let Some((activate_fn, owner)) = object::get_slot(obj, "activate") {
            return activate(vm, &activate_fn, obj, locals, &owner, cursor);
        }
    }
    (obj.clone(), Stop::None)
}

/// Only `false` and `nil` are falsy; every other object, including `0` and
/// the empty sequence, is truthy.
#[must_use]
pub fn is_truthy(vm: &'static Vm, obj: &ObjectRef) -> bool {
    obj.id() != vm.false_obj.id() && obj.id() != vm.nil.id()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageChain;
    use crate::parser::parse;

    fn make_block(vm: &'static Vm, arg_names: &[&str], body_src: &str) -> ObjectRef {
        let body: MessageChain = parse(body_src, "block-body", vm).unwrap();
        let block = Block {
            message: body,
            lexical_self: None,
            arg_names: arg_names.iter().map(|s| Symbol::from(*s)).collect(),
            activatable: true,
            pass_stops: false,
        };
        Object::new(Tag::Block(Arc::new(block)), [vm.base_object.clone()])
    }

    #[test]
    fn block_activation_binds_args_and_evaluates_body() {
        let vm = Vm::new().leak();
        let receiver = Object::plain([vm.base_object.clone()]);
        receiver.set_slot(Symbol::from("double"), make_block(vm, &["x"], "x + x"));
        vm.lobby.set_slot(Symbol::from("r"), receiver);
        vm.lobby.set_slot(Symbol::from("one"), vm.make(Tag::Number(21.0)));
        let chain = parse("r double(one)", "t", vm).unwrap();
        let (result, stop) = crate::eval::eval_chain(vm, &chain, &vm.lobby);
        assert!(stop.is_none(), "{stop:?}");
        assert_eq!(result.with_tag(|t| t.as_number()), Some(42.0));
    }

    #[test]
    fn return_inside_block_ends_it_with_stop_none() {
        let vm = Vm::new().leak();
        let receiver = Object::plain([vm.base_object.clone()]);
        receiver.set_slot(Symbol::from("early"), make_block(vm, &[], "return 9; 100"));
        vm.lobby.set_slot(Symbol::from("r"), receiver);
        let chain = parse("r early", "t", vm).unwrap();
        let (result, stop) = crate::eval::eval_chain(vm, &chain, &vm.lobby);
        assert!(stop.is_none());
        assert_eq!(result.with_tag(|t| t.as_number()), Some(9.0));
    }
}
