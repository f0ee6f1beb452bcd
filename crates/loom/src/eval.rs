//! The message evaluation loop (§4.2).
//!
//! `eval_chain` walks a whole chain; `eval_one` resolves and activates a
//! single non-terminator message. Activation itself (the CFunction/Block
//! split of §4.3) lives in `activation.rs` to keep the walk-the-chain logic
//! separate from the what-does-activating-mean logic.

use crate::activation::activate;
use crate::exception::{ExcType, ExceptionData, StackFrame};
use crate::message::{MessageChain, MessageCursor};
use crate::object::{self, ObjectRef, Symbol};
use crate::stop::Stop;
use crate::value::Tag;
use crate::vm::{poll_current_remote_stop, Vm};

/// `Message.eval(vm, target, locals)` (§4.2), generalized to a whole chain:
/// the receiver of the first message is `locals`; each non-terminator
/// message's result becomes the next message's target; a terminator resets
/// target to `locals`.
#[must_use]
pub fn eval_chain(vm: &'static Vm, chain: &MessageChain, locals: &ObjectRef) -> (ObjectRef, Stop) {
    eval_chain_from(vm, chain, locals, locals)
}

/// Like [`eval_chain`] but the first message's target is `target0` rather
/// than `locals`. Used by `asyncSend`/`futureSend` ("sends `argAt(0)` to the
/// current receiver") and by a Future's `forward`, which re-dispatches the
/// triggering message to the filled result once it arrives.
#[must_use]
pub fn eval_chain_from(vm: &'static Vm, chain: &MessageChain, target0: &ObjectRef, locals: &ObjectRef) -> (ObjectRef, Stop) {
    let mut target = target0.clone();
    let mut result = vm.nil.clone();
    let mut cursor = MessageCursor::head(chain.clone());
    loop {
        if cursor.is_terminator() {
            target = locals.clone();
        } else {
            let (value, stop) = eval_one(vm, &target, locals, &cursor);
            vm.tracer.on_stop(&stop);
            if !stop.is_none() {
                return (value, stop);
            }
            result = value;
            target = result.clone();
            // §4.4: "At each statement boundary ... the evaluator
            // non-blockingly polls its channel; a pending remote stop
            // preempts continuation." Pause/Resume are scheduler-internal
            // and consumed by dedicated primitives, not observed here.
            if let Some(remote) = poll_current_remote_stop() {
                if !remote.is_scheduler_internal() {
                    return (result, remote);
                }
            }
        }
        match cursor.next() {
            Some(next) => cursor = next,
            None => break,
        }
    }
    (result, Stop::None)
}

/// Evaluates argument `i` of `cursor` against `locals`, propagating any
/// non-`none` stop as `Err` and a missing argument as an `argument`
/// exception. The common case for CFunctions whose parameters are ordinary
/// (eagerly evaluated) message sends -- `setSlot`, arithmetic, `perform`'s
/// trailing args, and so on.
pub(crate) fn eval_arg(vm: &'static Vm, cursor: &MessageCursor, locals: &ObjectRef, i: usize) -> Result<ObjectRef, Stop> {
    match cursor.arg_chain(i) {
        Some(chain) => {
            let (value, stop) = eval_chain(vm, &chain, locals);
            if stop.is_none() { Ok(value) } else { Err(stop) }
        }
        None => Err(Stop::Exception(raise_argument_error(vm, "missing required argument", cursor))),
    }
}

/// Resolves and activates one non-terminator message against `target`.
#[must_use]
pub(crate) fn eval_one(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    if let Some(memo) = &cursor.node().memo {
        return (memo.clone(), Stop::None);
    }
    vm.tracer.on_send(target, cursor);
    let name = cursor.text();
    if let Some((value, owner)) = object::get_slot(target, name) {
        return activate(vm, &value, target, locals, &owner, cursor);
    }
    if let Some((forward, owner)) = object::get_slot(target, "forward") {
        return activate(vm, &forward, target, locals, &owner, cursor);
    }
    let exc = raise_does_not_respond(vm, target, name, cursor);
    (exc.clone(), Stop::Exception(exc))
}

/// Builds and raises a `doesNotRespond` exception (§7), with a one-frame
/// stack recording where it happened; callers higher up append their own
/// frame as the exception unwinds.
#[must_use]
pub fn raise_does_not_respond(vm: &'static Vm, target: &ObjectRef, name: &Symbol, cursor: &MessageCursor) -> ObjectRef {
    let message = format!("{} does not respond to '{name}'", target.tag_name());
    raise(vm, ExcType::DoesNotRespond, &message, cursor)
}

/// Builds and raises a `typeMismatch` exception for a typed CFunction whose
/// receiver has the wrong tag (§4.3, §7).
#[must_use]
pub fn raise_type_mismatch(vm: &'static Vm, fn_name: &str, target: &ObjectRef, cursor: &MessageCursor) -> ObjectRef {
    let message = format!("'{fn_name}' does not accept a receiver of type {}", target.tag_name());
    raise(vm, ExcType::TypeMismatch, &message, cursor)
}

/// Builds and raises an `argument` exception (wrong arity/type of argument).
#[must_use]
pub fn raise_argument_error(vm: &'static Vm, message: &str, cursor: &MessageCursor) -> ObjectRef {
    raise(vm, ExcType::Argument, message, cursor)
}

#[must_use]
pub fn raise(vm: &'static Vm, exc_type: ExcType, message: &str, cursor: &MessageCursor) -> ObjectRef {
    let error = vm.make(Tag::Sequence(message.to_string()));
    let mut data = ExceptionData::new(exc_type, error);
    data.push_frame(StackFrame { label: cursor.node().label.clone(), line: cursor.node().line, col: cursor.node().col, message_name: cursor.text().clone() });
    vm.make(Tag::Exception(std::sync::Arc::new(data)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;
    use crate::parser::parse;

    #[test]
    fn literal_evaluates_to_itself() {
        let vm = Vm::new().leak();
        let chain = parse("42", "t", vm).unwrap();
        let (result, stop) = eval_chain(vm, &chain, &vm.lobby);
        assert!(stop.is_none());
        assert_eq!(result.with_tag(|t| t.as_number()), Some(42.0));
    }

    #[test]
    fn slot_lookup_resolves_through_protos() {
        let vm = Vm::new().leak();
        let proto = Object::plain([vm.base_object.clone()]);
        proto.set_slot(Symbol::from("x"), vm.make(Tag::Number(7.0)));
        let obj = Object::plain([proto]);
        let locals = Object::plain([obj.clone()]);
        let chain = parse("x", "t", vm).unwrap();
        let (result, stop) = eval_chain(vm, &chain, &locals);
        assert!(stop.is_none());
        assert_eq!(result.with_tag(|t| t.as_number()), Some(7.0));
    }

    #[test]
    fn missing_slot_raises_does_not_respond() {
        let vm = Vm::new().leak();
        let chain = parse("thisSlotDoesNotExist", "t", vm).unwrap();
        let (_, stop) = eval_chain(vm, &chain, &vm.lobby);
        match stop {
            Stop::Exception(exc) => {
                assert_eq!(exc.with_tag(|t| t.as_exception().unwrap().exc_type), ExcType::DoesNotRespond);
            }
            other => panic!("expected Exception stop, got {other:?}"),
        }
    }

    #[test]
    fn terminator_resets_target_to_locals() {
        let vm = Vm::new().leak();
        vm.lobby.set_slot(Symbol::from("a"), vm.make(Tag::Number(1.0)));
        vm.lobby.set_slot(Symbol::from("b"), vm.make(Tag::Number(2.0)));
        let chain = parse("a\nb", "t", vm).unwrap();
        let (result, stop) = eval_chain(vm, &chain, &vm.lobby);
        assert!(stop.is_none());
        assert_eq!(result.with_tag(|t| t.as_number()), Some(2.0));
    }
}
