//! The Object protocol library (§4.7) and the control-flow/coroutine/literal
//! primitives that make the language usable (§6 "Runtime reflective
//! surface"). Everything here is installed as an ordinary `CFunction` slot on
//! `vm.base_object` (or, for the Future-specific `forward`/`waitOnResult`, on
//! the `Future` proto under `Core`) by [`install`], called once from
//! `Vm::with_tracer` during bootstrap.
//!
//! The grounding crate wires its builtins as a flat table of `(name, fn)`
//! pairs registered onto a namespace object; this module follows the same
//! shape, just against the slot table instead of a namespace dict.

use std::sync::Arc;
use std::thread;

use ahash::AHashMap;

use crate::activation::{activate, is_truthy};
use crate::eval::{eval_arg, eval_chain, eval_chain_from, eval_one, raise, raise_argument_error, raise_type_mismatch};
use crate::exception::ExcType;
use crate::future::FutureState;
use crate::identity::ObjectId;
use crate::message::{MessageChain, MessageCursor, MessageNode};
use crate::object::{self, Object, ObjectRef, Symbol};
use crate::stop::{first_non_none, Stop};
use crate::value::{Block, CFunction, Tag};
use crate::vm::{current_coroutine, with_current_coroutine, Vm};

/// Evaluates argument `i`, returning early from the caller with `(vm.nil,
/// stop)` on any non-`none` stop. The common case for CFunctions whose
/// parameters are ordinary eager sends.
macro_rules! arg {
    ($vm:expr, $cursor:expr, $locals:expr, $i:expr) => {
        match eval_arg($vm, $cursor, $locals, $i) {
            Ok(v) => v,
            Err(stop) => return (($vm).nil.clone(), stop),
        }
    };
}

macro_rules! slot {
    ($vm:expr, $obj:expr, $name:expr, $f:expr) => {
        $obj.set_slot(Symbol::from($name), Object::new(Tag::CFunction(CFunction::new($name, $f)), [$vm.base_object.clone()]));
    };
}

macro_rules! slot_typed {
    ($vm:expr, $obj:expr, $name:expr, $expects:expr, $f:expr) => {
        $obj.set_slot(Symbol::from($name), Object::new(Tag::CFunction(CFunction::typed($name, $expects, $f)), [$vm.base_object.clone()]));
    };
}

/// Wires every guaranteed root-object slot (§6) onto `vm.base_object`, the
/// `Future` proto's `forward`/`waitOnResult`, and hands off to
/// `crate::primitives` for the Number/Sequence/List/Map libraries.
pub fn install(vm: &Vm) {
    let base = vm.base_object.clone();

    slot!(vm, base, "clone", obj_clone);
    slot!(vm, base, "cloneWithoutInit", obj_clone_without_init);
    slot!(vm, base, "shallowCopy", shallow_copy_fn);
    slot!(vm, base, "isIdenticalTo", is_identical_to_fn);
    slot!(vm, base, "isKindOf", is_kind_of_fn);
    slot!(vm, base, "uniqueId", unique_id_fn);
    slot!(vm, base, "asString", as_string_fn);
    slot!(vm, base, "asGoRepr", as_go_repr_fn);

    slot!(vm, base, "setSlot", set_slot_fn);
    slot!(vm, base, "updateSlot", update_slot_fn);
    slot!(vm, base, "getSlot", get_slot_fn);
    slot!(vm, base, "getLocalSlot", get_local_slot_fn);
    slot!(vm, base, "hasLocalSlot", has_local_slot_fn);
    slot!(vm, base, "hasSlot", has_slot_fn);
    slot!(vm, base, "slotNames", slot_names_fn);
    slot!(vm, base, "slotValues", slot_values_fn);
    slot!(vm, base, "removeSlot", remove_slot_fn);
    slot!(vm, base, "removeAllSlots", remove_all_slots_fn);
    slot!(vm, base, "ancestorWithSlot", ancestor_with_slot_fn);
    slot!(vm, base, "contextWithSlot", context_with_slot_fn);

    slot!(vm, base, "protos", protos_fn);
    slot!(vm, base, "appendProto", append_proto_fn);
    slot!(vm, base, "prependProto", prepend_proto_fn);
    slot!(vm, base, "setProto", set_proto_fn);
    slot!(vm, base, "setProtos", set_protos_fn);
    slot!(vm, base, "removeProto", remove_proto_fn);
    slot!(vm, base, "removeAllProtos", remove_all_protos_fn);

    slot!(vm, base, "perform", perform_fn);
    slot!(vm, base, "performWithArgList", perform_with_arg_list_fn);
    slot!(vm, base, "do", do_fn);
    slot!(vm, base, "lexicalDo", lexical_do_fn);
    slot!(vm, base, "doFile", do_file_fn);
    slot!(vm, base, "doString", do_string_fn);
    slot!(vm, base, "doMessage", do_message_fn);
    slot!(vm, base, "try", try_fn);
    slot!(vm, base, "message", message_fn);
    slot!(vm, base, "thisContext", this_context_fn);
    slot!(vm, base, "thisLocalContext", this_local_context_fn);
    slot!(vm, base, "thisMessage", this_message_fn);

    slot!(vm, base, "compare", default_compare_fn);
    slot!(vm, base, "<", op_lt);
    slot!(vm, base, "<=", op_le);
    slot!(vm, base, "==", op_eq);
    slot!(vm, base, "!=", op_ne);
    slot!(vm, base, ">=", op_ge);
    slot!(vm, base, ">", op_gt);

    slot!(vm, base, "if", if_fn);
    slot!(vm, base, "while", while_fn);
    slot!(vm, base, "for", for_fn);
    slot!(vm, base, "loop", loop_fn);
    slot!(vm, base, "break", break_fn);
    slot!(vm, base, "continue", continue_fn);
    slot!(vm, base, "return", return_fn);
    slot!(vm, base, "exit", exit_fn);
    slot!(vm, base, "foreachSlot", foreach_slot_fn);

    slot!(vm, base, "block", block_fn);
    slot!(vm, base, "method", method_fn);

    slot!(vm, base, "asyncSend", async_send_fn);
    slot!(vm, base, "futureSend", future_send_fn);
    slot!(vm, base, "wait", wait_fn);
    slot!(vm, base, "yield", yield_fn);
    slot!(vm, base, "pause", pause_fn);
    slot!(vm, base, "resume", resume_fn);

    slot!(vm, base, "isTrue", is_true_fn);
    slot!(vm, base, "isNil", is_nil_fn);
    slot!(vm, base, "not", not_fn);
    slot!(vm, base, "and", and_fn);
    slot!(vm, base, "or", or_fn);
    slot!(vm, base, "evalArg", eval_arg_fn);
    slot!(vm, base, "evalArgAndReturnSelf", eval_arg_and_return_self_fn);
    slot!(vm, base, "evalArgAndReturnNil", eval_arg_and_return_nil_fn);

    slot!(vm, base, "squareBrackets", square_brackets_fn);
    slot!(vm, base, "curlyBrackets", curly_brackets_fn);
    slot!(vm, base, "", empty_name_fn);

    // §6 "operator shuffling": `:=`/`<-` create-or-overwrite on the
    // receiver (locals, at statement start); `=`/`<->` require the slot to
    // already exist on an ancestor. Open Question resolved in DESIGN.md --
    // the distilled spec names these four operators but doesn't define the
    // split.
    slot!(vm, base, ":=", assign_create);
    slot!(vm, base, "<-", assign_create);
    slot!(vm, base, "=", assign_update);
    slot!(vm, base, "<->", assign_update);

    let future_proto = Object::plain([vm.base_object.clone()]);
    slot_typed!(vm, future_proto, "forward", is_future_tag, future_forward_fn);
    slot_typed!(vm, future_proto, "waitOnResult", is_future_tag, future_wait_on_result_fn);
    vm.core.set_slot(Symbol::from("Future"), future_proto);

    crate::primitives::install(vm);
}

fn is_future_tag(t: &Tag) -> bool {
    matches!(t, Tag::Future(_))
}

// ---------------------------------------------------------------------
// clone / identity
// ---------------------------------------------------------------------

fn obj_clone(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    clone_impl(vm, target, locals, cursor, true)
}

fn obj_clone_without_init(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    clone_impl(vm, target, locals, cursor, false)
}

fn clone_impl(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor, run_init: bool) -> (ObjectRef, Stop) {
    let tag = target.with_tag(Tag::clone_value);
    let new_obj = Object::new(tag, [target.clone()]);
    if run_init {
        if let Some((init, owner)) = object::get_slot(&new_obj, "init") {
            let (_, stop) = activate(vm, &init, &new_obj, locals, &owner, cursor);
            if !stop.is_none() {
                return (new_obj, stop);
            }
        }
    }
    (new_obj, Stop::None)
}

fn shallow_copy_fn(vm: &'static Vm, target: &ObjectRef, _locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    if !target.with_tag(|t| matches!(t, Tag::None)) {
        let exc = raise_argument_error(vm, "shallowCopy: tagged objects cannot be shallow-copied", cursor);
        return (exc.clone(), Stop::Exception(exc));
    }
    let new_obj = Object::plain(target.protos_snapshot());
    for (name, value) in target.local_slots_snapshot() {
        new_obj.set_slot(name, value);
    }
    (new_obj, Stop::None)
}

fn is_identical_to_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let other = arg!(vm, cursor, locals, 0);
    (vm.bool_obj(target.id() == other.id()), Stop::None)
}

fn is_kind_of_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let proto = arg!(vm, cursor, locals, 0);
    (vm.bool_obj(object::is_kind_of(target, &proto)), Stop::None)
}

fn unique_id_fn(vm: &'static Vm, target: &ObjectRef, _locals: &ObjectRef, _cursor: &MessageCursor) -> (ObjectRef, Stop) {
    (vm.make(Tag::Number(target.id().raw() as f64)), Stop::None)
}

/// Formats a Number the way source code would write it back: no trailing
/// `.0` for integral values.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

fn as_string_fn(vm: &'static Vm, target: &ObjectRef, _locals: &ObjectRef, _cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let s = target.with_tag(|t| match t {
        Tag::None => format!("Object_{}", target.id()),
        Tag::Number(n) => format_number(*n),
        Tag::Sequence(s) => s.clone(),
        Tag::List(items) => format!("list({} items)", items.len()),
        Tag::Map(m) => format!("Map({} keys)", m.len()),
        Tag::Block(b) => {
            if b.lexical_self.is_some() {
                format!("block({} args)", b.arg_names.len())
            } else {
                format!("method({} args)", b.arg_names.len())
            }
        }
        Tag::Message(_) => "Message".to_string(),
        Tag::Call(_) => "Call".to_string(),
        Tag::Coroutine(_) => format!("Coroutine_{}", target.id()),
        Tag::Future(f) => if f.is_filled() { "Future(filled)".to_string() } else { "Future(pending)".to_string() },
        Tag::Exception(e) => format!("Exception({})", e.exc_type),
        Tag::CFunction(f) => format!("CFunction({})", f.name),
    });
    (vm.make(Tag::Sequence(s)), Stop::None)
}

fn as_go_repr_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let (s_obj, stop) = as_string_fn(vm, target, locals, cursor);
    if !stop.is_none() {
        return (s_obj, stop);
    }
    let repr = s_obj.with_tag(|t| t.as_sequence().unwrap_or("").to_string());
    (vm.make(Tag::Sequence(format!("{}_{}:{repr}", target.tag_name(), target.id()))), Stop::None)
}

// ---------------------------------------------------------------------
// slots
// ---------------------------------------------------------------------

fn name_arg(vm: &'static Vm, cursor: &MessageCursor, locals: &ObjectRef, i: usize, fn_name: &str) -> Result<Symbol, (ObjectRef, Stop)> {
    let value = match eval_arg(vm, cursor, locals, i) {
        Ok(v) => v,
        Err(stop) => return Err((vm.nil.clone(), stop)),
    };
    match value.with_tag(|t| t.as_sequence().map(Symbol::from)) {
        Some(name) => Ok(name),
        None => {
            let exc = raise_argument_error(vm, &format!("{fn_name} expects a Sequence name"), cursor);
            Err((exc.clone(), Stop::Exception(exc)))
        }
    }
}

macro_rules! name_arg {
    ($vm:expr, $cursor:expr, $locals:expr, $i:expr, $fn_name:expr) => {
        match name_arg($vm, $cursor, $locals, $i, $fn_name) {
            Ok(n) => n,
            Err(result) => return result,
        }
    };
}

fn set_slot_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let name = name_arg!(vm, cursor, locals, 0, "setSlot");
    let value = arg!(vm, cursor, locals, 1);
    target.set_slot(name, value.clone());
    (value, Stop::None)
}

fn update_slot_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let name = name_arg!(vm, cursor, locals, 0, "updateSlot");
    let value = arg!(vm, cursor, locals, 1);
    if object::update_slot(target, &name, value.clone()) {
        (value, Stop::None)
    } else {
        let exc = raise_argument_error(vm, &format!("updateSlot: no ancestor has slot '{name}'"), cursor);
        (exc.clone(), Stop::Exception(exc))
    }
}

fn get_slot_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let name = name_arg!(vm, cursor, locals, 0, "getSlot");
    match object::get_slot(target, &name) {
        Some((value, _)) => (value, Stop::None),
        None => (vm.nil.clone(), Stop::None),
    }
}

fn get_local_slot_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let name = name_arg!(vm, cursor, locals, 0, "getLocalSlot");
    (target.get_local_slot(&name).unwrap_or_else(|| vm.nil.clone()), Stop::None)
}

fn has_local_slot_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let name = name_arg!(vm, cursor, locals, 0, "hasLocalSlot");
    (vm.bool_obj(target.has_local_slot(&name)), Stop::None)
}

fn has_slot_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let name = name_arg!(vm, cursor, locals, 0, "hasSlot");
    (vm.bool_obj(object::get_slot(target, &name).is_some()), Stop::None)
}

fn slot_names_fn(vm: &'static Vm, target: &ObjectRef, _locals: &ObjectRef, _cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let names = target.local_slot_names().into_iter().map(|s| vm.make(Tag::Sequence(s.to_string()))).collect();
    (vm.make(Tag::List(names)), Stop::None)
}

fn slot_values_fn(vm: &'static Vm, target: &ObjectRef, _locals: &ObjectRef, _cursor: &MessageCursor) -> (ObjectRef, Stop) {
    (vm.make(Tag::List(target.local_slot_values())), Stop::None)
}

fn remove_slot_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let name = name_arg!(vm, cursor, locals, 0, "removeSlot");
    target.remove_slot(&name);
    (target.clone(), Stop::None)
}

fn remove_all_slots_fn(_vm: &'static Vm, target: &ObjectRef, _locals: &ObjectRef, _cursor: &MessageCursor) -> (ObjectRef, Stop) {
    target.remove_all_slots();
    (target.clone(), Stop::None)
}

fn ancestor_with_slot_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let name = name_arg!(vm, cursor, locals, 0, "ancestorWithSlot");
    (object::ancestor_with_slot(target, &name).unwrap_or_else(|| vm.nil.clone()), Stop::None)
}

fn context_with_slot_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let name = name_arg!(vm, cursor, locals, 0, "contextWithSlot");
    match object::get_slot(target, &name) {
        Some((_, owner)) => (owner, Stop::None),
        None => (vm.nil.clone(), Stop::None),
    }
}

// ---------------------------------------------------------------------
// protos
// ---------------------------------------------------------------------

fn protos_fn(vm: &'static Vm, target: &ObjectRef, _locals: &ObjectRef, _cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let protos: Vec<ObjectRef> = target.protos_snapshot().into_iter().collect();
    (vm.make(Tag::List(protos)), Stop::None)
}

fn append_proto_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let proto = arg!(vm, cursor, locals, 0);
    target.append_proto(proto);
    (target.clone(), Stop::None)
}

fn prepend_proto_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let proto = arg!(vm, cursor, locals, 0);
    target.prepend_proto(proto);
    (target.clone(), Stop::None)
}

fn set_proto_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let proto = arg!(vm, cursor, locals, 0);
    target.set_proto(proto);
    (target.clone(), Stop::None)
}

fn set_protos_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let list_val = arg!(vm, cursor, locals, 0);
    let Some(items) = list_val.with_tag(|t| t.as_list().cloned()) else {
        let exc = raise_argument_error(vm, "setProtos expects a List", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    target.set_protos(items);
    (target.clone(), Stop::None)
}

fn remove_proto_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let proto = arg!(vm, cursor, locals, 0);
    target.remove_proto(&proto);
    (target.clone(), Stop::None)
}

fn remove_all_protos_fn(_vm: &'static Vm, target: &ObjectRef, _locals: &ObjectRef, _cursor: &MessageCursor) -> (ObjectRef, Stop) {
    target.remove_all_protos();
    (target.clone(), Stop::None)
}

// ---------------------------------------------------------------------
// reflection / dispatch
// ---------------------------------------------------------------------

fn synthetic_leaf(value: ObjectRef, cursor: &MessageCursor) -> MessageChain {
    let node = cursor.node();
    Arc::from(vec![MessageNode { text: Symbol::from(""), memo: Some(value), args: vec![], label: node.label.clone(), line: node.line, col: node.col }])
}

fn perform_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let name_val = arg!(vm, cursor, locals, 0);
    if let Some(chain) = name_val.with_tag(|t| t.as_message().cloned()) {
        let synth = MessageCursor::head(chain);
        return eval_one(vm, target, locals, &synth);
    }
    let Some(name) = name_val.with_tag(|t| t.as_sequence().map(Symbol::from)) else {
        let exc = raise_argument_error(vm, "perform expects a Sequence name or a Message", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let arg_chains: Vec<MessageChain> = (1..cursor.arg_count()).filter_map(|i| cursor.arg_chain(i)).collect();
    let node = cursor.node();
    let synth_chain: MessageChain =
        Arc::from(vec![MessageNode { text: name, memo: None, args: arg_chains, label: node.label.clone(), line: node.line, col: node.col }]);
    eval_one(vm, target, locals, &MessageCursor::head(synth_chain))
}

fn perform_with_arg_list_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let name = name_arg!(vm, cursor, locals, 0, "performWithArgList");
    let list_val = arg!(vm, cursor, locals, 1);
    let Some(values) = list_val.with_tag(|t| t.as_list().cloned()) else {
        let exc = raise_argument_error(vm, "performWithArgList expects a List", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let arg_chains: Vec<MessageChain> = values.into_iter().map(|v| synthetic_leaf(v, cursor)).collect();
    let node = cursor.node();
    let synth_chain: MessageChain =
        Arc::from(vec![MessageNode { text: name, memo: None, args: arg_chains, label: node.label.clone(), line: node.line, col: node.col }]);
    eval_one(vm, target, locals, &MessageCursor::head(synth_chain))
}

fn do_fn(vm: &'static Vm, target: &ObjectRef, _locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let Some(body) = cursor.arg_chain(0) else {
        let exc = raise_argument_error(vm, "do requires a body argument", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let (result, stop) = eval_chain(vm, &body, target);
    if stop.is_none() { (target.clone(), Stop::None) } else { (result, stop) }
}

fn lexical_do_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let Some(body) = cursor.arg_chain(0) else {
        let exc = raise_argument_error(vm, "lexicalDo requires a body argument", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let original = target.protos_snapshot();
    target.append_proto(locals.clone());
    let (result, stop) = eval_chain(vm, &body, target);
    target.restore_protos(original);
    if stop.is_none() { (target.clone(), Stop::None) } else { (result, stop) }
}

fn do_string_source(vm: &'static Vm, target: &ObjectRef, cursor: &MessageCursor, source: &str, label: &str) -> (ObjectRef, Stop) {
    match crate::parser::parse(source, label, vm) {
        Ok(chain) => eval_chain(vm, &chain, target),
        Err(e) => {
            let exc = raise(vm, ExcType::Argument, &format!("parse error: {e}"), cursor);
            (exc.clone(), Stop::Exception(exc))
        }
    }
}

fn do_string_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let src = arg!(vm, cursor, locals, 0);
    let Some(source) = src.with_tag(|t| t.as_sequence().map(str::to_string)) else {
        let exc = raise_argument_error(vm, "doString expects a Sequence", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    do_string_source(vm, target, cursor, &source, "doString")
}

fn do_file_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let path_obj = arg!(vm, cursor, locals, 0);
    let Some(path) = path_obj.with_tag(|t| t.as_sequence().map(str::to_string)) else {
        let exc = raise_argument_error(vm, "doFile expects a Sequence path", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    match std::fs::read_to_string(&path) {
        Ok(source) => do_string_source(vm, target, cursor, &source, &path),
        Err(e) => {
            let exc = raise(vm, ExcType::Io, &format!("doFile '{path}': {e}"), cursor);
            (exc.clone(), Stop::Exception(exc))
        }
    }
}

fn do_message_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let msg_val = arg!(vm, cursor, locals, 0);
    let Some(chain) = msg_val.with_tag(|t| t.as_message().cloned()) else {
        let exc = raise_argument_error(vm, "doMessage expects a Message", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let ctx = if cursor.arg_count() > 1 { arg!(vm, cursor, locals, 1) } else { target.clone() };
    eval_chain_from(vm, &chain, &ctx, locals)
}

fn try_fn(vm: &'static Vm, _target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let Some(body) = cursor.arg_chain(0) else {
        let exc = raise_argument_error(vm, "try requires a body argument", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let (value, stop) = eval_chain(vm, &body, locals);
    match stop {
        Stop::Exception(exc) => (exc, Stop::None),
        other => (value, other),
    }
}

fn message_fn(vm: &'static Vm, _target: &ObjectRef, _locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    match cursor.arg_chain(0) {
        Some(chain) => (vm.make(Tag::Message(chain)), Stop::None),
        None => {
            let exc = raise_argument_error(vm, "message requires an argument", cursor);
            (exc.clone(), Stop::Exception(exc))
        }
    }
}

fn this_context_fn(_vm: &'static Vm, _target: &ObjectRef, locals: &ObjectRef, _cursor: &MessageCursor) -> (ObjectRef, Stop) {
    (locals.get_local_slot("self").unwrap_or_else(|| locals.clone()), Stop::None)
}

fn this_local_context_fn(_vm: &'static Vm, _target: &ObjectRef, locals: &ObjectRef, _cursor: &MessageCursor) -> (ObjectRef, Stop) {
    (locals.clone(), Stop::None)
}

fn this_message_fn(vm: &'static Vm, _target: &ObjectRef, _locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let remaining: Vec<MessageNode> = cursor.chain[cursor.index..].to_vec();
    (vm.make(Tag::Message(Arc::from(remaining))), Stop::None)
}

// ---------------------------------------------------------------------
// comparison (§4.7 "compare returns an integer... <, <=, == ... with a
// fallback to identity-ordered comparison when compare returns a
// non-number")
// ---------------------------------------------------------------------

fn identity_sign(a: &ObjectRef, b: &ObjectRef) -> f64 {
    match a.id().raw().cmp(&b.id().raw()) {
        std::cmp::Ordering::Less => -1.0,
        std::cmp::Ordering::Equal => 0.0,
        std::cmp::Ordering::Greater => 1.0,
    }
}

fn default_compare_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let other = arg!(vm, cursor, locals, 0);
    (vm.make(Tag::Number(identity_sign(target, &other))), Stop::None)
}

/// Sends `compare` to `target` (respecting any proto override, e.g.
/// Number/Sequence's numeric/lexicographic one) and reduces the result to a
/// sign, falling back to identity order if `compare` didn't return a Number.
fn compare_sign(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> Result<f64, (ObjectRef, Stop)> {
    let other = match eval_arg(vm, cursor, locals, 0) {
        Ok(v) => v,
        Err(stop) => return Err((vm.nil.clone(), stop)),
    };
    let synth_chain: MessageChain = {
        let node = cursor.node();
        Arc::from(vec![MessageNode {
            text: Symbol::from("compare"),
            memo: None,
            args: vec![synthetic_leaf(other.clone(), cursor)],
            label: node.label.clone(),
            line: node.line,
            col: node.col,
        }])
    };
    let (result, stop) = eval_one(vm, target, locals, &MessageCursor::head(synth_chain));
    if !stop.is_none() {
        return Err((result, stop));
    }
    Ok(result.with_tag(Tag::as_number).unwrap_or_else(|| identity_sign(target, &other)))
}

fn op_lt(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    match compare_sign(vm, target, locals, cursor) {
        Ok(sign) => (vm.bool_obj(sign < 0.0), Stop::None),
        Err(result) => result,
    }
}
fn op_le(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    match compare_sign(vm, target, locals, cursor) {
        Ok(sign) => (vm.bool_obj(sign <= 0.0), Stop::None),
        Err(result) => result,
    }
}
fn op_eq(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    match compare_sign(vm, target, locals, cursor) {
        Ok(sign) => (vm.bool_obj(sign == 0.0), Stop::None),
        Err(result) => result,
    }
}
fn op_ne(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    match compare_sign(vm, target, locals, cursor) {
        Ok(sign) => (vm.bool_obj(sign != 0.0), Stop::None),
        Err(result) => result,
    }
}
fn op_ge(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    match compare_sign(vm, target, locals, cursor) {
        Ok(sign) => (vm.bool_obj(sign >= 0.0), Stop::None),
        Err(result) => result,
    }
}
fn op_gt(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    match compare_sign(vm, target, locals, cursor) {
        Ok(sign) => (vm.bool_obj(sign > 0.0), Stop::None),
        Err(result) => result,
    }
}

// ---------------------------------------------------------------------
// control flow (§4.4)
// ---------------------------------------------------------------------

fn if_fn(vm: &'static Vm, _target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let Some(cond_chain) = cursor.arg_chain(0) else {
        let exc = raise_argument_error(vm, "if requires a condition argument", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let (cond_val, stop) = eval_chain(vm, &cond_chain, locals);
    if !stop.is_none() {
        return (cond_val, stop);
    }
    let branch = if is_truthy(vm, &cond_val) { cursor.arg_chain(1) } else { cursor.arg_chain(2) };
    match branch {
        Some(chain) => eval_chain(vm, &chain, locals),
        None => (vm.nil.clone(), Stop::None),
    }
}

/// Folds one loop-body outcome per §4.4's table: `none`/`continue` carry the
/// value forward as the prospective result, `break` ends the loop, anything
/// else propagates straight out of the caller.
macro_rules! loop_step {
    ($result:ident, $value:expr, $stop:expr, $label:lifetime) => {
        match $stop {
            Stop::None => $result = $value,
            Stop::Continue(v) => $result = v,
            Stop::Break(v) => {
                $result = v;
                break $label;
            }
            other => return ($value, other),
        }
    };
}

fn while_fn(vm: &'static Vm, _target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let Some(cond_chain) = cursor.arg_chain(0) else {
        let exc = raise_argument_error(vm, "while requires a condition argument", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let Some(body) = cursor.arg_chain(1) else {
        let exc = raise_argument_error(vm, "while requires a body argument", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let mut result = vm.nil.clone();
    'outer: loop {
        let (cond_val, cond_stop) = eval_chain(vm, &cond_chain, locals);
        if !cond_stop.is_none() {
            return (cond_val, cond_stop);
        }
        if !is_truthy(vm, &cond_val) {
            break;
        }
        let (value, stop) = eval_chain(vm, &body, locals);
        loop_step!(result, value, stop, 'outer);
    }
    (result, Stop::None)
}

fn loop_fn(vm: &'static Vm, _target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let Some(body) = cursor.arg_chain(0) else {
        let exc = raise_argument_error(vm, "loop requires a body argument", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let mut result = vm.nil.clone();
    'outer: loop {
        let (value, stop) = eval_chain(vm, &body, locals);
        loop_step!(result, value, stop, 'outer);
    }
    (result, Stop::None)
}

fn for_fn(vm: &'static Vm, _target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let n = cursor.arg_count();
    if n < 4 {
        let exc = raise_argument_error(vm, "for expects (var, start, end, [step,] body)", cursor);
        return (exc.clone(), Stop::Exception(exc));
    }
    let var_name = cursor.arg_chain(0).unwrap()[0].text.clone();
    let start = arg!(vm, cursor, locals, 1);
    let end = arg!(vm, cursor, locals, 2);
    let (Some(start_n), Some(end_n)) = (start.with_tag(Tag::as_number), end.with_tag(Tag::as_number)) else {
        let exc = raise_argument_error(vm, "for expects Numbers for start/end", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let (step_n, body_idx) = if n >= 5 {
        let step = arg!(vm, cursor, locals, 3);
        let Some(s) = step.with_tag(Tag::as_number) else {
            let exc = raise_argument_error(vm, "for expects a Number step", cursor);
            return (exc.clone(), Stop::Exception(exc));
        };
        (s, 4)
    } else {
        (if start_n <= end_n { 1.0 } else { -1.0 }, 3)
    };
    let Some(body) = cursor.arg_chain(body_idx) else {
        let exc = raise_argument_error(vm, "for requires a body argument", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let mut i = start_n;
    let mut result = vm.nil.clone();
    'outer: loop {
        if step_n == 0.0 || (step_n > 0.0 && i > end_n) || (step_n < 0.0 && i < end_n) {
            break;
        }
        locals.set_slot(var_name.clone(), vm.make(Tag::Number(i)));
        let (value, stop) = eval_chain(vm, &body, locals);
        loop_step!(result, value, stop, 'outer);
        i += step_n;
    }
    (result, Stop::None)
}

fn foreach_slot_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    if cursor.arg_count() != 3 {
        let exc = raise_argument_error(vm, "foreachSlot expects (keyName, valueName, body)", cursor);
        return (exc.clone(), Stop::Exception(exc));
    }
    let k_name = cursor.arg_chain(0).unwrap()[0].text.clone();
    let v_name = cursor.arg_chain(1).unwrap()[0].text.clone();
    let body = cursor.arg_chain(2).unwrap();
    let mut result = vm.nil.clone();
    'outer: for (name, value) in target.local_slots_snapshot() {
        locals.set_slot(k_name.clone(), vm.make(Tag::Sequence(name.to_string())));
        locals.set_slot(v_name.clone(), value);
        let (val, stop) = eval_chain(vm, &body, locals);
        loop_step!(result, val, stop, 'outer);
    }
    (result, Stop::None)
}

/// The sibling messages following `cursor` up to (not including) the next
/// terminator, as their own chain. `return`/`break`/`continue`/`exit` are
/// ordinary identifiers to the parser -- `return 1` parses as two separate
/// nodes, `return` and `1`, since an identifier only gains args when
/// immediately followed by `(` (`parser.rs`'s `maybe_parse_paren_args`), and
/// `shuffle` never folds a trailing bare primary into a non-operator
/// message's args (`a foo bar` stays three separate sends). So the space
/// form's operand isn't an argument of the control-flow word at all -- it's
/// whatever comes after it in the chain, which this walks off the cursor
/// directly rather than out of `args()`.
fn remainder_chain(cursor: &MessageCursor) -> Option<MessageChain> {
    let mut nodes = Vec::new();
    let mut next = cursor.next();
    while let Some(n) = next {
        if n.is_terminator() {
            break;
        }
        nodes.push(n.node().clone());
        next = n.next();
    }
    (!nodes.is_empty()).then(|| Arc::from(nodes))
}

/// Evaluates the operand of a control-flow word: an explicit parenthesized
/// argument (`return(1)`) if present, otherwise the space-form remainder of
/// the statement (`return 1`), otherwise `default`.
fn capture_operand(vm: &'static Vm, locals: &ObjectRef, cursor: &MessageCursor, default: ObjectRef) -> (ObjectRef, Stop) {
    if let Some(chain) = cursor.arg_chain(0) {
        return eval_chain(vm, &chain, locals);
    }
    match remainder_chain(cursor) {
        Some(chain) => eval_chain(vm, &chain, locals),
        None => (default, Stop::None),
    }
}

fn break_fn(vm: &'static Vm, _target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let (value, stop) = capture_operand(vm, locals, cursor, vm.nil.clone());
    // Tie-break (§4.4): a stop raised while evaluating the operand wins over
    // the Break this call would otherwise produce.
    let resolved = first_non_none(Stop::None, stop);
    if !resolved.is_none() {
        return (value, resolved);
    }
    (value.clone(), Stop::Break(value))
}

fn continue_fn(vm: &'static Vm, _target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let (value, stop) = capture_operand(vm, locals, cursor, vm.nil.clone());
    let resolved = first_non_none(Stop::None, stop);
    if !resolved.is_none() {
        return (value, resolved);
    }
    (value.clone(), Stop::Continue(value))
}

fn return_fn(vm: &'static Vm, _target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let (value, stop) = capture_operand(vm, locals, cursor, vm.nil.clone());
    let resolved = first_non_none(Stop::None, stop);
    if !resolved.is_none() {
        return (value, resolved);
    }
    (value.clone(), Stop::Return(value))
}

fn exit_fn(vm: &'static Vm, _target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let (value, stop) = capture_operand(vm, locals, cursor, vm.make(Tag::Number(0.0)));
    if !stop.is_none() {
        return (value, stop);
    }
    (value.clone(), Stop::Exit(value))
}

// ---------------------------------------------------------------------
// callables
// ---------------------------------------------------------------------

fn make_callable(vm: &'static Vm, locals: &ObjectRef, cursor: &MessageCursor, lexical: bool, pass_stops: bool) -> (ObjectRef, Stop) {
    let n = cursor.arg_count();
    if n == 0 {
        let exc = raise_argument_error(vm, "block/method requires a body argument", cursor);
        return (exc.clone(), Stop::Exception(exc));
    }
    let body = cursor.arg_chain(n - 1).unwrap();
    let mut arg_names = Vec::with_capacity(n - 1);
    for i in 0..n - 1 {
        if let Some(chain) = cursor.arg_chain(i) {
            if let Some(first) = chain.first() {
                arg_names.push(first.text.clone());
            }
        }
    }
    let block = Block { message: body, lexical_self: lexical.then(|| locals.clone()), arg_names, activatable: true, pass_stops };
    (Object::new(Tag::Block(Arc::new(block)), [vm.base_object.clone()]), Stop::None)
}

fn block_fn(vm: &'static Vm, _target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    make_callable(vm, locals, cursor, true, true)
}

fn method_fn(vm: &'static Vm, _target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    make_callable(vm, locals, cursor, false, false)
}

// ---------------------------------------------------------------------
// coroutines & futures (§4.5, §4.6)
// ---------------------------------------------------------------------

fn async_send_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let Some(chain) = cursor.arg_chain(0) else {
        let exc = raise_argument_error(vm, "asyncSend requires a message argument", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let target = target.clone();
    let locals = locals.clone();
    let coro = crate::coroutine::CoroutineState::new(ObjectId::next());
    vm.scheduler.start(&coro);
    let thread_coro = coro.clone();
    thread::spawn(move || {
        with_current_coroutine(thread_coro.clone(), || {
            let _ = eval_chain_from(vm, &chain, &target, &locals);
        });
        vm.scheduler.finish(&thread_coro);
    });
    (vm.nil.clone(), Stop::None)
}

fn future_send_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let Some(chain) = cursor.arg_chain(0) else {
        let exc = raise_argument_error(vm, "futureSend requires a message argument", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let target = target.clone();
    let locals = locals.clone();
    let coro = crate::coroutine::CoroutineState::new(ObjectId::next());
    vm.scheduler.start(&coro);
    let state = Arc::new(FutureState::new(coro.clone()));
    let future_obj = vm.make(Tag::Future(state.clone()));
    let thread_coro = coro.clone();
    thread::spawn(move || {
        let result = with_current_coroutine(thread_coro.clone(), || {
            let (value, _stop) = eval_chain_from(vm, &chain, &target, &locals);
            value
        });
        state.fill(result);
        vm.scheduler.finish(&thread_coro);
    });
    (future_obj, Stop::None)
}

/// §4.6: awaits the producer's completion (registering with the scheduler,
/// then polling the fill flag between remote-stop checks) and re-dispatches
/// the triggering message -- `cursor`, unchanged from the failed lookup that
/// landed here -- against the filled result.
fn future_forward_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let Some(state) = target.with_tag(|t| t.as_future().cloned()) else {
        let exc = raise_type_mismatch(vm, "forward", target, cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let coro = current_coroutine().unwrap_or_else(|| vm.main_coroutine.clone());
    vm.scheduler.register_waiter(state.producer().id(), coro.clone());
    loop {
        if let Some(result) = state.result() {
            return crate::eval::eval_one(vm, &result, locals, cursor);
        }
        if let Some(stop) = coro.poll_remote_stop() {
            if !stop.is_scheduler_internal() {
                return (stop.payload().cloned().unwrap_or_else(|| vm.nil.clone()), stop);
            }
        }
        thread::yield_now();
    }
}

fn future_wait_on_result_fn(vm: &'static Vm, target: &ObjectRef, _locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let Some(state) = target.with_tag(|t| t.as_future().cloned()) else {
        let exc = raise_type_mismatch(vm, "waitOnResult", target, cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let coro = current_coroutine().unwrap_or_else(|| vm.main_coroutine.clone());
    vm.scheduler.register_waiter(state.producer().id(), coro.clone());
    loop {
        if state.result().is_some() {
            return (vm.nil.clone(), Stop::None);
        }
        if let Some(stop) = coro.poll_remote_stop() {
            if !stop.is_scheduler_internal() {
                return (stop.payload().cloned().unwrap_or_else(|| vm.nil.clone()), stop);
            }
        }
        thread::yield_now();
    }
}

fn wait_fn(vm: &'static Vm, _target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let secs = arg!(vm, cursor, locals, 0);
    let Some(n) = secs.with_tag(Tag::as_number) else {
        let exc = raise_argument_error(vm, "wait expects a Number of seconds", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    thread::sleep(std::time::Duration::from_secs_f64(n.max(0.0)));
    (vm.nil.clone(), Stop::None)
}

fn yield_fn(vm: &'static Vm, _target: &ObjectRef, _locals: &ObjectRef, _cursor: &MessageCursor) -> (ObjectRef, Stop) {
    thread::yield_now();
    (vm.nil.clone(), Stop::None)
}

/// A resume already queued before `pause` runs is a simple yield (§4.5); the
/// caller-checks-first contract documented on
/// [`crate::coroutine::CoroutineState::block_until_remote_stop`].
fn pause_fn(vm: &'static Vm, _target: &ObjectRef, _locals: &ObjectRef, _cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let coro = current_coroutine().unwrap_or_else(|| vm.main_coroutine.clone());
    if let Some(stop) = coro.poll_remote_stop() {
        return match stop {
            Stop::Resume => (vm.nil.clone(), Stop::None),
            other => (other.payload().cloned().unwrap_or_else(|| vm.nil.clone()), other),
        };
    }
    match coro.block_until_remote_stop() {
        Stop::Resume => (vm.nil.clone(), Stop::None),
        other => (other.payload().cloned().unwrap_or_else(|| vm.nil.clone()), other),
    }
}

fn resume_fn(vm: &'static Vm, _target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let coro_obj = arg!(vm, cursor, locals, 0);
    let Some(handle) = coro_obj.with_tag(|t| t.as_coroutine().cloned()) else {
        let exc = raise_argument_error(vm, "resume expects a Coroutine", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    handle.send_remote_stop(Stop::Resume);
    (vm.nil.clone(), Stop::None)
}

// ---------------------------------------------------------------------
// boolean / nil identity, lazy logical operators
// ---------------------------------------------------------------------

fn is_true_fn(vm: &'static Vm, target: &ObjectRef, _locals: &ObjectRef, _cursor: &MessageCursor) -> (ObjectRef, Stop) {
    (vm.bool_obj(is_truthy(vm, target)), Stop::None)
}

fn is_nil_fn(vm: &'static Vm, target: &ObjectRef, _locals: &ObjectRef, _cursor: &MessageCursor) -> (ObjectRef, Stop) {
    (vm.bool_obj(target.id() == vm.nil.id()), Stop::None)
}

fn not_fn(vm: &'static Vm, target: &ObjectRef, _locals: &ObjectRef, _cursor: &MessageCursor) -> (ObjectRef, Stop) {
    (vm.bool_obj(!is_truthy(vm, target)), Stop::None)
}

fn and_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    if !is_truthy(vm, target) {
        return (vm.bool_obj(false), Stop::None);
    }
    let Some(chain) = cursor.arg_chain(0) else {
        let exc = raise_argument_error(vm, "and requires an argument", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let (val, stop) = eval_chain(vm, &chain, locals);
    if !stop.is_none() {
        return (val, stop);
    }
    (vm.bool_obj(is_truthy(vm, &val)), Stop::None)
}

fn or_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    if is_truthy(vm, target) {
        return (vm.bool_obj(true), Stop::None);
    }
    let Some(chain) = cursor.arg_chain(0) else {
        let exc = raise_argument_error(vm, "or requires an argument", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let (val, stop) = eval_chain(vm, &chain, locals);
    if !stop.is_none() {
        return (val, stop);
    }
    (vm.bool_obj(is_truthy(vm, &val)), Stop::None)
}

fn eval_arg_fn(vm: &'static Vm, _target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    match cursor.arg_chain(0) {
        Some(chain) => eval_chain(vm, &chain, locals),
        None => (vm.nil.clone(), Stop::None),
    }
}

fn eval_arg_and_return_self_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let (_, stop) = eval_arg_fn(vm, target, locals, cursor);
    (target.clone(), stop)
}

fn eval_arg_and_return_nil_fn(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let (_, stop) = eval_arg_fn(vm, target, locals, cursor);
    (vm.nil.clone(), stop)
}

// ---------------------------------------------------------------------
// literal sugar (§6: "`[ ]` and `{ }` parse as calls to the squareBrackets
// and curlyBrackets identifiers"; a lone parenthesized group is "a call to
// the empty-name slot")
// ---------------------------------------------------------------------

fn square_brackets_fn(vm: &'static Vm, _target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let mut items = Vec::with_capacity(cursor.arg_count());
    for i in 0..cursor.arg_count() {
        let chain = cursor.arg_chain(i).unwrap();
        let (v, stop) = eval_chain(vm, &chain, locals);
        if !stop.is_none() {
            return (v, stop);
        }
        items.push(v);
    }
    (vm.make(Tag::List(items)), Stop::None)
}

/// `{ [k1, v1], [k2, v2] }` builds a Map from two-element association
/// lists (see DESIGN.md for why this shape was chosen over flat pairing).
fn curly_brackets_fn(vm: &'static Vm, _target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let mut map = ahash::AHashMap::default();
    for i in 0..cursor.arg_count() {
        let chain = cursor.arg_chain(i).unwrap();
        let (pair, stop) = eval_chain(vm, &chain, locals);
        if !stop.is_none() {
            return (pair, stop);
        }
        let Some(items) = pair.with_tag(|t| t.as_list().filter(|v| v.len() == 2).cloned()) else {
            let exc = raise_argument_error(vm, "curlyBrackets expects [key, value] pairs", cursor);
            return (exc.clone(), Stop::Exception(exc));
        };
        let Some(key) = items[0].with_tag(|t| t.as_sequence().map(Symbol::from)) else {
            let exc = raise_argument_error(vm, "Map keys must be Sequences", cursor);
            return (exc.clone(), Stop::Exception(exc));
        };
        map.insert(key, items[1].clone());
    }
    (vm.make(Tag::Map(map)), Stop::None)
}

fn empty_name_fn(vm: &'static Vm, _target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let mut result = vm.nil.clone();
    for i in 0..cursor.arg_count() {
        let chain = cursor.arg_chain(i).unwrap();
        let (value, stop) = eval_chain(vm, &chain, locals);
        if !stop.is_none() {
            return (value, stop);
        }
        result = value;
    }
    (result, Stop::None)
}

// ---------------------------------------------------------------------
// assignment (§6 operator table: `:=`, `=`, `<-`, `<->`)
// ---------------------------------------------------------------------

fn assign_create(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let name = cursor.arg_chain(0).unwrap()[0].text.clone();
    let Some(rhs) = cursor.arg_chain(1) else {
        let exc = raise_argument_error(vm, "assignment requires a right-hand side", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let (value, stop) = eval_chain(vm, &rhs, locals);
    if !stop.is_none() {
        return (value, stop);
    }
    target.set_slot(name, value.clone());
    (value, Stop::None)
}

fn assign_update(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let name = cursor.arg_chain(0).unwrap()[0].text.clone();
    let Some(rhs) = cursor.arg_chain(1) else {
        let exc = raise_argument_error(vm, "assignment requires a right-hand side", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let (value, stop) = eval_chain(vm, &rhs, locals);
    if !stop.is_none() {
        return (value, stop);
    }
    if object::update_slot(target, &name, value.clone()) {
        (value, Stop::None)
    } else {
        let exc = raise_argument_error(vm, &format!("'{name}' is not yet a slot anywhere in scope"), cursor);
        (exc.clone(), Stop::Exception(exc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn run(vm: &'static Vm, src: &str) -> (ObjectRef, Stop) {
        let chain = parse(src, "t", vm).unwrap();
        eval_chain(vm, &chain, &vm.lobby)
    }

    #[test]
    fn assignment_creates_a_slot_without_does_not_respond() {
        let vm = Vm::new().leak();
        let (result, stop) = run(vm, "a := 41 + 1\na");
        assert!(stop.is_none(), "{stop:?}");
        assert_eq!(result.with_tag(|t| t.as_number()), Some(42.0));
    }

    #[test]
    fn update_assignment_requires_existing_slot() {
        let vm = Vm::new().leak();
        let (_, stop) = run(vm, "neverDeclared = 1");
        assert!(matches!(stop, Stop::Exception(_)));
    }

    #[test]
    fn if_picks_branch_lazily() {
        let vm = Vm::new().leak();
        let (result, stop) = run(vm, "if(true, 1, 2)");
        assert!(stop.is_none());
        assert_eq!(result.with_tag(|t| t.as_number()), Some(1.0));
    }

    #[test]
    fn while_loop_accumulates_and_breaks() {
        let vm = Vm::new().leak();
        let (result, stop) = run(vm, "i := 0\nsum := 0\nwhile(i < 5, sum := sum + i; i := i + 1)\nsum");
        assert!(stop.is_none(), "{stop:?}");
        assert_eq!(result.with_tag(|t| t.as_number()), Some(10.0));
    }

    #[test]
    fn for_loop_is_inclusive_and_builds_a_list() {
        let vm = Vm::new().leak();
        let (result, stop) = run(vm, "l := []\nfor(i, 0, 2, l append(i))\nl size");
        assert!(stop.is_none(), "{stop:?}");
        assert_eq!(result.with_tag(|t| t.as_number()), Some(3.0));
    }

    #[test]
    fn break_inside_loop_ends_it_with_carried_value() {
        let vm = Vm::new().leak();
        let (result, stop) = run(vm, "loop(break(7))");
        assert!(stop.is_none(), "{stop:?}");
        assert_eq!(result.with_tag(|t| t.as_number()), Some(7.0));
    }

    #[test]
    fn break_continue_tie_break_prefers_inner_stop() {
        let vm = Vm::new().leak();
        // §4.4: "break(continue) yields continue" -- the inner stop produced
        // while evaluating break's own argument wins.
        let chain = parse("break(continue)", "t", vm).unwrap();
        let (_, stop) = eval_chain(vm, &chain, &vm.lobby);
        assert!(matches!(stop, Stop::Continue(_)), "{stop:?}");
    }

    #[test]
    fn try_swallows_only_exceptions() {
        let vm = Vm::new().leak();
        let (result, stop) = run(vm, "try(thisDoesNotExist)");
        assert!(stop.is_none(), "{stop:?}");
        assert_eq!(result.tag_name(), "Exception");
    }

    #[test]
    fn clone_runs_init_and_sets_sole_proto() {
        let vm = Vm::new().leak();
        let (result, stop) = run(vm, "Proto := Object clone\nProto init := method(self x := 9)\nProto clone x");
        assert!(stop.is_none(), "{stop:?}");
        assert_eq!(result.with_tag(|t| t.as_number()), Some(9.0));
    }

    #[test]
    fn method_call_returns_unwinds_only_the_method() {
        let vm = Vm::new().leak();
        let (result, stop) = run(vm, "f := method(return 1; 2)\nf");
        assert!(stop.is_none(), "{stop:?}");
        assert_eq!(result.with_tag(|t| t.as_number()), Some(1.0));
    }

    #[test]
    fn perform_dispatches_by_name_with_raw_args() {
        let vm = Vm::new().leak();
        let (result, stop) = run(vm, "3 perform(\"+\", 4)");
        assert!(stop.is_none(), "{stop:?}");
        assert_eq!(result.with_tag(|t| t.as_number()), Some(7.0));
    }

    #[test]
    fn lexical_do_restores_protos_after_exception() {
        let vm = Vm::new().leak();
        let obj = Object::plain([vm.base_object.clone()]);
        let before = obj.protos_snapshot().len();
        vm.lobby.set_slot(Symbol::from("o"), obj.clone());
        let (_, stop) = run(vm, "o lexicalDo(thisDoesNotExist)");
        assert!(matches!(stop, Stop::Exception(_)));
        assert_eq!(obj.protos_snapshot().len(), before);
    }
}
