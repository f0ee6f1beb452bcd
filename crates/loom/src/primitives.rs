//! The Number/Sequence/List/Map libraries (§1 "a small number of primitive
//! types"). Each proto is a plain object registered under `Core` by the
//! exact name `Tag::name()` returns, so `Vm::proto_for_tag`/`Vm::make` pick
//! it up automatically for every freshly tagged value.
//!
//! Generic concerns -- `asString`, identity-ordered `compare`, `clone` --
//! already live on `base_object` (`builtins.rs`) and apply to these tags
//! through ordinary proto lookup; this module only adds the operations that
//! are genuinely type-specific.

use ahash::AHashMap;

use crate::eval::{eval_arg, eval_chain, raise_argument_error, raise_type_mismatch};
use crate::message::MessageCursor;
use crate::object::{Object, ObjectRef, Symbol};
use crate::stop::Stop;
use crate::value::{CFunction, Tag};
use crate::vm::Vm;

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

fn is_number(t: &Tag) -> bool {
    matches!(t, Tag::Number(_))
}
fn is_sequence(t: &Tag) -> bool {
    matches!(t, Tag::Sequence(_))
}
fn is_list(t: &Tag) -> bool {
    matches!(t, Tag::List(_))
}
fn is_map(t: &Tag) -> bool {
    matches!(t, Tag::Map(_))
}

pub fn install(vm: &Vm) {
    install_number(vm);
    install_sequence(vm);
    install_list(vm);
    install_map(vm);
}

// ---------------------------------------------------------------------
// Number
// ---------------------------------------------------------------------

fn install_number(vm: &Vm) {
    let number = Object::plain([vm.base_object.clone()]);
    slot_typed!(vm, number, "+", is_number, num_add);
    slot_typed!(vm, number, "-", is_number, num_sub);
    slot_typed!(vm, number, "*", is_number, num_mul);
    slot_typed!(vm, number, "/", is_number, num_div);
    slot_typed!(vm, number, "%", is_number, num_mod);
    slot_typed!(vm, number, "**", is_number, num_pow);
    slot_typed!(vm, number, "compare", is_number, num_compare);
    vm.core.set_slot(Symbol::from("Number"), number);
}

fn num_binop(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor, op: fn(f64, f64) -> f64) -> (ObjectRef, Stop) {
    let a = target.with_tag(Tag::as_number).unwrap_or(0.0);
    let b = arg!(vm, cursor, locals, 0);
    let Some(bn) = b.with_tag(Tag::as_number) else {
        let exc = raise_type_mismatch(vm, "Number operator", &b, cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    (vm.make(Tag::Number(op(a, bn))), Stop::None)
}

fn num_add(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    num_binop(vm, target, locals, cursor, |a, b| a + b)
}
fn num_sub(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    num_binop(vm, target, locals, cursor, |a, b| a - b)
}
fn num_mul(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    num_binop(vm, target, locals, cursor, |a, b| a * b)
}
fn num_div(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    num_binop(vm, target, locals, cursor, |a, b| a / b)
}
fn num_mod(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    num_binop(vm, target, locals, cursor, |a, b| a % b)
}
fn num_pow(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    num_binop(vm, target, locals, cursor, f64::powf)
}

fn num_compare(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let a = target.with_tag(Tag::as_number).unwrap_or(0.0);
    let b = arg!(vm, cursor, locals, 0);
    let Some(bn) = b.with_tag(Tag::as_number) else {
        let exc = raise_type_mismatch(vm, "compare", &b, cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let sign = if a < bn { -1.0 } else if a > bn { 1.0 } else { 0.0 };
    (vm.make(Tag::Number(sign)), Stop::None)
}

// ---------------------------------------------------------------------
// Sequence
// ---------------------------------------------------------------------

fn install_sequence(vm: &Vm) {
    let sequence = Object::plain([vm.base_object.clone()]);
    slot_typed!(vm, sequence, "+", is_sequence, seq_concat);
    slot_typed!(vm, sequence, "size", is_sequence, seq_size);
    slot_typed!(vm, sequence, "at", is_sequence, seq_at);
    slot_typed!(vm, sequence, "compare", is_sequence, seq_compare);
    vm.core.set_slot(Symbol::from("Sequence"), sequence);
}

fn seq_concat(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let a = target.with_tag(|t| t.as_sequence().unwrap_or("").to_string());
    let b = arg!(vm, cursor, locals, 0);
    let Some(bs) = b.with_tag(|t| t.as_sequence().map(str::to_string)) else {
        let exc = raise_type_mismatch(vm, "+", &b, cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    (vm.make(Tag::Sequence(a + &bs)), Stop::None)
}

fn seq_size(vm: &'static Vm, target: &ObjectRef, _locals: &ObjectRef, _cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let n = target.with_tag(|t| t.as_sequence().map(str::len)).unwrap_or(0);
    (vm.make(Tag::Number(n as f64)), Stop::None)
}

fn seq_at(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let i = arg!(vm, cursor, locals, 0);
    let Some(idx) = i.with_tag(Tag::as_number) else {
        let exc = raise_argument_error(vm, "Sequence at expects a Number index", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let s = target.with_tag(|t| t.as_sequence().unwrap_or("").to_string());
    match s.chars().nth(idx as usize) {
        Some(c) => (vm.make(Tag::Sequence(c.to_string())), Stop::None),
        None => (vm.nil.clone(), Stop::None),
    }
}

fn seq_compare(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let a = target.with_tag(|t| t.as_sequence().unwrap_or("").to_string());
    let b = arg!(vm, cursor, locals, 0);
    let Some(bs) = b.with_tag(|t| t.as_sequence().map(str::to_string)) else {
        let exc = raise_type_mismatch(vm, "compare", &b, cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let sign = match a.as_str().cmp(bs.as_str()) {
        std::cmp::Ordering::Less => -1.0,
        std::cmp::Ordering::Equal => 0.0,
        std::cmp::Ordering::Greater => 1.0,
    };
    (vm.make(Tag::Number(sign)), Stop::None)
}

// ---------------------------------------------------------------------
// List
// ---------------------------------------------------------------------

fn install_list(vm: &Vm) {
    let list = Object::plain([vm.base_object.clone()]);
    slot_typed!(vm, list, "append", is_list, list_append);
    slot_typed!(vm, list, "at", is_list, list_at);
    slot_typed!(vm, list, "atPut", is_list, list_at_put);
    slot_typed!(vm, list, "size", is_list, list_size);
    slot_typed!(vm, list, "foreach", is_list, list_foreach);
    vm.core.set_slot(Symbol::from("List"), list);
}

fn list_append(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let v = arg!(vm, cursor, locals, 0);
    target.with_tag_mut(|t| {
        if let Tag::List(items) = t {
            items.push(v.clone());
        }
    });
    (target.clone(), Stop::None)
}

fn list_at(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let i = arg!(vm, cursor, locals, 0);
    let Some(idx) = i.with_tag(Tag::as_number) else {
        let exc = raise_argument_error(vm, "List at expects a Number index", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let item = target.with_tag(|t| t.as_list().and_then(|v| v.get(idx as usize).cloned()));
    (item.unwrap_or_else(|| vm.nil.clone()), Stop::None)
}

fn list_at_put(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let i = arg!(vm, cursor, locals, 0);
    let Some(idx) = i.with_tag(Tag::as_number) else {
        let exc = raise_argument_error(vm, "List atPut expects a Number index", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let v = arg!(vm, cursor, locals, 1);
    let ok = target.with_tag_mut(|t| match t {
        Tag::List(items) if (idx as usize) < items.len() => {
            items[idx as usize] = v.clone();
            true
        }
        _ => false,
    });
    if ok {
        (target.clone(), Stop::None)
    } else {
        let exc = raise_argument_error(vm, "List atPut: index out of range", cursor);
        (exc.clone(), Stop::Exception(exc))
    }
}

fn list_size(vm: &'static Vm, target: &ObjectRef, _locals: &ObjectRef, _cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let n = target.with_tag(|t| t.as_list().map(Vec::len)).unwrap_or(0);
    (vm.make(Tag::Number(n as f64)), Stop::None)
}

/// `foreach(item, body)` or `foreach(index, item, body)`, iterating a
/// snapshot of the list so mutation inside the body doesn't disturb the
/// walk (same rule `foreachSlot` uses for slots).
fn list_foreach(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let n = cursor.arg_count();
    let items = target.with_tag(|t| t.as_list().cloned()).unwrap_or_default();
    let mut result = vm.nil.clone();
    match n {
        2 => {
            let item_name = cursor.arg_chain(0).unwrap()[0].text.clone();
            let body = cursor.arg_chain(1).unwrap();
            for value in items {
                locals.set_slot(item_name.clone(), value);
                let (v, stop) = eval_chain(vm, &body, locals);
                match stop {
                    Stop::None => result = v,
                    Stop::Continue(c) => result = c,
                    Stop::Break(b) => {
                        result = b;
                        break;
                    }
                    other => return (v, other),
                }
            }
        }
        3 => {
            let idx_name = cursor.arg_chain(0).unwrap()[0].text.clone();
            let item_name = cursor.arg_chain(1).unwrap()[0].text.clone();
            let body = cursor.arg_chain(2).unwrap();
            for (i, value) in items.into_iter().enumerate() {
                locals.set_slot(idx_name.clone(), vm.make(Tag::Number(i as f64)));
                locals.set_slot(item_name.clone(), value);
                let (v, stop) = eval_chain(vm, &body, locals);
                match stop {
                    Stop::None => result = v,
                    Stop::Continue(c) => result = c,
                    Stop::Break(b) => {
                        result = b;
                        break;
                    }
                    other => return (v, other),
                }
            }
        }
        _ => {
            let exc = raise_argument_error(vm, "List foreach expects (item, body) or (index, item, body)", cursor);
            return (exc.clone(), Stop::Exception(exc));
        }
    }
    (result, Stop::None)
}

// ---------------------------------------------------------------------
// Map
// ---------------------------------------------------------------------

fn install_map(vm: &Vm) {
    let map = Object::plain([vm.base_object.clone()]);
    slot_typed!(vm, map, "atPut", is_map, map_at_put);
    slot_typed!(vm, map, "at", is_map, map_at);
    slot_typed!(vm, map, "hasKey", is_map, map_has_key);
    slot_typed!(vm, map, "size", is_map, map_size);
    slot_typed!(vm, map, "keys", is_map, map_keys);
    slot_typed!(vm, map, "foreach", is_map, map_foreach);
    vm.core.set_slot(Symbol::from("Map"), map);
}

fn map_at_put(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let k = arg!(vm, cursor, locals, 0);
    let Some(key) = k.with_tag(|t| t.as_sequence().map(Symbol::from)) else {
        let exc = raise_argument_error(vm, "Map atPut expects a Sequence key", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let v = arg!(vm, cursor, locals, 1);
    target.with_tag_mut(|t| {
        if let Tag::Map(m) = t {
            m.insert(key, v.clone());
        }
    });
    (target.clone(), Stop::None)
}

fn map_at(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let k = arg!(vm, cursor, locals, 0);
    let Some(key) = k.with_tag(|t| t.as_sequence().map(str::to_string)) else {
        let exc = raise_argument_error(vm, "Map at expects a Sequence key", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let value = target.with_tag(|t| t.as_map().and_then(|m| m.get(key.as_str()).cloned()));
    (value.unwrap_or_else(|| vm.nil.clone()), Stop::None)
}

fn map_has_key(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let k = arg!(vm, cursor, locals, 0);
    let Some(key) = k.with_tag(|t| t.as_sequence().map(str::to_string)) else {
        let exc = raise_argument_error(vm, "Map hasKey expects a Sequence key", cursor);
        return (exc.clone(), Stop::Exception(exc));
    };
    let has = target.with_tag(|t| t.as_map().is_some_and(|m| m.contains_key(key.as_str())));
    (vm.bool_obj(has), Stop::None)
}

fn map_size(vm: &'static Vm, target: &ObjectRef, _locals: &ObjectRef, _cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let n = target.with_tag(|t| t.as_map().map(AHashMap::len)).unwrap_or(0);
    (vm.make(Tag::Number(n as f64)), Stop::None)
}

fn map_keys(vm: &'static Vm, target: &ObjectRef, _locals: &ObjectRef, _cursor: &MessageCursor) -> (ObjectRef, Stop) {
    let keys = target.with_tag(|t| t.as_map().map(|m| m.keys().map(|k| vm.make(Tag::Sequence(k.to_string()))).collect())).unwrap_or_default();
    (vm.make(Tag::List(keys)), Stop::None)
}

fn map_foreach(vm: &'static Vm, target: &ObjectRef, locals: &ObjectRef, cursor: &MessageCursor) -> (ObjectRef, Stop) {
    if cursor.arg_count() != 3 {
        let exc = raise_argument_error(vm, "Map foreach expects (key, value, body)", cursor);
        return (exc.clone(), Stop::Exception(exc));
    }
    let k_name = cursor.arg_chain(0).unwrap()[0].text.clone();
    let v_name = cursor.arg_chain(1).unwrap()[0].text.clone();
    let body = cursor.arg_chain(2).unwrap();
    let entries = target.with_tag(|t| t.as_map().map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Vec<_>>())).unwrap_or_default();
    let mut result = vm.nil.clone();
    for (k, v) in entries {
        locals.set_slot(k_name.clone(), vm.make(Tag::Sequence(k.to_string())));
        locals.set_slot(v_name.clone(), v);
        let (val, stop) = eval_chain(vm, &body, locals);
        match stop {
            Stop::None => result = val,
            Stop::Continue(c) => result = c,
            Stop::Break(b) => {
                result = b;
                break;
            }
            other => return (val, other),
        }
    }
    (result, Stop::None)
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
    fn number_arithmetic_and_compare() {
        let vm = Vm::new().leak();
        let (result, stop) = run(vm, "(3 + 4) * 2");
        assert!(stop.is_none(), "{stop:?}");
        assert_eq!(result.with_tag(|t| t.as_number()), Some(14.0));

        let (result, stop) = run(vm, "3 < 4");
        assert!(stop.is_none());
        assert_eq!(result.id(), vm.true_obj.id());
    }

    #[test]
    fn sequence_concat_and_size() {
        let vm = Vm::new().leak();
        let (result, stop) = run(vm, "(\"foo\" + \"bar\") size");
        assert!(stop.is_none(), "{stop:?}");
        assert_eq!(result.with_tag(|t| t.as_number()), Some(6.0));
    }

    #[test]
    fn sequence_compare_is_lexicographic() {
        let vm = Vm::new().leak();
        let (result, stop) = run(vm, "\"abc\" < \"abd\"");
        assert!(stop.is_none(), "{stop:?}");
        assert_eq!(result.id(), vm.true_obj.id());
    }

    #[test]
    fn list_append_at_and_size() {
        let vm = Vm::new().leak();
        let (result, stop) = run(vm, "l := []\nl append(10)\nl append(20)\nl at(1)");
        assert!(stop.is_none(), "{stop:?}");
        assert_eq!(result.with_tag(|t| t.as_number()), Some(20.0));
    }

    #[test]
    fn list_foreach_sums_items() {
        let vm = Vm::new().leak();
        let (result, stop) = run(vm, "l := [1, 2, 3]\nsum := 0\nl foreach(x, sum := sum + x)\nsum");
        assert!(stop.is_none(), "{stop:?}");
        assert_eq!(result.with_tag(|t| t.as_number()), Some(6.0));
    }

    #[test]
    fn map_at_put_and_has_key() {
        let vm = Vm::new().leak();
        let (result, stop) = run(vm, "m := {}\nm atPut(\"a\", 1)\nm hasKey(\"a\")");
        assert!(stop.is_none(), "{stop:?}");
        assert_eq!(result.id(), vm.true_obj.id());
    }
}
