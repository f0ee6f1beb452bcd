//! The object/slot model and prototype lookup (§3 "Object"/"Slot", §4.1).
//!
//! Every value in the language is an `Object`: a locked bundle of named slots,
//! an ordered list of protos, and an optional tagged payload. Unlike the
//! grounding crate's arena-of-indices heap (`HeapId` into a central `Heap`),
//! objects here are individually heap-allocated and shared via `Arc` -- the
//! language has no global GC pass to justify an arena, and `Arc` gives the
//! "retained for the interpreter's lifetime" singletons (§3) a natural home
//! with no separate heap-sweep bookkeeping. Identity (`ObjectId`) is assigned
//! once at construction, independent of the `Arc`'s address, per the GC-stable
//! identity requirement resolved in DESIGN.md.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, Mutex, MutexGuard},
};

use ahash::{AHashMap, AHashSet};
use smallvec::SmallVec;

use crate::identity::ObjectId;
use crate::value::Tag;

/// Interned-by-content slot/argument name. Slot names are small and compared
/// often (every message send does a lookup); `Arc<str>` makes clones cheap
/// without a global interner table to maintain.
pub type Symbol = Arc<str>;

/// A shared handle to an [`Object`]. Every reference to a value in the
/// language is one of these.
pub type ObjectRef = Arc<Object>;

/// Typical proto-list length without spilling to the heap (single inheritance
/// is the overwhelmingly common case; multiple inheritance is rare but legal).
type ProtoList = SmallVec<[ObjectRef; 2]>;

/// The universal value (§3).
pub struct Object {
    id: ObjectId,
    /// Guards `slots`, `protos`, and `tag` together -- exactly the set of
    /// fields §3 calls mutable, and exactly what must be held for the shortest
    /// viable interval per §4.1's algorithm and §5's shared-resource policy.
    inner: Mutex<ObjectInner>,
}

struct ObjectInner {
    slots: AHashMap<Symbol, ObjectRef>,
    protos: ProtoList,
    tag: Tag,
}

impl Object {
    /// Allocates a new object with the given payload tag and proto list.
    #[must_use]
    pub fn new(tag: Tag, protos: impl IntoIterator<Item = ObjectRef>) -> ObjectRef {
        Arc::new(Self {
            id: ObjectId::next(),
            inner: Mutex::new(ObjectInner {
                slots: AHashMap::default(),
                protos: protos.into_iter().collect(),
                tag,
            }),
        })
    }

    /// Allocates a plain (untagged) object -- the common case for `clone` and
    /// for objects built directly from the language (`Object clone`).
    #[must_use]
    pub fn plain(protos: impl IntoIterator<Item = ObjectRef>) -> ObjectRef {
        Self::new(Tag::None, protos)
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, ObjectInner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Runs `f` with shared access to the tag. Takes the object's lock for the
    /// duration of `f`; callers that only need to *copy* the payload should
    /// prefer [`Object::tag_snapshot`] to release the lock sooner.
    pub fn with_tag<R>(&self, f: impl FnOnce(&Tag) -> R) -> R {
        f(&self.lock().tag)
    }

    /// Runs `f` with exclusive access to the tag, for primitives that mutate
    /// their payload in place (e.g. appending to a List).
    pub fn with_tag_mut<R>(&self, f: impl FnOnce(&mut Tag) -> R) -> R {
        f(&mut self.lock().tag)
    }

    #[must_use]
    pub fn tag_name(&self) -> &'static str {
        self.lock().tag.name()
    }

    // -- slots ---------------------------------------------------------

    /// `getLocalSlot`: consults only this object's own slots.
    #[must_use]
    pub fn get_local_slot(&self, name: &str) -> Option<ObjectRef> {
        self.lock().slots.get(name).cloned()
    }

    #[must_use]
    pub fn has_local_slot(&self, name: &str) -> bool {
        self.lock().slots.contains_key(name)
    }

    /// `setSlot`: local slot write, creating or overwriting.
    pub fn set_slot(&self, name: Symbol, value: ObjectRef) {
        self.lock().slots.insert(name, value);
    }

    /// `removeSlot`: local-only removal. Returns whether a slot was present.
    pub fn remove_slot(&self, name: &str) -> bool {
        self.lock().slots.remove(name).is_some()
    }

    pub fn remove_all_slots(&self) {
        self.lock().slots.clear();
    }

    /// Snapshot of local slot names, insertion order not observable (§3).
    #[must_use]
    pub fn local_slot_names(&self) -> Vec<Symbol> {
        self.lock().slots.keys().cloned().collect()
    }

    /// Snapshot of local slot values, parallel to `local_slot_names`.
    #[must_use]
    pub fn local_slot_values(&self) -> Vec<ObjectRef> {
        self.lock().slots.values().cloned().collect()
    }

    /// Snapshot of local (name, value) pairs. Used by `foreachSlot`, which
    /// iterates "a snapshot of the receiver's local slots" per §4.7 so that
    /// mutating slots during the loop body doesn't affect which slots are
    /// visited.
    #[must_use]
    pub fn local_slots_snapshot(&self) -> Vec<(Symbol, ObjectRef)> {
        self.lock().slots.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    // -- protos ----------------------------------------------------------

    #[must_use]
    pub fn protos_snapshot(&self) -> ProtoList {
        self.lock().protos.clone()
    }

    pub fn append_proto(&self, proto: ObjectRef) {
        self.lock().protos.push(proto);
    }

    pub fn prepend_proto(&self, proto: ObjectRef) {
        self.lock().protos.insert(0, proto);
    }

    /// Removes every proto with the given identity. Returns whether any were
    /// removed.
    pub fn remove_proto(&self, proto: &ObjectRef) -> bool {
        let mut inner = self.lock();
        let before = inner.protos.len();
        inner.protos.retain(|p| p.id() != proto.id());
        inner.protos.len() != before
    }

    /// `setProto`: replaces the whole proto list with a single proto.
    pub fn set_proto(&self, proto: ObjectRef) {
        let mut inner = self.lock();
        inner.protos = SmallVec::from_iter([proto]);
    }

    /// `setProtos`: replaces the whole proto list wholesale.
    pub fn set_protos(&self, protos: Vec<ObjectRef>) {
        self.lock().protos = protos.into_iter().collect();
    }

    pub fn remove_all_protos(&self) {
        self.lock().protos.clear();
    }

    /// Used by `lexicalDo`, which must restore the proto list on every exit
    /// path including an exception unwind -- callers wrap this in a scope
    /// guard rather than calling it only on the success path.
    pub fn restore_protos(&self, protos: ProtoList) {
        self.lock().protos = protos;
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Object {}

impl Hash for Object {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id)
            .field("tag", &self.tag_name())
            .finish_non_exhaustive()
    }
}

/// `getSlot(obj, name)`: depth-first prototype lookup with cycle-break by
/// identity set (§4.1's algorithm). Returns `(value, owner)` where `owner` is
/// the proto that actually held the slot locally (`obj` itself, for a local
/// hit).
///
/// Locks are held only long enough to check the local slot map and copy out
/// the proto list; the object is unlocked before its protos are visited, so a
/// cyclic or deeply shared proto graph never holds more than one lock at a
/// time.
#[must_use]
pub fn get_slot(obj: &ObjectRef, name: &str) -> Option<(ObjectRef, ObjectRef)> {
    if let Some(value) = obj.get_local_slot(name) {
        return Some((value, obj.clone()));
    }
    let mut visited: AHashSet<ObjectId> = AHashSet::default();
    visited.insert(obj.id());
    let mut stack: Vec<ObjectRef> = obj.protos_snapshot().into_iter().rev().collect();
    while let Some(proto) = stack.pop() {
        if !visited.insert(proto.id()) {
            continue;
        }
        if let Some(value) = proto.get_local_slot(name) {
            return Some((value, proto));
        }
        let grandparents = proto.protos_snapshot();
        stack.extend(grandparents.into_iter().filter(|p| !visited.contains(&p.id())).rev());
    }
    None
}

/// `ancestorWithSlot`: like [`get_slot`] but starts searching at `obj`'s
/// protos, excluding `obj` itself, and returns only the owning proto.
#[must_use]
pub fn ancestor_with_slot(obj: &ObjectRef, name: &str) -> Option<ObjectRef> {
    let mut visited: AHashSet<ObjectId> = AHashSet::default();
    visited.insert(obj.id());
    let mut stack: Vec<ObjectRef> = obj.protos_snapshot().into_iter().rev().collect();
    while let Some(proto) = stack.pop() {
        if !visited.insert(proto.id()) {
            continue;
        }
        if proto.has_local_slot(name) {
            return Some(proto);
        }
        let grandparents = proto.protos_snapshot();
        stack.extend(grandparents.into_iter().filter(|p| !visited.contains(&p.id())).rev());
    }
    None
}

/// `updateSlot`: writes to the first ancestor (including `obj` itself) that
/// already has the slot locally. Returns `false` (caller raises) if no
/// ancestor has it.
#[must_use]
pub fn update_slot(obj: &ObjectRef, name: &Symbol, value: ObjectRef) -> bool {
    if obj.has_local_slot(name) {
        obj.set_slot(name.clone(), value);
        return true;
    }
    if let Some(owner) = ancestor_with_slot(obj, name) {
        owner.set_slot(name.clone(), value);
        true
    } else {
        false
    }
}

/// `isKindOf`: walks the proto graph with its own visited set, independent of
/// [`get_slot`]'s scratch space, per §4.1.
#[must_use]
pub fn is_kind_of(obj: &ObjectRef, proto: &ObjectRef) -> bool {
    if obj.id() == proto.id() {
        return true;
    }
    let mut visited: AHashSet<ObjectId> = AHashSet::default();
    visited.insert(obj.id());
    let mut stack: Vec<ObjectRef> = obj.protos_snapshot().into_iter().collect();
    while let Some(p) = stack.pop() {
        if p.id() == proto.id() {
            return true;
        }
        if !visited.insert(p.id()) {
            continue;
        }
        stack.extend(p.protos_snapshot());
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Tag;

    fn leaf() -> ObjectRef {
        Object::plain([])
    }

    #[test]
    fn set_then_get_local_slot() {
        let o = leaf();
        o.set_slot(Symbol::from("x"), leaf());
        assert!(o.get_local_slot("x").is_some());
        assert!(o.get_local_slot("y").is_none());
    }

    #[test]
    fn remove_slot_clears_it() {
        let o = leaf();
        o.set_slot(Symbol::from("x"), leaf());
        assert!(o.remove_slot("x"));
        assert!(o.get_local_slot("x").is_none());
    }

    #[test]
    fn proto_chain_delegates_three_deep() {
        let a = leaf();
        let marker = leaf();
        a.set_slot(Symbol::from("s"), marker.clone());
        let b = Object::plain([a.clone()]);
        let c = Object::plain([b.clone()]);
        let (value, owner) = get_slot(&c, "s").expect("slot found via proto chain");
        assert_eq!(value.id(), marker.id());
        assert_eq!(owner.id(), a.id());
    }

    #[test]
    fn cyclic_protos_terminate_and_miss() {
        let a = leaf();
        let b = leaf();
        a.append_proto(b.clone());
        b.append_proto(a.clone());
        assert!(get_slot(&a, "nope").is_none());
        assert!(is_kind_of(&a, &b));
        assert!(is_kind_of(&b, &a));
    }

    #[test]
    fn update_slot_writes_to_owning_ancestor() {
        let a = leaf();
        a.set_slot(Symbol::from("x"), leaf());
        let b = Object::plain([a.clone()]);
        let new_val = leaf();
        assert!(update_slot(&b, &Symbol::from("x"), new_val.clone()));
        assert!(b.get_local_slot("x").is_none(), "updateSlot must not create a local slot");
        assert_eq!(a.get_local_slot("x").unwrap().id(), new_val.id());
    }

    #[test]
    fn update_slot_fails_when_absent() {
        let a = leaf();
        assert!(!update_slot(&a, &Symbol::from("missing"), leaf()));
    }

    #[test]
    fn tag_name_reports_payload_kind() {
        let n = Object::new(Tag::Number(1.0), []);
        assert_eq!(n.tag_name(), "Number");
    }
}
