//! Stable, GC-independent object identity.
//!
//! The grounding crate's heap (`HeapId`, an arena index) showed the shape of the
//! solution: identity should be a small `Copy` handle assigned once at allocation,
//! never derived from a pointer. Objects here are heap-allocated via `Arc` rather
//! than an arena, so a raw address would in fact be stable for the object's
//! lifetime -- but using one is exactly the trap §9's Open Question warns about:
//! it silently stops working the day anything compacts or relocates objects. A
//! monotonic counter has no such failure mode and costs one atomic increment per
//! `Object::new`.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A stable identity for one [`Object`](crate::object::Object), usable as a
/// hash-set key for proto-traversal cycle detection (§4.1) and for `isIdenticalTo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Allocates the next identity in sequence. Called exactly once per object,
    /// from `Object::new`.
    pub(crate) fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value, used for `uniqueId` and debug reprs.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_are_monotonic_and_unique() {
        let a = ObjectId::next();
        let b = ObjectId::next();
        assert_ne!(a, b);
        assert!(b.raw() > a.raw());
    }
}
