//! HashNode: one chain entry with its cached hash and two arena links.

use crate::alloc::NodeId;

/// A value, its cached hash code and the links the driver threads through
/// the arena.
///
/// Links are plain `NodeId`s and own nothing; the node allocator owns every
/// node. `next`/`prev` form a doubly-linked chain within one bucket.
#[derive(Debug)]
pub struct HashNode<T> {
    value: T,
    hash: u64,
    pub next: Option<NodeId>,
    pub prev: Option<NodeId>,
}

impl<T> HashNode<T> {
    /// Unlinked node caching `hash` for `value`.
    pub fn new(value: T, hash: u64) -> Self {
        HashNode {
            value,
            hash,
            next: None,
            prev: None,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn into_value(self) -> T {
        self.value
    }

    /// True when neither link is set.
    pub fn is_unlinked(&self) -> bool {
        self.next.is_none() && self.prev.is_none()
    }
}

// Copies carry the cached hash but never the links: a copy belongs to no
// chain until the driver places it.
impl<T: Clone> Clone for HashNode<T> {
    fn clone(&self) -> Self {
        HashNode::new(self.value.clone(), self.hash)
    }
}

/// Equal iff hash codes match and values compare equal. Values are only
/// compared when the hashes agree.
impl<T: PartialEq> PartialEq for HashNode<T> {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.value == other.value
    }
}

impl<T: Eq> Eq for HashNode<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counted<'a> {
        v: i32,
        cmps: &'a Cell<u32>,
    }

    impl PartialEq for Counted<'_> {
        fn eq(&self, other: &Self) -> bool {
            self.cmps.set(self.cmps.get() + 1);
            self.v == other.v
        }
    }

    /// Invariant: differing hashes short-circuit before the value comparison.
    #[test]
    fn hash_mismatch_skips_value_eq() {
        let cmps = Cell::new(0);
        let a = HashNode::new(Counted { v: 1, cmps: &cmps }, 10);
        let b = HashNode::new(Counted { v: 1, cmps: &cmps }, 11);
        assert!(a != b);
        assert_eq!(cmps.get(), 0);

        let c = HashNode::new(Counted { v: 1, cmps: &cmps }, 10);
        assert!(a == c);
        assert_eq!(cmps.get(), 1);
    }

    #[test]
    fn equal_hash_different_values() {
        let a = HashNode::new("x", 7);
        let b = HashNode::new("y", 7);
        assert_ne!(a, b);
    }

    /// Invariant: a clone keeps the cached hash and drops both links.
    #[test]
    fn clone_copies_hash_not_links() {
        let mut keys = slotmap::SlotMap::<slotmap::DefaultKey, ()>::new();
        let k = NodeId::from_key(keys.insert(()));
        let mut a = HashNode::new(String::from("v"), 42);
        a.next = Some(k);
        a.prev = Some(k);
        let b = a.clone();
        assert_eq!(b.hash(), 42);
        assert_eq!(b.value(), "v");
        assert!(b.is_unlinked());
        assert!(!a.is_unlinked());
    }

    #[test]
    fn moving_keeps_hash() {
        let a = HashNode::new(vec![1, 2, 3], 99);
        let b = a;
        assert_eq!(b.hash(), 99);
        assert_eq!(b.into_value(), vec![1, 2, 3]);
    }
}
