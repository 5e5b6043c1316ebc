//! Node and bucket-array allocation.
//!
//! Two independent capabilities, injected into a table at construction:
//! - `NodeAllocator<T>` owns every `HashNode<T>` and hands out stable
//!   generational `NodeId`s. Chains link nodes by id, so relocating a node
//!   between bucket arrays never moves or re-borrows it.
//! - `BucketAllocator` hands out zeroed `BucketArray`s (every chain empty)
//!   and takes them back without looking at the nodes they referenced.
//!
//! Node lifetime and bucket-array lifetime are deliberately decoupled: a
//! driver relocates every chain into the new array before releasing the
//! old one, so no node is ever unreachable mid-rehash.

use crate::hash_node::HashNode;
use core::alloc::Layout;
use hashbrown::TryReserveError;
use slotmap::{DefaultKey, SlotMap};

/// Stable handle to a node in a `NodeAllocator`.
///
/// Wraps a slotmap `DefaultKey`, so any allocator that stores nodes in a
/// `SlotMap<DefaultKey, _>` (or mints keys some other way) can hand out ids.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeId(DefaultKey);

impl NodeId {
    pub fn from_key(k: DefaultKey) -> Self {
        NodeId(k)
    }

    pub fn into_key(self) -> DefaultKey {
        self.0
    }
}

impl From<DefaultKey> for NodeId {
    fn from(k: DefaultKey) -> Self {
        NodeId(k)
    }
}

pub trait NodeAllocator<T> {
    /// Take ownership of `node` and return its id.
    fn allocate_node(&mut self, node: HashNode<T>) -> Result<NodeId, TryReserveError>;

    /// Construct the value in place. `make` runs only once room for the node
    /// is known to exist; if it panics nothing has been allocated.
    fn allocate_node_with<F>(&mut self, hash: u64, make: F) -> Result<NodeId, TryReserveError>
    where
        F: FnOnce() -> T;

    /// Allocate a copy of `src`, reusing its cached hash.
    fn copy_node(&mut self, src: &HashNode<T>) -> Result<NodeId, TryReserveError>
    where
        T: Clone,
    {
        self.allocate_node(src.clone())
    }

    /// Free the node's storage and hand its value back. The caller must
    /// have unlinked it from every chain.
    fn take_node(&mut self, id: NodeId) -> Option<T>;

    /// Free the node and drop its value. Returns false for a stale id.
    fn release_node(&mut self, id: NodeId) -> bool {
        self.take_node(id).is_some()
    }

    fn node(&self, id: NodeId) -> Option<&HashNode<T>>;

    fn node_mut(&mut self, id: NodeId) -> Option<&mut HashNode<T>>;

    /// Number of nodes allocated and not yet released.
    fn live_nodes(&self) -> usize;
}

pub trait BucketAllocator {
    /// Acquire `count` chain heads, all empty.
    fn allocate_buckets(&mut self, count: usize) -> Result<BucketArray, TryReserveError>;

    /// Give back an array. Referenced nodes are not touched; `count` must be
    /// the array's length.
    fn release_buckets(&mut self, array: BucketArray, count: usize);
}

/// Flat array of chain heads. Not an owner of nodes.
#[derive(Debug)]
pub struct BucketArray {
    heads: Box<[Option<NodeId>]>,
}

impl BucketArray {
    /// Zero-length array; allocates nothing.
    pub fn empty() -> Self {
        BucketArray {
            heads: Box::new([]),
        }
    }

    /// `count` empty chains, or an error if the memory source refuses.
    pub fn try_zeroed(count: usize) -> Result<Self, TryReserveError> {
        let layout = Layout::array::<Option<NodeId>>(count)
            .map_err(|_| TryReserveError::CapacityOverflow)?;
        let mut heads = Vec::new();
        heads
            .try_reserve_exact(count)
            .map_err(|_| TryReserveError::AllocError { layout })?;
        heads.resize(count, None);
        Ok(BucketArray {
            heads: heads.into_boxed_slice(),
        })
    }

    pub fn len(&self) -> usize {
        self.heads.len()
    }

    /// True for a zero-length array.
    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    /// Bucket that `hash` maps to. Panics on a zero-length array.
    #[inline]
    pub fn bucket_for(&self, hash: u64) -> usize {
        assert!(!self.heads.is_empty(), "no buckets to map into");
        (hash % self.heads.len() as u64) as usize
    }

    #[inline]
    pub fn head(&self, bucket: usize) -> Option<NodeId> {
        self.heads[bucket]
    }

    #[inline]
    pub fn set_head(&mut self, bucket: usize, head: Option<NodeId>) {
        self.heads[bucket] = head;
    }

    pub fn is_empty_chain(&self, bucket: usize) -> bool {
        self.heads[bucket].is_none()
    }

    /// True when every chain is empty.
    pub fn all_chains_empty(&self) -> bool {
        self.heads.iter().all(Option::is_none)
    }
}

// slotmap panics once it holds u32::MAX - 1 elements.
const MAX_NODES: usize = u32::MAX as usize - 1;

/// Arena-backed node allocator using generational keys.
#[derive(Debug)]
pub struct NodeArena<T> {
    slots: SlotMap<DefaultKey, HashNode<T>>,
}

impl<T> NodeArena<T> {
    pub fn new() -> Self {
        NodeArena {
            slots: SlotMap::with_key(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        NodeArena {
            slots: SlotMap::with_capacity_and_key(capacity),
        }
    }

    fn check_room(&self) -> Result<(), TryReserveError> {
        if self.slots.len() >= MAX_NODES {
            return Err(TryReserveError::CapacityOverflow);
        }
        Ok(())
    }
}

impl<T> Default for NodeArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> NodeAllocator<T> for NodeArena<T> {
    fn allocate_node(&mut self, node: HashNode<T>) -> Result<NodeId, TryReserveError> {
        self.check_room()?;
        Ok(NodeId::from_key(self.slots.insert(node)))
    }

    fn allocate_node_with<F>(&mut self, hash: u64, make: F) -> Result<NodeId, TryReserveError>
    where
        F: FnOnce() -> T,
    {
        self.check_room()?;
        let value = make();
        Ok(NodeId::from_key(self.slots.insert(HashNode::new(value, hash))))
    }

    fn take_node(&mut self, id: NodeId) -> Option<T> {
        debug_assert!(
            self.slots.get(id.into_key()).map_or(true, HashNode::is_unlinked),
            "released node is still linked into a chain"
        );
        self.slots.remove(id.into_key()).map(HashNode::into_value)
    }

    fn node(&self, id: NodeId) -> Option<&HashNode<T>> {
        self.slots.get(id.into_key())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut HashNode<T>> {
        self.slots.get_mut(id.into_key())
    }

    fn live_nodes(&self) -> usize {
        self.slots.len()
    }
}

/// Global-heap bucket allocator that tracks how many bucket slots are
/// still handed out.
#[derive(Debug, Default)]
pub struct HeapBuckets {
    outstanding: usize,
}

impl HeapBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bucket slots allocated and not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
}

impl BucketAllocator for HeapBuckets {
    fn allocate_buckets(&mut self, count: usize) -> Result<BucketArray, TryReserveError> {
        let array = BucketArray::try_zeroed(count)?;
        self.outstanding += count;
        Ok(array)
    }

    fn release_buckets(&mut self, array: BucketArray, count: usize) {
        assert_eq!(
            array.len(),
            count,
            "released bucket array length does not match count"
        );
        debug_assert!(self.outstanding >= count);
        self.outstanding = self.outstanding.saturating_sub(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct DropCount(Rc<Cell<u32>>);
    impl Drop for DropCount {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    /// Invariant: allocate then release leaves nothing held and drops the
    /// value exactly once.
    #[test]
    fn node_round_trip_releases_everything() {
        let drops = Rc::new(Cell::new(0));
        let mut arena = NodeArena::new();
        let id = arena
            .allocate_node(HashNode::new(DropCount(drops.clone()), 1))
            .unwrap();
        assert_eq!(arena.live_nodes(), 1);
        assert!(arena.release_node(id));
        assert_eq!(arena.live_nodes(), 0);
        assert_eq!(drops.get(), 1);
        assert!(!arena.release_node(id), "stale id must not release twice");
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn take_node_returns_value() {
        let mut arena = NodeArena::new();
        let id = arena.allocate_node(HashNode::new("v".to_string(), 3)).unwrap();
        assert_eq!(arena.node(id).map(HashNode::hash), Some(3));
        assert_eq!(arena.take_node(id), Some("v".to_string()));
        assert!(arena.node(id).is_none());
    }

    /// Invariant: a copied node keeps the source's cached hash.
    #[test]
    fn copy_node_reuses_hash() {
        let mut src = NodeArena::new();
        let mut dst = NodeArena::new();
        let a = src.allocate_node(HashNode::new(vec![1u8], 0xfeed)).unwrap();
        let b = dst.copy_node(src.node(a).unwrap()).unwrap();
        let copy = dst.node(b).unwrap();
        assert_eq!(copy.hash(), 0xfeed);
        assert_eq!(copy.value(), &vec![1u8]);
        assert!(copy.is_unlinked());
    }

    #[test]
    fn allocate_with_builds_in_place() {
        let mut arena: NodeArena<String> = NodeArena::with_capacity(4);
        let id = arena.allocate_node_with(9, || "built".to_string()).unwrap();
        let n = arena.node(id).unwrap();
        assert_eq!(n.value(), "built");
        assert_eq!(n.hash(), 9);
    }

    /// Invariant: a panicking constructor leaves no node behind.
    #[test]
    fn panicking_constructor_allocates_nothing() {
        let mut arena: NodeArena<String> = NodeArena::new();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = arena.allocate_node_with(1, || panic!("ctor failed"));
        }));
        assert!(res.is_err());
        assert_eq!(arena.live_nodes(), 0);
    }

    /// Invariant: freshly allocated bucket arrays hold only empty chains.
    #[test]
    fn buckets_start_empty() {
        let mut buckets = HeapBuckets::new();
        let arr = buckets.allocate_buckets(23).unwrap();
        assert_eq!(arr.len(), 23);
        assert!((0..23).all(|b| arr.is_empty_chain(b)));
        assert!(arr.all_chains_empty());
        assert_eq!(buckets.outstanding(), 23);
        buckets.release_buckets(arr, 23);
        assert_eq!(buckets.outstanding(), 0);
    }

    /// Invariant: releasing a bucket array leaves the nodes it referenced alive.
    #[test]
    fn releasing_buckets_keeps_nodes() {
        let mut arena = NodeArena::new();
        let mut buckets = HeapBuckets::new();
        let mut arr = buckets.allocate_buckets(5).unwrap();
        let id = arena.allocate_node(HashNode::new(7u32, 12)).unwrap();
        let b = arr.bucket_for(12);
        assert_eq!(b, 2);
        arr.set_head(b, Some(id));
        assert!(!arr.all_chains_empty());
        buckets.release_buckets(arr, 5);
        assert_eq!(arena.node(id).map(|n| *n.value()), Some(7));
    }

    #[test]
    fn oversized_bucket_request_overflows() {
        let mut buckets = HeapBuckets::new();
        match buckets.allocate_buckets(usize::MAX) {
            Err(TryReserveError::CapacityOverflow) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(buckets.outstanding(), 0);
    }

    #[test]
    #[should_panic(expected = "length does not match")]
    fn release_with_wrong_count_panics() {
        let mut buckets = HeapBuckets::new();
        let arr = buckets.allocate_buckets(5).unwrap();
        buckets.release_buckets(arr, 11);
    }

    #[test]
    fn node_id_round_trips_its_key() {
        let mut keys = SlotMap::new();
        let k = keys.insert(());
        let id = NodeId::from_key(k);
        assert_eq!(id.into_key(), k);
        assert_eq!(NodeId::from(k), id);
    }

    #[test]
    fn empty_array_allocates_nothing() {
        let arr = BucketArray::empty();
        assert_eq!(arr.len(), 0);
        assert!(arr.is_empty());
        assert!(arr.all_chains_empty());
    }
}
