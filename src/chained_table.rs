//! ChainedTable: a separate-chaining map driven by `RehashPolicy` and the
//! node/bucket allocators.
//!
//! Growth follows one fixed order: ask the policy, allocate the new bucket
//! array, relocate every node by its cached hash, release the old array.
//! In `Incremental` mode the relocation is spread over later writes (or
//! explicit `rehash_step` calls) and lookups consult both arrays until the
//! old one is drained.

use crate::alloc::{BucketAllocator, BucketArray, HeapBuckets, NodeAllocator, NodeArena, NodeId};
use crate::busy::BusyFlag;
use crate::hash_node::HashNode;
use crate::rehash_policy::{RehashCursor, RehashDecision, RehashPolicy, RehashStatus};
use core::borrow::Borrow;
use core::hash::{BuildHasher, Hash};
use core::marker::PhantomData;
use hashbrown::TryReserveError;
use std::collections::hash_map::RandomState;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle(NodeId);

impl Handle {
    pub fn key<'a, K, V, S, N, B>(&self, table: &'a ChainedTable<K, V, S, N, B>) -> Option<&'a K>
    where
        N: NodeAllocator<(K, V)>,
        B: BucketAllocator,
    {
        table.nodes.node(self.0).map(|n| &n.value().0)
    }

    pub fn value<'a, K, V, S, N, B>(&self, table: &'a ChainedTable<K, V, S, N, B>) -> Option<&'a V>
    where
        N: NodeAllocator<(K, V)>,
        B: BucketAllocator,
    {
        table.nodes.node(self.0).map(|n| &n.value().1)
    }

    pub fn value_mut<'a, K, V, S, N, B>(
        &self,
        table: &'a mut ChainedTable<K, V, S, N, B>,
    ) -> Option<&'a mut V>
    where
        N: NodeAllocator<(K, V)>,
        B: BucketAllocator,
    {
        table.nodes.node_mut(self.0).map(|n| &mut n.value_mut().1)
    }
}

#[derive(Debug)]
pub enum InsertError {
    DuplicateKey,
    Alloc(TryReserveError),
}

impl From<TryReserveError> for InsertError {
    fn from(e: TryReserveError) -> Self {
        InsertError::Alloc(e)
    }
}

/// How relocation work is scheduled once the policy asks for growth.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum RehashMode {
    /// Relocate every node before the triggering insert returns.
    #[default]
    Atomic,
    /// Relocate at most `quota` old buckets per write.
    Incremental { quota: usize },
}

/// Construction-time settings.
#[derive(Clone, Debug, Default)]
pub struct TableConfig {
    pub policy: RehashPolicy,
    pub mode: RehashMode,
}

pub struct ChainedTable<K, V, S = RandomState, N = NodeArena<(K, V)>, B = HeapBuckets>
where
    N: NodeAllocator<(K, V)>,
    B: BucketAllocator,
{
    hasher: S,
    policy: RehashPolicy,
    mode: RehashMode,
    nodes: N,
    bucket_alloc: B,
    buckets: BucketArray,
    // Array being drained while an incremental migration runs.
    old: Option<BucketArray>,
    len: usize,
    busy: BusyFlag,
    _kv: PhantomData<(K, V)>,
}

impl<K, V> ChainedTable<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }

    pub fn with_config(config: TableConfig) -> Self {
        Self::with_config_and_hasher(config, Default::default())
    }

    /// Fixed-capacity table: the bucket count is the smallest tabulated size
    /// `>= buckets` and never changes. Inserts past the load factor are
    /// accepted and lengthen the chains.
    pub fn with_fixed_buckets(buckets: usize) -> Result<Self, TryReserveError> {
        let mut t = Self::with_config(TableConfig {
            policy: RehashPolicy::fixed(),
            mode: RehashMode::Atomic,
        });
        t.allocate_initial(buckets)?;
        Ok(t)
    }
}

impl<K, V> Default for ChainedTable<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> ChainedTable<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_config_and_hasher(TableConfig::default(), hasher)
    }

    pub fn with_config_and_hasher(config: TableConfig, hasher: S) -> Self {
        Self::with_allocators(config, hasher, NodeArena::new(), HeapBuckets::new())
    }
}

/// Iterator over `(Handle, &K, &V)`; each live entry is yielded once.
pub struct Iter<'a, K, V, N> {
    nodes: &'a N,
    arrays: [Option<&'a BucketArray>; 2],
    side: usize,
    bucket: usize,
    cur: Option<NodeId>,
    remaining: usize,
    _pd: PhantomData<&'a (K, V)>,
}

impl<'a, K: 'a, V: 'a, N> Iterator for Iter<'a, K, V, N>
where
    N: NodeAllocator<(K, V)>,
{
    type Item = (Handle, &'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(id) = self.cur {
                let node = self.nodes.node(id)?;
                self.cur = node.next;
                self.remaining = self.remaining.saturating_sub(1);
                let (k, v) = node.value();
                return Some((Handle(id), k, v));
            }
            match self.arrays.get(self.side).copied()? {
                Some(a) if self.bucket < a.len() => {
                    self.cur = a.head(self.bucket);
                    self.bucket += 1;
                }
                _ => {
                    self.side += 1;
                    self.bucket = 0;
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

fn node_of<T, N: NodeAllocator<T>>(nodes: &N, id: NodeId) -> &HashNode<T> {
    nodes.node(id).expect("chain links a released node")
}

fn node_of_mut<T, N: NodeAllocator<T>>(nodes: &mut N, id: NodeId) -> &mut HashNode<T> {
    nodes.node_mut(id).expect("chain links a released node")
}

/// Push `id` onto the front of its chain in `array`.
fn link_front<T, N: NodeAllocator<T>>(nodes: &mut N, array: &mut BucketArray, id: NodeId, hash: u64) {
    let b = array.bucket_for(hash);
    let head = array.head(b);
    if let Some(h) = head {
        node_of_mut(nodes, h).prev = Some(id);
    }
    let n = node_of_mut(nodes, id);
    n.next = head;
    n.prev = None;
    array.set_head(b, Some(id));
}

/// Move every node of `from[bucket]` into `into`, leaving that chain empty.
fn relocate_chain<T, N: NodeAllocator<T>>(
    nodes: &mut N,
    into: &mut BucketArray,
    from: &mut BucketArray,
    bucket: usize,
) {
    let mut cur = from.head(bucket);
    from.set_head(bucket, None);
    while let Some(id) = cur {
        let n = node_of_mut(nodes, id);
        cur = n.next;
        let hash = n.hash();
        link_front(nodes, into, id, hash);
    }
}

/// Zero-length arrays never came from the allocator; skip them.
fn release_array<B: BucketAllocator>(alloc: &mut B, array: BucketArray) {
    if !array.is_empty() {
        let n = array.len();
        alloc.release_buckets(array, n);
    }
}

impl<K, V, S, N, B> ChainedTable<K, V, S, N, B>
where
    K: Eq + Hash,
    S: BuildHasher,
    N: NodeAllocator<(K, V)>,
    B: BucketAllocator,
{
    /// Table with explicit node and bucket allocators. Starts with zero
    /// buckets; the first insert allocates.
    pub fn with_allocators(config: TableConfig, hasher: S, nodes: N, bucket_alloc: B) -> Self {
        ChainedTable {
            hasher,
            policy: config.policy,
            mode: config.mode,
            nodes,
            bucket_alloc,
            buckets: BucketArray::empty(),
            old: None,
            len: 0,
            busy: BusyFlag::new(),
            _kv: PhantomData,
        }
    }

    fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        let _b = self.busy.hold();
        self.hasher.hash_one(q)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bucket count of the current (receiving) array.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn load_factor(&self) -> f32 {
        if self.buckets.is_empty() {
            return 0.0;
        }
        self.len as f32 / self.buckets.len() as f32
    }

    pub fn policy(&self) -> &RehashPolicy {
        &self.policy
    }

    pub fn is_rehashing(&self) -> bool {
        self.old.is_some()
    }

    pub fn node_allocator(&self) -> &N {
        &self.nodes
    }

    pub fn bucket_allocator(&self) -> &B {
        &self.bucket_alloc
    }

    fn find_in<Q>(&self, array: &BucketArray, hash: u64, q: &Q) -> Option<NodeId>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        if array.is_empty() {
            return None;
        }
        let mut cur = array.head(array.bucket_for(hash));
        while let Some(id) = cur {
            let n = node_of(&self.nodes, id);
            if n.hash() == hash && n.value().0.borrow() == q {
                return Some(id);
            }
            cur = n.next;
        }
        None
    }

    fn find_node<Q>(&self, hash: u64, q: &Q) -> Option<NodeId>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let _b = self.busy.hold();
        self.find_in(&self.buckets, hash, q)
            .or_else(|| self.old.as_ref().and_then(|old| self.find_in(old, hash, q)))
    }

    pub fn find<Q>(&self, q: &Q) -> Option<Handle>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(q);
        self.find_node(hash, q).map(Handle)
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find(q).is_some()
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let id = self.find(q)?.0;
        self.nodes.node(id).map(|n| &n.value().1)
    }

    pub fn insert(&mut self, key: K, value: V) -> Result<Handle, InsertError> {
        self.insert_with(key, move || value)
    }

    /// Insert `key` with a lazily built value. `make` runs only when the key
    /// is new and room for it has been secured.
    pub fn insert_with<F>(&mut self, key: K, make: F) -> Result<Handle, InsertError>
    where
        F: FnOnce() -> V,
    {
        let hash = self.make_hash(&key);
        if self.find_node(hash, &key).is_some() {
            return Err(InsertError::DuplicateKey);
        }
        self.step_on_write();
        self.grow_for(1)?;
        if self.buckets.is_empty() {
            self.allocate_initial(0)?;
        }
        let id = self.nodes.allocate_node_with(hash, move || (key, make()))?;
        link_front(&mut self.nodes, &mut self.buckets, id, hash);
        self.len += 1;
        Ok(Handle(id))
    }

    /// Remove the entry behind `handle`. Stale handles return `None`.
    pub fn remove(&mut self, handle: Handle) -> Option<(K, V)> {
        let id = handle.0;
        let n = self.nodes.node(id)?;
        let (hash, prev, next) = (n.hash(), n.prev, n.next);

        match prev {
            Some(p) => node_of_mut(&mut self.nodes, p).next = next,
            None => {
                // Chain head: in the receiving array or, mid-migration, the
                // old one.
                let in_new = !self.buckets.is_empty()
                    && self.buckets.head(self.buckets.bucket_for(hash)) == Some(id);
                if in_new {
                    let b = self.buckets.bucket_for(hash);
                    self.buckets.set_head(b, next);
                } else if let Some(old) = self.old.as_mut() {
                    let b = old.bucket_for(hash);
                    debug_assert_eq!(old.head(b), Some(id));
                    old.set_head(b, next);
                }
            }
        }
        if let Some(nx) = next {
            node_of_mut(&mut self.nodes, nx).prev = prev;
        }
        let n = node_of_mut(&mut self.nodes, id);
        n.next = None;
        n.prev = None;

        self.len -= 1;
        let kv = self.nodes.take_node(id);
        self.step_on_write();
        kv
    }

    pub fn remove_key<Q>(&mut self, q: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let h = self.find(q)?;
        self.remove(h)
    }

    /// Make room for `additional` more entries in one growth decision.
    pub fn reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        self.grow_for(additional)
    }

    /// Relocate at most `quota` old buckets (at least one) of an in-flight
    /// migration.
    pub fn rehash_step(&mut self, quota: usize) -> RehashStatus {
        let Some(mut old) = self.old.take() else {
            return RehashStatus::Idle;
        };
        let start = self.policy.cursor().position().offset;
        let end = start.saturating_add(quota.max(1)).min(old.len());
        for bucket in start..end {
            relocate_chain(&mut self.nodes, &mut self.buckets, &mut old, bucket);
        }
        let offset = self.policy.cursor_mut().advance(end - start);
        if offset < old.len() {
            log::trace!("relocated old buckets {start}..{end} of {}", old.len());
            self.old = Some(old);
            return RehashStatus::Paused;
        }
        debug_assert!(old.all_chains_empty());
        release_array(&mut self.bucket_alloc, old);
        self.policy.cursor_mut().finish();
        log::debug!("migration into {} buckets complete", self.buckets.len());
        RehashStatus::Completed
    }

    pub fn iter(&self) -> Iter<'_, K, V, N> {
        Iter {
            nodes: &self.nodes,
            arrays: [Some(&self.buckets), self.old.as_ref()],
            side: 0,
            bucket: 0,
            cur: None,
            remaining: self.len,
            _pd: PhantomData,
        }
    }

    /// Deep copy that reuses every node's cached hash instead of hashing
    /// keys again.
    pub fn try_clone(&self) -> Result<Self, TryReserveError>
    where
        K: Clone,
        V: Clone,
        S: Clone,
        N: Default,
        B: Default,
    {
        let mut policy = self.policy.clone();
        *policy.cursor_mut() = RehashCursor::default();
        let config = TableConfig {
            policy,
            mode: self.mode,
        };
        let mut out = Self::with_allocators(config, self.hasher.clone(), N::default(), B::default());
        if !self.buckets.is_empty() {
            out.buckets = out.bucket_alloc.allocate_buckets(self.buckets.len())?;
        }
        for (h, _, _) in self.iter() {
            let src = node_of(&self.nodes, h.0);
            let id = out.nodes.copy_node(src)?;
            link_front(&mut out.nodes, &mut out.buckets, id, src.hash());
            out.len += 1;
        }
        Ok(out)
    }

    fn step_on_write(&mut self) {
        if let RehashMode::Incremental { quota } = self.mode {
            self.rehash_step(quota);
        }
    }

    fn allocate_initial(&mut self, requested: usize) -> Result<(), TryReserveError> {
        let saved = self.policy.next_resize();
        let count = self.policy.next_bucket_count(requested);
        match self.bucket_alloc.allocate_buckets(count) {
            Ok(array) => {
                let empty = core::mem::replace(&mut self.buckets, array);
                release_array(&mut self.bucket_alloc, empty);
                Ok(())
            }
            Err(e) => {
                self.policy.reset(saved);
                Err(e)
            }
        }
    }

    fn grow_for(&mut self, additional: usize) -> Result<(), TryReserveError> {
        let saved = self.policy.next_resize();
        let decision = self
            .policy
            .decide_rehash(self.buckets.len(), self.len, additional);
        let RehashDecision::Grow { bucket_count, .. } = decision else {
            return Ok(());
        };

        // One migration at a time: finish the previous one first.
        if self.old.is_some() {
            self.rehash_step(usize::MAX);
        }

        let fresh = match self.bucket_alloc.allocate_buckets(bucket_count) {
            Ok(a) => a,
            Err(e) => {
                self.policy.reset(saved);
                return Err(e);
            }
        };
        let mut old = core::mem::replace(&mut self.buckets, fresh);
        if old.is_empty() {
            return Ok(());
        }

        match self.mode {
            RehashMode::Atomic => {
                for bucket in 0..old.len() {
                    relocate_chain(&mut self.nodes, &mut self.buckets, &mut old, bucket);
                }
                release_array(&mut self.bucket_alloc, old);
            }
            RehashMode::Incremental { quota } => {
                log::debug!(
                    "migrating {} -> {bucket_count} buckets, {quota} per step",
                    old.len()
                );
                self.old = Some(old);
                self.policy.cursor_mut().begin();
            }
        }
        Ok(())
    }
}

impl<K, V, S, N, B> Drop for ChainedTable<K, V, S, N, B>
where
    N: NodeAllocator<(K, V)>,
    B: BucketAllocator,
{
    fn drop(&mut self) {
        let current = core::mem::replace(&mut self.buckets, BucketArray::empty());
        for mut array in self.old.take().into_iter().chain(Some(current)) {
            for bucket in 0..array.len() {
                let mut cur = array.head(bucket);
                array.set_head(bucket, None);
                while let Some(id) = cur {
                    cur = self.nodes.node_mut(id).and_then(|n| {
                        n.prev = None;
                        n.next.take()
                    });
                    self.nodes.release_node(id);
                }
            }
            release_array(&mut self.bucket_alloc, array);
        }
    }
}
