//! chain-rehash: growth policy and node/bucket allocation for
//! separate-chaining hash tables.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: keep the sizing math and the memory lifecycle of a chained
//!   table in small layers that can be reasoned about independently.
//! - Layers:
//!   - `primes`: static ascending table of candidate bucket counts,
//!     searched with a lower bound.
//!   - `RehashPolicy`: decides when to grow and to what size; owns the
//!     cached resize threshold and the migration cursor, never memory.
//!   - `HashNode<T>`: value plus cached hash plus two `NodeId` links.
//!   - `NodeAllocator` / `BucketAllocator`: two independent capabilities
//!     for node storage (a generational arena) and zeroed bucket arrays.
//!   - `ChainedTable<K, V, S>`: a reference driver wiring the above
//!     together: decide, allocate, relocate, release.
//!
//! Constraints
//! - Single-threaded: the table is `!Send`/`!Sync`.
//! - Nodes are addressed by stable generational ids, never by pointers;
//!   bucket arrays hold ids and own nothing.
//! - Each node caches its hash. Relocation and cloning never call
//!   `K: Hash` again.
//!
//! Sizing contract
//! - `decide_rehash(buckets, elements, pending)` grows only when
//!   `elements + pending` exceeds the cached threshold and the load factor
//!   cannot be met by the current array. Growth is at least
//!   `GROWTH_FACTOR` (2x), rounded up to a tabulated prime.
//! - The threshold is updated by `next_bucket_count` and by
//!   `decide_rehash`; both take `&mut self` and the decision reports the
//!   post-call threshold.
//! - A fixed policy runs the same math but never reports growth.
//!
//! Failure boundaries
//! - Bucket-array and node allocation return `TryReserveError`. A failed
//!   growth leaves the table and the cached threshold as they were.
//! - Non-positive load factors, bucket requests above the largest
//!   tabulated prime, and mismatched release counts panic.
//!
//! Incremental rehashing
//! - With `RehashMode::Incremental { quota }` the old array is drained at
//!   most `quota` buckets per write. The policy's `RehashCursor` records
//!   the position; lookups consult both arrays until the drain completes.

pub mod alloc;
mod busy;
pub mod chained_table;
mod chained_table_proptest;
pub mod hash_node;
pub mod primes;
pub mod rehash_policy;

// Public surface
pub use alloc::{BucketAllocator, BucketArray, HeapBuckets, NodeAllocator, NodeArena, NodeId};
pub use chained_table::{ChainedTable, Handle, InsertError, RehashMode, TableConfig};
pub use hash_node::HashNode;
pub use hashbrown::TryReserveError;
pub use rehash_policy::{
    BucketIndex, BucketSide, RehashCursor, RehashDecision, RehashPolicy, RehashStatus,
    GROWTH_FACTOR,
};
