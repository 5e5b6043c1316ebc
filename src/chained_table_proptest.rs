#![cfg(test)]

// Property tests for ChainedTable kept inside the crate so they can reach
// the bucket allocator's bookkeeping.

use crate::alloc::NodeAllocator;
use crate::chained_table::{ChainedTable, Handle, InsertError, RehashMode, TableConfig};
use crate::rehash_policy::{RehashPolicy, RehashStatus};
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::hash::{BuildHasher, Hasher};

#[derive(Clone, Debug)]
enum Op {
    Insert(usize, i32),
    Remove(usize),
    RemoveKey(usize),
    Find(usize),
    Reserve(usize),
    Step(usize),
    Iterate,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<u16>, Vec<Op>)> {
    proptest::collection::vec(any::<u16>(), 1..=24).prop_flat_map(|pool| {
        let idx = 0..pool.len();
        let op = prop_oneof![
            4 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Insert(i, v)),
            1 => idx.clone().prop_map(Op::Remove),
            1 => idx.clone().prop_map(Op::RemoveKey),
            2 => idx.clone().prop_map(Op::Find),
            1 => (0usize..64).prop_map(Op::Reserve),
            1 => (0usize..8).prop_map(Op::Step),
            1 => Just(Op::Iterate),
        ];
        proptest::collection::vec(op, 1..120).prop_map(move |ops| (pool.clone(), ops))
    })
}

fn arb_config() -> impl Strategy<Value = TableConfig> {
    let lf = prop_oneof![Just(0.5f32), Just(1.0f32), Just(2.0f32), Just(3.5f32)];
    let mode = prop_oneof![
        Just(RehashMode::Atomic),
        (1usize..4).prop_map(|quota| RehashMode::Incremental { quota }),
    ];
    (lf, mode).prop_map(|(lf, mode)| TableConfig {
        policy: RehashPolicy::new(lf),
        mode,
    })
}

fn run<S: BuildHasher>(
    mut sut: ChainedTable<u16, i32, S>,
    pool: &[u16],
    ops: Vec<Op>,
) -> Result<(), TestCaseError> {
    let mut model: HashMap<u16, i32> = HashMap::new();
    let mut live: HashMap<u16, Handle> = HashMap::new();
    let mut stale: Vec<Handle> = Vec::new();

    for op in ops {
        let before = sut.bucket_count();
        match op {
            Op::Insert(i, v) => {
                let k = pool[i];
                match sut.insert(k, v) {
                    Ok(h) => {
                        prop_assert!(!model.contains_key(&k));
                        model.insert(k, v);
                        live.insert(k, h);
                    }
                    Err(InsertError::DuplicateKey) => prop_assert!(model.contains_key(&k)),
                    Err(InsertError::Alloc(e)) => prop_assert!(false, "alloc failed: {:?}", e),
                }
            }
            Op::Remove(i) => {
                let k = pool[i];
                if let Some(h) = live.remove(&k) {
                    let (kk, vv) = sut.remove(h).expect("live handle removes");
                    prop_assert_eq!(kk, k);
                    prop_assert_eq!(Some(vv), model.remove(&k));
                    stale.push(h);
                } else {
                    prop_assert!(sut.find(&k).is_none());
                }
            }
            Op::RemoveKey(i) => {
                let k = pool[i];
                let got = sut.remove_key(&k).map(|(_, v)| v);
                prop_assert_eq!(got, model.remove(&k));
                if let Some(h) = live.remove(&k) {
                    stale.push(h);
                }
            }
            Op::Find(i) => {
                let k = pool[i];
                prop_assert_eq!(sut.get(&k), model.get(&k));
                prop_assert_eq!(sut.find(&k), live.get(&k).copied());
            }
            Op::Reserve(n) => {
                sut.reserve(n).expect("reserve");
            }
            Op::Step(q) => {
                let was = sut.is_rehashing();
                let st = sut.rehash_step(q);
                prop_assert_eq!(st == RehashStatus::Idle, !was);
            }
            Op::Iterate => {
                let got: Vec<u16> = sut.iter().map(|(_, k, _)| *k).collect();
                let set: BTreeSet<u16> = got.iter().copied().collect();
                prop_assert_eq!(got.len(), set.len(), "iteration yielded a duplicate");
                prop_assert_eq!(set, model.keys().copied().collect::<BTreeSet<_>>());
            }
        }

        // Growth never shrinks the table.
        prop_assert!(sut.bucket_count() >= before);
        for &h in &stale {
            prop_assert!(h.value(&sut).is_none());
        }
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.node_allocator().live_nodes(), model.len());
        if !sut.is_rehashing() {
            // Only the current array is outstanding.
            prop_assert_eq!(sut.bucket_allocator().outstanding(), sut.bucket_count());
            if sut.bucket_count() > 0 {
                let lf = sut.policy().max_load_factor() as f64;
                prop_assert!(sut.len() as f64 <= (sut.bucket_count() as f64 * lf).ceil());
            }
        }
    }
    Ok(())
}

// Property: state-machine equivalence against std::collections::HashMap
// across load factors and both rehash modes.
// - Duplicate keys are rejected; handles stay stable across growth.
// - Every entry stays reachable while a migration is in flight.
// - The node arena holds exactly the live entries; bucket slots are
//   released once a migration completes.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine(config in arb_config(), (pool, ops) in arb_scenario()) {
        let sut: ChainedTable<u16, i32> = ChainedTable::with_config(config);
        run(sut, &pool, ops)?;
    }
}

#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> Self::Hasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

// Property: same invariants with every key in one chain, which stresses
// head/middle/tail unlinking and relocation of a single long chain.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions(config in arb_config(), (pool, ops) in arb_scenario()) {
        let sut = ChainedTable::with_config_and_hasher(config, ConstBuildHasher);
        run(sut, &pool, ops)?;
    }
}
