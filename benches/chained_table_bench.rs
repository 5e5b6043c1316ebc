use chain_rehash::{ChainedTable, RehashMode, RehashPolicy, RehashStatus, TableConfig};
use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use std::time::Duration;

const N: u64 = 100_000;

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

fn table(mode: RehashMode) -> ChainedTable<u64, u64> {
    ChainedTable::with_config(TableConfig {
        policy: RehashPolicy::new(1.0),
        mode,
    })
}

// Growing from zero buckets to N entries: every array in the prime ladder is
// allocated, fully relocated and released. The presized run is the baseline
// with no relocation at all.
fn bench_atomic_growth(c: &mut Criterion) {
    let mut g = c.benchmark_group("growth/atomic");
    g.throughput(Throughput::Elements(N));
    g.bench_function("grow_from_empty", |b| {
        b.iter_batched(
            || table(RehashMode::Atomic),
            |mut t| {
                for x in lcg(1).take(N as usize) {
                    t.insert(x, x).unwrap();
                }
                black_box(t.bucket_count())
            },
            BatchSize::LargeInput,
        )
    });
    g.bench_function("presized", |b| {
        b.iter_batched(
            || {
                let mut t = table(RehashMode::Atomic);
                t.reserve(N as usize).unwrap();
                t
            },
            |mut t| {
                for x in lcg(1).take(N as usize) {
                    t.insert(x, x).unwrap();
                }
                black_box(t.bucket_count())
            },
            BatchSize::LargeInput,
        )
    });
    g.finish();
}

// Same workload with migration spread over writes. Small quotas keep two
// arrays alive longer, so lookups during the run probe both.
fn bench_incremental_quota(c: &mut Criterion) {
    let mut g = c.benchmark_group("growth/incremental");
    g.throughput(Throughput::Elements(N));
    for quota in [1usize, 4, 16, 256] {
        g.bench_with_input(BenchmarkId::from_parameter(quota), &quota, |b, &quota| {
            b.iter_batched(
                || table(RehashMode::Incremental { quota }),
                |mut t| {
                    for x in lcg(1).take(N as usize) {
                        t.insert(x, x).unwrap();
                        black_box(t.get(&x));
                    }
                    black_box(t.is_rehashing())
                },
                BatchSize::LargeInput,
            )
        });
    }
    g.finish();
}

// A table caught right after a growth into at least `min_buckets` buckets,
// with the old array still fully populated.
fn pending_migration(min_buckets: usize) -> ChainedTable<u64, u64> {
    let mut t = table(RehashMode::Incremental { quota: 1 });
    for x in lcg(9) {
        t.insert(x, x).unwrap();
        if t.is_rehashing() && t.bucket_count() >= min_buckets {
            break;
        }
    }
    t
}

fn bench_drain_pending(c: &mut Criterion) {
    let mut g = c.benchmark_group("rehash_step/drain");
    for min_buckets in [10_000usize, 100_000] {
        g.bench_with_input(
            BenchmarkId::new("all_at_once", min_buckets),
            &min_buckets,
            |b, &min_buckets| {
                b.iter_batched(
                    || pending_migration(min_buckets),
                    |mut t| {
                        let s = t.rehash_step(usize::MAX);
                        debug_assert_eq!(s, RehashStatus::Completed);
                        black_box(t)
                    },
                    BatchSize::LargeInput,
                )
            },
        );
        g.bench_with_input(
            BenchmarkId::new("quota_64", min_buckets),
            &min_buckets,
            |b, &min_buckets| {
                b.iter_batched(
                    || pending_migration(min_buckets),
                    |mut t| {
                        while t.rehash_step(64) == RehashStatus::Paused {}
                        black_box(t)
                    },
                    BatchSize::LargeInput,
                )
            },
        );
    }
    g.finish();
}

fn growth_config() -> Criterion {
    Criterion::default()
        .sample_size(10)
        .measurement_time(Duration::from_secs(4))
        .warm_up_time(Duration::from_millis(500))
}

criterion_group! {
    name = benches_growth;
    config = growth_config();
    targets = bench_atomic_growth, bench_incremental_quota
}
criterion_group! {
    name = benches_drain;
    config = growth_config();
    targets = bench_drain_pending
}
criterion_main!(benches_growth, benches_drain);
