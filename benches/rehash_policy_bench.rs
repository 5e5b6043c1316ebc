use chain_rehash::primes::prime_at_least;
use chain_rehash::RehashPolicy;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_prime_lookup(c: &mut Criterion) {
    c.bench_function("policy::prime_at_least_1k", |b| {
        b.iter(|| {
            for n in (0..1_000_000usize).step_by(1000) {
                black_box(prime_at_least(black_box(n)));
            }
        })
    });
}

fn bench_decide_under_threshold(c: &mut Criterion) {
    c.bench_function("policy::decide_under_threshold_1k", |b| {
        let mut p = RehashPolicy::new(1.0);
        p.next_bucket_count(1543);
        b.iter(|| {
            for e in 0..1000usize {
                black_box(p.decide_rehash(1543, black_box(e), 1));
            }
        })
    });
}

fn bench_decide_growth_chain(c: &mut Criterion) {
    c.bench_function("policy::decide_growth_chain_to_1m", |b| {
        b.iter(|| {
            let mut p = RehashPolicy::new(0.75);
            let mut buckets = 0usize;
            for e in 0..1_000_000usize {
                let (grow, n) = p.decide_rehash(buckets, e, 1).as_pair();
                if grow {
                    buckets = n;
                }
            }
            black_box(buckets)
        })
    });
}

criterion_group!(
    benches,
    bench_prime_lookup,
    bench_decide_under_threshold,
    bench_decide_growth_chain
);
criterion_main!(benches);
