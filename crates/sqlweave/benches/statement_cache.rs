//! Benchmark `StatementCache`: read-locked hits, inserts that evict, and a mixed workload.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use sqlweave::StatementCache;

fn make_key(i: usize) -> String {
    format!("SELECT * FROM table_{i} WHERE id = $1 AND status = $2")
}

fn filled(capacity: usize, n: usize) -> StatementCache<u64> {
    let cache = StatementCache::new(capacity, |_: &u64| {});
    for i in 0..n {
        drop(cache.insert(&make_key(i), i as u64));
    }
    cache
}

fn bench_cache_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("statement_cache/hit");

    for capacity in [64, 256, 1024] {
        let cache = filled(capacity, capacity);
        let hit_key = make_key(capacity / 2);
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &hit_key, |b, key| {
            b.iter(|| black_box(cache.get(key)));
        });
    }

    group.finish();
}

fn bench_cache_miss_and_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("statement_cache/miss_insert");

    for capacity in [64, 256, 1024] {
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &cap| {
                let cache = filled(cap, cap);
                let mut counter = cap;
                b.iter(|| {
                    counter += 1;
                    black_box(cache.insert(&make_key(counter), counter as u64));
                });
            },
        );
    }

    group.finish();
}

fn bench_cache_mixed_workload(c: &mut Criterion) {
    let mut group = c.benchmark_group("statement_cache/mixed");

    for capacity in [64, 256, 1024] {
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &cap| {
                let prefill = cap * 4 / 5;
                let cache = filled(cap, prefill);
                let mut counter = 0usize;
                b.iter(|| {
                    counter += 1;
                    if counter % 5 == 0 {
                        black_box(cache.insert(&make_key(cap + counter), counter as u64));
                    } else {
                        black_box(cache.get(&make_key(counter % prefill)));
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_cache_hit,
    bench_cache_miss_and_insert,
    bench_cache_mixed_workload
);
criterion_main!(benches);
