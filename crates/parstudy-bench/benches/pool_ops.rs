//! Criterion micro-benchmarks for the shared object pool.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use parstudy_buffer::SharedPool;

/// Acquire and release one pooled vector; after the first iteration the
/// pool always has one to hand back.
fn bench_pool_acquire_release(c: &mut Criterion) {
    let pool: SharedPool<Vec<u8>> = SharedPool::new();
    c.bench_function("pool_acquire_release", |b| {
        b.iter(|| {
            let v = pool.acquire(());
            black_box(v.len());
        });
    });
}

/// Hold 100 objects at once, then release them all.
fn bench_pool_burst(c: &mut Criterion) {
    let pool: SharedPool<Vec<u8>> = SharedPool::new();
    c.bench_function("pool_burst_100", |b| {
        b.iter(|| {
            let held: Vec<_> = (0..100).map(|_| pool.checkout(())).collect();
            black_box(held.len());
        });
    });
}

/// Baseline: the same burst without a pool.
fn bench_alloc_burst(c: &mut Criterion) {
    c.bench_function("alloc_burst_100", |b| {
        b.iter(|| {
            let held: Vec<_> = (0..100).map(|_| Box::new(Vec::<u8>::new())).collect();
            black_box(held.len());
        });
    });
}

criterion_group!(
    benches,
    bench_pool_acquire_release,
    bench_pool_burst,
    bench_alloc_burst
);
criterion_main!(benches);
