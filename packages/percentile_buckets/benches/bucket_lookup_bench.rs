//! Benchmarks for the bucket index lookup in isolation.
//!
//! `index_of()` is the hot-path operation that determines which bucket an observed value
//! is counted in. It should take the same time regardless of the magnitude of the value.

#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use percentile_buckets::{Magnitude, index_of};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("bucket_lookup");

    // Exact region at the bottom of the range.
    group.bench_function("exact_region", |b| {
        b.iter(|| index_of(black_box(5)));
    });

    group.bench_function("first_band", |b| {
        b.iter(|| index_of(black_box(12)));
    });

    group.bench_function("middle", |b| {
        b.iter(|| index_of(black_box(1_234_567)));
    });

    group.bench_function("max", |b| {
        b.iter(|| index_of(black_box(Magnitude::MAX)));
    });

    // Invalid input, clamped into the first bucket.
    group.bench_function("negative", |b| {
        b.iter(|| index_of(black_box(-1)));
    });

    group.finish();
}
