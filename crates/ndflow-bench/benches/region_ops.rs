//! Criterion micro-benchmarks for region algebra and iteration.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndflow_core::region::Region;
use ndflow_image::RegionIndexIter;
use smallvec::smallvec;

/// Benchmark: intersect 10K shifted region pairs.
fn bench_intersect_10k(c: &mut Criterion) {
    let base = Region::new(smallvec![0, 0, 0], smallvec![64, 64, 64]);
    let pairs: Vec<Region> = (0..10_000i64)
        .map(|i| Region::new(smallvec![i % 32, (i * 7) % 32, (i * 13) % 32], smallvec![48, 48, 48]))
        .collect();

    c.bench_function("region_intersect_10k", |b| {
        b.iter(|| {
            for other in &pairs {
                black_box(base.intersect(other));
            }
        });
    });
}

/// Benchmark: union 10K shifted region pairs.
fn bench_union_10k(c: &mut Criterion) {
    let base = Region::new(smallvec![0, 0], smallvec![100, 100]);
    let pairs: Vec<Region> = (0..10_000i64)
        .map(|i| Region::new(smallvec![i % 200 - 100, (i * 3) % 200 - 100], smallvec![50, 50]))
        .collect();

    c.bench_function("region_union_10k", |b| {
        b.iter(|| {
            for other in &pairs {
                black_box(base.bounding_union(other));
            }
        });
    });
}

/// Benchmark: offset_of for every index of a 64x64x16 region.
fn bench_offset_of_full_walk(c: &mut Criterion) {
    let region = Region::new(smallvec![-8, -8, 0], smallvec![64, 64, 16]);
    let indices: Vec<_> = RegionIndexIter::new(&region).collect();

    c.bench_function("region_offset_of_64x64x16", |b| {
        b.iter(|| {
            for idx in &indices {
                black_box(region.offset_of(idx));
            }
        });
    });
}

/// Benchmark: raw index iteration over a 128x128 region.
fn bench_index_iteration(c: &mut Criterion) {
    let region = Region::new(smallvec![0, 0], smallvec![128, 128]);

    c.bench_function("region_index_iter_128x128", |b| {
        b.iter(|| {
            for idx in RegionIndexIter::new(&region) {
                black_box(&idx);
            }
        });
    });
}

criterion_group!(
    benches,
    bench_intersect_10k,
    bench_union_10k,
    bench_offset_of_full_walk,
    bench_index_iteration
);
criterion_main!(benches);
