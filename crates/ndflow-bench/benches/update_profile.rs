//! Criterion benchmarks for whole-pipeline demand-driven updates.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndflow_bench::{reference_pipeline, stress_pipeline};

/// Benchmark: cold update of the 256x256 reference chain, including
/// pipeline construction.
fn bench_reference_cold_update(c: &mut Criterion) {
    c.bench_function("reference_cold_update", |b| {
        b.iter(|| {
            let mut profile = reference_pipeline(4, 42);
            let report = profile
                .pipeline
                .update(profile.target)
                .expect("reference chain updates");
            black_box(report.elements_computed);
        });
    });
}

/// Benchmark: invalidate the source, then bring the reference chain
/// back up to date. Measures a full re-execution on warm allocations.
fn bench_reference_touch_and_update(c: &mut Criterion) {
    let mut profile = reference_pipeline(4, 42);
    profile
        .pipeline
        .update(profile.target)
        .expect("reference chain updates");

    c.bench_function("reference_touch_and_update", |b| {
        b.iter(|| {
            profile.pipeline.touch(profile.source);
            let report = profile
                .pipeline
                .update(profile.target)
                .expect("reference chain updates");
            black_box(report.elements_computed);
        });
    });
}

/// Benchmark: update when everything is already current. Measures the
/// staleness check overhead alone.
fn bench_reference_no_op_update(c: &mut Criterion) {
    let mut profile = reference_pipeline(4, 42);
    profile
        .pipeline
        .update(profile.target)
        .expect("reference chain updates");

    c.bench_function("reference_no_op_update", |b| {
        b.iter(|| {
            let report = profile
                .pipeline
                .update(profile.target)
                .expect("reference chain updates");
            black_box(report.stages_executed);
        });
    });
}

/// Benchmark: full re-execution of the 1024x1024 stress chain.
fn bench_stress_touch_and_update(c: &mut Criterion) {
    let mut profile = stress_pipeline(8, 42);
    profile
        .pipeline
        .update(profile.target)
        .expect("stress chain updates");

    c.bench_function("stress_touch_and_update", |b| {
        b.iter(|| {
            profile.pipeline.touch(profile.source);
            let report = profile
                .pipeline
                .update(profile.target)
                .expect("stress chain updates");
            black_box(report.elements_computed);
        });
    });
}

criterion_group!(
    benches,
    bench_reference_cold_update,
    bench_reference_touch_and_update,
    bench_reference_no_op_update,
    bench_stress_touch_and_update
);
criterion_main!(benches);
