//! Benchmark profiles for the ndflow pipeline engine.
//!
//! Provides pre-built pipelines for benchmarking:
//!
//! - [`reference_pipeline`]: 256x256 source → box mean → normalize
//! - [`stress_pipeline`]: 1024x1024, same chain at 16x the elements

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use ndflow_core::id::{OutputRef, StageId};
use ndflow_filters::{BoxMean, GlobalNormalize, RandomSource};
use ndflow_pipeline::Pipeline;

/// A pre-wired pipeline plus the ids needed to drive it.
pub struct Profile {
    /// The wired pipeline.
    pub pipeline: Pipeline,
    /// The source stage, for `modify`-based invalidation.
    pub source: StageId,
    /// The terminal output to update.
    pub target: OutputRef,
}

fn chain(extent: u64, workers: usize, seed: u64) -> Profile {
    let mut pipeline = match Pipeline::with_workers(workers) {
        Ok(p) => p,
        Err(_) => unreachable!("worker count is non-zero"),
    };
    let source = pipeline.add_stage(
        RandomSource::builder(2)
            .size(&[extent, extent])
            .seed(seed)
            .build()
            .expect("valid source configuration"),
    );
    let mean = pipeline.add_stage(BoxMean::new(1));
    let norm = pipeline.add_stage(GlobalNormalize::new());
    pipeline
        .connect(OutputRef::first(source), mean, 0)
        .expect("valid wiring");
    pipeline
        .connect(OutputRef::first(mean), norm, 0)
        .expect("valid wiring");
    Profile {
        pipeline,
        source,
        target: OutputRef::first(norm),
    }
}

/// Reference profile: 256x256 (64K elements), source → mean → normalize.
pub fn reference_pipeline(workers: usize, seed: u64) -> Profile {
    chain(256, workers, seed)
}

/// Stress profile: 1024x1024 (~1M elements), same chain.
pub fn stress_pipeline(workers: usize, seed: u64) -> Profile {
    chain(1024, workers, seed)
}
