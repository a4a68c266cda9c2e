//! Parallel execution for ndflow stages.
//!
//! [`split_region`] partitions a requested region into disjoint
//! sub-regions, [`ThreadedDispatcher`] runs a stage's compute callback
//! over them on a pool of scoped worker threads with synchronous
//! barrier semantics, and [`ProgressReporter`] aggregates per-worker
//! completion into threshold-crossing progress events.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod dispatch;
pub mod progress;
pub mod split;

pub use dispatch::ThreadedDispatcher;
pub use progress::ProgressReporter;
pub use split::split_region;
