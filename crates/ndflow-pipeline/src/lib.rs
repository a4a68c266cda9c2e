//! The demand-driven pipeline executor.
//!
//! A [`Pipeline`] owns a DAG of [`Stage`]s and their output
//! [`DataObject`]s. `update` on a target output runs the two
//! metadata-only propagation passes (output information flowing
//! downstream, requested regions flowing upstream), decides staleness
//! from
//! logical timestamps and buffered-region containment, and executes
//! only the stale subgraph: tiled across the worker pool for ordinary
//! stages, or as a single whole-region invocation for global and
//! iterative ones.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod data_object;
pub mod executor;
pub mod iterative;
pub mod stage;

pub use data_object::DataObject;
pub use executor::{Pipeline, UpdateReport};
pub use iterative::{IterationDriver, IterationOutcome, IterationState, StopFlag};
pub use stage::{ExecContext, InfoContext, RequestContext, Stage, Threading};
