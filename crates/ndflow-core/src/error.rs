//! Error types for the ndflow pipeline engine.
//!
//! Organized by subsystem: update (pipeline executor), stage (filter
//! callbacks), and dispatch (worker pool). The engine never retries
//! and never swallows: every failure aborts the enclosing `update`
//! and surfaces to its caller with the stage and region involved.

use crate::id::StageId;
use crate::region::Region;

use std::error::Error;
use std::fmt;

/// Errors from individual stage callbacks.
///
/// Returned by `compute_output_information`,
/// `compute_input_requested_regions`, and `execute`, and wrapped in
/// [`UpdateError::ComputationFailure`] by the executor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageError {
    /// The stage's callback failed for a domain-specific reason
    /// (singular kernel, divergent iteration, ...).
    ExecutionFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// A non-finite value was produced or encountered.
    NonFiniteResult {
        /// Which output buffer.
        output_index: usize,
        /// Flat element offset of the first non-finite value, if known.
        element: Option<u64>,
    },
    /// A required input was absent or unreadable inside a callback.
    MissingInput {
        /// Index of the missing input.
        input_index: usize,
    },
    /// A worker could not allocate its output tile.
    ResourceExhaustion {
        /// Number of elements that were requested.
        elements: u64,
    },
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutionFailed { reason } => write!(f, "execution failed: {reason}"),
            Self::NonFiniteResult {
                output_index,
                element,
            } => {
                write!(f, "non-finite result in output {output_index}")?;
                if let Some(idx) = element {
                    write!(f, " at element {idx}")?;
                }
                Ok(())
            }
            Self::MissingInput { input_index } => {
                write!(f, "input {input_index} is missing")
            }
            Self::ResourceExhaustion { elements } => {
                write!(f, "failed to allocate a tile of {elements} elements")
            }
        }
    }
}

impl Error for StageError {}

/// Errors from `Pipeline::update`.
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateError {
    /// A requested region is not contained in the data object's
    /// largest possible region. Programmer error; not retried.
    OutOfBoundsRequest {
        /// Name of the stage whose output was over-requested.
        stage: String,
        /// The offending request.
        requested: Region,
        /// The available extent.
        largest: Region,
    },
    /// A required input is not connected. Detected during information
    /// propagation, before any computation runs.
    MissingInput {
        /// Name of the stage with the unconnected input.
        stage: String,
        /// Index of the unconnected input.
        input_index: usize,
    },
    /// A stage callback failed during execution.
    ComputationFailure {
        /// Name of the failing stage.
        stage: String,
        /// The underlying stage error.
        reason: StageError,
    },
    /// Output buffer allocation failed for the requested region.
    ResourceExhaustion {
        /// Name of the stage whose output could not be allocated.
        stage: String,
        /// Number of elements that were requested.
        elements: u64,
    },
    /// The target stage id is not part of this pipeline.
    UnknownStage {
        /// The offending id.
        id: StageId,
    },
    /// The graph reachable from the target contains a cycle. This
    /// design supports acyclic graphs only.
    CycleDetected {
        /// Name of a stage on the cycle.
        stage: String,
    },
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBoundsRequest {
                stage,
                requested,
                largest,
            } => write!(
                f,
                "stage '{stage}': requested region {requested} exceeds largest possible \
                 region {largest}"
            ),
            Self::MissingInput { stage, input_index } => {
                write!(f, "stage '{stage}': required input {input_index} is not connected")
            }
            Self::ComputationFailure { stage, reason } => {
                write!(f, "stage '{stage}' failed: {reason}")
            }
            Self::ResourceExhaustion { stage, elements } => write!(
                f,
                "stage '{stage}': failed to allocate output buffer of {elements} elements"
            ),
            Self::UnknownStage { id } => write!(f, "stage {id} is not part of this pipeline"),
            Self::CycleDetected { stage } => {
                write!(f, "cycle detected through stage '{stage}'")
            }
        }
    }
}

impl Error for UpdateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ComputationFailure { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Errors from the threaded dispatcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchError {
    /// A worker's compute callback failed. Outstanding workers ran to
    /// completion; this is the first error observed.
    WorkerFailed {
        /// The underlying stage error.
        reason: StageError,
    },
    /// The dispatcher was configured with zero workers.
    NoWorkers,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkerFailed { reason } => write!(f, "worker failed: {reason}"),
            Self::NoWorkers => write!(f, "dispatcher requires at least one worker"),
        }
    }
}

impl Error for DispatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::WorkerFailed { reason } => Some(reason),
            Self::NoWorkers => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::SmallVec;

    #[test]
    fn computation_failure_chains_source() {
        let err = UpdateError::ComputationFailure {
            stage: "box_mean".into(),
            reason: StageError::ExecutionFailed {
                reason: "kernel is singular".into(),
            },
        };
        let src = err.source().expect("source");
        assert_eq!(src.to_string(), "execution failed: kernel is singular");
    }

    #[test]
    fn out_of_bounds_names_both_regions() {
        let err = UpdateError::OutOfBoundsRequest {
            stage: "source".into(),
            requested: Region::new(SmallVec::from_slice(&[0]), SmallVec::from_slice(&[100])),
            largest: Region::new(SmallVec::from_slice(&[0]), SmallVec::from_slice(&[64])),
        };
        let msg = err.to_string();
        assert!(msg.contains("source"));
        assert!(msg.contains("100"));
        assert!(msg.contains("64"));
    }

    #[test]
    fn dispatch_error_chains_stage_error() {
        let err = DispatchError::WorkerFailed {
            reason: StageError::MissingInput { input_index: 1 },
        };
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "worker failed: input 1 is missing");
    }
}
