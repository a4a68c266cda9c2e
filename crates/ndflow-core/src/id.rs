//! Strongly-typed identifiers for pipeline nodes and subscriptions.

use std::fmt;

/// Identifies a stage within a pipeline.
///
/// Stages are registered in insertion order and assigned sequential IDs.
/// `StageId(n)` corresponds to the n-th stage added to the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(pub u32);

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for StageId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// A reference to one output data object of a stage.
///
/// Pipelines address data objects as `(stage, output index)` pairs;
/// this is the handle consumers pass to `update` and `connect`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OutputRef {
    /// The producing stage.
    pub stage: StageId,
    /// Index into the stage's output list.
    pub output: usize,
}

impl OutputRef {
    /// Shorthand for the first (usually only) output of a stage.
    pub fn first(stage: StageId) -> Self {
        Self { stage, output: 0 }
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.stage, self.output)
    }
}

/// Handle returned by `EventHub::subscribe`, used to unsubscribe.
///
/// Allocated from a per-hub monotonic counter; never reused within
/// one hub's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
