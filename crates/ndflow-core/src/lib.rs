//! Core types for the ndflow image pipeline.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the fundamental abstractions used throughout the ndflow workspace:
//! index-space regions, the pipeline clock, strongly-typed identifiers,
//! the error taxonomy, and the per-stage event channel.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod clock;
pub mod error;
pub mod event;
pub mod id;
pub mod region;

pub use clock::{PipelineClock, Stamp};
pub use error::{DispatchError, StageError, UpdateError};
pub use event::{
    EventHub, NotifyError, Observer, ObserverError, RunOutcome, StageEvent, StageEventKind,
};
pub use id::{OutputRef, StageId, SubscriptionId};
pub use region::{Index, Region, Size};
