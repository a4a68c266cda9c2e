//! ndflow: demand-driven N-dimensional image processing pipelines.
//!
//! This is the top-level facade crate re-exporting the public API from
//! all ndflow sub-crates. For most users, adding `ndflow` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use ndflow::prelude::*;
//!
//! // Source → smooth → normalize, computed lazily on update.
//! let mut pipeline = Pipeline::with_workers(4).unwrap();
//! let source = pipeline.add_stage(
//!     RandomSource::builder(2).size(&[32, 32]).seed(7).build().unwrap(),
//! );
//! let smooth = pipeline.add_stage(BoxMean::new(1));
//! let normalize = pipeline.add_stage(GlobalNormalize::new());
//! pipeline.connect(OutputRef::first(source), smooth, 0).unwrap();
//! pipeline.connect(OutputRef::first(smooth), normalize, 0).unwrap();
//!
//! let target = OutputRef::first(normalize);
//! let report = pipeline.update(target).unwrap();
//! assert_eq!(report.stages_executed, 3);
//!
//! // Nothing changed: the second update is free.
//! assert_eq!(pipeline.update(target).unwrap().stages_executed, 0);
//!
//! let image = pipeline.output_image(target).unwrap();
//! assert_eq!(image.region().num_elements(), 32 * 32);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in
//! the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `ndflow-core` | Regions, stamps, ids, errors, events |
//! | [`image`] | `ndflow-image` | Buffers, views, tiles, iterators |
//! | [`dispatch`] | `ndflow-dispatch` | Region splitting, worker pool, progress |
//! | [`pipeline`] | `ndflow-pipeline` | Data objects, the stage trait, the executor |
//! | [`filters`] | `ndflow-filters` | Concrete source and filter stages |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Regions, logical stamps, identifiers, errors, and stage events
/// (`ndflow-core`).
pub use ndflow_core as types;

/// Image buffers, read-only views, worker tiles, and region iterators
/// (`ndflow-image`).
pub use ndflow_image as image;

/// Region partitioning, the threaded dispatcher, and progress
/// reporting (`ndflow-dispatch`).
pub use ndflow_dispatch as dispatch;

/// The pipeline executor: data objects, the [`pipeline::Stage`] trait,
/// propagation, staleness, and the iterative extension
/// (`ndflow-pipeline`).
pub use ndflow_pipeline as pipeline;

/// Concrete stages: [`filters::RandomSource`], [`filters::ShiftScale`],
/// [`filters::BoxMean`], [`filters::GlobalNormalize`], and
/// [`filters::LandweberDeconvolution`] (`ndflow-filters`).
pub use ndflow_filters as filters;

/// Common imports for typical ndflow usage.
///
/// ```rust
/// use ndflow::prelude::*;
/// ```
pub mod prelude {
    // Geometry and identity
    pub use ndflow_core::{OutputRef, Region, StageId, Stamp};

    // Errors
    pub use ndflow_core::{DispatchError, StageError, UpdateError};

    // Events
    pub use ndflow_core::event::{Observer, RunOutcome, StageEvent, StageEventKind};

    // Buffers
    pub use ndflow_image::{Image, ImageInfo, ImageView, RegionIndexIter, Tile};

    // Pipeline
    pub use ndflow_pipeline::{
        DataObject, ExecContext, InfoContext, IterationDriver, IterationOutcome, Pipeline,
        RequestContext, Stage, StopFlag, Threading, UpdateReport,
    };

    // Stages
    pub use ndflow_filters::{
        BoxMean, GlobalNormalize, Kernel1D, LandweberDeconvolution, RandomSource, ShiftScale,
    };
}
