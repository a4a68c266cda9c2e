//! Concrete stages for ndflow pipelines.
//!
//! One stage per request-propagation policy, so the crate doubles as a
//! catalog of how filters declare their dependency footprints:
//!
//! - [`RandomSource`] — no inputs, extent from configuration; output is
//!   deterministic for a given seed regardless of partitioning.
//! - [`ShiftScale`] — pointwise, pass-through requests.
//! - [`BoxMean`] — neighborhood, padded requests with clamped
//!   boundaries.
//! - [`GlobalNormalize`] — global, whole-input requests.
//! - [`LandweberDeconvolution`] — iterative, whole-input, runs a
//!   convergence loop with cooperative stop inside one execution.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod box_mean;
pub mod convolve;
pub mod global_normalize;
pub mod landweber;
pub mod random_source;
pub mod shift_scale;

pub use box_mean::BoxMean;
pub use convolve::Kernel1D;
pub use global_normalize::GlobalNormalize;
pub use landweber::{LandweberDeconvolution, LandweberDeconvolutionBuilder};
pub use random_source::{RandomSource, RandomSourceBuilder};
pub use shift_scale::ShiftScale;
