//! Image storage for the ndflow pipeline.
//!
//! An [`Image`] owns a row-major `f32` buffer over a region of index
//! space. Consumers read through [`ImageView`]s; workers write into
//! their own [`Tile`]s which the buffer owner blits back after the
//! parallel barrier. Writers never alias the owned buffer, which keeps
//! disjoint sub-region writes safe without unsafe code.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod image;
pub mod info;
pub mod iter;

pub use image::{AllocError, Image, ImageView, Tile};
pub use info::ImageInfo;
pub use iter::{RegionIndexIter, RegionRowIter};
