//! Owned image buffers, read-only views, and worker tiles.

use ndflow_core::region::Region;
use std::error::Error;
use std::fmt;

use crate::iter::RegionRowIter;

/// Buffer allocation failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// The element count overflows addressable memory.
    TooLarge {
        /// Number of elements requested.
        elements: u64,
    },
    /// The allocator refused the reservation.
    OutOfMemory {
        /// Number of elements requested.
        elements: u64,
    },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge { elements } => {
                write!(f, "buffer of {elements} elements exceeds addressable memory")
            }
            Self::OutOfMemory { elements } => {
                write!(f, "allocation of {elements} elements failed")
            }
        }
    }
}

impl Error for AllocError {}

/// An owned row-major `f32` buffer over a region of index space.
///
/// The buffer belongs exclusively to its producing stage's data
/// object; consumers only ever see [`ImageView`]s.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    region: Region,
    data: Vec<f32>,
}

impl Image {
    /// Allocate a zero-filled image over `region`.
    ///
    /// Uses a fallible reservation so an oversized request surfaces as
    /// an error instead of aborting the process.
    pub fn allocate(region: &Region) -> Result<Image, AllocError> {
        let elements = region.checked_num_elements().ok_or(AllocError::TooLarge {
            elements: region.num_elements(),
        })?;
        let n = usize::try_from(elements).map_err(|_| AllocError::TooLarge { elements })?;
        if n > isize::MAX as usize / std::mem::size_of::<f32>() {
            return Err(AllocError::TooLarge { elements });
        }
        let mut data = Vec::new();
        data.try_reserve_exact(n)
            .map_err(|_| AllocError::OutOfMemory { elements })?;
        data.resize(n, 0.0);
        Ok(Image {
            region: region.clone(),
            data,
        })
    }

    /// The region this buffer covers.
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Value at `index`, or `None` outside the buffer.
    pub fn get(&self, index: &[i64]) -> Option<f32> {
        let offset = self.region.offset_of(index)?;
        self.data.get(offset as usize).copied()
    }

    /// A read-only view of the whole buffer.
    pub fn view(&self) -> ImageView<'_> {
        ImageView {
            region: &self.region,
            data: &self.data,
        }
    }

    /// Raw storage, row-major over [`Image::region`].
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Mutable raw storage. Single-threaded owner access only; workers
    /// go through [`Tile`]s.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Copy a completed tile into this buffer.
    ///
    /// The tile must lie within the buffer's region; rows are copied
    /// as contiguous runs.
    pub fn blit(&mut self, tile: &Tile) {
        debug_assert!(
            self.region.contains(&tile.region),
            "tile escapes image region"
        );
        for (row_start, len) in RegionRowIter::new(&tile.region) {
            let (Some(src), Some(dst)) = (
                tile.region.offset_of(&row_start),
                self.region.offset_of(&row_start),
            ) else {
                // Row escapes the image; nothing sensible to copy.
                continue;
            };
            let (src, dst, len) = (src as usize, dst as usize, len as usize);
            self.data[dst..dst + len].copy_from_slice(&tile.data[src..src + len]);
        }
    }
}

/// Read-only view of an image buffer scoped to its region.
#[derive(Clone, Copy, Debug)]
pub struct ImageView<'a> {
    region: &'a Region,
    data: &'a [f32],
}

impl<'a> ImageView<'a> {
    /// Construct a view over `data` laid out row-major on `region`.
    pub fn new(region: &'a Region, data: &'a [f32]) -> Self {
        debug_assert_eq!(region.num_elements() as usize, data.len());
        Self { region, data }
    }

    /// The region this view covers.
    pub fn region(&self) -> &Region {
        self.region
    }

    /// Value at `index`, or `None` outside the view.
    pub fn get(&self, index: &[i64]) -> Option<f32> {
        let offset = self.region.offset_of(index)?;
        self.data.get(offset as usize).copied()
    }

    /// Value at `index` with each axis clamped into the view's extent.
    ///
    /// Neighborhood filters use this for boundary handling: samples
    /// past the edge repeat the edge value.
    pub fn get_clamped(&self, index: &[i64]) -> f32 {
        let mut clamped = ndflow_core::region::Index::from_slice(index);
        for axis in 0..self.region.dimension() {
            let lo = self.region.start()[axis];
            let hi = self.region.end(axis) - 1;
            clamped[axis] = clamped[axis].clamp(lo, hi);
        }
        // Empty views have nothing to sample.
        self.region
            .offset_of(&clamped)
            .and_then(|o| self.data.get(o as usize).copied())
            .unwrap_or(0.0)
    }

    /// Raw storage, row-major over the view's region.
    pub fn as_slice(&self) -> &[f32] {
        self.data
    }
}

/// A worker-local output buffer covering one assigned sub-region.
///
/// Workers fill their own tile and hand it back over a channel; the
/// buffer owner blits tiles after the barrier. Workers therefore never
/// hold a reference into the shared output buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    region: Region,
    data: Vec<f32>,
}

impl Tile {
    /// Allocate a zero-filled tile over `region`.
    pub fn allocate(region: &Region) -> Result<Tile, AllocError> {
        let image = Image::allocate(region)?;
        Ok(Tile {
            region: image.region,
            data: image.data,
        })
    }

    /// The sub-region this tile covers.
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Write `value` at `index`. Ignores indices outside the tile in
    /// release builds; debug builds assert.
    pub fn set(&mut self, index: &[i64], value: f32) {
        match self.region.offset_of(index) {
            Some(offset) => self.data[offset as usize] = value,
            None => debug_assert!(false, "write outside assigned tile"),
        }
    }

    /// Value at `index`, or `None` outside the tile.
    pub fn get(&self, index: &[i64]) -> Option<f32> {
        let offset = self.region.offset_of(index)?;
        self.data.get(offset as usize).copied()
    }

    /// Fill the whole tile with one value.
    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    /// Raw storage, row-major over the tile's region.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Mutable raw storage, row-major over the tile's region.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }
}
