//! Axis-aligned index-space regions of an N-dimensional grid.
//!
//! A [`Region`] is pure value data: a start index and a size per axis.
//! All operations are side-effect-free and consistent for any
//! dimensionality >= 1. A region with any zero-sized axis is *empty*
//! and is absorbing under intersection.

use smallvec::SmallVec;

/// Per-axis start index. Inline capacity 4 covers 2D/3D/4D without
/// heap allocation.
pub type Index = SmallVec<[i64; 4]>;

/// Per-axis extent.
pub type Size = SmallVec<[u64; 4]>;

/// An axis-aligned subset of an N-dimensional index space.
///
/// Regions are copied freely and compared by value. The canonical
/// empty region of dimension D has all-zero start and all-zero size,
/// so empty results of different computations compare equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Region {
    start: Index,
    size: Size,
}

impl Region {
    /// Create a region from a start index and per-axis size.
    ///
    /// `start` and `size` must have the same length. A region with any
    /// zero-sized axis canonicalizes to [`Region::empty`].
    pub fn new(start: Index, size: Size) -> Self {
        debug_assert_eq!(start.len(), size.len(), "start/size dimension mismatch");
        if size.iter().any(|&s| s == 0) {
            return Self::empty(start.len());
        }
        Self { start, size }
    }

    /// The canonical empty region of dimension `dim`.
    pub fn empty(dim: usize) -> Self {
        Self {
            start: SmallVec::from_elem(0, dim),
            size: SmallVec::from_elem(0, dim),
        }
    }

    /// A region starting at the origin with the given size.
    pub fn from_size(size: &[u64]) -> Self {
        Self::new(
            SmallVec::from_elem(0, size.len()),
            SmallVec::from_slice(size),
        )
    }

    /// Dimensionality of the index space.
    pub fn dimension(&self) -> usize {
        self.start.len()
    }

    /// Per-axis start indices.
    pub fn start(&self) -> &[i64] {
        &self.start
    }

    /// Per-axis sizes.
    pub fn size(&self) -> &[u64] {
        &self.size
    }

    /// One-past-the-end index along `axis`.
    pub fn end(&self, axis: usize) -> i64 {
        self.start[axis] + self.size[axis] as i64
    }

    /// Whether the region contains no elements.
    pub fn is_empty(&self) -> bool {
        self.size.iter().any(|&s| s == 0) || self.size.is_empty()
    }

    /// Number of elements: the product of the per-axis sizes,
    /// saturating at `u64::MAX` when the true product does not fit.
    pub fn num_elements(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        self.size.iter().fold(1u64, |acc, &s| acc.saturating_mul(s))
    }

    /// Number of elements, or `None` when the product of the per-axis
    /// sizes overflows `u64`. Allocation paths use this so an absurd
    /// extent surfaces as an error instead of a wrapped size.
    pub fn checked_num_elements(&self) -> Option<u64> {
        if self.is_empty() {
            return Some(0);
        }
        self.size.iter().try_fold(1u64, |acc, &s| acc.checked_mul(s))
    }

    /// Per-axis intersection. Empty if the regions do not overlap on
    /// every axis; empty operands are absorbing.
    pub fn intersect(&self, other: &Region) -> Region {
        debug_assert_eq!(self.dimension(), other.dimension());
        if self.is_empty() || other.is_empty() {
            return Region::empty(self.dimension());
        }
        let mut start = Index::with_capacity(self.dimension());
        let mut size = Size::with_capacity(self.dimension());
        for axis in 0..self.dimension() {
            let lo = self.start[axis].max(other.start[axis]);
            let hi = self.end(axis).min(other.end(axis));
            if hi <= lo {
                return Region::empty(self.dimension());
            }
            start.push(lo);
            size.push((hi - lo) as u64);
        }
        Region::new(start, size)
    }

    /// Clamp this region to `bounds`. Alias for [`Region::intersect`];
    /// reads better at the call sites that clamp padded requests.
    pub fn crop_to(&self, bounds: &Region) -> Region {
        self.intersect(bounds)
    }

    /// Whether `index` lies inside the region.
    pub fn contains_index(&self, index: &[i64]) -> bool {
        debug_assert_eq!(index.len(), self.dimension());
        !self.is_empty()
            && (0..self.dimension())
                .all(|axis| index[axis] >= self.start[axis] && index[axis] < self.end(axis))
    }

    /// Whether `other` lies entirely inside this region.
    ///
    /// The empty region is contained in every region.
    pub fn contains(&self, other: &Region) -> bool {
        debug_assert_eq!(self.dimension(), other.dimension());
        if other.is_empty() {
            return true;
        }
        if self.is_empty() {
            return false;
        }
        (0..self.dimension())
            .all(|axis| other.start[axis] >= self.start[axis] && other.end(axis) <= self.end(axis))
    }

    /// Axis-wise bounding box of two regions: the smallest region
    /// containing both. Identity on empty operands.
    ///
    /// This is the merge operation for conflicting requested regions:
    /// one upstream computation over the union satisfies all consumers.
    pub fn bounding_union(&self, other: &Region) -> Region {
        debug_assert_eq!(self.dimension(), other.dimension());
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        let mut start = Index::with_capacity(self.dimension());
        let mut size = Size::with_capacity(self.dimension());
        for axis in 0..self.dimension() {
            let lo = self.start[axis].min(other.start[axis]);
            let hi = self.end(axis).max(other.end(axis));
            start.push(lo);
            size.push((hi - lo) as u64);
        }
        Region::new(start, size)
    }

    /// Expand the region by `radius` on every axis in both directions.
    ///
    /// Building block for neighborhood request policies; callers clamp
    /// the result to the input extent with [`Region::crop_to`].
    pub fn pad(&self, radius: u64) -> Region {
        if self.is_empty() {
            return self.clone();
        }
        let mut start = Index::with_capacity(self.dimension());
        let mut size = Size::with_capacity(self.dimension());
        for axis in 0..self.dimension() {
            start.push(self.start[axis] - radius as i64);
            size.push(self.size[axis] + 2 * radius);
        }
        Region::new(start, size)
    }

    /// Row-major flat offset of `index` relative to this region, or
    /// `None` if the index lies outside it. The last axis is fastest.
    pub fn offset_of(&self, index: &[i64]) -> Option<u64> {
        if !self.contains_index(index) {
            return None;
        }
        let mut offset = 0u64;
        for axis in 0..self.dimension() {
            offset = offset * self.size[axis] + (index[axis] - self.start[axis]) as u64;
        }
        Some(offset)
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[start {:?}, size {:?}]", &self.start[..], &self.size[..])
    }
}
