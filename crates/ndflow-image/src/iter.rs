//! Row-major iteration over regions.
//!
//! [`RegionIndexIter`] walks every index of a region with the last
//! axis fastest. [`RegionRowIter`] yields whole rows (runs contiguous
//! in a row-major buffer), which is what blitting and per-row
//! generation want.

use ndflow_core::region::{Index, Region};

/// Iterator over every index of a region in row-major order.
#[derive(Clone, Debug)]
pub struct RegionIndexIter {
    region: Region,
    current: Index,
    done: bool,
}

impl RegionIndexIter {
    /// Iterate `region`'s indices; empty regions yield nothing.
    pub fn new(region: &Region) -> Self {
        let done = region.is_empty();
        Self {
            current: Index::from_slice(region.start()),
            region: region.clone(),
            done,
        }
    }
}

impl Iterator for RegionIndexIter {
    type Item = Index;

    fn next(&mut self) -> Option<Index> {
        if self.done {
            return None;
        }
        let item = self.current.clone();
        // Odometer increment, last axis fastest.
        let dim = self.region.dimension();
        let mut axis = dim;
        loop {
            if axis == 0 {
                self.done = true;
                break;
            }
            axis -= 1;
            self.current[axis] += 1;
            if self.current[axis] < self.region.end(axis) {
                break;
            }
            self.current[axis] = self.region.start()[axis];
        }
        Some(item)
    }
}

/// Iterator over the rows of a region: each item is the index of the
/// row's first element plus the row length (the size of the last axis).
#[derive(Clone, Debug)]
pub struct RegionRowIter {
    inner: RegionIndexIter,
    row_len: u64,
}

impl RegionRowIter {
    /// Iterate `region` row by row.
    pub fn new(region: &Region) -> Self {
        let dim = region.dimension();
        let row_len = if region.is_empty() || dim == 0 {
            0
        } else {
            region.size()[dim - 1]
        };
        // Rows are enumerated by iterating the region with the last
        // axis collapsed to a single element.
        let mut size = ndflow_core::region::Size::from_slice(region.size());
        if !region.is_empty() {
            size[dim - 1] = 1;
        }
        let rows = Region::new(Index::from_slice(region.start()), size);
        Self {
            inner: RegionIndexIter::new(&rows),
            row_len,
        }
    }
}

impl Iterator for RegionRowIter {
    type Item = (Index, u64);

    fn next(&mut self) -> Option<(Index, u64)> {
        self.inner.next().map(|idx| (idx, self.row_len))
    }
}
