//! Non-region image metadata carried through information propagation.

use smallvec::SmallVec;

/// Physical-space descriptors of an image: sample spacing and origin
/// per axis. Propagated alongside region extents during the
/// information pass; filters that resample or pad adjust these.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageInfo {
    /// Physical distance between adjacent samples, per axis.
    pub spacing: SmallVec<[f64; 4]>,
    /// Physical coordinate of the index-space origin, per axis.
    pub origin: SmallVec<[f64; 4]>,
}

impl ImageInfo {
    /// Unit spacing and zero origin for `dim` axes, the conventional
    /// default for sources that have no physical calibration.
    pub fn uniform(dim: usize) -> Self {
        Self {
            spacing: SmallVec::from_elem(1.0, dim),
            origin: SmallVec::from_elem(0.0, dim),
        }
    }

    /// Number of axes described.
    pub fn dimension(&self) -> usize {
        self.spacing.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_defaults() {
        let info = ImageInfo::uniform(3);
        assert_eq!(info.dimension(), 3);
        assert!(info.spacing.iter().all(|&s| s == 1.0));
        assert!(info.origin.iter().all(|&o| o == 0.0));
    }
}
