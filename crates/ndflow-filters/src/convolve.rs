//! Separable small-kernel direct convolution over region-addressed
//! buffers, with clamped boundaries.
//!
//! Shared by [`crate::LandweberDeconvolution`], which applies the
//! kernel and its adjoint once per iteration. Deliberately direct (no
//! FFT): kernels here are a handful of taps wide.

use ndflow_core::region::Region;
use ndflow_image::RegionIndexIter;

/// A symmetric-length one-dimensional kernel, applied separably along
/// every axis.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel1D {
    weights: Vec<f32>,
}

impl Kernel1D {
    /// Create a kernel from raw taps.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the tap count is even or zero, or any tap is
    /// non-finite.
    pub fn new(weights: Vec<f32>) -> Result<Self, String> {
        if weights.is_empty() || weights.len() % 2 == 0 {
            return Err(format!(
                "kernel needs an odd number of taps, got {}",
                weights.len()
            ));
        }
        if weights.iter().any(|w| !w.is_finite()) {
            return Err("kernel taps must be finite".to_string());
        }
        Ok(Self { weights })
    }

    /// Uniform averaging kernel of `2 * radius + 1` taps.
    pub fn box_filter(radius: u64) -> Self {
        let taps = (2 * radius + 1) as usize;
        Self {
            weights: vec![1.0 / taps as f32; taps],
        }
    }

    /// Taps on each side of the center.
    pub fn radius(&self) -> u64 {
        (self.weights.len() / 2) as u64
    }

    /// The raw taps, center at `weights()[radius()]`.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// The adjoint kernel: taps in reverse order. Equal to `self` for
    /// symmetric kernels.
    pub fn reversed(&self) -> Kernel1D {
        let mut weights = self.weights.clone();
        weights.reverse();
        Kernel1D { weights }
    }
}

/// Convolve `data` (row-major over `region`) along one axis,
/// clamping neighbor indices to the region boundary.
pub fn convolve_axis(region: &Region, data: &[f32], axis: usize, kernel: &Kernel1D) -> Vec<f32> {
    let radius = kernel.radius() as i64;
    let lo = region.start()[axis];
    let hi = region.end(axis) - 1;
    let mut out = vec![0.0f32; data.len()];

    for (flat, idx) in RegionIndexIter::new(region).enumerate() {
        let mut acc = 0.0f32;
        let mut neighbor = idx.clone();
        for (tap, &w) in kernel.weights().iter().enumerate() {
            neighbor[axis] = (idx[axis] + tap as i64 - radius).clamp(lo, hi);
            let Some(offset) = region.offset_of(&neighbor) else {
                continue;
            };
            acc += w * data[offset as usize];
        }
        out[flat] = acc;
    }
    out
}

/// Convolve along every axis in turn: the separable N-dimensional
/// product of the one-dimensional kernel.
pub fn convolve_separable(region: &Region, data: &[f32], kernel: &Kernel1D) -> Vec<f32> {
    let mut current = data.to_vec();
    for axis in 0..region.dimension() {
        current = convolve_axis(region, &current, axis, kernel);
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::SmallVec;

    fn region(start: &[i64], size: &[u64]) -> Region {
        Region::new(SmallVec::from_slice(start), SmallVec::from_slice(size))
    }

    #[test]
    fn kernel_validation() {
        assert!(Kernel1D::new(vec![]).is_err());
        assert!(Kernel1D::new(vec![0.5, 0.5]).is_err());
        assert!(Kernel1D::new(vec![0.25, f32::NAN, 0.25]).is_err());
        assert_eq!(Kernel1D::box_filter(2).radius(), 2);
    }

    #[test]
    fn identity_kernel_is_a_no_op() {
        let r = region(&[0, 0], &[3, 4]);
        let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let kernel = Kernel1D::new(vec![1.0]).unwrap();
        assert_eq!(convolve_separable(&r, &data, &kernel), data);
    }

    #[test]
    fn box_kernel_averages_with_clamped_edges() {
        let r = region(&[0], &[4]);
        let data = vec![3.0, 6.0, 9.0, 12.0];
        let out = convolve_axis(&r, &data, 0, &Kernel1D::box_filter(1));
        // Left edge replicates data[0], right edge replicates data[3].
        assert_eq!(out, vec![4.0, 6.0, 9.0, 11.0]);
    }

    #[test]
    fn separable_passes_commute_with_constant_input() {
        let r = region(&[-1, -1], &[5, 5]);
        let data = vec![2.0f32; 25];
        let out = convolve_separable(&r, &data, &Kernel1D::box_filter(1));
        for v in out {
            assert!((v - 2.0).abs() < 1e-5);
        }
    }

    #[test]
    fn reversed_flips_asymmetric_taps() {
        let kernel = Kernel1D::new(vec![0.1, 0.2, 0.7]).unwrap();
        assert_eq!(kernel.reversed().weights(), &[0.7, 0.2, 0.1]);
        let symmetric = Kernel1D::box_filter(1);
        assert_eq!(symmetric.reversed(), symmetric);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Box weights are convex, and clamping only repeats real
            // samples, so averaging can never escape the input range.
            #[test]
            fn box_filter_output_stays_within_input_bounds(
                data in proptest::collection::vec(-100.0f32..100.0, 1..64),
                radius in 0u64..4,
            ) {
                let r = region(&[0], &[data.len() as u64]);
                let out = convolve_axis(&r, &data, 0, &Kernel1D::box_filter(radius));
                let lo = data.iter().copied().fold(f32::INFINITY, f32::min);
                let hi = data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                for v in out {
                    prop_assert!(v >= lo - 1e-3);
                    prop_assert!(v <= hi + 1e-3);
                }
            }

            #[test]
            fn identity_kernel_preserves_any_input(
                data in proptest::collection::vec(-10.0f32..10.0, 1..32),
            ) {
                let r = region(&[-3], &[data.len() as u64]);
                let kernel = Kernel1D::new(vec![1.0]).unwrap();
                prop_assert_eq!(convolve_separable(&r, &data, &kernel), data);
            }
        }
    }
}
