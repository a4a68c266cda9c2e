//! Deterministic seeded image source.
//!
//! Pixel values come from a counter-mode ChaCha8 stream positioned by
//! each pixel's flat offset within the full extent, so the output is
//! identical for any worker count, any tiling, and any requested
//! sub-region. Constructed via the builder pattern:
//! [`RandomSource::builder`].

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use smallvec::SmallVec;

use ndflow_core::error::StageError;
use ndflow_core::region::{Region, Size};
use ndflow_image::{ImageInfo, RegionRowIter, Tile};
use ndflow_pipeline::{ExecContext, InfoContext, RequestContext, Stage};

/// Conventional default extent per axis.
pub const DEFAULT_SIZE: u64 = 64;

/// A source stage producing uniform random values in `[min, max)`.
#[derive(Debug)]
pub struct RandomSource {
    size: Size,
    info: ImageInfo,
    seed: u64,
    min: f32,
    max: f32,
}

/// Builder for [`RandomSource`].
///
/// All fields default: 64 samples per axis, unit spacing, zero
/// origin, seed 0, values in `[0, 1)`.
pub struct RandomSourceBuilder {
    dim: usize,
    size: Option<Size>,
    spacing: Option<SmallVec<[f64; 4]>>,
    origin: Option<SmallVec<[f64; 4]>>,
    seed: u64,
    min: f32,
    max: f32,
}

impl RandomSource {
    /// Create a builder for a `dim`-dimensional source.
    pub fn builder(dim: usize) -> RandomSourceBuilder {
        RandomSourceBuilder {
            dim,
            size: None,
            spacing: None,
            origin: None,
            seed: 0,
            min: 0.0,
            max: 1.0,
        }
    }

    /// The configured seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl RandomSourceBuilder {
    /// Set the extent per axis (default: 64 per axis).
    pub fn size(mut self, size: &[u64]) -> Self {
        self.size = Some(Size::from_slice(size));
        self
    }

    /// Set the physical sample spacing per axis (default: 1.0).
    pub fn spacing(mut self, spacing: &[f64]) -> Self {
        self.spacing = Some(SmallVec::from_slice(spacing));
        self
    }

    /// Set the physical origin per axis (default: 0.0).
    pub fn origin(mut self, origin: &[f64]) -> Self {
        self.origin = Some(SmallVec::from_slice(origin));
        self
    }

    /// Set the stream seed (default: 0).
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the half-open value range `[min, max)` (default: `[0, 1)`).
    pub fn range(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Build the source, validating all configuration.
    ///
    /// # Errors
    ///
    /// Returns `Err` if:
    /// - the dimension is zero
    /// - `size`, `spacing`, or `origin` length disagrees with it
    /// - any size axis is zero, or any spacing axis is not positive
    /// - the value range is empty or non-finite
    pub fn build(self) -> Result<RandomSource, String> {
        if self.dim == 0 {
            return Err("dimension must be at least 1".to_string());
        }
        let size = self
            .size
            .unwrap_or_else(|| Size::from_elem(DEFAULT_SIZE, self.dim));
        if size.len() != self.dim {
            return Err(format!(
                "size has {} axes, expected {}",
                size.len(),
                self.dim
            ));
        }
        if size.iter().any(|&s| s == 0) {
            return Err("size must be non-zero on every axis".to_string());
        }
        let spacing = self
            .spacing
            .unwrap_or_else(|| SmallVec::from_elem(1.0, self.dim));
        let origin = self
            .origin
            .unwrap_or_else(|| SmallVec::from_elem(0.0, self.dim));
        if spacing.len() != self.dim || origin.len() != self.dim {
            return Err(format!(
                "spacing ({} axes) and origin ({} axes) must both have {} axes",
                spacing.len(),
                origin.len(),
                self.dim
            ));
        }
        if spacing.iter().any(|&s| !s.is_finite() || s <= 0.0) {
            return Err("spacing must be finite and positive on every axis".to_string());
        }
        if !self.min.is_finite() || !self.max.is_finite() || self.min >= self.max {
            return Err(format!(
                "value range [{}, {}) must be finite and non-empty",
                self.min, self.max
            ));
        }
        Ok(RandomSource {
            size,
            info: ImageInfo { spacing, origin },
            seed: self.seed,
            min: self.min,
            max: self.max,
        })
    }
}

impl Stage for RandomSource {
    fn name(&self) -> &str {
        "random_source"
    }

    fn num_inputs(&self) -> usize {
        0
    }

    fn compute_output_information(&self, ctx: &mut InfoContext<'_>) -> Result<(), StageError> {
        ctx.set_output_region(0, Region::from_size(&self.size));
        ctx.set_output_info(0, self.info.clone());
        Ok(())
    }

    fn compute_input_requested_regions(
        &self,
        _ctx: &mut RequestContext<'_>,
    ) -> Result<(), StageError> {
        Ok(())
    }

    fn execute(
        &self,
        ctx: &ExecContext<'_>,
        sub: &Region,
        outputs: &mut [Tile],
    ) -> Result<(), StageError> {
        let largest = &ctx.output_info(0).largest;
        let span = self.max - self.min;
        let last = sub.dimension().saturating_sub(1);
        // Rows are contiguous in the full-extent stream: reposition
        // once per row, then draw one word per pixel.
        for (start, len) in RegionRowIter::new(sub) {
            let Some(base) = largest.offset_of(&start) else {
                continue;
            };
            let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
            rng.set_word_pos(u128::from(base));
            let mut idx = start.clone();
            for step in 0..len {
                idx[last] = start[last] + step as i64;
                let unit: f32 = rng.random();
                outputs[0].set(&idx, self.min + span * unit);
            }
        }
        Ok(())
    }
}
