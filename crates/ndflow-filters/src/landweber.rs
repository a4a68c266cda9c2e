//! Landweber deconvolution: an iterative whole-input stage.
//!
//! Estimates `f` from an observed `g = H * f` by gradient descent on
//! the residual, `f_{k+1} = f_k + alpha * H^T (g - H f_k)`, where `H`
//! applies the (separable) blur kernel. The loop runs inside one
//! `execute` through the iteration driver, emitting one `Iteration`
//! event per sweep and honoring a cooperative stop flag.

use ndflow_core::error::StageError;
use ndflow_core::region::Region;
use ndflow_image::{ImageView, RegionIndexIter, Tile};
use ndflow_pipeline::{
    ExecContext, InfoContext, IterationDriver, RequestContext, Stage, StopFlag, Threading,
};

use crate::convolve::{convolve_separable, Kernel1D};

/// Iterative deconvolution by the Landweber scheme.
///
/// Constructed via [`LandweberDeconvolution::builder`]. The stage is
/// `Threading::Single` (the convergence loop must see the whole
/// region, not one tile) and requests its entire input.
#[derive(Debug)]
pub struct LandweberDeconvolution {
    kernel: Kernel1D,
    relaxation: f32,
    max_iterations: u64,
    convergence_threshold: f64,
    stop: StopFlag,
}

/// Builder for [`LandweberDeconvolution`].
///
/// Required field: `kernel`.
pub struct LandweberDeconvolutionBuilder {
    kernel: Option<Kernel1D>,
    relaxation: f32,
    max_iterations: u64,
    convergence_threshold: f64,
}

impl LandweberDeconvolution {
    /// Create a builder with default relaxation 1.0, 50 iterations,
    /// and a residual threshold of 1e-6.
    pub fn builder() -> LandweberDeconvolutionBuilder {
        LandweberDeconvolutionBuilder {
            kernel: None,
            relaxation: 1.0,
            max_iterations: 50,
            convergence_threshold: 1e-6,
        }
    }

    /// A clone of the stage's stop flag. Raise it from any thread to
    /// end the loop after the in-flight iteration; [`StopFlag::clear`]
    /// re-arms it for the next update.
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }
}

impl LandweberDeconvolutionBuilder {
    /// Set the blur kernel to invert (required).
    pub fn kernel(mut self, kernel: Kernel1D) -> Self {
        self.kernel = Some(kernel);
        self
    }

    /// Set the relaxation factor `alpha` (default: 1.0). Must be
    /// finite and positive; too large a value diverges.
    pub fn relaxation(mut self, relaxation: f32) -> Self {
        self.relaxation = relaxation;
        self
    }

    /// Set the iteration budget (default: 50).
    pub fn max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the residual-norm threshold below which the loop converges
    /// (default: 1e-6).
    pub fn convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = threshold;
        self
    }

    /// Build the stage, validating all configuration.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `kernel` is not set, `relaxation` is not
    /// finite and positive, or the threshold is negative or NaN.
    pub fn build(self) -> Result<LandweberDeconvolution, String> {
        let kernel = self.kernel.ok_or_else(|| "kernel is required".to_string())?;
        if !self.relaxation.is_finite() || self.relaxation <= 0.0 {
            return Err(format!(
                "relaxation must be finite and positive, got {}",
                self.relaxation
            ));
        }
        if !(self.convergence_threshold >= 0.0) {
            return Err(format!(
                "convergence threshold must be >= 0, got {}",
                self.convergence_threshold
            ));
        }
        Ok(LandweberDeconvolution {
            kernel,
            relaxation: self.relaxation,
            max_iterations: self.max_iterations,
            convergence_threshold: self.convergence_threshold,
            stop: StopFlag::new(),
        })
    }
}

/// Copy the observed data over `region` into a dense row-major vector.
fn gather(view: &ImageView<'_>, region: &Region) -> Vec<f32> {
    if view.region() == region {
        return view.as_slice().to_vec();
    }
    RegionIndexIter::new(region)
        .map(|idx| view.get_clamped(&idx))
        .collect()
}

impl Stage for LandweberDeconvolution {
    fn name(&self) -> &str {
        "landweber_deconvolution"
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn compute_output_information(&self, ctx: &mut InfoContext<'_>) -> Result<(), StageError> {
        ctx.mirror_input(0, 0);
        Ok(())
    }

    fn compute_input_requested_regions(
        &self,
        ctx: &mut RequestContext<'_>,
    ) -> Result<(), StageError> {
        ctx.whole_input();
        Ok(())
    }

    /// The estimate is coupled across the whole extent through the
    /// repeated convolutions: always produce all of it.
    fn enlarge_requested_region(
        &self,
        _output: usize,
        _requested: &Region,
        largest: &Region,
    ) -> Region {
        largest.clone()
    }

    fn threading(&self) -> Threading {
        Threading::Single
    }

    fn execute(
        &self,
        ctx: &ExecContext<'_>,
        sub: &Region,
        outputs: &mut [Tile],
    ) -> Result<(), StageError> {
        let input = ctx.input(0)?;
        let observed = gather(input, sub);
        let mut estimate = observed.clone();
        let adjoint = self.kernel.reversed();
        let elements = observed.len().max(1) as f64;

        let mut driver = IterationDriver::new(
            self.max_iterations,
            self.convergence_threshold,
            self.stop.clone(),
        );
        driver.run(ctx.hub(), self.name(), |_iteration| {
            let blurred = convolve_separable(sub, &estimate, &self.kernel);
            let mut residual = Vec::with_capacity(observed.len());
            let mut sum_sq = 0.0f64;
            for (&g, &b) in observed.iter().zip(&blurred) {
                let r = g - b;
                sum_sq += f64::from(r) * f64::from(r);
                residual.push(r);
            }
            let metric = (sum_sq / elements).sqrt();
            if !metric.is_finite() {
                return Err(StageError::NonFiniteResult {
                    output_index: 0,
                    element: None,
                });
            }

            let correction = convolve_separable(sub, &residual, &adjoint);
            for (f, c) in estimate.iter_mut().zip(correction) {
                *f += self.relaxation * c;
            }
            Ok(metric)
        })?;

        for (value, idx) in estimate.iter().zip(RegionIndexIter::new(sub)) {
            outputs[0].set(&idx, *value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_a_kernel_and_sane_numbers() {
        assert!(LandweberDeconvolution::builder().build().is_err());
        assert!(LandweberDeconvolution::builder()
            .kernel(Kernel1D::box_filter(1))
            .relaxation(0.0)
            .build()
            .is_err());
        assert!(LandweberDeconvolution::builder()
            .kernel(Kernel1D::box_filter(1))
            .convergence_threshold(-1.0)
            .build()
            .is_err());
        assert!(LandweberDeconvolution::builder()
            .kernel(Kernel1D::box_filter(1))
            .build()
            .is_ok());
    }

    #[test]
    fn identity_kernel_converges_immediately() {
        // With H = identity the first residual is exactly zero, so the
        // loop converges after one iteration and returns the input.
        use ndflow_core::id::OutputRef;
        use ndflow_pipeline::Pipeline;
        use crate::random_source::RandomSource;

        let mut p = Pipeline::with_workers(1).unwrap();
        let src = p.add_stage(
            RandomSource::builder(2).size(&[6, 6]).seed(3).build().unwrap(),
        );
        let deconv = p.add_stage(
            LandweberDeconvolution::builder()
                .kernel(Kernel1D::new(vec![1.0]).unwrap())
                .build()
                .unwrap(),
        );
        p.connect(OutputRef::first(src), deconv, 0).unwrap();

        p.update(OutputRef::first(deconv)).unwrap();
        let input = p.output_image(OutputRef::first(src)).unwrap().as_slice().to_vec();
        let output = p.output_image(OutputRef::first(deconv)).unwrap().as_slice();
        assert_eq!(input, output);
    }
}
