//! Global magnitude normalization.

use ndflow_core::error::StageError;
use ndflow_core::region::Region;
use ndflow_image::{RegionIndexIter, Tile};
use ndflow_pipeline::{ExecContext, InfoContext, RequestContext, Stage, Threading};

/// Divides every element by the input's global maximum magnitude.
///
/// The canonical whole-input stage: however small the output request,
/// the statistic depends on every input element, so the full input
/// extent is requested and the full output extent produced.
#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalNormalize;

impl GlobalNormalize {
    /// Create a normalizer.
    pub fn new() -> Self {
        Self
    }
}

impl Stage for GlobalNormalize {
    fn name(&self) -> &str {
        "global_normalize"
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

    /// The statistic is global, so a partial output would be wasted
    /// work: always produce the full extent.
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

        let mut max_magnitude = 0.0f32;
        for (flat, &v) in input.as_slice().iter().enumerate() {
            if !v.is_finite() {
                return Err(StageError::NonFiniteResult {
                    output_index: 0,
                    element: Some(flat as u64),
                });
            }
            max_magnitude = max_magnitude.max(v.abs());
        }
        if max_magnitude == 0.0 {
            return Err(StageError::ExecutionFailed {
                reason: "input is identically zero".to_string(),
            });
        }

        for idx in RegionIndexIter::new(sub) {
            outputs[0].set(&idx, input.get_clamped(&idx) / max_magnitude);
        }
        Ok(())
    }
}
