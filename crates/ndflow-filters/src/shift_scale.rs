//! Pointwise affine remap: `v * scale + shift`.

use ndflow_core::error::StageError;
use ndflow_core::region::Region;
use ndflow_image::{RegionIndexIter, Tile};
use ndflow_pipeline::{ExecContext, InfoContext, RequestContext, Stage};

/// A pointwise stage computing `v * scale + shift` per element.
///
/// The textbook pass-through filter: its output geometry mirrors its
/// input, and it requests exactly the region requested of it.
#[derive(Clone, Copy, Debug)]
pub struct ShiftScale {
    scale: f32,
    shift: f32,
}

impl ShiftScale {
    /// Create a stage computing `v * scale + shift`.
    pub fn new(scale: f32, shift: f32) -> Self {
        Self { scale, shift }
    }

    /// Replace the scale factor.
    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale;
    }

    /// Replace the additive shift.
    pub fn set_shift(&mut self, shift: f32) {
        self.shift = shift;
    }
}

impl Stage for ShiftScale {
    fn name(&self) -> &str {
        "shift_scale"
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
        ctx.pass_through();
        Ok(())
    }

    fn execute(
        &self,
        ctx: &ExecContext<'_>,
        sub: &Region,
        outputs: &mut [Tile],
    ) -> Result<(), StageError> {
        let input = ctx.input(0)?;
        for idx in RegionIndexIter::new(sub) {
            outputs[0].set(&idx, input.get_clamped(&idx) * self.scale + self.shift);
        }
        Ok(())
    }
}
