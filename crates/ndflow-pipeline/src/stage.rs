//! The [`Stage`] trait: the capability set every filter implements to
//! plug into the pipeline.
//!
//! A stage is polymorphic over three callbacks (compute output
//! information, compute input requested regions, execute) plus an
//! optional enlarge hook. The executor hands each callback a narrow
//! context: metadata snapshots for the propagation passes, read-only
//! input views and worker tiles for execution. Stages never touch the
//! graph or other stages' buffers directly.

use std::any::Any;

use ndflow_core::error::StageError;
use ndflow_core::event::EventHub;
use ndflow_core::region::Region;
use ndflow_image::{ImageInfo, ImageView, Tile};

/// How the executor invokes a stage's `execute`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Threading {
    /// The requested region is partitioned and `execute` runs
    /// concurrently, once per sub-region.
    #[default]
    Tiled,
    /// `execute` runs exactly once on the calling thread, covering the
    /// whole requested region. For global transforms and iterative
    /// stages whose loop must not be entered per-tile.
    Single,
}

/// Upcast helper so the pipeline can downcast stages for typed
/// parameter mutation. Blanket-implemented; stages never implement it
/// by hand.
pub trait AsAnyMut {
    /// `&mut dyn Any` view of self.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAnyMut for T {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A unit of computation in the pipeline graph.
///
/// # Contract
///
/// - All callbacks take `&self`: parameters are fixed during an
///   update, and `execute` runs concurrently across worker threads.
/// - `compute_output_information` must be idempotent and free of side
///   effects beyond writing output metadata through the context.
/// - `execute` must write only the tiles it is handed (each covering
///   its assigned sub-region) and treat all inputs as read-only.
///
/// # Object safety
///
/// The trait is object-safe; pipelines store stages as
/// `Box<dyn Stage>`.
pub trait Stage: AsAnyMut + Send + Sync + 'static {
    /// Human-readable name for error reporting and event attribution.
    fn name(&self) -> &str;

    /// Number of required inputs. All must be connected before an
    /// update can succeed.
    fn num_inputs(&self) -> usize;

    /// Number of output data objects this stage produces.
    ///
    /// Outputs are congruent: they share the partitioned requested
    /// region during execution.
    fn num_outputs(&self) -> usize {
        1
    }

    /// Information propagation: read input extents/metadata, write own
    /// output extents/metadata. Sources derive extents from their own
    /// configuration.
    fn compute_output_information(&self, ctx: &mut InfoContext<'_>) -> Result<(), StageError>;

    /// Request propagation: read own outputs' requested regions, write
    /// what each input must provide. The context offers the three
    /// standard policies (pass-through, padded, whole-input); inputs
    /// left unset default to pass-through.
    fn compute_input_requested_regions(
        &self,
        ctx: &mut RequestContext<'_>,
    ) -> Result<(), StageError>;

    /// Optional hook widening an output's requested region beyond the
    /// consumers' union (e.g. a whole-extent constraint). Runs after
    /// all consumers have deposited their requests and before this
    /// stage's input-region computation. The result is clamped to
    /// `largest`.
    fn enlarge_requested_region(
        &self,
        output: usize,
        requested: &Region,
        largest: &Region,
    ) -> Region {
        let _ = (output, largest);
        requested.clone()
    }

    /// Execution strategy; see [`Threading`].
    fn threading(&self) -> Threading {
        Threading::Tiled
    }

    /// Compute `sub` of every output into the given tiles (one per
    /// output, all covering `sub`).
    fn execute(
        &self,
        ctx: &ExecContext<'_>,
        sub: &Region,
        outputs: &mut [Tile],
    ) -> Result<(), StageError>;
}

/// Metadata snapshot of one input during information propagation.
#[derive(Clone, Debug)]
pub struct InputInfo {
    /// The input's largest possible region.
    pub largest: Region,
    /// The input's non-region metadata.
    pub info: ImageInfo,
}

/// One output's metadata slot, written during information propagation.
#[derive(Clone, Debug)]
pub struct OutputInfoSlot {
    /// The output's largest possible region.
    pub largest: Region,
    /// The output's non-region metadata.
    pub info: ImageInfo,
}

/// Context for [`Stage::compute_output_information`].
#[derive(Debug)]
pub struct InfoContext<'a> {
    inputs: &'a [InputInfo],
    outputs: &'a mut [OutputInfoSlot],
}

impl<'a> InfoContext<'a> {
    /// Build a context over input snapshots and output slots.
    pub fn new(inputs: &'a [InputInfo], outputs: &'a mut [OutputInfoSlot]) -> Self {
        Self { inputs, outputs }
    }

    /// Number of inputs.
    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// Metadata of input `i`.
    pub fn input(&self, i: usize) -> &InputInfo {
        &self.inputs[i]
    }

    /// Set output `o`'s largest possible region.
    pub fn set_output_region(&mut self, o: usize, region: Region) {
        self.outputs[o].largest = region;
    }

    /// Set output `o`'s non-region metadata.
    pub fn set_output_info(&mut self, o: usize, info: ImageInfo) {
        self.outputs[o].info = info;
    }

    /// Copy input `i`'s extent and metadata onto output `o`, the
    /// common case for filters that preserve geometry.
    pub fn mirror_input(&mut self, i: usize, o: usize) {
        self.outputs[o].largest = self.inputs[i].largest.clone();
        self.outputs[o].info = self.inputs[i].info.clone();
    }
}

/// One output's request state during the request pass.
#[derive(Clone, Debug)]
pub struct OutputRequest {
    /// The (possibly enlarged) region consumers want from this output.
    pub requested: Region,
    /// The output's full extent.
    pub largest: Region,
}

/// One input's request slot during the request pass.
#[derive(Clone, Debug)]
pub struct InputRequest {
    /// The input's full extent (for clamping).
    pub largest: Region,
    /// The region this stage requires of the input; `None` defaults to
    /// pass-through.
    pub requested: Option<Region>,
}

/// Context for [`Stage::compute_input_requested_regions`].
#[derive(Debug)]
pub struct RequestContext<'a> {
    outputs: &'a [OutputRequest],
    inputs: &'a mut [InputRequest],
}

impl<'a> RequestContext<'a> {
    /// Build a context over output requests and input slots.
    pub fn new(outputs: &'a [OutputRequest], inputs: &'a mut [InputRequest]) -> Self {
        Self { outputs, inputs }
    }

    /// Region requested of output `o`.
    pub fn output_requested(&self, o: usize) -> &Region {
        &self.outputs[o].requested
    }

    /// Full extent of input `i`.
    pub fn input_largest(&self, i: usize) -> &Region {
        &self.inputs[i].largest
    }

    /// Union of all outputs' requested regions: what a multi-output
    /// stage must cover overall.
    pub fn combined_output_request(&self) -> Region {
        let mut combined = self.outputs[0].requested.clone();
        for out in &self.outputs[1..] {
            combined = combined.bounding_union(&out.requested);
        }
        combined
    }

    /// Set input `i`'s requested region directly.
    pub fn set_input_requested(&mut self, i: usize, region: Region) {
        self.inputs[i].requested = Some(region);
    }

    /// Pass-through policy: every input mirrors the combined output
    /// request, clamped to the input's extent. For pointwise filters.
    pub fn pass_through(&mut self) {
        let request = self.combined_output_request();
        for input in self.inputs.iter_mut() {
            input.requested = Some(request.crop_to(&input.largest));
        }
    }

    /// Padded policy: every input gets the combined output request
    /// expanded by `radius` on every axis, clamped to the input's
    /// extent. For neighborhood filters.
    pub fn pad_by(&mut self, radius: u64) {
        let request = self.combined_output_request().pad(radius);
        for input in self.inputs.iter_mut() {
            input.requested = Some(request.crop_to(&input.largest));
        }
    }

    /// Whole-input policy: every input's full extent is required
    /// regardless of the output request. For global transforms where
    /// every output element depends on every input element.
    pub fn whole_input(&mut self) {
        for input in self.inputs.iter_mut() {
            input.requested = Some(input.largest.clone());
        }
    }
}

/// Context for [`Stage::execute`]: read-only input views plus the
/// stage's event hub, shared across worker threads.
pub struct ExecContext<'a> {
    stage_name: &'a str,
    inputs: Vec<ImageView<'a>>,
    output_info: &'a [OutputInfoSlot],
    hub: &'a EventHub,
}

impl<'a> ExecContext<'a> {
    /// Build an execution context.
    pub fn new(
        stage_name: &'a str,
        inputs: Vec<ImageView<'a>>,
        output_info: &'a [OutputInfoSlot],
        hub: &'a EventHub,
    ) -> Self {
        Self {
            stage_name,
            inputs,
            output_info,
            hub,
        }
    }

    /// Name of the executing stage.
    pub fn stage_name(&self) -> &str {
        self.stage_name
    }

    /// Number of inputs.
    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// Read-only view of input `i`, scoped to its buffered region.
    pub fn input(&self, i: usize) -> Result<&ImageView<'a>, StageError> {
        self.inputs
            .get(i)
            .ok_or(StageError::MissingInput { input_index: i })
    }

    /// Output `o`'s propagated metadata.
    pub fn output_info(&self, o: usize) -> &OutputInfoSlot {
        &self.output_info[o]
    }

    /// The stage's event hub, for iterative stages emitting
    /// per-iteration events from inside `execute`.
    pub fn hub(&self) -> &EventHub {
        self.hub
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::SmallVec;

    fn region(start: &[i64], size: &[u64]) -> Region {
        Region::new(SmallVec::from_slice(start), SmallVec::from_slice(size))
    }

    fn slots(largest: Region) -> Vec<OutputInfoSlot> {
        vec![OutputInfoSlot {
            largest,
            info: ImageInfo::uniform(2),
        }]
    }

    #[test]
    fn mirror_input_copies_extent_and_info() {
        let inputs = vec![InputInfo {
            largest: region(&[0, 0], &[8, 8]),
            info: ImageInfo::uniform(2),
        }];
        let mut outputs = slots(Region::empty(2));
        let mut ctx = InfoContext::new(&inputs, &mut outputs);
        ctx.mirror_input(0, 0);
        assert_eq!(outputs[0].largest, region(&[0, 0], &[8, 8]));
    }

    #[test]
    fn pass_through_clamps_to_input_extent() {
        let outputs = vec![OutputRequest {
            requested: region(&[-2, -2], &[8, 8]),
            largest: region(&[-2, -2], &[8, 8]),
        }];
        let mut inputs = vec![InputRequest {
            largest: region(&[0, 0], &[4, 4]),
            requested: None,
        }];
        let mut ctx = RequestContext::new(&outputs, &mut inputs);
        ctx.pass_through();
        assert_eq!(inputs[0].requested, Some(region(&[0, 0], &[4, 4])));
    }

    #[test]
    fn pad_by_expands_then_clamps() {
        let outputs = vec![OutputRequest {
            requested: region(&[0, 0], &[2, 2]),
            largest: region(&[0, 0], &[10, 10]),
        }];
        let mut inputs = vec![InputRequest {
            largest: region(&[0, 0], &[10, 10]),
            requested: None,
        }];
        let mut ctx = RequestContext::new(&outputs, &mut inputs);
        ctx.pad_by(3);
        assert_eq!(inputs[0].requested, Some(region(&[0, 0], &[5, 5])));
    }

    #[test]
    fn whole_input_ignores_output_request() {
        let outputs = vec![OutputRequest {
            requested: region(&[4, 4], &[1, 1]),
            largest: region(&[0, 0], &[64, 64]),
        }];
        let mut inputs = vec![InputRequest {
            largest: region(&[0, 0], &[64, 64]),
            requested: None,
        }];
        let mut ctx = RequestContext::new(&outputs, &mut inputs);
        ctx.whole_input();
        assert_eq!(inputs[0].requested, Some(region(&[0, 0], &[64, 64])));
    }

    #[test]
    fn combined_output_request_unions() {
        let outputs = vec![
            OutputRequest {
                requested: region(&[0], &[2]),
                largest: region(&[0], &[10]),
            },
            OutputRequest {
                requested: region(&[5], &[2]),
                largest: region(&[0], &[10]),
            },
        ];
        let mut inputs = Vec::new();
        let ctx = RequestContext::new(&outputs, &mut inputs);
        assert_eq!(ctx.combined_output_request(), region(&[0], &[7]));
    }
}
