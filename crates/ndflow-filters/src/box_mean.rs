//! Neighborhood mean filter over a `(2r + 1)^D` box.

use smallvec::SmallVec;

use ndflow_core::error::StageError;
use ndflow_core::region::{Index, Region, Size};
use ndflow_image::{RegionIndexIter, Tile};
use ndflow_pipeline::{ExecContext, InfoContext, RequestContext, Stage};

/// Averages each element with its box neighborhood.
///
/// The canonical padded-request filter: each input request is the
/// output request expanded by the radius, clamped to the input extent;
/// samples past the extent replicate the boundary.
#[derive(Clone, Copy, Debug)]
pub struct BoxMean {
    radius: u64,
}

impl BoxMean {
    /// Create a filter averaging over `(2 * radius + 1)^D` elements.
    pub fn new(radius: u64) -> Self {
        Self { radius }
    }

    /// The neighborhood radius.
    pub fn radius(&self) -> u64 {
        self.radius
    }
}

impl Stage for BoxMean {
    fn name(&self) -> &str {
        "box_mean"
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
        ctx.pad_by(self.radius);
        Ok(())
    }

    fn execute(
        &self,
        ctx: &ExecContext<'_>,
        sub: &Region,
        outputs: &mut [Tile],
    ) -> Result<(), StageError> {
        let input = ctx.input(0)?;
        let dim = sub.dimension();
        let r = self.radius as i64;
        let offsets = Region::new(
            Index::from_elem(-r, dim),
            Size::from_elem(2 * self.radius + 1, dim),
        );
        let count = offsets.num_elements() as f32;

        let mut neighbor: Index = SmallVec::from_elem(0, dim);
        for idx in RegionIndexIter::new(sub) {
            let mut acc = 0.0f32;
            for off in RegionIndexIter::new(&offsets) {
                for axis in 0..dim {
                    neighbor[axis] = idx[axis] + off[axis];
                }
                acc += input.get_clamped(&neighbor);
            }
            outputs[0].set(&idx, acc / count);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random_source::RandomSource;
    use ndflow_core::id::OutputRef;
    use ndflow_pipeline::Pipeline;

    fn region(start: &[i64], size: &[u64]) -> Region {
        Region::new(SmallVec::from_slice(start), SmallVec::from_slice(size))
    }

    #[test]
    fn radius_zero_is_identity() {
        let mut p = Pipeline::with_workers(2).unwrap();
        let src = p.add_stage(RandomSource::builder(2).size(&[8, 8]).build().unwrap());
        let mean = p.add_stage(BoxMean::new(0));
        p.connect(OutputRef::first(src), mean, 0).unwrap();

        p.update(OutputRef::first(mean)).unwrap();
        let a = p.output_image(OutputRef::first(src)).unwrap().as_slice().to_vec();
        let b = p.output_image(OutputRef::first(mean)).unwrap().as_slice();
        assert_eq!(a, b);
    }

    #[test]
    fn constant_input_is_preserved() {
        // A constant field averages to itself, boundaries included.
        let mut p = Pipeline::with_workers(4).unwrap();
        let src = p.add_stage(
            RandomSource::builder(2)
                .size(&[10, 10])
                .range(5.0, 5.0000005)
                .build()
                .unwrap(),
        );
        let mean = p.add_stage(BoxMean::new(2));
        p.connect(OutputRef::first(src), mean, 0).unwrap();

        p.update(OutputRef::first(mean)).unwrap();
        let image = p.output_image(OutputRef::first(mean)).unwrap();
        for &v in image.as_slice() {
            assert!((v - 5.0).abs() < 1e-4);
        }
    }

    #[test]
    fn request_is_padded_upstream_and_clamped() {
        let mut p = Pipeline::with_workers(1).unwrap();
        let src = p.add_stage(RandomSource::builder(2).size(&[16, 16]).build().unwrap());
        let mean = p.add_stage(BoxMean::new(2));
        p.connect(OutputRef::first(src), mean, 0).unwrap();

        let target = OutputRef::first(mean);
        p.request_region(target, region(&[4, 4], &[4, 4])).unwrap();
        p.update(target).unwrap();

        // [4,4]+4 padded by 2 is [2,2]+8, well inside the extent.
        assert_eq!(
            p.data_object(OutputRef::first(src)).unwrap().buffered_region(),
            &region(&[2, 2], &[8, 8])
        );

        // A corner request pads past the extent and clamps to it.
        p.request_region(target, region(&[0, 0], &[2, 2])).unwrap();
        p.update(target).unwrap();
        assert!(p
            .data_object(OutputRef::first(src))
            .unwrap()
            .buffered_region()
            .contains(&region(&[0, 0], &[4, 4])));
    }

    #[test]
    fn interior_value_is_the_neighborhood_mean() {
        let mut p = Pipeline::with_workers(1).unwrap();
        let src = p.add_stage(
            RandomSource::builder(2).size(&[9, 9]).seed(7).build().unwrap(),
        );
        let mean = p.add_stage(BoxMean::new(1));
        p.connect(OutputRef::first(src), mean, 0).unwrap();

        p.update(OutputRef::first(mean)).unwrap();
        let input = p.output_image(OutputRef::first(src)).unwrap();
        let output = p.output_image(OutputRef::first(mean)).unwrap();

        let mut acc = 0.0f32;
        for idx in RegionIndexIter::new(&region(&[3, 3], &[3, 3])) {
            acc += input.get(&idx).unwrap();
        }
        let expected = acc / 9.0;
        let got = output.get(&[4, 4]).unwrap();
        assert!((got - expected).abs() < 1e-5);
    }
}
