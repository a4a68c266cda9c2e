//! Region partitioning for parallel dispatch.

use ndflow_core::region::{Index, Region, Size};
use smallvec::SmallVec;

/// Partition `region` into up to `want` disjoint sub-regions whose
/// union is exactly `region`.
///
/// Repeatedly halves the largest remaining piece along its
/// largest-extent axis until `want` pieces exist, no piece can be
/// halved without dropping below `min_elements`, or every piece is a
/// single element. The result order is deterministic for a given
/// input, so tile blit order (and with it any floating-point
/// accumulation done by the caller) is reproducible.
///
/// An empty region yields no pieces; otherwise at least one.
pub fn split_region(region: &Region, want: usize, min_elements: u64) -> Vec<Region> {
    if region.is_empty() {
        return Vec::new();
    }
    let want = want.max(1);
    let min_elements = min_elements.max(1);
    let mut pieces = vec![region.clone()];

    while pieces.len() < want {
        // Halve the piece with the most elements that is still
        // splittable.
        let candidate = pieces
            .iter()
            .enumerate()
            .filter(|(_, p)| p.num_elements() >= 2 * min_elements && splittable_axis(p).is_some())
            .max_by_key(|(_, p)| p.num_elements())
            .map(|(i, _)| i);
        let Some(i) = candidate else { break };
        let piece = pieces.remove(i);
        let (lo, hi) = halve(&piece);
        pieces.insert(i, hi);
        pieces.insert(i, lo);
    }
    pieces
}

/// The axis with the largest extent that can still be halved, if any.
fn splittable_axis(region: &Region) -> Option<usize> {
    (0..region.dimension())
        .filter(|&axis| region.size()[axis] >= 2)
        .max_by_key(|&axis| region.size()[axis])
}

/// Split `region` in half along its largest axis.
fn halve(region: &Region) -> (Region, Region) {
    let axis = splittable_axis(region).unwrap_or(0);
    let half = region.size()[axis] / 2;

    let mut lo_size: Size = SmallVec::from_slice(region.size());
    lo_size[axis] = half;
    let lo = Region::new(Index::from_slice(region.start()), lo_size);

    let mut hi_start: Index = SmallVec::from_slice(region.start());
    hi_start[axis] += half as i64;
    let mut hi_size: Size = SmallVec::from_slice(region.size());
    hi_size[axis] -= half;
    let hi = Region::new(hi_start, hi_size);

    (lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndflow_image::RegionIndexIter;
    use proptest::prelude::*;
    use smallvec::SmallVec;

    fn region(start: &[i64], size: &[u64]) -> Region {
        Region::new(SmallVec::from_slice(start), SmallVec::from_slice(size))
    }

    #[test]
    fn empty_region_yields_no_pieces() {
        assert!(split_region(&Region::empty(2), 8, 1).is_empty());
    }

    #[test]
    fn want_one_returns_whole_region() {
        let r = region(&[0, 0], &[16, 16]);
        assert_eq!(split_region(&r, 1, 1), vec![r]);
    }

    #[test]
    fn splits_along_largest_axis_first() {
        let r = region(&[0, 0], &[4, 16]);
        let pieces = split_region(&r, 2, 1);
        assert_eq!(pieces.len(), 2);
        // Axis 1 (extent 16) must have been halved, not axis 0.
        assert_eq!(pieces[0], region(&[0, 0], &[4, 8]));
        assert_eq!(pieces[1], region(&[0, 8], &[4, 8]));
    }

    #[test]
    fn respects_min_piece_size() {
        let r = region(&[0], &[8]);
        // min 4 elements per piece: at most 2 pieces, even if 8 wanted.
        let pieces = split_region(&r, 8, 4);
        assert_eq!(pieces.len(), 2);
    }

    #[test]
    fn single_element_region_never_splits() {
        let r = region(&[3, 3], &[1, 1]);
        assert_eq!(split_region(&r, 8, 1), vec![r]);
    }

    #[test]
    fn more_pieces_than_elements_caps_at_elements() {
        let r = region(&[0], &[3]);
        let pieces = split_region(&r, 100, 1);
        assert_eq!(pieces.len(), 3);
        let total: u64 = pieces.iter().map(Region::num_elements).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn deterministic_order() {
        let r = region(&[0, 0], &[32, 17]);
        assert_eq!(split_region(&r, 7, 1), split_region(&r, 7, 1));
    }

    fn assert_exact_partition(original: &Region, pieces: &[Region]) {
        // Union covers exactly: element counts match and every index
        // of the original is in exactly one piece.
        let total: u64 = pieces.iter().map(Region::num_elements).sum();
        assert_eq!(total, original.num_elements());
        for idx in RegionIndexIter::new(original) {
            let owners = pieces.iter().filter(|p| p.contains_index(&idx)).count();
            assert_eq!(owners, 1, "index {idx:?} owned by {owners} pieces");
        }
    }

    #[test]
    fn partition_exact_for_odd_sizes() {
        let r = region(&[-3, 5], &[7, 13]);
        let pieces = split_region(&r, 5, 1);
        assert_exact_partition(&r, &pieces);
    }

    proptest! {
        #[test]
        fn partition_is_exact_and_disjoint(
            d0 in 1u64..12,
            d1 in 1u64..12,
            s0 in -5i64..5,
            s1 in -5i64..5,
            want in 1usize..10,
            min in 1u64..8,
        ) {
            let r = region(&[s0, s1], &[d0, d1]);
            let pieces = split_region(&r, want, min);
            prop_assert!(!pieces.is_empty());
            prop_assert!(pieces.len() <= want);
            let total: u64 = pieces.iter().map(Region::num_elements).sum();
            prop_assert_eq!(total, r.num_elements());
            for idx in RegionIndexIter::new(&r) {
                let owners =
                    pieces.iter().filter(|p| p.contains_index(&idx)).count();
                prop_assert_eq!(owners, 1);
            }
        }
    }
}
