//! The data object: a stage output's buffer plus region and staleness
//! metadata.

use ndflow_core::clock::{PipelineClock, Stamp};
use ndflow_core::region::Region;
use ndflow_image::{Image, ImageInfo};

/// One output slot of a stage: the owned buffer and the three region
/// attributes negotiated by the propagation passes.
///
/// - `largest_possible_region`: full extent this output *could*
///   produce, set during information propagation (may change across
///   updates if upstream metadata changes).
/// - `requested_region`: what downstream consumers actually want,
///   rebuilt every update; multiple consumers union via
///   [`DataObject::request_region`].
/// - `buffered_region`: what is materialized in memory right now.
///
/// The buffer is owned exclusively by this object; consumers only
/// receive read-only views.
#[derive(Debug)]
pub struct DataObject {
    largest_possible_region: Region,
    requested_region: Option<Region>,
    buffered_region: Region,
    info: ImageInfo,
    modified: Stamp,
    buffer: Option<Image>,
    /// Persistent explicit request recorded by a consumer via
    /// `Pipeline::request_region`; seeds the request pass when this
    /// object is the update target.
    explicit_request: Option<Region>,
}

impl DataObject {
    /// A fresh, never-produced data object of dimension `dim`.
    pub fn new(dim: usize) -> Self {
        Self {
            largest_possible_region: Region::empty(dim),
            requested_region: None,
            buffered_region: Region::empty(dim),
            info: ImageInfo::uniform(dim),
            modified: Stamp::NEVER,
            buffer: None,
            explicit_request: None,
        }
    }

    /// Full extent this output could produce.
    pub fn largest_possible_region(&self) -> &Region {
        &self.largest_possible_region
    }

    /// Update the largest possible region during information
    /// propagation. Bumps the modification stamp only on actual
    /// change, so a metadata-stable update stays idempotent.
    pub fn set_largest_possible_region(&mut self, region: Region, clock: &PipelineClock) {
        if self.largest_possible_region != region {
            self.largest_possible_region = region;
            self.modified = clock.tick();
        }
    }

    /// Non-region metadata (spacing, origin).
    pub fn info(&self) -> &ImageInfo {
        &self.info
    }

    /// Update non-region metadata; stamp bumped only on change.
    pub fn set_info(&mut self, info: ImageInfo, clock: &PipelineClock) {
        if self.info != info {
            self.info = info;
            self.modified = clock.tick();
        }
    }

    /// The raw requested region, if any consumer deposited one this
    /// update.
    pub fn requested_region(&self) -> Option<&Region> {
        self.requested_region.as_ref()
    }

    /// The region the producing stage must cover: the deposited
    /// request, defaulting to the full extent if nothing was
    /// requested.
    pub fn effective_requested_region(&self) -> Region {
        self.requested_region
            .clone()
            .unwrap_or_else(|| self.largest_possible_region.clone())
    }

    /// Deposit a consumer's request, merging with any existing request
    /// by bounding union so one upstream computation satisfies every
    /// consumer.
    pub fn request_region(&mut self, region: &Region) {
        self.requested_region = Some(match &self.requested_region {
            Some(existing) => existing.bounding_union(region),
            None => region.clone(),
        });
    }

    /// Replace the requested region wholesale (the executor's enlarge
    /// hook result).
    pub fn set_requested_region(&mut self, region: Region) {
        self.requested_region = Some(region);
    }

    /// Clear the per-update request state. Called at the top of every
    /// request pass so shrinking requests are honored.
    pub fn clear_request(&mut self) {
        self.requested_region = None;
    }

    /// Persistent explicit request for this object as an update
    /// target.
    pub fn explicit_request(&self) -> Option<&Region> {
        self.explicit_request.as_ref()
    }

    /// Record (or clear) the persistent explicit request.
    pub fn set_explicit_request(&mut self, region: Option<Region>) {
        self.explicit_request = region;
    }

    /// The region currently materialized in the buffer.
    pub fn buffered_region(&self) -> &Region {
        &self.buffered_region
    }

    /// Whether the effective request is already materialized.
    pub fn is_request_buffered(&self) -> bool {
        self.buffered_region.contains(&self.effective_requested_region())
    }

    /// Logical time of the last mutation.
    pub fn modified(&self) -> Stamp {
        self.modified
    }

    /// Bump the modification stamp (buffer content changed).
    pub fn mark_modified(&mut self, clock: &PipelineClock) {
        self.modified = clock.tick();
    }

    /// The owned buffer, if materialized.
    pub fn buffer(&self) -> Option<&Image> {
        self.buffer.as_ref()
    }

    /// Install a freshly computed buffer covering `region`.
    pub fn install_buffer(&mut self, image: Image, region: Region) {
        self.buffer = Some(image);
        self.buffered_region = region;
    }

    /// Drop the buffer and forget the buffered region, reclaiming
    /// memory. The next update that needs this output recomputes it.
    pub fn release_buffer(&mut self) {
        self.buffer = None;
        self.buffered_region = Region::empty(self.largest_possible_region.dimension());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::SmallVec;

    fn region(start: &[i64], size: &[u64]) -> Region {
        Region::new(SmallVec::from_slice(start), SmallVec::from_slice(size))
    }

    #[test]
    fn fresh_object_is_never_modified_and_unbuffered() {
        let obj = DataObject::new(2);
        assert_eq!(obj.modified(), Stamp::NEVER);
        assert!(obj.buffered_region().is_empty());
        assert!(obj.buffer().is_none());
    }

    #[test]
    fn effective_request_defaults_to_largest() {
        let clock = PipelineClock::new();
        let mut obj = DataObject::new(1);
        obj.set_largest_possible_region(region(&[0], &[64]), &clock);
        assert_eq!(obj.effective_requested_region(), region(&[0], &[64]));
    }

    #[test]
    fn requests_union_across_consumers() {
        let mut obj = DataObject::new(2);
        obj.request_region(&region(&[0, 0], &[2, 2]));
        obj.request_region(&region(&[5, 1], &[2, 4]));
        let merged = obj.effective_requested_region();
        assert_eq!(merged, region(&[0, 0], &[7, 5]));
    }

    #[test]
    fn set_largest_bumps_stamp_only_on_change() {
        let clock = PipelineClock::new();
        let mut obj = DataObject::new(1);
        obj.set_largest_possible_region(region(&[0], &[8]), &clock);
        let t1 = obj.modified();
        assert!(t1 > Stamp::NEVER);
        obj.set_largest_possible_region(region(&[0], &[8]), &clock);
        assert_eq!(obj.modified(), t1, "no-op set must not bump");
        obj.set_largest_possible_region(region(&[0], &[16]), &clock);
        assert!(obj.modified() > t1);
    }

    #[test]
    fn request_containment_tracks_buffered() {
        let clock = PipelineClock::new();
        let mut obj = DataObject::new(1);
        obj.set_largest_possible_region(region(&[0], &[64]), &clock);
        obj.request_region(&region(&[0], &[16]));

        assert!(!obj.is_request_buffered());
        let img = Image::allocate(&region(&[0], &[32])).unwrap();
        obj.install_buffer(img, region(&[0], &[32]));
        assert!(obj.is_request_buffered(), "buffered may exceed requested");

        obj.clear_request();
        obj.request_region(&region(&[0], &[48]));
        assert!(!obj.is_request_buffered());
    }

    #[test]
    fn release_buffer_forgets_buffered_region() {
        let clock = PipelineClock::new();
        let mut obj = DataObject::new(1);
        obj.set_largest_possible_region(region(&[0], &[8]), &clock);
        let img = Image::allocate(&region(&[0], &[8])).unwrap();
        obj.install_buffer(img, region(&[0], &[8]));
        obj.release_buffer();
        assert!(obj.buffer().is_none());
        assert!(obj.buffered_region().is_empty());
    }
}
