// THEORY:
// Filtering is the caller's half of the detection contract: the engine traces every
// candidate region, and a filter decides which ones are worth counting. Filters see
// only a blob's geometry, so they stay pure functions of the `Blob`.

use crate::core_modules::blob::Blob;

/// A pure accept/reject decision over a finished blob.
pub trait BlobFilter: Send {
    fn accept(&self, blob: &Blob) -> bool;
}

impl<F> BlobFilter for F
where
    F: Fn(&Blob) -> bool + Send,
{
    fn accept(&self, blob: &Blob) -> bool {
        self(blob)
    }
}

/// Accepts blobs whose bounding-box area, as a fraction of the image area, lies in
/// `[min_area, max_area]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaRangeFilter {
    pub min_area: f32,
    pub max_area: f32,
}

impl AreaRangeFilter {
    pub const fn new(min_area: f32, max_area: f32) -> Self {
        Self { min_area, max_area }
    }

    /// Accepts everything, degenerate single-point blobs included.
    pub const fn any() -> Self {
        Self::new(0.0, f32::MAX)
    }
}

impl Default for AreaRangeFilter {
    fn default() -> Self {
        Self::any()
    }
}

impl BlobFilter for AreaRangeFilter {
    fn accept(&self, blob: &Blob) -> bool {
        let area = blob.area();
        area >= self.min_area && area <= self.max_area
    }
}
