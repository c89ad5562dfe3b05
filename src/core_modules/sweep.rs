// THEORY:
// A single threshold only separates one band of brightness. Sweeping the threshold
// from bright to dark and rescanning at every step peels an image into nested
// layers of regions, and pairing each sweep with an area window keeps every layer
// to blobs of a similar scale.
//
// The schedule lives outside the detector. `BlobDetection` keeps no state across
// scans, and a sweep is a sequence of thresholds plus a filter to run them with.

use crate::core_modules::filters::AreaRangeFilter;
use crate::core_modules::luminance_map::Threshold;
use crate::error::DetectionError;

/// Thresholds `1 - t` for `t = step, 2 * step, ...`, ending with exactly `0.0`.
#[derive(Debug, Clone)]
pub struct ThresholdSweep {
    step: f32,
    progress: f32,
    exhausted: bool,
}

impl ThresholdSweep {
    /// `step` must lie in `(0, 1]`.
    pub fn new(step: f32) -> Result<Self, DetectionError> {
        if !(step > 0.0 && step <= 1.0) {
            return Err(DetectionError::InvalidThreshold(step));
        }
        Ok(Self {
            step,
            progress: 0.0,
            exhausted: false,
        })
    }
}

impl Iterator for ThresholdSweep {
    type Item = Threshold;

    fn next(&mut self) -> Option<Threshold> {
        if self.exhausted {
            return None;
        }
        self.progress = (self.progress + self.step).min(1.0);
        self.exhausted = self.progress >= 1.0;
        Threshold::new(1.0 - self.progress).ok()
    }
}

/// One sweep of thresholds paired with the area window its blobs must fall in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepPass {
    step: f32,
    filter: AreaRangeFilter,
}

impl SweepPass {
    pub fn new(step: f32, filter: AreaRangeFilter) -> Result<Self, DetectionError> {
        ThresholdSweep::new(step)?;
        Ok(Self { step, filter })
    }

    /// Coarse to fine: large blobs with wide steps first, then ever smaller blobs
    /// with ever finer steps.
    pub fn progressive() -> [SweepPass; 3] {
        [
            SweepPass {
                step: 0.09,
                filter: AreaRangeFilter::new(0.125, 0.5),
            },
            SweepPass {
                step: 0.045,
                filter: AreaRangeFilter::new(0.015625, 0.125),
            },
            SweepPass {
                step: 0.0225,
                filter: AreaRangeFilter::new(0.00015, 0.015625),
            },
        ]
    }

    pub fn step(&self) -> f32 {
        self.step
    }

    pub fn filter(&self) -> AreaRangeFilter {
        self.filter
    }

    pub fn thresholds(&self) -> ThresholdSweep {
        ThresholdSweep {
            step: self.step,
            progress: 0.0,
            exhausted: false,
        }
    }
}
