// THEORY:
// The `LuminanceMap` turns a picture into the two bit-planes the blob scan walks on:
// an "inside blob" mask (is this pixel at or below the luminance threshold?) and a
// "visited" mask (has the current pass already looked at this pixel?).
//
// Key architectural principles:
// 1.  **Integer Luminance**: Brightness is `(3 * (2R + 5G + B)) >> 3`, a cheap
//     integer approximation of perceptual weighting (blue counts least). It lands in
//     0..=765, the same scale as three summed 8-bit channels, so a normalized
//     threshold is simply multiplied by 765.
// 2.  **Border Exclusion**: A 5-pixel frame around the image always reports as
//     visited. The scan never starts or grows a blob there, which keeps edge
//     artifacts out of the results and keeps every neighbor read inside the buffer.
// 3.  **Explicit Re-initialization**: `reset` is the only thing that rewrites the
//     masks between passes. It is idempotent and must run before every scan.

use crate::core_modules::argb_image::{ArgbImage, argb};
use crate::error::DetectionError;
use std::sync::Arc;

/// Width of the frame around the image that is never explored.
pub const BORDER_OFFSET: usize = 5;

/// Largest luminance value: three full 8-bit channels.
pub const MAX_ISO_VALUE: f32 = 3.0 * 255.0;

/// A validated, normalized luminance threshold in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Threshold(f32);

impl Threshold {
    pub fn new(value: f32) -> Result<Self, DetectionError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(DetectionError::InvalidThreshold(value));
        }
        Ok(Self(value))
    }

    /// The normalized value the threshold was built from.
    pub fn value(self) -> f32 {
        self.0
    }

    /// The threshold on the 0..=765 luminance scale.
    pub fn absolute(self) -> f32 {
        self.0 * MAX_ISO_VALUE
    }
}

impl TryFrom<f32> for Threshold {
    type Error = DetectionError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Integer luminance of a packed ARGB pixel, on the 0..=765 scale.
#[inline]
pub fn luminance(color: argb::Argb) -> u32 {
    let red = argb::red(color) as u32;
    let green = argb::green(color) as u32;
    let blue = argb::blue(color) as u32;
    (3 * (2 * red + 5 * green + blue)) >> 3
}

pub struct LuminanceMap {
    pixels: Arc<[argb::Argb]>,
    width: usize,
    height: usize,
    inside_blob: Vec<bool>,
    visited: Vec<bool>,
    threshold: Threshold,
}

impl LuminanceMap {
    pub fn from_image(image: &ArgbImage) -> Self {
        // The image guarantees `pixels().len() == width * height`.
        let len = image.pixels().len();
        Self {
            pixels: image.shared_pixels(),
            width: image.width(),
            height: image.height(),
            inside_blob: vec![false; len],
            visited: vec![false; len],
            threshold: Threshold::default(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Stores `value * 765` as the working threshold. Values outside `[0, 1]` are
    /// rejected and leave the map untouched.
    pub fn set_threshold(&mut self, value: f32) -> Result<(), DetectionError> {
        self.apply_threshold(Threshold::new(value)?);
        Ok(())
    }

    pub fn apply_threshold(&mut self, threshold: Threshold) {
        self.threshold = threshold;
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    /// Clears every visited flag and recomputes the inside-blob mask.
    pub fn reset(&mut self) {
        self.visited.fill(false);
        let threshold = self.threshold.absolute();
        for (inside, &color) in self.inside_blob.iter_mut().zip(self.pixels.iter()) {
            *inside = luminance(color) as f32 <= threshold;
        }
    }

    pub fn visit(&mut self, x: usize, y: usize) {
        if let Some(index) = self.index(x, y) {
            self.visited[index] = true;
        }
    }

    /// True for every pixel in the border frame, and for pixels visited this pass.
    pub fn is_visited(&self, x: usize, y: usize) -> bool {
        self.is_in_border(x, y) || self.visited[x + self.width * y]
    }

    /// Raw mask lookup. Coordinates outside the image read as outside.
    pub fn is_inside_blob(&self, x: usize, y: usize) -> bool {
        self.index(x, y).is_some_and(|index| self.inside_blob[index])
    }

    /// Maps pixel coordinates into the normalized `[0, 1]` space of the map.
    pub fn normalize(&self, x: usize, y: usize) -> (f32, f32) {
        (x as f32 / self.width as f32, y as f32 / self.height as f32)
    }

    fn is_in_border(&self, x: usize, y: usize) -> bool {
        x < BORDER_OFFSET
            || x + BORDER_OFFSET >= self.width
            || y < BORDER_OFFSET
            || y + BORDER_OFFSET >= self.height
    }

    fn index(&self, x: usize, y: usize) -> Option<usize> {
        (x < self.width && y < self.height).then(|| x + self.width * y)
    }
}
