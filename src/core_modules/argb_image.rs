// THEORY:
// The `ArgbImage` is the only thing the detection engine knows about pictures. It is
// a "dumb" data container: a width, a height and a flattened buffer of packed ARGB
// integers (alpha in bits 24-31, red 16-23, green 8-15, blue 0-7), indexed
// `x + width * y`.
//
// Key architectural principles:
// 1.  **Shared Pixels**: The buffer lives behind an `Arc<[u32]>`, so a `LuminanceMap`
//     can hold a view of the same pixels without copying them, and the image can be
//     handed to several detectors at once.
// 2.  **Decoding at the Edge**: Anything that involves file formats goes through the
//     `image` crate and is converted once, up front, into the packed layout.
// 3.  **Single-Pixel Scope**: The `argb` helpers only ever look at one packed value.
//     Anything that needs neighbors belongs in the `LuminanceMap`.

use crate::error::DetectionError;
use std::path::Path;
use std::sync::Arc;

pub mod argb {
    pub type Argb = u32;
    pub type Channel = u8;

    /// Packs four 8-bit channels into one ARGB integer.
    #[inline]
    pub fn pack(alpha: Channel, red: Channel, green: Channel, blue: Channel) -> Argb {
        ((alpha as Argb) << 24) | ((red as Argb) << 16) | ((green as Argb) << 8) | blue as Argb
    }

    /// Opaque gray: the same value in every color channel.
    #[inline]
    pub fn gray(level: Channel) -> Argb {
        pack(0xFF, level, level, level)
    }

    #[inline]
    pub fn alpha(color: Argb) -> Channel {
        ((color >> 24) & 0xFF) as Channel
    }

    #[inline]
    pub fn red(color: Argb) -> Channel {
        ((color >> 16) & 0xFF) as Channel
    }

    #[inline]
    pub fn green(color: Argb) -> Channel {
        ((color >> 8) & 0xFF) as Channel
    }

    #[inline]
    pub fn blue(color: Argb) -> Channel {
        (color & 0xFF) as Channel
    }
}

/// An image as a flattened buffer of packed ARGB pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgbImage {
    width: usize,
    height: usize,
    pixels: Arc<[argb::Argb]>,
}

impl ArgbImage {
    /// Wraps an existing packed buffer. The buffer must hold exactly `width * height` pixels.
    pub fn new(
        width: usize,
        height: usize,
        pixels: impl Into<Arc<[argb::Argb]>>,
    ) -> Result<Self, DetectionError> {
        let pixels = pixels.into();
        let expected = pixel_count(width, height)?;
        if pixels.len() != expected {
            return Err(DetectionError::PixelCountMismatch {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Builds an image by evaluating `pixel(x, y)` for every coordinate.
    pub fn from_fn(
        width: usize,
        height: usize,
        mut pixel: impl FnMut(usize, usize) -> argb::Argb,
    ) -> Result<Self, DetectionError> {
        let mut pixels = Vec::with_capacity(pixel_count(width, height)?);
        for y in 0..height {
            for x in 0..width {
                pixels.push(pixel(x, y));
            }
        }
        Ok(Self {
            width,
            height,
            pixels: pixels.into(),
        })
    }

    /// Converts a decoded RGBA image into the packed layout.
    pub fn from_rgba(image: &image::RgbaImage) -> Self {
        let pixels: Vec<argb::Argb> = image
            .pixels()
            .map(|image::Rgba([red, green, blue, alpha])| argb::pack(*alpha, *red, *green, *blue))
            .collect();
        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            pixels: pixels.into(),
        }
    }

    /// Decodes any format the `image` crate understands.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DetectionError> {
        let decoded = image::open(path)?;
        Ok(Self::from_rgba(&decoded.to_rgba8()))
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// The packed pixel at `(x, y)`, or `None` outside the image.
    pub fn get(&self, x: usize, y: usize) -> Option<argb::Argb> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(x + self.width * y).copied()
    }

    pub fn pixels(&self) -> &[argb::Argb] {
        &self.pixels
    }

    pub(crate) fn shared_pixels(&self) -> Arc<[argb::Argb]> {
        Arc::clone(&self.pixels)
    }
}

/// `width * height`, or an error when the product does not fit in `usize`.
fn pixel_count(width: usize, height: usize) -> Result<usize, DetectionError> {
    width
        .checked_mul(height)
        .ok_or(DetectionError::ImageTooLarge { width, height })
}
