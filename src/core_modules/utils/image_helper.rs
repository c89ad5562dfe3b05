// Debug output: draws detected blobs over a dimmed copy of their source image.

use crate::core_modules::argb_image::{ArgbImage, argb};
use crate::core_modules::blob::Blob;
use image::{ImageEncoder, Rgba, RgbaImage};
use std::path::Path;

const PALETTE: [[u8; 3]; 6] = [
    [255, 64, 64],
    [64, 255, 64],
    [64, 128, 255],
    [255, 220, 0],
    [255, 0, 255],
    [0, 230, 230],
];

/// Renders `blobs` over `source`. The source is dimmed to a quarter of its
/// brightness, and each blob's edge vertices are plotted in a color picked by the
/// blob's index.
pub fn render_overlay(source: &ArgbImage, blobs: &[Blob]) -> RgbaImage {
    let (width, height) = (source.width() as u32, source.height() as u32);
    let mut overlay = RgbaImage::from_fn(width, height, |x, y| {
        let color = source.get(x as usize, y as usize).unwrap_or_default();
        Rgba([
            argb::red(color) / 4,
            argb::green(color) / 4,
            argb::blue(color) / 4,
            0xFF,
        ])
    });

    for (index, blob) in blobs.iter().enumerate() {
        let [r, g, b] = PALETTE[index % PALETTE.len()];
        for vertex in blob.edge_vertices() {
            let x = (vertex.x * width as f32).round() as u32;
            let y = (vertex.y * height as f32).round() as u32;
            if x < width && y < height {
                overlay.put_pixel(x, y, Rgba([r, g, b, 0xFF]));
            }
        }
    }
    overlay
}

/// Writes `buffer` as an RGBA PNG.
pub fn save(path: impl AsRef<Path>, buffer: &RgbaImage) -> Result<(), image::ImageError> {
    let output = std::fs::File::create(path)?;
    let encoder = image::codecs::png::PngEncoder::new(output);

    encoder.write_image(
        buffer.as_raw(),
        buffer.width(),
        buffer.height(),
        image::ExtendedColorType::Rgba8,
    )?;

    Ok(())
}

pub fn save_overlay(
    path: impl AsRef<Path>,
    source: &ArgbImage,
    blobs: &[Blob],
) -> Result<(), image::ImageError> {
    save(path, &render_overlay(source, blobs))
}
