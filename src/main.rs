//! Command-line front end for the blob detection engine.
//!
//! ```bash
//! # One scan at a fixed threshold, keeping mid-sized blobs
//! rainbow_blobs photo.png --threshold 0.4 --min-area 0.01 --max-area 0.2
//!
//! # Coarse-to-fine sweep over every threshold, with a debug overlay
//! rainbow_blobs photo.png --overlay blobs.png
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use futures::executor::block_on;
use log::info;
use rainbow_blobs::core_modules::utils::image_helper;
use rainbow_blobs::{
    AreaRangeFilter, ArgbImage, Blob, BlobDetection, DetectionConfig, DetectionEvent, SweepPass,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Image to scan
    image: PathBuf,

    /// Normalized luminance threshold in [0, 1]. Without it, runs the progressive sweep.
    #[arg(short, long)]
    threshold: Option<f32>,

    /// Stop a scan after this many accepted blobs
    #[arg(long, default_value_t = rainbow_blobs::core_modules::blob_detector::DEFAULT_MAX_NUMBER_OF_BLOBS)]
    max_blobs: usize,

    /// Abandon a blob once its exploration worklist grows past this many pixels
    #[arg(long)]
    max_pending: Option<usize>,

    /// Smallest accepted bounding-box area, as a fraction of the image (single scan only)
    #[arg(long, default_value_t = 0.0)]
    min_area: f32,

    /// Largest accepted bounding-box area, as a fraction of the image (single scan only)
    #[arg(long, default_value_t = 1.0)]
    max_area: f32,

    /// Write a PNG with every detected blob drawn over the image
    #[arg(short, long)]
    overlay: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let image = ArgbImage::open(&cli.image)
        .with_context(|| format!("failed to load {}", cli.image.display()))?;
    info!("loaded {} ({}x{})", cli.image.display(), image.width(), image.height());

    let config = DetectionConfig {
        max_number_of_blobs: cli.max_blobs,
        max_pending_pixels: cli.max_pending,
        ..DetectionConfig::default()
    };
    let mut detection = BlobDetection::with_config(&image, config)?;

    let blobs = match cli.threshold {
        Some(threshold) => {
            detection
                .set_threshold(threshold)
                .context("invalid --threshold")?;
            single_scan(&detection, AreaRangeFilter::new(cli.min_area, cli.max_area))?
        }
        None => {
            let mut blobs = Vec::new();
            for pass in SweepPass::progressive() {
                blobs.extend(detection.sweep(&pass)?);
            }
            blobs
        }
    };

    for (index, blob) in blobs.iter().enumerate() {
        let center = blob.center();
        println!(
            "{index:>5}  center ({:.4}, {:.4})  size {:.4} x {:.4}  vertices {}",
            center.x,
            center.y,
            blob.width(),
            blob.height(),
            blob.edge_count()
        );
    }
    info!("{} blobs detected", blobs.len());

    if let Some(path) = &cli.overlay {
        image_helper::save_overlay(path, &image, &blobs)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("overlay written to {}", path.display());
    }

    detection.cancel();
    Ok(())
}

fn single_scan(detection: &BlobDetection, filter: AreaRangeFilter) -> Result<Vec<Blob>> {
    let (handle, mut events) = detection.compute_blob_events(filter)?;
    block_on(async {
        let mut blobs = Vec::new();
        while let Some(event) = events.recv().await {
            match event {
                DetectionEvent::BlobDetected(blob) => blobs.push(blob),
                DetectionEvent::Finished => break,
            }
        }
        let summary = handle.finished().await?;
        if summary.cap_reached {
            info!("stopped at the blob cap after {} blobs", summary.blobs_detected);
        }
        Ok::<_, anyhow::Error>(blobs)
    })
}
