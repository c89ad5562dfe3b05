// THEORY:
// This file is the main entry point for the `rainbow_blobs` library crate. It exports
// `BlobDetection` and the types that travel with it (`DetectionConfig`, `Blob`,
// `EdgeVertex`, the callback and filter traits) as the high-level interface of the
// engine.
//
// The engine thresholds an image's luminance, then traces the boundary of every
// region that crosses the threshold. Tracing runs on one dedicated worker per
// detector, and results are streamed back through a caller-supplied callback or an
// event channel. The building blocks live in `core_modules` and stay usable on their
// own, e.g. `blob_detector::find_blobs` for a synchronous scan.

pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use core_modules::argb_image::{ArgbImage, argb};
pub use core_modules::blob::{Blob, EdgeVertex};
pub use core_modules::blob_detector::{BlobDetectionCallback, DetectionSummary};
pub use core_modules::filters::{AreaRangeFilter, BlobFilter};
pub use core_modules::luminance_map::{LuminanceMap, Threshold};
pub use core_modules::sweep::{SweepPass, ThresholdSweep};
pub use core_modules::worker::{Canceller, DetectionHandle};
pub use error::DetectionError;
pub use pipeline::{BlobDetection, DetectionConfig, DetectionEvent};
