// THEORY:
// Every fallible operation in the engine reports through a single `DetectionError`.
// Precondition violations (a threshold outside [0, 1], a pixel buffer that does not
// match its dimensions) fail synchronously at the call site. Worker-side outcomes
// (cancellation, a callback that panicked) are delivered through the
// `DetectionHandle` of the scan they belong to. Exploration overflow is never an
// error: it is recovered inside the scan and only shows up in the summary.

use thiserror::Error;

/// Errors produced by the blob detection engine.
#[derive(Error, Debug)]
pub enum DetectionError {
    /// A normalized threshold was outside `[0, 1]` (NaN included).
    #[error("threshold must be a value between 0 and 1, got {0}")]
    InvalidThreshold(f32),

    /// The packed pixel buffer does not hold exactly `width * height` pixels.
    #[error("pixel buffer holds {actual} pixels but a {width}x{height} image needs {expected}")]
    PixelCountMismatch {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },

    /// `width * height` does not fit in `usize`.
    #[error("a {width}x{height} image has more pixels than can be addressed")]
    ImageTooLarge { width: usize, height: usize },

    /// The scan was abandoned because the detection was cancelled.
    #[error("blob detection was cancelled")]
    Cancelled,

    /// The worker no longer accepts scans because `cancel()` was called.
    #[error("blob detection worker has been shut down")]
    WorkerShutDown,

    /// A callback panicked while the scan was running on the worker.
    #[error("blob detection callback panicked: {0}")]
    WorkerPanicked(String),

    /// The dedicated worker thread could not be spawned.
    #[error("failed to spawn blob detection worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),

    /// The source image could not be decoded.
    #[error("failed to load image: {0}")]
    Image(#[from] image::ImageError),
}
