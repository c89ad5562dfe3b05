// THEORY:
// The `pipeline` module is the top-level API of the engine. `BlobDetection` ties one
// source image to one dedicated worker and exposes the three things a caller does
// with it: pick a threshold, request scans, and cancel.
//
// Results can be consumed two ways. A `BlobDetectionCallback` receives blobs as they
// are found, on the worker thread. `compute_blob_events` wraps a plain `BlobFilter`
// in a channel-backed callback and hands back a receiver of `DetectionEvent`s, which
// suits async consumers and simple collect-everything loops alike.

use crate::core_modules::argb_image::ArgbImage;
use crate::core_modules::blob::Blob;
use crate::core_modules::blob_detector::{
    BlobDetectionCallback, DEFAULT_MAX_NUMBER_OF_BLOBS, DetectionSummary, ScanLimits,
};
use crate::core_modules::filters::BlobFilter;
use crate::core_modules::luminance_map::{LuminanceMap, Threshold};
use crate::core_modules::sweep::SweepPass;
use crate::core_modules::worker::{Canceller, DetectionHandle, DetectionWorker};
use crate::error::DetectionError;
use log::{debug, info};
use tokio::sync::mpsc;

/// Configuration for a `BlobDetection`, allowing for tunable behavior.
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Accepted blobs after which a scan stops early.
    pub max_number_of_blobs: usize,
    /// Bound on the exploration worklist of a single blob. Growth of a blob that
    /// exceeds it is abandoned and the scan moves on. `None` never abandons.
    pub max_pending_pixels: Option<usize>,
    /// Name given to the worker thread.
    pub worker_name: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_number_of_blobs: DEFAULT_MAX_NUMBER_OF_BLOBS,
            max_pending_pixels: None,
            worker_name: String::from("BlobDetection"),
        }
    }
}

impl DetectionConfig {
    fn limits(&self) -> ScanLimits {
        ScanLimits {
            max_number_of_blobs: self.max_number_of_blobs,
            max_pending_pixels: self.max_pending_pixels,
        }
    }
}

/// What a channel-backed scan reports.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionEvent {
    BlobDetected(Blob),
    Finished,
}

/// Adapts a `BlobFilter` into a callback that forwards results over a channel.
pub struct ChannelCallback<F> {
    filter: F,
    events: mpsc::UnboundedSender<DetectionEvent>,
}

impl<F: BlobFilter> ChannelCallback<F> {
    pub fn new(filter: F) -> (Self, mpsc::UnboundedReceiver<DetectionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (Self { filter, events }, receiver)
    }
}

impl<F: BlobFilter> BlobDetectionCallback for ChannelCallback<F> {
    fn on_blob_detected(&mut self, blob: Blob) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.events.send(DetectionEvent::BlobDetected(blob));
    }

    fn filter_blob(&self, blob: &Blob) -> bool {
        self.filter.accept(blob)
    }

    fn on_blob_detection_finish(&mut self) {
        let _ = self.events.send(DetectionEvent::Finished);
    }
}

/// Blob detection over one image, run on a dedicated background worker.
pub struct BlobDetection {
    worker: DetectionWorker,
    threshold: Threshold,
    width: usize,
    height: usize,
}

impl BlobDetection {
    pub fn new(image: &ArgbImage) -> Result<Self, DetectionError> {
        Self::with_config(image, DetectionConfig::default())
    }

    pub fn with_config(image: &ArgbImage, config: DetectionConfig) -> Result<Self, DetectionError> {
        let map = LuminanceMap::from_image(image);
        let worker = DetectionWorker::spawn(&config.worker_name, map, config.limits())?;
        debug!(
            "{} ready for a {}x{} image, at most {} blobs per scan",
            config.worker_name,
            image.width(),
            image.height(),
            config.max_number_of_blobs
        );
        Ok(Self {
            worker,
            threshold: Threshold::default(),
            width: image.width(),
            height: image.height(),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Sets the normalized luminance threshold used by every scan requested from now on.
    /// Values outside `[0, 1]` are rejected and leave the current threshold in place.
    pub fn set_threshold(&mut self, value: f32) -> Result<(), DetectionError> {
        self.threshold = Threshold::new(value)?;
        Ok(())
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    /// Queues a scan on the worker and returns immediately. Scans run one at a time,
    /// in the order they were requested.
    pub fn compute_blobs<C>(&self, callback: C) -> Result<DetectionHandle, DetectionError>
    where
        C: BlobDetectionCallback + 'static,
    {
        self.worker.submit(self.threshold, Box::new(callback))
    }

    /// Queues a scan whose accepted blobs arrive as `DetectionEvent`s, followed by
    /// `Finished` when the scan completes.
    pub fn compute_blob_events<F>(
        &self,
        filter: F,
    ) -> Result<(DetectionHandle, mpsc::UnboundedReceiver<DetectionEvent>), DetectionError>
    where
        F: BlobFilter + 'static,
    {
        self.submit_events(self.threshold, filter)
    }

    fn submit_events<F>(
        &self,
        threshold: Threshold,
        filter: F,
    ) -> Result<(DetectionHandle, mpsc::UnboundedReceiver<DetectionEvent>), DetectionError>
    where
        F: BlobFilter + 'static,
    {
        let (callback, events) = ChannelCallback::new(filter);
        let handle = self.worker.submit(threshold, Box::new(callback))?;
        Ok((handle, events))
    }

    /// Runs every threshold of `pass` in turn and collects what its filter accepts.
    /// The threshold set with [`Self::set_threshold`] is left untouched.
    ///
    /// Blocks the calling thread; must not be called from inside an async runtime.
    pub fn sweep(&self, pass: &SweepPass) -> Result<Vec<Blob>, DetectionError> {
        let mut blobs = Vec::new();
        for threshold in pass.thresholds() {
            let (handle, mut events) = self.submit_events(threshold, pass.filter())?;
            while let Some(event) = events.blocking_recv() {
                match event {
                    DetectionEvent::BlobDetected(blob) => blobs.push(blob),
                    DetectionEvent::Finished => break,
                }
            }
            let summary: DetectionSummary = handle.wait()?;
            debug!(
                "threshold {:.4}: {} of {} candidates kept",
                threshold.value(),
                summary.blobs_detected,
                summary.candidates_examined
            );
        }
        info!(
            "sweep with step {} collected {} blobs",
            pass.step(),
            blobs.len()
        );
        Ok(blobs)
    }

    /// Stops the worker and returns immediately, even while a callback is running.
    /// The running scan is abandoned at its next check, queued scans are dropped, and
    /// later requests fail with `WorkerShutDown`. A callback already in progress may
    /// still complete; none starts after the worker observes the cancellation.
    pub fn cancel(&mut self) {
        self.worker.cancel();
    }

    /// Like [`Self::cancel`], but also waits for a callback that is already running,
    /// so that no callback runs at all once this returns.
    ///
    /// Must not be called while holding anything a callback needs.
    pub fn cancel_and_wait(&mut self) {
        self.worker.cancel_and_wait();
    }

    /// A handle that can cancel this detection from another thread or a callback.
    pub fn canceller(&self) -> Canceller {
        self.worker.canceller()
    }

    pub fn is_cancelled(&self) -> bool {
        self.worker.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::argb_image::argb;
    use crate::core_modules::filters::AreaRangeFilter;

    fn square_image() -> ArgbImage {
        ArgbImage::from_fn(64, 64, |x, y| {
            if (16..48).contains(&x) && (16..48).contains(&y) {
                argb::gray(20)
            } else {
                argb::gray(230)
            }
        })
        .unwrap()
    }

    #[test]
    fn threshold_is_validated_before_anything_is_queued() {
        let mut detection = BlobDetection::new(&square_image()).unwrap();
        detection.set_threshold(0.6).unwrap();
        assert!(matches!(
            detection.set_threshold(1.2),
            Err(DetectionError::InvalidThreshold(_))
        ));
        assert_eq!(detection.threshold().value(), 0.6);
    }

    #[test]
    fn blocking_event_stream_delivers_blob_then_finished() {
        let mut detection = BlobDetection::new(&square_image()).unwrap();
        detection.set_threshold(0.5).unwrap();
        let (handle, mut events) = detection.compute_blob_events(AreaRangeFilter::any()).unwrap();

        let mut received = Vec::new();
        while let Some(event) = events.blocking_recv() {
            received.push(event);
        }
        let summary = handle.wait().unwrap();

        assert_eq!(summary.blobs_detected, 1);
        assert_eq!(received.len(), 2);
        assert!(matches!(received[0], DetectionEvent::BlobDetected(_)));
        assert_eq!(received[1], DetectionEvent::Finished);
    }

    #[test]
    fn threshold_at_zero_sees_nothing_in_a_gray_image() {
        let detection = BlobDetection::new(&square_image()).unwrap();
        let (handle, _events) = detection.compute_blob_events(AreaRangeFilter::any()).unwrap();
        assert_eq!(handle.wait().unwrap().candidates_examined, 0);
    }

    #[test]
    fn sweep_collects_blobs_across_thresholds() {
        let mut detection = BlobDetection::new(&square_image()).unwrap();
        detection.set_threshold(0.3).unwrap();
        let pass = SweepPass::new(0.25, AreaRangeFilter::new(0.1, 0.5)).unwrap();
        let blobs = detection.sweep(&pass).unwrap();
        assert_eq!(detection.threshold().value(), 0.3);

        // Dark square luminance 60, background 690: thresholds 0.75, 0.5 and 0.25
        // all separate them, 0.0 does not.
        assert_eq!(blobs.len(), 3);
        assert_eq!(blobs[0], blobs[1]);
    }

    #[test]
    fn cancel_rejects_later_requests() {
        let mut detection = BlobDetection::new(&square_image()).unwrap();
        detection.cancel();
        assert!(detection.is_cancelled());
        assert!(matches!(
            detection.compute_blob_events(AreaRangeFilter::any()),
            Err(DetectionError::WorkerShutDown)
        ));
    }
}
