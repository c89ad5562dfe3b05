// THEORY:
// The `DetectionWorker` is the scheduler behind `BlobDetection::compute_blobs`. Each
// detector owns exactly one dedicated OS thread, and that thread owns the detector's
// `LuminanceMap`. Scans are sent to it as jobs over an unbounded channel and run to
// completion one after another, in the order they were requested.
//
// Key architectural principles:
// 1.  **Actor Ownership**: The map's mask and visited buffers are only ever touched
//     by the worker thread, so they need no locking at all.
// 2.  **Handles, Not Blocking**: Requesting a scan returns immediately with a
//     `DetectionHandle` wrapping a oneshot receiver. The caller can block on it,
//     await it, or poll it.
// 3.  **Abrupt Cancellation**: `cancel()` only raises a flag and returns at once,
//     from any thread, even while a callback is running. The worker re-checks the
//     flag before every callback and at every scan step, so once it sees the flag
//     nothing more is delivered. `cancel_and_wait()` additionally waits for a
//     callback that is already running, for callers that must know delivery is over.
// 4.  **Log and Carry On**: A panicking callback is caught, logged, and reported on
//     that scan's handle. The worker stays alive for the scans queued behind it.

use crate::core_modules::blob_detector::{self, BlobDetectionCallback, DetectionSummary, ScanLimits};
use crate::core_modules::luminance_map::{LuminanceMap, Threshold};
use crate::error::DetectionError;
use log::{debug, error};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::{self, ThreadId};
use tokio::sync::{mpsc, oneshot};

type ScanResult = Result<DetectionSummary, DetectionError>;

/// The cancellation flag, plus a delivery lock `cancel_and_wait` uses to wait out a running callback.
pub(crate) struct CancellationGate {
    cancelled: AtomicBool,
    delivery: Mutex<()>,
    worker: OnceLock<ThreadId>,
}

impl CancellationGate {
    pub(crate) fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            delivery: Mutex::new(()),
            worker: OnceLock::new(),
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Runs `deliver` unless the gate has been cancelled.
    pub(crate) fn dispatch<R>(&self, deliver: impl FnOnce() -> R) -> Option<R> {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_cancelled() {
            return None;
        }
        Some(deliver())
    }

    /// Raises the flag without waiting for a callback in progress.
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Raises the flag, then waits until no callback is running. Afterwards no
    /// callback starts again.
    pub(crate) fn cancel_and_wait(&self) {
        self.cancel();
        if self.worker.get() == Some(&thread::current().id()) {
            // Called from a callback: the worker already holds the delivery lock.
            return;
        }
        drop(self.delivery.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn bind_worker(&self) {
        let _ = self.worker.set(thread::current().id());
    }
}

/// A cloneable handle that cancels a detector from any thread, including from
/// inside one of its callbacks.
#[derive(Clone)]
pub struct Canceller {
    gate: Arc<CancellationGate>,
}

impl Canceller {
    /// Returns immediately; the worker stops at its next check.
    pub fn cancel(&self) {
        self.gate.cancel();
    }

    /// Like [`Self::cancel`], but also waits for a callback that is already running.
    /// Must not be called while holding anything that callback needs.
    pub fn cancel_and_wait(&self) {
        self.gate.cancel_and_wait();
    }

    pub fn is_cancelled(&self) -> bool {
        self.gate.is_cancelled()
    }
}

/// The pending result of one requested scan.
pub struct DetectionHandle {
    result: oneshot::Receiver<ScanResult>,
    gate: Arc<CancellationGate>,
}

impl DetectionHandle {
    /// Blocks the current thread until the scan finishes or is abandoned.
    ///
    /// Must not be called from inside an async runtime; use [`Self::finished`] there.
    pub fn wait(self) -> ScanResult {
        self.result
            .blocking_recv()
            .unwrap_or(Err(DetectionError::Cancelled))
    }

    /// Resolves once the scan finishes or is abandoned.
    pub async fn finished(self) -> ScanResult {
        self.result.await.unwrap_or(Err(DetectionError::Cancelled))
    }

    /// Returns the outcome if the scan is over, without blocking. The outcome is
    /// handed out once; later calls report `Cancelled`.
    pub fn try_result(&mut self) -> Option<ScanResult> {
        match self.result.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(DetectionError::Cancelled)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.gate.is_cancelled()
    }
}

struct DetectionJob {
    threshold: Threshold,
    callback: Box<dyn BlobDetectionCallback>,
    done: oneshot::Sender<ScanResult>,
}

pub(crate) struct DetectionWorker {
    /// Dropping the last sender lets already requested scans finish, then the thread exits.
    jobs: Option<mpsc::UnboundedSender<DetectionJob>>,
    gate: Arc<CancellationGate>,
}

impl DetectionWorker {
    /// Moves `map` onto a freshly spawned, named worker thread.
    pub(crate) fn spawn(
        name: &str,
        mut map: LuminanceMap,
        limits: ScanLimits,
    ) -> Result<Self, DetectionError> {
        let (jobs, mut job_receiver) = mpsc::unbounded_channel::<DetectionJob>();
        let gate = Arc::new(CancellationGate::new());
        let worker_gate = Arc::clone(&gate);

        thread::Builder::new().name(name.to_owned()).spawn(move || {
            worker_gate.bind_worker();
            while let Some(job) = job_receiver.blocking_recv() {
                if worker_gate.is_cancelled() {
                    break;
                }
                run_job(&mut map, &limits, &worker_gate, job);
            }
            // Dropping the receiver resolves every queued handle as cancelled.
            debug!("{} worker stopped", thread::current().name().unwrap_or("detection"));
        })?;

        Ok(Self {
            jobs: Some(jobs),
            gate,
        })
    }

    pub(crate) fn submit(
        &self,
        threshold: Threshold,
        callback: Box<dyn BlobDetectionCallback>,
    ) -> Result<DetectionHandle, DetectionError> {
        if self.gate.is_cancelled() {
            return Err(DetectionError::WorkerShutDown);
        }
        let jobs = self.jobs.as_ref().ok_or(DetectionError::WorkerShutDown)?;
        let (done, result) = oneshot::channel();
        jobs.send(DetectionJob {
            threshold,
            callback,
            done,
        })
        .map_err(|_| DetectionError::WorkerShutDown)?;
        Ok(DetectionHandle {
            result,
            gate: Arc::clone(&self.gate),
        })
    }

    pub(crate) fn canceller(&self) -> Canceller {
        Canceller {
            gate: Arc::clone(&self.gate),
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.gate.is_cancelled()
    }

    /// Abandons the running scan, drops queued ones and lets the thread exit.
    pub(crate) fn cancel(&mut self) {
        self.gate.cancel();
        self.jobs = None;
    }

    pub(crate) fn cancel_and_wait(&mut self) {
        self.gate.cancel_and_wait();
        self.jobs = None;
    }
}

fn run_job(map: &mut LuminanceMap, limits: &ScanLimits, gate: &CancellationGate, job: DetectionJob) {
    let DetectionJob {
        threshold,
        mut callback,
        done,
    } = job;
    debug!("starting scan at threshold {:.4}", threshold.value());

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        map.apply_threshold(threshold);
        blob_detector::detect(map, limits, callback.as_mut(), gate)
    }));

    let result = match outcome {
        Ok(Some(summary)) => Ok(summary),
        Ok(None) => {
            debug!("scan at threshold {:.4} cancelled", threshold.value());
            Err(DetectionError::Cancelled)
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("blob detection callback panicked: {message}");
            Err(DetectionError::WorkerPanicked(message))
        }
    };
    let _ = done.send(result);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
