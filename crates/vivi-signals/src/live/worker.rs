//! Background estimator thread
//!
//! Architecture:
//! - Bounded command channel (capacity 1): at most one snapshot waits while
//!   another is being estimated
//! - `try_send` only: a busy worker means the snapshot is skipped, never
//!   that the capture thread waits
//! - Results come back on a separate channel and are polled
//! - Atomic metrics for observability

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

use crate::buffer::BufferSnapshot;
use crate::dsp::SpectrumEstimate;
use crate::engine::{estimate_heart_rate, EstimationSettings};
use crate::measurement::Rejection;

const QUEUE_CAPACITY: usize = 1;

/// Worker metrics tracked atomically
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    pub submitted: AtomicU64,
    /// Snapshots dropped because the worker was busy
    pub skipped_busy: AtomicU64,
    pub estimates_ok: AtomicU64,
    pub estimates_rejected: AtomicU64,
}

impl WorkerMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            skipped_busy: self.skipped_busy.load(Ordering::Relaxed),
            estimates_ok: self.estimates_ok.load(Ordering::Relaxed),
            estimates_rejected: self.estimates_rejected.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub skipped_busy: u64,
    pub estimates_ok: u64,
    pub estimates_rejected: u64,
}

/// Commands sent to worker thread
enum WorkerCmd {
    Estimate { seq: u64, snapshot: BufferSnapshot },
    Shutdown,
}

/// One finished estimate
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerOutput {
    /// Sequence number returned by [`EstimateWorker::submit`]
    pub seq: u64,
    /// Frames seen when the snapshot was taken
    pub total_frames: usize,
    pub result: Result<SpectrumEstimate, Rejection>,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error("estimator busy, snapshot skipped")]
    Busy,
    #[error("estimator thread stopped")]
    Stopped,
}

/// Estimator thread handle
pub struct EstimateWorker {
    tx: Sender<WorkerCmd>,
    results: Receiver<WorkerOutput>,
    metrics: Arc<WorkerMetrics>,
    worker_thread: Option<thread::JoinHandle<()>>,
    next_seq: u64,
}

impl EstimateWorker {
    /// Create and start the worker
    pub fn start(settings: EstimationSettings) -> std::io::Result<Self> {
        let (tx, rx) = bounded(QUEUE_CAPACITY);
        let (result_tx, results) = unbounded();
        let metrics = Arc::new(WorkerMetrics::default());
        let metrics_clone = Arc::clone(&metrics);

        let worker_thread = thread::Builder::new()
            .name("vivi-estimator".into())
            .spawn(move || Self::run(settings, rx, result_tx, metrics_clone))?;

        Ok(EstimateWorker {
            tx,
            results,
            metrics,
            worker_thread: Some(worker_thread),
            next_seq: 0,
        })
    }

    /// Queue a snapshot without blocking
    pub fn submit(&mut self, snapshot: BufferSnapshot) -> Result<u64, SubmitError> {
        if self.worker_thread.is_none() {
            return Err(SubmitError::Stopped);
        }

        let seq = self.next_seq;
        match self.tx.try_send(WorkerCmd::Estimate { seq, snapshot }) {
            Ok(()) => {
                self.next_seq += 1;
                self.metrics.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(seq)
            }
            Err(TrySendError::Full(_)) => {
                self.metrics.skipped_busy.fetch_add(1, Ordering::Relaxed);
                Err(SubmitError::Busy)
            }
            Err(TrySendError::Disconnected(_)) => Err(SubmitError::Stopped),
        }
    }

    /// Every finished estimate not yet collected, oldest first
    pub fn drain(&self) -> Vec<WorkerOutput> {
        self.results.try_iter().collect()
    }

    /// Block until the next estimate finishes or `timeout` passes
    pub fn wait(&self, timeout: Duration) -> Option<WorkerOutput> {
        match self.results.recv_timeout(timeout) {
            Ok(output) => Some(output),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Shutdown worker gracefully
    pub fn shutdown(mut self) {
        self.stop();
    }

    pub(crate) fn stop(&mut self) {
        if let Some(handle) = self.worker_thread.take() {
            let _ = self.tx.send(WorkerCmd::Shutdown);
            let _ = handle.join();
        }
    }

    /// Main worker loop
    fn run(
        settings: EstimationSettings,
        rx: Receiver<WorkerCmd>,
        results: Sender<WorkerOutput>,
        metrics: Arc<WorkerMetrics>,
    ) {
        while let Ok(cmd) = rx.recv() {
            match cmd {
                WorkerCmd::Estimate { seq, snapshot } => {
                    let result = estimate_heart_rate(&snapshot, &settings);
                    let counter = if result.is_ok() {
                        &metrics.estimates_ok
                    } else {
                        &metrics.estimates_rejected
                    };
                    counter.fetch_add(1, Ordering::Relaxed);

                    let output = WorkerOutput { seq, total_frames: snapshot.total_frames, result };
                    if results.send(output).is_err() {
                        break;
                    }
                }
                WorkerCmd::Shutdown => break,
            }
        }
    }
}

impl Drop for EstimateWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{ColorSample, SignalBuffer};
    use crate::config::MeasurementConfig;
    use std::f64::consts::PI;

    fn pulse_snapshot(frames: usize) -> BufferSnapshot {
        let mut buf = SignalBuffer::unbounded(30.0);
        for i in 0..frames {
            let t = i as f64 / 30.0;
            let g = 120.0 + (2.0 * PI * 1.2 * t).sin() + 0.1 * (i as f64 * 1.7).sin();
            buf.append(Some(ColorSample::new(i as u64, [180.0, g, 100.0])));
        }
        buf.snapshot()
    }

    fn settings() -> EstimationSettings {
        EstimationSettings::from_config(&MeasurementConfig::live(), 30.0)
    }

    #[test]
    fn test_worker_computes_estimate() {
        let mut worker = EstimateWorker::start(settings()).unwrap();
        let seq = worker.submit(pulse_snapshot(600)).unwrap();

        let output = worker.wait(Duration::from_secs(10)).expect("estimate");
        assert_eq!(output.seq, seq);
        assert_eq!(output.total_frames, 600);
        let bpm = output.result.unwrap().bpm;
        assert!((bpm - 72.0).abs() <= 3.0, "bpm = {bpm}");

        assert_eq!(worker.metrics().estimates_ok, 1);
        worker.shutdown();
    }

    #[test]
    fn test_worker_reports_rejections() {
        let mut worker = EstimateWorker::start(settings()).unwrap();
        worker.submit(pulse_snapshot(30)).unwrap();

        let output = worker.wait(Duration::from_secs(10)).expect("estimate");
        assert!(matches!(output.result, Err(Rejection::InputTooShort { .. })));
        assert_eq!(worker.metrics().estimates_rejected, 1);
    }

    #[test]
    fn test_backpressure_skips_without_blocking() {
        let mut worker = EstimateWorker::start(settings()).unwrap();
        let snapshot = pulse_snapshot(900);
        let batch: Vec<BufferSnapshot> = (0..50).map(|_| snapshot.clone()).collect();

        let mut skipped = 0;
        for snapshot in batch {
            if worker.submit(snapshot) == Err(SubmitError::Busy) {
                skipped += 1;
            }
        }

        let metrics = worker.metrics();
        assert_eq!(metrics.skipped_busy, skipped);
        assert_eq!(metrics.submitted + metrics.skipped_busy, 50);
        assert!(skipped > 0);
    }

    #[test]
    fn test_drop_joins_thread() {
        let mut worker = EstimateWorker::start(settings()).unwrap();
        worker.submit(pulse_snapshot(600)).unwrap();
        drop(worker);
    }
}
