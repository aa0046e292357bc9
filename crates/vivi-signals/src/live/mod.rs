//! Live (camera) measurement
//!
//! [`LiveMonitor`] drives an [`RppgEngine`] over an endless frame stream:
//! every frame updates the sliding window synchronously, and once enough
//! samples exist an estimate is recomputed, either inline or on an
//! [`EstimateWorker`]. Estimates pass the range check and the jump rule
//! before they are displayed.
//!
//! ```ignore
//! let stop = StopHandle::new();
//! let monitor = LiveMonitor::new(engine, source.frame_rate());
//! let result = monitor.run(source, &stop, |update| {
//!     println!("{:.0}% {:?}", update.progress_percent, update.heart_rate);
//! })?;
//! ```

mod worker;

pub use worker::{EstimateWorker, MetricsSnapshot, SubmitError, WorkerMetrics, WorkerOutput};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::MeasurementConfig;
use crate::dsp::{QualityLabel, SpectrumEstimate};
use crate::engine::RppgEngine;
use crate::error::Result;
use crate::events::DiagnosticEvent;
use crate::gate::{JumpGuard, JumpVerdict};
use crate::measurement::{CaptureStats, MeasurementResult, Rejection, RejectedMeasurement};
use crate::vision::{Frame, FrameSource};

/// Cloneable cancellation flag for [`LiveMonitor::run`]
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What happened to the estimate computed for a frame
#[derive(Debug, Clone, PartialEq)]
pub enum EstimateStatus {
    /// Not enough samples yet
    Pending,
    Accepted(SpectrumEstimate),
    /// Jumped too far from the displayed value, which stays in place
    Suppressed { bpm: f64, previous: f64 },
    Rejected(Rejection),
    /// Handed to the background worker; result arrives later
    Queued,
    /// Background worker busy, snapshot skipped
    Skipped,
}

/// Progress report after each frame
#[derive(Debug, Clone, PartialEq)]
pub struct LiveUpdate {
    pub frame_index: u64,
    pub elapsed_seconds: f64,
    pub remaining_seconds: f64,
    /// Progress toward `duration_seconds`, capped at 100
    pub progress_percent: f64,
    pub frames_processed: usize,
    pub face_frames: usize,
    /// This frame had a usable forehead ROI
    pub face_present: bool,
    /// Last accepted heart rate
    pub heart_rate: Option<f64>,
    pub quality: Option<QualityLabel>,
    pub status: EstimateStatus,
}

pub struct LiveMonitor {
    engine: RppgEngine,
    guard: JumpGuard,
    worker: Option<EstimateWorker>,
    displayed: Option<SpectrumEstimate>,
    first_timestamp_us: Option<i64>,
    last_timestamp_us: i64,
    stop_at_target: bool,
}

impl LiveMonitor {
    /// Start a live session at `fps` (falls back to the configured default)
    pub fn new(mut engine: RppgEngine, fps: f64) -> Self {
        engine.begin(fps);
        let config = engine.config();
        let worker = if config.background_estimation {
            match EstimateWorker::start(*engine.settings()) {
                Ok(worker) => Some(worker),
                Err(e) => {
                    log::warn!("Estimator thread unavailable ({e}), estimating inline");
                    None
                }
            }
        } else {
            None
        };

        Self {
            guard: JumpGuard::new(config.max_bpm_jump),
            worker,
            displayed: None,
            first_timestamp_us: None,
            last_timestamp_us: 0,
            stop_at_target: true,
            engine,
        }
    }

    /// Keep running past `duration_seconds` until stopped or the source ends
    pub fn continuous(mut self) -> Self {
        self.stop_at_target = false;
        self
    }

    pub fn engine(&self) -> &RppgEngine {
        &self.engine
    }

    pub fn config(&self) -> &MeasurementConfig {
        self.engine.config()
    }

    /// Currently displayed estimate
    pub fn displayed(&self) -> Option<&SpectrumEstimate> {
        self.displayed.as_ref()
    }

    pub fn worker_metrics(&self) -> Option<MetricsSnapshot> {
        self.worker.as_ref().map(|w| w.metrics())
    }

    /// Seconds of stream seen, from frame timestamps
    ///
    /// Counts one frame period for the last frame. Falls back to frame
    /// count over rate when timestamps do not advance.
    pub fn elapsed_seconds(&self) -> f64 {
        let frames = self.engine.buffer().total_frames();
        let fps = self.engine.fps();
        if frames == 0 {
            return 0.0;
        }
        match self.first_timestamp_us {
            Some(first) if self.last_timestamp_us > first => {
                (self.last_timestamp_us - first) as f64 / 1e6 + 1.0 / fps
            }
            _ => frames as f64 / fps,
        }
    }

    /// Run a new estimate through the range check and the jump rule
    pub fn consider(&mut self, estimate: SpectrumEstimate) -> EstimateStatus {
        if let Err(reason) = self.engine.gate().check_range(estimate.bpm) {
            self.engine.emit(DiagnosticEvent::EstimateRejected { reason: reason.clone() });
            return EstimateStatus::Rejected(reason);
        }

        match self.guard.check(estimate.bpm) {
            JumpVerdict::Accepted => {
                self.engine.emit(DiagnosticEvent::EstimateComputed {
                    bpm: estimate.bpm,
                    snr: estimate.snr,
                    quality: estimate.quality,
                });
                self.displayed = Some(estimate);
                EstimateStatus::Accepted(estimate)
            }
            JumpVerdict::Suppressed { previous, .. } => {
                self.engine.emit(DiagnosticEvent::EstimateSuppressed { bpm: estimate.bpm, previous });
                EstimateStatus::Suppressed { bpm: estimate.bpm, previous }
            }
        }
    }

    fn resolve(&mut self, result: std::result::Result<SpectrumEstimate, Rejection>) -> EstimateStatus {
        match result {
            Ok(estimate) => self.consider(estimate),
            Err(reason) => {
                self.engine.emit(DiagnosticEvent::EstimateRejected { reason: reason.clone() });
                EstimateStatus::Rejected(reason)
            }
        }
    }

    fn submit_snapshot(&mut self) -> EstimateStatus {
        let Some(worker) = self.worker.as_mut() else {
            return EstimateStatus::Pending;
        };
        match worker.submit(self.engine.snapshot()) {
            Ok(_) => EstimateStatus::Queued,
            Err(SubmitError::Busy) => {
                let skipped = worker.metrics().skipped_busy;
                self.engine.emit(DiagnosticEvent::WorkerBackpressure { skipped });
                EstimateStatus::Skipped
            }
            Err(SubmitError::Stopped) => {
                log::warn!("Estimator thread stopped, estimating inline");
                self.worker = None;
                let result = self.engine.estimate();
                self.resolve(result)
            }
        }
    }

    /// Ingest one frame and refresh the estimate when possible
    pub fn push(&mut self, frame: &Frame) -> Result<LiveUpdate> {
        let outcome = self.engine.ingest(frame)?;
        self.first_timestamp_us.get_or_insert(frame.timestamp_us);
        self.last_timestamp_us = frame.timestamp_us;

        // Results that finished since the last frame
        let finished = self.worker.as_ref().map(|w| w.drain()).unwrap_or_default();
        let mut status = EstimateStatus::Pending;
        for output in finished {
            status = self.resolve(output.result);
        }

        if self.engine.buffer().len() >= self.engine.settings().pos.min_samples() {
            status = if self.worker.is_some() {
                let queued = self.submit_snapshot();
                if status == EstimateStatus::Pending {
                    queued
                } else {
                    status
                }
            } else {
                let result = self.engine.estimate();
                self.resolve(result)
            };
        }

        let elapsed = self.elapsed_seconds();
        let target = self.engine.config().duration_seconds;
        let buffer = self.engine.buffer();
        Ok(LiveUpdate {
            frame_index: frame.index,
            elapsed_seconds: elapsed,
            remaining_seconds: (target - elapsed).max(0.0),
            progress_percent: (elapsed / target * 100.0).min(100.0),
            frames_processed: buffer.total_frames(),
            face_frames: buffer.face_frames(),
            face_present: outcome.has_sample(),
            heart_rate: self.displayed.map(|e| e.bpm),
            quality: self.displayed.map(|e| e.quality),
            status,
        })
    }

    /// Pull frames until the source ends, `stop` is set, or (unless
    /// [`continuous`](Self::continuous)) the target duration is reached
    ///
    /// The source is dropped before the final result is computed.
    ///
    /// `stop` is checked between frames only. A source that blocks inside
    /// `next_frame` (a pipe or camera with no data) delays cancellation
    /// until that call returns.
    pub fn run<S, F>(mut self, mut source: S, stop: &StopHandle, mut on_update: F) -> Result<MeasurementResult>
    where
        S: FrameSource,
        F: FnMut(&LiveUpdate),
    {
        self.engine.emit(DiagnosticEvent::SourceOpened {
            fps: self.engine.fps(),
            frame_count: source.frame_count(),
        });

        loop {
            if stop.is_stopped() {
                self.engine.emit(DiagnosticEvent::Cancelled { elapsed_seconds: self.elapsed_seconds() });
                break;
            }
            let Some(frame) = source.next_frame()? else {
                break;
            };
            let update = self.push(&frame)?;
            on_update(&update);
            if self.stop_at_target && update.elapsed_seconds >= self.engine.config().duration_seconds {
                break;
            }
        }
        drop(source);

        Ok(self.finish())
    }

    /// Final result from whatever the window holds
    ///
    /// Stops the background worker, then applies the duration pre-check on
    /// elapsed stream time and the offline-style gates. The jump rule does
    /// not apply here.
    pub fn finish(mut self) -> MeasurementResult {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }

        let buffer = self.engine.buffer();
        self.engine.emit(DiagnosticEvent::CaptureComplete {
            frames: buffer.total_frames(),
            face_frames: buffer.face_frames(),
        });

        let elapsed = self.elapsed_seconds();
        if let Err(reason) = self.engine.gate().check_duration(elapsed) {
            let snapshot = self.engine.snapshot();
            let stats = CaptureStats { duration_seconds: elapsed, ..CaptureStats::from_snapshot(&snapshot) };
            self.engine.emit(DiagnosticEvent::EstimateRejected { reason: reason.clone() });
            let result = MeasurementResult::Rejected(RejectedMeasurement { reason, stats, snr: None });
            return self.engine.finish(result);
        }

        let mut result = self.engine.finalize();
        result.stats_mut().duration_seconds = elapsed;
        self.engine.finish(result)
    }
}
