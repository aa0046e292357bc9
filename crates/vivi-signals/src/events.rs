//! Diagnostic events
//!
//! The engine reports what happens during a measurement as typed events.
//! A [`DiagnosticSink`] decides what to do with them: forward to `log`,
//! collect them for inspection, or drop them.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::dsp::QualityLabel;
use crate::measurement::Rejection;

#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticEvent {
    SourceOpened {
        fps: f64,
        frame_count: Option<usize>,
    },
    /// Source reported no usable rate; `fps` is the fallback in use
    FrameRateDefaulted {
        reported: f64,
        fps: f64,
    },
    /// A run of frames without a usable face reached a whole second
    NoFaceStreak {
        frames: usize,
        seconds: f64,
    },
    /// Offline decoding stopped early after too long without a face
    CaptureAborted {
        frame_index: u64,
        consecutive_no_face: usize,
    },
    CaptureComplete {
        frames: usize,
        face_frames: usize,
    },
    EstimateComputed {
        bpm: f64,
        snr: f64,
        quality: QualityLabel,
    },
    EstimateRejected {
        reason: Rejection,
    },
    /// Live estimate held back by the jump rule
    EstimateSuppressed {
        bpm: f64,
        previous: f64,
    },
    /// Background estimator busy; snapshot skipped
    WorkerBackpressure {
        skipped: u64,
    },
    Cancelled {
        elapsed_seconds: f64,
    },
    MeasurementFinished {
        success: bool,
        heart_rate: Option<f64>,
    },
}

/// Receiver of diagnostic events
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, event: DiagnosticEvent);
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for Arc<S> {
    fn emit(&self, event: DiagnosticEvent) {
        (**self).emit(event)
    }
}

/// Forwards events to the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn emit(&self, event: DiagnosticEvent) {
        match event {
            DiagnosticEvent::SourceOpened { fps, frame_count } => match frame_count {
                Some(n) => log::info!("Source opened: {fps:.2} fps, {n} frames"),
                None => log::info!("Source opened: {fps:.2} fps, length unknown"),
            },
            DiagnosticEvent::FrameRateDefaulted { reported, fps } => {
                log::warn!("Source reported frame rate {reported}, using {fps} fps")
            }
            DiagnosticEvent::NoFaceStreak { frames, seconds } => {
                log::debug!("No face for {frames} frames ({seconds:.1}s)")
            }
            DiagnosticEvent::CaptureAborted { frame_index, consecutive_no_face } => log::warn!(
                "No face detected for {consecutive_no_face} consecutive frames, stopping at frame {frame_index}"
            ),
            DiagnosticEvent::CaptureComplete { frames, face_frames } => {
                log::info!("Capture complete: {face_frames}/{frames} frames with a face")
            }
            DiagnosticEvent::EstimateComputed { bpm, snr, quality } => {
                log::debug!("Estimate: {bpm:.1} BPM, SNR {snr:.2} ({quality})")
            }
            DiagnosticEvent::EstimateRejected { reason } => log::debug!("Estimate rejected: {reason}"),
            DiagnosticEvent::EstimateSuppressed { bpm, previous } => {
                log::debug!("Estimate {bpm:.1} BPM suppressed, keeping {previous:.1} BPM")
            }
            DiagnosticEvent::WorkerBackpressure { skipped } => {
                log::warn!("Estimator busy, {skipped} snapshots skipped so far")
            }
            DiagnosticEvent::Cancelled { elapsed_seconds } => {
                log::info!("Measurement stopped after {elapsed_seconds:.1}s")
            }
            DiagnosticEvent::MeasurementFinished { success, heart_rate } => match heart_rate {
                Some(bpm) if success => log::info!("Measurement finished: {bpm:.1} BPM"),
                _ => log::info!("Measurement finished without a heart rate"),
            },
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<DiagnosticEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn count_where(&self, pred: impl Fn(&DiagnosticEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, event: DiagnosticEvent) {
        self.events.lock().push(event);
    }
}

/// Drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn emit(&self, _event: DiagnosticEvent) {}
}
