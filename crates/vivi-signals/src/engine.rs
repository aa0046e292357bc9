//! rPPG measurement engine
//!
//! One engine instance per measurement session. It owns the face detector,
//! the signal buffer and the diagnostic sink, and runs the whole pipeline:
//!
//! frames → forehead ROI colors → buffer → POS pulse → spectrum → gated
//! result → derived vitals
//!
//! Offline clips go through [`RppgEngine::measure_offline`]; live streams
//! wrap the engine in a [`crate::live::LiveMonitor`].

use std::sync::Arc;

use crate::buffer::{AppendOutcome, BufferSnapshot, ColorSample, SignalBuffer};
use crate::config::MeasurementConfig;
use crate::dsp::{SpectralEstimator, SpectrumEstimate};
use crate::error::{Result, SignalError};
use crate::events::{DiagnosticEvent, DiagnosticSink, LogSink};
use crate::gate::ValidityGate;
use crate::measurement::{CaptureStats, Measurement, MeasurementResult, Rejection, RejectedMeasurement};
use crate::rppg::PosExtractor;
use crate::vision::{locate_forehead, FaceDetector, Frame, FrameSource, RoiObservation};
use crate::vitals::VitalSigns;

/// Everything the estimator needs besides the snapshot
#[derive(Debug, Clone, Copy)]
pub struct EstimationSettings {
    pub pos: PosExtractor,
    pub spectral: SpectralEstimator,
    pub gap_fill: bool,
}

impl EstimationSettings {
    pub fn from_config(config: &MeasurementConfig, fps: f64) -> Self {
        Self {
            pos: PosExtractor::from_config(config, fps),
            spectral: SpectralEstimator::from_config(config),
            gap_fill: config.gap_fill,
        }
    }
}

/// Snapshot → pulse → spectrum
///
/// Pure function of its inputs; safe to call from any thread.
pub fn estimate_heart_rate(
    snapshot: &BufferSnapshot,
    settings: &EstimationSettings,
) -> std::result::Result<SpectrumEstimate, Rejection> {
    // Minimum length counts measured samples, never interpolated ones
    settings.pos.check_length(snapshot.sample_count(), snapshot.fps)?;
    let series = snapshot.series(settings.gap_fill);
    let pulse = settings.pos.extract(&series, snapshot.fps)?;
    settings.spectral.estimate(&pulse)
}

/// What one ingested frame contributed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameOutcome {
    pub observation: RoiObservation,
    pub append: AppendOutcome,
}

impl FrameOutcome {
    pub fn has_sample(&self) -> bool {
        self.observation.mean_rgb.is_some()
    }
}

pub struct RppgEngine {
    config: MeasurementConfig,
    detector: Box<dyn FaceDetector>,
    sink: Arc<dyn DiagnosticSink>,
    gate: ValidityGate,
    buffer: SignalBuffer,
    settings: EstimationSettings,
}

impl RppgEngine {
    /// Create an engine; the configuration is validated first
    pub fn new<D: FaceDetector + 'static>(config: MeasurementConfig, detector: D) -> Result<Self> {
        config.validate()?;
        let fps = config.default_fps;
        Ok(Self {
            gate: ValidityGate::from_config(&config),
            buffer: SignalBuffer::with_capacity(config.window_capacity(fps), fps),
            settings: EstimationSettings::from_config(&config, fps),
            detector: Box::new(detector),
            sink: Arc::new(LogSink),
            config,
        })
    }

    /// Replace the default [`LogSink`]
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &MeasurementConfig {
        &self.config
    }

    pub fn gate(&self) -> &ValidityGate {
        &self.gate
    }

    pub fn settings(&self) -> &EstimationSettings {
        &self.settings
    }

    pub fn sink(&self) -> &Arc<dyn DiagnosticSink> {
        &self.sink
    }

    pub fn emit(&self, event: DiagnosticEvent) {
        self.sink.emit(event);
    }

    pub fn fps(&self) -> f64 {
        self.buffer.fps()
    }

    /// Start a new session at `reported_fps`
    ///
    /// A rate that is not a positive finite number is replaced by
    /// `default_fps`. Clears the buffer. Returns the rate in use.
    pub fn begin(&mut self, reported_fps: f64) -> f64 {
        let fps = if reported_fps.is_finite() && reported_fps > 0.0 {
            reported_fps
        } else {
            let fps = self.config.default_fps;
            self.emit(DiagnosticEvent::FrameRateDefaulted { reported: reported_fps, fps });
            fps
        };

        self.buffer = SignalBuffer::with_capacity(self.config.window_capacity(fps), fps);
        self.settings = EstimationSettings::from_config(&self.config, fps);
        fps
    }

    /// Locate the forehead in `frame` and record the outcome
    pub fn ingest(&mut self, frame: &Frame) -> Result<FrameOutcome> {
        let expected = frame.width as usize * frame.height as usize * 3;
        if frame.width == 0 || frame.height == 0 || frame.data.len() != expected {
            return Err(SignalError::MalformedFrame(format!(
                "frame {}: {} bytes for {}x{} RGB",
                frame.index,
                frame.data.len(),
                frame.width,
                frame.height
            )));
        }

        let observation = locate_forehead(frame, self.detector.as_mut());
        let sample = observation.mean_rgb.map(|rgb| ColorSample::new(frame.index, rgb));
        let append = self.buffer.append(sample);

        if let AppendOutcome::NoFace(run) = append {
            let per_second = self.buffer.fps().round().max(1.0) as usize;
            if run % per_second == 0 {
                self.emit(DiagnosticEvent::NoFaceStreak {
                    frames: run,
                    seconds: run as f64 / self.buffer.fps(),
                });
            }
        }

        Ok(FrameOutcome { observation, append })
    }

    pub fn snapshot(&self) -> BufferSnapshot {
        self.buffer.snapshot()
    }

    pub fn buffer(&self) -> &SignalBuffer {
        &self.buffer
    }

    /// Estimate from the current buffer, without coverage or range gating
    pub fn estimate(&self) -> std::result::Result<SpectrumEstimate, Rejection> {
        estimate_heart_rate(&self.buffer.snapshot(), &self.settings)
    }

    /// Final result from the current buffer
    ///
    /// Applies the coverage post-check, estimation, and the range check,
    /// then derives vitals. The duration pre-check is the caller's job
    /// since it depends on how the capture length is known.
    pub fn finalize(&self) -> MeasurementResult {
        let snapshot = self.buffer.snapshot();
        let stats = CaptureStats::from_snapshot(&snapshot);

        if let Err(reason) = self.gate.check_coverage(&snapshot) {
            return self.reject(reason, stats, None);
        }

        let estimate = match estimate_heart_rate(&snapshot, &self.settings) {
            Ok(estimate) => estimate,
            Err(reason) => {
                let snr = match reason {
                    Rejection::WeakSignal { snr, .. } => Some(snr),
                    _ => None,
                };
                return self.reject(reason, stats, snr);
            }
        };

        if let Err(reason) = self.gate.check_range(estimate.bpm) {
            return self.reject(reason, stats, Some(estimate.snr));
        }

        self.emit(DiagnosticEvent::EstimateComputed {
            bpm: estimate.bpm,
            snr: estimate.snr,
            quality: estimate.quality,
        });

        let vitals = VitalSigns::derive(estimate.bpm, estimate.confidence, stats.detection_rate, stats.usable_seconds);
        MeasurementResult::Accepted(Measurement { estimate, vitals, stats })
    }

    fn reject(&self, reason: Rejection, stats: CaptureStats, snr: Option<f64>) -> MeasurementResult {
        self.emit(DiagnosticEvent::EstimateRejected { reason: reason.clone() });
        MeasurementResult::Rejected(RejectedMeasurement { reason, stats, snr })
    }

    /// Run a whole finite clip through the pipeline
    ///
    /// The source is consumed and dropped before the final estimate.
    /// Signal-quality problems come back as a rejected result; only
    /// malformed frames and read failures are `Err`.
    pub fn measure_offline<S: FrameSource>(&mut self, mut source: S) -> Result<MeasurementResult> {
        let fps = self.begin(source.frame_rate());
        let frame_count = source.frame_count();
        self.emit(DiagnosticEvent::SourceOpened { fps, frame_count });

        // Length known up front: reject before decoding anything
        if let Some(count) = frame_count {
            let duration = count as f64 / fps;
            if let Err(reason) = self.gate.check_duration(duration) {
                return Ok(self.finish(self.short_capture(reason, fps, duration)));
            }
        }

        while let Some(frame) = source.next_frame()? {
            let outcome = self.ingest(&frame)?;
            if let AppendOutcome::NoFace(run) = outcome.append {
                if self.gate.no_face_streak_exceeded(run, fps) {
                    self.emit(DiagnosticEvent::CaptureAborted {
                        frame_index: frame.index,
                        consecutive_no_face: run,
                    });
                    break;
                }
            }
        }
        drop(source);

        self.emit(DiagnosticEvent::CaptureComplete {
            frames: self.buffer.total_frames(),
            face_frames: self.buffer.face_frames(),
        });

        if frame_count.is_none() {
            let duration = self.buffer.total_frames() as f64 / fps;
            if let Err(reason) = self.gate.check_duration(duration) {
                let mut result = self.short_capture(reason, fps, duration);
                *result.stats_mut() = CaptureStats::from_snapshot(&self.buffer.snapshot());
                return Ok(self.finish(result));
            }
        }

        let mut result = self.finalize();
        // An early abort still reports the length of the whole clip
        if let Some(count) = frame_count {
            result.stats_mut().duration_seconds = count as f64 / fps;
        }
        Ok(self.finish(result))
    }

    /// Like [`measure_offline`](Self::measure_offline), opening the source
    /// first. A source that cannot be opened yields a `SourceUnavailable`
    /// rejection instead of an error.
    pub fn measure_offline_with<S, F>(&mut self, open: F) -> Result<MeasurementResult>
    where
        S: FrameSource,
        F: FnOnce() -> Result<S>,
    {
        match open() {
            Ok(source) => self.measure_offline(source),
            Err(SignalError::SourceUnavailable(reason)) => Ok(self.unavailable(reason)),
            Err(SignalError::Io(e)) => Ok(self.unavailable(e.to_string())),
            Err(other) => Err(other),
        }
    }

    fn unavailable(&self, reason: String) -> MeasurementResult {
        let result = self.reject(Rejection::SourceUnavailable { reason }, CaptureStats::default(), None);
        self.finish(result)
    }

    fn short_capture(&self, reason: Rejection, fps: f64, duration: f64) -> MeasurementResult {
        let stats = CaptureStats { fps, duration_seconds: duration, ..CaptureStats::default() };
        self.reject(reason, stats, None)
    }

    /// Report the end of a measurement
    pub fn finish(&self, result: MeasurementResult) -> MeasurementResult {
        self.emit(DiagnosticEvent::MeasurementFinished {
            success: result.is_success(),
            heart_rate: result.heart_rate(),
        });
        result
    }
}

impl std::fmt::Debug for RppgEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RppgEngine")
            .field("config", &self.config)
            .field("gate", &self.gate)
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}
