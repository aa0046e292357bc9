//! # vivi-signals
//!
//! Contactless heart-rate estimation (rPPG) from face video.
//!
//! This crate provides:
//! - **Vision**: frames, frame sources, pluggable face detection, forehead ROI
//! - **Signal buffer**: per-frame forehead colors with face-coverage bookkeeping
//! - **rPPG**: POS pulse extraction
//! - **DSP**: Butterworth band-pass (second-order sections), FFT peak and SNR
//! - **Validity gate**: duration, coverage, range and jump checks
//! - **Vitals**: heuristic secondary metrics for an accepted heart rate
//! - **Engine / live monitor**: offline clips and live streams
//!
//! ## Example
//!
//! ```ignore
//! use vivi_signals::{MeasurementConfig, RppgEngine};
//! use vivi_signals::vision::{FaceRegion, FixedRegionDetector, RawVideoSource};
//!
//! let detector = FixedRegionDetector::new(FaceRegion::new(200, 80, 240, 240));
//! let mut engine = RppgEngine::new(MeasurementConfig::offline(), detector)?;
//! let result = engine.measure_offline_with(|| RawVideoSource::open("clip.rgb", 640, 480, 30.0))?;
//!
//! println!("{}", result.to_record().to_json()?);
//! ```

pub mod buffer;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod events;
pub mod gate;
pub mod live;
pub mod measurement;
pub mod rppg;
pub mod vision;
pub mod vitals;

pub use buffer::{BufferSnapshot, ColorSample, SignalBuffer};
pub use config::{CaptureMode, MeasurementConfig};
pub use dsp::{QualityLabel, SpectralEstimator, SpectrumEstimate};
pub use engine::{estimate_heart_rate, EstimationSettings, RppgEngine};
pub use error::{ConfigError, Result, SignalError};
pub use events::{DiagnosticEvent, DiagnosticSink, LogSink, MemorySink, NullSink};
pub use gate::{JumpGuard, JumpVerdict, ValidityGate};
pub use live::{EstimateStatus, LiveMonitor, LiveUpdate, StopHandle};
pub use measurement::{CaptureStats, Measurement, MeasurementRecord, MeasurementResult, Rejection};
pub use rppg::{PosExtractor, PulseSignal};
pub use vitals::{BloodPressure, HeartRateZone, VitalSigns};
