//! Measurement outcome types
//!
//! A measurement either produces an accepted heart-rate estimate with its
//! derived vitals, or a typed [`Rejection`] explaining why no estimate was
//! reported. Both carry the capture statistics and flatten into the same
//! JSON-friendly [`MeasurementRecord`].

use serde::Serialize;
use thiserror::Error;

use crate::buffer::BufferSnapshot;
use crate::dsp::{QualityLabel, SpectrumEstimate};
use crate::vitals::{BloodPressure, HeartRateZone, VitalSigns};

/// Why a capture did not yield a heart rate
///
/// `Display` is the user-facing reason string.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error(
        "Capture too short ({actual_seconds:.1}s). Need at least {required_seconds:.0} seconds for accurate analysis."
    )]
    InputTooShort { required_seconds: f64, actual_seconds: f64 },

    #[error(
        "Insufficient face coverage. Got {usable_seconds:.1}s of face data (need {required_seconds:.0}s+). Detection rate: {detection_rate:.1}%"
    )]
    InsufficientFaceCoverage {
        usable_seconds: f64,
        required_seconds: f64,
        detection_rate: f64,
    },

    #[error("No valid frequency data in the heart-rate band")]
    NoValidSpectralData,

    #[error("Signal too weak (SNR: {snr:.2}, need {min_snr:.1})")]
    WeakSignal { snr: f64, min_snr: f64 },

    #[error("Heart rate {bpm:.1} BPM outside physiological range ({min:.0}-{max:.0} BPM)")]
    OutOfPhysiologicalRange { bpm: f64, min: f64, max: f64 },

    #[error("Cannot open video source: {reason}")]
    SourceUnavailable { reason: String },
}

impl Rejection {
    /// Stable machine-readable name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InputTooShort { .. } => "input_too_short",
            Self::InsufficientFaceCoverage { .. } => "insufficient_face_coverage",
            Self::NoValidSpectralData => "no_valid_spectral_data",
            Self::WeakSignal { .. } => "weak_signal",
            Self::OutOfPhysiologicalRange { .. } => "out_of_physiological_range",
            Self::SourceUnavailable { .. } => "source_unavailable",
        }
    }
}

/// Frame and face-coverage counters of one capture
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CaptureStats {
    pub frames_processed: usize,
    /// Frames with a usable forehead ROI
    pub face_frames: usize,
    pub fps: f64,
    pub duration_seconds: f64,
    /// Seconds of video covered by usable samples
    pub usable_seconds: f64,
    /// face_frames / frames_processed, in percent
    pub detection_rate: f64,
}

impl CaptureStats {
    pub fn from_snapshot(snapshot: &BufferSnapshot) -> Self {
        let duration_seconds = if snapshot.fps > 0.0 {
            snapshot.total_frames as f64 / snapshot.fps
        } else {
            0.0
        };
        Self {
            frames_processed: snapshot.total_frames,
            face_frames: snapshot.face_frames,
            fps: snapshot.fps,
            duration_seconds,
            usable_seconds: snapshot.usable_seconds(),
            detection_rate: snapshot.detection_rate(),
        }
    }
}

/// Accepted estimate with everything derived from it
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub estimate: SpectrumEstimate,
    pub vitals: VitalSigns,
    pub stats: CaptureStats,
}

/// Rejected capture with the counters that explain it
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedMeasurement {
    pub reason: Rejection,
    pub stats: CaptureStats,
    /// SNR observed before the rejection, when the spectrum was computed
    pub snr: Option<f64>,
}

/// Outcome of one estimation request
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementResult {
    Accepted(Measurement),
    Rejected(RejectedMeasurement),
}

impl MeasurementResult {
    pub fn rejected(reason: Rejection, stats: CaptureStats) -> Self {
        Self::Rejected(RejectedMeasurement { reason, stats, snr: None })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    pub fn heart_rate(&self) -> Option<f64> {
        match self {
            Self::Accepted(m) => Some(m.estimate.bpm),
            Self::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected(r) => Some(&r.reason),
        }
    }

    pub fn stats(&self) -> &CaptureStats {
        match self {
            Self::Accepted(m) => &m.stats,
            Self::Rejected(r) => &r.stats,
        }
    }

    pub fn stats_mut(&mut self) -> &mut CaptureStats {
        match self {
            Self::Accepted(m) => &mut m.stats,
            Self::Rejected(r) => &mut r.stats,
        }
    }

    /// Flatten into the external record shape
    pub fn to_record(&self) -> MeasurementRecord {
        let stats = self.stats();
        let mut record = MeasurementRecord {
            success: self.is_success(),
            heart_rate: None,
            confidence: None,
            quality: None,
            quality_score: None,
            hrv: None,
            blood_pressure: None,
            stress_index: None,
            frames_processed: stats.frames_processed,
            face_frames: stats.face_frames,
            duration_seconds: round1(stats.duration_seconds),
            actual_face_duration: round1(stats.usable_seconds),
            detection_rate: (stats.frames_processed > 0).then(|| round1(stats.detection_rate)),
            error: None,
            required_duration: None,
            snr: None,
            heart_rate_zone: None,
        };

        match self {
            Self::Accepted(m) => {
                record.heart_rate = Some(round1(m.estimate.bpm));
                record.confidence = Some(round1(m.estimate.confidence));
                record.quality = Some(m.estimate.quality);
                record.quality_score = Some(round1(m.vitals.quality_score));
                record.hrv = Some(m.vitals.hrv);
                record.blood_pressure = Some(m.vitals.blood_pressure);
                record.stress_index = Some(round1(m.vitals.stress_index));
                record.snr = Some(round2(m.estimate.snr));
                record.heart_rate_zone = Some(HeartRateZone::from_bpm(m.estimate.bpm));
            }
            Self::Rejected(r) => {
                record.error = Some(r.reason.to_string());
                record.snr = r.snr.map(round2);
                if let Rejection::InputTooShort { required_seconds, .. } = r.reason {
                    record.required_duration = Some(round1(required_seconds));
                }
            }
        }

        record
    }
}

/// Flat, serializable view of a [`MeasurementResult`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementRecord {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityLabel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hrv: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blood_pressure: Option<BloodPressure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stress_index: Option<f64>,
    pub frames_processed: usize,
    pub face_frames: usize,
    pub duration_seconds: f64,
    pub actual_face_duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heart_rate_zone: Option<HeartRateZone>,
}

impl MeasurementRecord {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
