//! Secondary metrics derived from an accepted heart rate
//!
//! These are fixed linear heuristics kept for output parity with the
//! product. They are estimates for display, not medical measurements.

use serde::Serialize;

/// Estimated arterial pressure (mmHg)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BloodPressure {
    pub systolic: i32,
    pub diastolic: i32,
}

/// Resting heart-rate reference band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HeartRateZone {
    /// Below 60 BPM
    Low,
    /// 60-100 BPM
    Normal,
    /// Above 100 BPM
    Elevated,
}

impl HeartRateZone {
    pub fn from_bpm(bpm: f64) -> Self {
        if bpm < 60.0 {
            Self::Low
        } else if bpm > 100.0 {
            Self::Elevated
        } else {
            Self::Normal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VitalSigns {
    pub blood_pressure: BloodPressure,
    /// HRV estimate (ms)
    pub hrv: i32,
    /// 0-100
    pub stress_index: f64,
    /// Overall measurement quality, 0-100
    pub quality_score: f64,
}

impl VitalSigns {
    /// Derive all secondary metrics
    ///
    /// # Arguments
    /// * `bpm` - Accepted heart rate
    /// * `confidence` - Estimate confidence (%)
    /// * `detection_rate` - Frames with a usable face (%)
    /// * `usable_seconds` - Seconds of usable samples
    pub fn derive(bpm: f64, confidence: f64, detection_rate: f64, usable_seconds: f64) -> Self {
        let hrv = estimate_hrv(bpm);
        Self {
            blood_pressure: estimate_blood_pressure(bpm),
            hrv,
            stress_index: stress_index(bpm, hrv),
            quality_score: quality_score(detection_rate, confidence, usable_seconds),
        }
    }
}

/// Linear map around 65 BPM, truncated to whole mmHg then clamped
pub fn estimate_blood_pressure(bpm: f64) -> BloodPressure {
    let delta = bpm - 65.0;
    BloodPressure {
        systolic: ((105.0 + delta * 0.8) as i32).clamp(90, 160),
        diastolic: ((70.0 + delta * 0.5) as i32).clamp(60, 100),
    }
}

pub fn estimate_hrv(bpm: f64) -> i32 {
    ((75.0 - (bpm - 65.0) * 0.4) as i32).clamp(25, 95)
}

pub fn stress_index(bpm: f64, hrv: i32) -> f64 {
    let hr_stress = ((bpm - 70.0) / 30.0 * 40.0).max(0.0);
    let hrv_stress = ((75.0 - hrv as f64) / 50.0 * 30.0).max(0.0);
    (hr_stress + hrv_stress).min(100.0)
}

/// Mean of capped detection rate, confidence and capped usable duration
pub fn quality_score(detection_rate: f64, confidence: f64, usable_seconds: f64) -> f64 {
    let detection = (detection_rate * 1.2).min(100.0);
    let duration = (usable_seconds * 3.0).min(30.0);
    (detection + confidence + duration) / 3.0
}
