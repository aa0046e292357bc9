//! Measurement configuration
//!
//! Thresholds differ between the offline (uploaded clip) and live (camera)
//! modes, so two presets are provided. Every value can be overridden from a
//! TOML file; missing keys fall back to the preset selected by `mode`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ConfigError;

/// How frames reach the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Finite, already-recorded clip processed as one batch
    Offline,
    /// Continuous camera stream with a sliding window
    Live,
}

impl Default for CaptureMode {
    fn default() -> Self {
        Self::Offline
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    pub mode: CaptureMode,
    /// Target capture length (live) / sliding window length (seconds)
    pub duration_seconds: f64,
    /// Capture shorter than this is rejected before any processing
    pub min_acceptable_duration_seconds: f64,
    /// Usable ROI samples required after capture, in seconds of video
    pub min_face_coverage_seconds: f64,
    /// Evict the oldest sample once `duration_seconds` worth is buffered
    pub sliding_window: bool,
    /// Minimum series length handed to the pulse extractor (seconds)
    pub min_pulse_seconds: f64,
    /// Stop decoding after this long without a usable face (offline only)
    pub max_no_face_seconds: Option<f64>,
    /// Rate assumed when a source reports none
    pub default_fps: f64,
    /// Heart-rate band lower edge (Hz)
    pub band_min_hz: f64,
    /// Heart-rate band upper edge (Hz)
    pub band_max_hz: f64,
    /// Butterworth prototype order of the band-pass filter
    pub filter_order: usize,
    /// Peak / mean spectral magnitude below which the signal is weak
    pub min_snr: f64,
    pub min_bpm: f64,
    pub max_bpm: f64,
    /// Live: largest accepted change between consecutive estimates (BPM)
    pub max_bpm_jump: f64,
    /// Interpolate frames without a face inside the window
    pub gap_fill: bool,
    /// Live: recompute estimates on a worker thread
    pub background_estimation: bool,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self::offline()
    }
}

impl MeasurementConfig {
    /// Preset for uploaded ~30 s recordings
    pub fn offline() -> Self {
        Self {
            mode: CaptureMode::Offline,
            duration_seconds: 30.0,
            min_acceptable_duration_seconds: 25.0,
            min_face_coverage_seconds: 15.0,
            sliding_window: false,
            min_pulse_seconds: 5.0,
            max_no_face_seconds: Some(5.0),
            default_fps: 30.0,
            band_min_hz: 0.7,
            band_max_hz: 3.5,
            filter_order: 4,
            min_snr: 1.5,
            min_bpm: 40.0,
            max_bpm: 200.0,
            max_bpm_jump: 20.0,
            gap_fill: true,
            background_estimation: false,
        }
    }

    /// Preset for webcam monitoring
    pub fn live() -> Self {
        Self {
            mode: CaptureMode::Live,
            min_acceptable_duration_seconds: 10.0,
            min_face_coverage_seconds: 10.0,
            sliding_window: true,
            min_pulse_seconds: 10.0,
            max_no_face_seconds: None,
            ..Self::offline()
        }
    }

    /// Preset matching `mode`
    pub fn for_mode(mode: CaptureMode) -> Self {
        match mode {
            CaptureMode::Offline => Self::offline(),
            CaptureMode::Live => Self::live(),
        }
    }

    /// Parse a TOML document. Keys absent from the document take the value
    /// of the preset named by its `mode` key (offline when absent).
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = text.parse()?;
        let mode = match table.get("mode") {
            Some(value) => value.clone().try_into::<CaptureMode>()?,
            None => CaptureMode::Offline,
        };

        let preset = Self::for_mode(mode);
        // Unset optionals are not rendered, so they must be restored by hand
        let keeps_optional = table.contains_key("max_no_face_seconds");

        let mut merged = toml::Table::try_from(&preset)?;
        for (key, value) in table {
            merged.insert(key, value);
        }

        let mut config: Self = merged.try_into()?;
        if !keeps_optional {
            config.max_no_face_seconds = preset.max_no_face_seconds;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("duration_seconds", self.duration_seconds),
            ("default_fps", self.default_fps),
            ("min_pulse_seconds", self.min_pulse_seconds),
            ("min_snr", self.min_snr),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Validation(format!("{name} must be > 0, got {value}")));
            }
        }

        let non_negative = [
            ("min_acceptable_duration_seconds", self.min_acceptable_duration_seconds),
            ("min_face_coverage_seconds", self.min_face_coverage_seconds),
            ("max_bpm_jump", self.max_bpm_jump),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Validation(format!("{name} must be >= 0, got {value}")));
            }
        }

        if let Some(limit) = self.max_no_face_seconds {
            if !(limit.is_finite() && limit > 0.0) {
                return Err(ConfigError::Validation(format!(
                    "max_no_face_seconds must be > 0 when set, got {limit}"
                )));
            }
        }

        if !(self.band_min_hz > 0.0 && self.band_min_hz < self.band_max_hz) {
            return Err(ConfigError::Validation(format!(
                "band must satisfy 0 < band_min_hz < band_max_hz, got [{}, {}]",
                self.band_min_hz, self.band_max_hz
            )));
        }

        // The upper corner must stay below Nyquist for the slowest rate we accept
        if self.band_max_hz >= self.default_fps / 2.0 {
            return Err(ConfigError::Validation(format!(
                "band_max_hz ({}) must be below Nyquist of default_fps ({})",
                self.band_max_hz, self.default_fps
            )));
        }

        if self.filter_order == 0 || self.filter_order > 10 {
            return Err(ConfigError::Validation(format!(
                "filter_order must be in 1..=10, got {}",
                self.filter_order
            )));
        }

        if !(self.min_bpm > 0.0 && self.min_bpm < self.max_bpm) {
            return Err(ConfigError::Validation(format!(
                "bpm range must satisfy 0 < min_bpm < max_bpm, got [{}, {}]",
                self.min_bpm, self.max_bpm
            )));
        }

        Ok(())
    }

    /// Number of samples covering `seconds` at `fps` (rounded up)
    pub fn samples_for(seconds: f64, fps: f64) -> usize {
        (seconds * fps).ceil().max(0.0) as usize
    }

    /// Sliding-window capacity in samples, `None` for an unbounded buffer
    pub fn window_capacity(&self, fps: f64) -> Option<usize> {
        if self.sliding_window {
            Some(((self.duration_seconds * fps).round() as usize).max(1))
        } else {
            None
        }
    }
}
