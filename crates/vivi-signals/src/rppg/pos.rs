//! POS (Plane-Orthogonal-to-Skin) pulse extraction
//!
//! Wang et al. (2017): "Algorithmic Principles of Remote PPG"
//!
//! The projection is computed over the whole window at once: the mixing
//! weight α depends on the global spread of both chrominance components,
//! so the pulse cannot be produced sample by sample.

use ndarray::Array1;

use crate::buffer::RgbSeries;
use crate::config::MeasurementConfig;
use crate::measurement::Rejection;

/// Added to standard deviations before dividing
pub const POS_EPSILON: f64 = 1e-10;

/// Relative spread below which a channel counts as constant
const FLAT_CHANNEL_TOLERANCE: f64 = 1e-9;

/// One-dimensional blood-volume pulse sampled at `fps`
///
/// Immutable once extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct PulseSignal {
    values: Array1<f64>,
    fps: f64,
}

impl PulseSignal {
    pub fn new(values: Array1<f64>, fps: f64) -> Self {
        Self { values, fps }
    }

    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.fps > 0.0 {
            self.values.len() as f64 / self.fps
        } else {
            0.0
        }
    }
}

/// POS pulse extractor with a minimum window length
#[derive(Debug, Clone, Copy)]
pub struct PosExtractor {
    min_samples: usize,
}

impl PosExtractor {
    /// `min_samples` is raised to 2, the shortest series with a spread
    pub fn new(min_samples: usize) -> Self {
        Self { min_samples: min_samples.max(2) }
    }

    /// Minimum derived from `min_pulse_seconds` at the session frame rate
    pub fn from_config(config: &MeasurementConfig, fps: f64) -> Self {
        Self::new(MeasurementConfig::samples_for(config.min_pulse_seconds, fps))
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Project an RGB series onto the pulse plane
    ///
    /// Rejects with [`Rejection::InputTooShort`] when the series holds fewer
    /// than `min_samples` samples.
    pub fn extract(&self, series: &RgbSeries, fps: f64) -> Result<PulseSignal, Rejection> {
        self.check_length(series.len(), fps)?;
        Ok(PulseSignal::new(pos_projection(&series.r, &series.g, &series.b), fps))
    }

    /// [`Rejection::InputTooShort`] unless `samples` reaches `min_samples`
    ///
    /// Callers that interpolate gaps pass the measured sample count here,
    /// not the length of the filled series.
    pub fn check_length(&self, samples: usize, fps: f64) -> Result<(), Rejection> {
        if samples >= self.min_samples {
            return Ok(());
        }
        let per_second = if fps > 0.0 { fps } else { 1.0 };
        Err(Rejection::InputTooShort {
            required_seconds: self.min_samples as f64 / per_second,
            actual_seconds: samples as f64 / per_second,
        })
    }
}

/// Raw POS projection: z-score each channel, then `X - αY`
pub fn pos_projection(r: &Array1<f64>, g: &Array1<f64>, b: &Array1<f64>) -> Array1<f64> {
    let rn = z_score(r);
    let gn = z_score(g);
    let bn = z_score(b);

    // Chrominance components orthogonal to the skin-tone direction
    let x = &rn - &gn;
    let y = &rn + &gn - 2.0 * &bn;

    let alpha = population_std(&x) / (population_std(&y) + POS_EPSILON);
    x - alpha * y
}

/// Zero-mean, unit-variance copy of a channel
///
/// A channel whose spread is at the level of accumulated rounding error is
/// treated as exactly flat and normalizes to zeros.
fn z_score(channel: &Array1<f64>) -> Array1<f64> {
    let mean = channel.mean().unwrap_or(0.0);
    let std = population_std(channel);
    if std <= FLAT_CHANNEL_TOLERANCE * mean.abs().max(1.0) {
        return Array1::zeros(channel.len());
    }
    channel.mapv(|v| (v - mean) / (std + POS_EPSILON))
}

fn population_std(arr: &Array1<f64>) -> f64 {
    if arr.is_empty() {
        return 0.0;
    }
    arr.std(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn series(n: usize, f: impl Fn(usize) -> [f64; 3]) -> RgbSeries {
        let samples: Vec<[f64; 3]> = (0..n).map(f).collect();
        RgbSeries::from_rgb(&samples)
    }

    #[test]
    fn test_rejects_short_series() {
        let extractor = PosExtractor::new(150);
        let s = series(100, |_| [1.0, 2.0, 3.0]);
        match extractor.extract(&s, 30.0) {
            Err(Rejection::InputTooShort { required_seconds, actual_seconds }) => {
                assert_relative_eq!(required_seconds, 5.0);
                assert_relative_eq!(actual_seconds, 100.0 / 30.0);
            }
            other => panic!("expected InputTooShort, got {other:?}"),
        }
    }

    #[test]
    fn test_pulse_has_input_length() {
        let s = series(300, |i| {
            let t = i as f64 / 30.0;
            [180.0 + (2.0 * PI * t).sin(), 120.0 + 2.0 * (2.0 * PI * t).sin(), 100.0]
        });
        let pulse = PosExtractor::new(150).extract(&s, 30.0).unwrap();
        assert_eq!(pulse.len(), 300);
        assert_relative_eq!(pulse.duration_seconds(), 10.0);
        assert_eq!(pulse.fps(), 30.0);
    }

    #[test]
    fn test_constant_input_gives_zero_pulse() {
        let s = series(200, |_| [180.3, 120.7, 99.9]);
        let pulse = PosExtractor::new(10).extract(&s, 30.0).unwrap();
        assert!(pulse.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_common_illumination_change_is_removed() {
        // Identical intensity change on all channels: X and Y cancel after z-scoring
        let s = series(300, |i| {
            let light = (i as f64 * 0.05).sin() * 10.0;
            [150.0 + light, 150.0 + light, 150.0 + light]
        });
        let pulse = pos_projection(&s.r, &s.g, &s.b);
        for v in pulse.iter() {
            assert_relative_eq!(*v, 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_pulse_follows_green_variation() {
        let s = series(300, |i| {
            let t = i as f64 / 30.0;
            [180.0, 120.0 + (2.0 * PI * 1.2 * t).sin(), 100.0]
        });
        let pulse = pos_projection(&s.r, &s.g, &s.b);

        // Pulse is a scaled copy of the green z-score: perfectly correlated
        let g = z_score(&s.g);
        let corr = (&pulse * &g).sum() / (population_std(&pulse) * population_std(&g) * 300.0);
        assert_relative_eq!(corr.abs(), 1.0, epsilon = 1e-6);
    }
}
