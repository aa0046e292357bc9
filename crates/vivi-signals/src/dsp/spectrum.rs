//! Spectral heart-rate estimation
//!
//! Band-pass, detrend, FFT magnitude, then the strongest bin inside the
//! heart-rate band. SNR is the peak magnitude over the mean magnitude of
//! the searched band.

use ndarray::Array1;
use num_complex::Complex64;
use rustfft::FftPlanner;
use serde::Serialize;

use super::butterworth::ButterworthBandpass;
use crate::config::MeasurementConfig;
use crate::measurement::Rejection;
use crate::rppg::PulseSignal;

/// Mean band magnitude at or below this counts as an empty spectrum
const SILENT_SPECTRUM: f64 = 1e-12;

/// Quality label from SNR; variants are ordered worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum QualityLabel {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl QualityLabel {
    /// SNR > 3 Excellent, > 2 Good, > 1.5 Fair, otherwise Poor
    pub fn from_snr(snr: f64) -> Self {
        if snr > 3.0 {
            Self::Excellent
        } else if snr > 2.0 {
            Self::Good
        } else if snr > 1.5 {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Poor => "Poor",
            Self::Fair => "Fair",
            Self::Good => "Good",
            Self::Excellent => "Excellent",
        }
    }
}

impl std::fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence in percent: SNR 3 and above maps to 100
pub fn confidence_from_snr(snr: f64) -> f64 {
    (snr / 3.0 * 100.0).min(100.0)
}

/// Result of one spectral estimation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpectrumEstimate {
    /// Dominant frequency (Hz)
    pub frequency_hz: f64,
    pub peak_magnitude: f64,
    /// Mean magnitude over the searched band
    pub mean_magnitude: f64,
    pub bpm: f64,
    pub snr: f64,
    pub quality: QualityLabel,
    /// Percent, 0-100
    pub confidence: f64,
}

/// Remove the least-squares line through `signal`
pub fn detrend_linear(signal: &Array1<f64>) -> Array1<f64> {
    let n = signal.len();
    if n < 2 {
        return Array1::zeros(n);
    }

    let nf = n as f64;
    let t_mean = (nf - 1.0) / 2.0;
    let y_mean = signal.mean().unwrap_or(0.0);

    let mut cov = 0.0;
    let mut var = 0.0;
    for (i, y) in signal.iter().enumerate() {
        let dt = i as f64 - t_mean;
        cov += dt * (y - y_mean);
        var += dt * dt;
    }
    let slope = cov / var;

    Array1::from_iter(
        signal
            .iter()
            .enumerate()
            .map(|(i, y)| y - (y_mean + slope * (i as f64 - t_mean))),
    )
}

/// One-sided FFT magnitude spectrum
///
/// # Returns
/// `(frequencies_hz, magnitudes)` for bins `0..=n/2`
pub fn magnitude_spectrum(signal: &Array1<f64>, sample_rate: f64) -> (Array1<f64>, Array1<f64>) {
    let n = signal.len();
    if n == 0 {
        return (Array1::zeros(0), Array1::zeros(0));
    }

    let mut buffer: Vec<Complex64> = signal.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut buffer);

    let bins = n / 2 + 1;
    let bin_hz = sample_rate / n as f64;
    let freqs = Array1::from_iter((0..bins).map(|k| k as f64 * bin_hz));
    let mags = Array1::from_iter(buffer.iter().take(bins).map(|c| c.norm()));
    (freqs, mags)
}

/// Band-pass + FFT peak picker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralEstimator {
    pub band_min_hz: f64,
    pub band_max_hz: f64,
    pub filter_order: usize,
    pub min_snr: f64,
}

impl Default for SpectralEstimator {
    fn default() -> Self {
        Self {
            band_min_hz: 0.7,
            band_max_hz: 3.5,
            filter_order: 4,
            min_snr: 1.5,
        }
    }
}

impl SpectralEstimator {
    pub fn from_config(config: &MeasurementConfig) -> Self {
        Self {
            band_min_hz: config.band_min_hz,
            band_max_hz: config.band_max_hz,
            filter_order: config.filter_order,
            min_snr: config.min_snr,
        }
    }

    /// Estimate the dominant pulse frequency
    ///
    /// Rejects with `NoValidSpectralData` when the band holds no bins, the
    /// filter cannot be designed at this frame rate, or the band is silent;
    /// with `WeakSignal` when the peak is not `min_snr` times the mean.
    pub fn estimate(&self, pulse: &PulseSignal) -> Result<SpectrumEstimate, Rejection> {
        let fs = pulse.fps();
        if pulse.len() < 2 {
            return Err(Rejection::NoValidSpectralData);
        }

        let filter = ButterworthBandpass::design(self.filter_order, self.band_min_hz, self.band_max_hz, fs)
            .ok_or(Rejection::NoValidSpectralData)?;
        let filtered = filter.filter(pulse.values());
        let detrended = detrend_linear(&filtered);
        let (freqs, mags) = magnitude_spectrum(&detrended, fs);

        let mut peak: Option<(f64, f64)> = None;
        let mut sum = 0.0;
        let mut count = 0usize;
        for (&f, &m) in freqs.iter().zip(mags.iter()) {
            if f < self.band_min_hz || f > self.band_max_hz {
                continue;
            }
            sum += m;
            count += 1;
            match peak {
                Some((_, best)) if best >= m => {}
                _ => peak = Some((f, m)),
            }
        }

        let Some((frequency_hz, peak_magnitude)) = peak else {
            return Err(Rejection::NoValidSpectralData);
        };
        let mean_magnitude = sum / count as f64;
        if !mean_magnitude.is_finite() || mean_magnitude <= SILENT_SPECTRUM {
            return Err(Rejection::NoValidSpectralData);
        }

        let snr = peak_magnitude / mean_magnitude;
        if peak_magnitude < self.min_snr * mean_magnitude {
            return Err(Rejection::WeakSignal { snr, min_snr: self.min_snr });
        }

        Ok(SpectrumEstimate {
            frequency_hz,
            peak_magnitude,
            mean_magnitude,
            bpm: frequency_hz * 60.0,
            snr,
            quality: QualityLabel::from_snr(snr),
            confidence: confidence_from_snr(snr),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::PI;

    fn sinusoid_with_noise(freq: f64, amplitude: f64, noise: f64, n: usize, fs: f64, seed: u64) -> PulseSignal {
        let mut rng = StdRng::seed_from_u64(seed);
        let values = Array1::from_iter((0..n).map(|i| {
            let t = i as f64 / fs;
            amplitude * (2.0 * PI * freq * t).sin() + noise * rng.gen_range(-1.0..1.0)
        }));
        PulseSignal::new(values, fs)
    }

    #[test]
    fn test_quality_thresholds() {
        assert_eq!(QualityLabel::from_snr(3.01), QualityLabel::Excellent);
        assert_eq!(QualityLabel::from_snr(3.0), QualityLabel::Good);
        assert_eq!(QualityLabel::from_snr(2.0), QualityLabel::Fair);
        assert_eq!(QualityLabel::from_snr(1.5), QualityLabel::Poor);
        assert!(QualityLabel::Excellent > QualityLabel::Good);
        assert!(QualityLabel::Fair > QualityLabel::Poor);
    }

    #[test]
    fn test_confidence() {
        assert_relative_eq!(confidence_from_snr(1.5), 50.0);
        assert_relative_eq!(confidence_from_snr(6.0), 100.0);
    }

    #[test]
    fn test_detrend_removes_line() {
        let signal = Array1::from_iter((0..50).map(|i| 3.0 + 0.5 * i as f64));
        let out = detrend_linear(&signal);
        for v in out.iter() {
            assert_relative_eq!(*v, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_magnitude_spectrum_bins() {
        let fs = 30.0;
        let signal = Array1::from_iter((0..300).map(|i| (2.0 * PI * 1.5 * i as f64 / fs).cos()));
        let (freqs, mags) = magnitude_spectrum(&signal, fs);
        assert_eq!(freqs.len(), 151);
        assert_relative_eq!(freqs[15], 1.5);
        // A bin-centered cosine puts n/2 in its bin
        assert_relative_eq!(mags[15], 150.0, epsilon = 1e-6);
    }

    #[test]
    fn test_recovers_injected_frequency() {
        for (freq, seed) in [(1.0, 1), (1.2, 2), (1.75, 3), (2.5, 4)] {
            let pulse = sinusoid_with_noise(freq, 1.0, 0.5, 900, 30.0, seed);
            let est = SpectralEstimator::default().estimate(&pulse).unwrap();
            assert!((est.bpm - freq * 60.0).abs() <= 2.0, "{freq} Hz -> {} BPM", est.bpm);
            assert!(est.snr > 1.5);
        }
    }

    #[test]
    fn test_flat_spectrum_is_weak() {
        // Single impulse: flat magnitude spectrum before filtering
        let mut values = Array1::zeros(900);
        values[450] = 1.0;
        let result = SpectralEstimator::default().estimate(&PulseSignal::new(values, 30.0));
        match result {
            Err(Rejection::WeakSignal { snr, min_snr }) => {
                assert!(snr < 1.5, "snr = {snr}");
                assert_eq!(min_snr, 1.5);
            }
            other => panic!("expected WeakSignal, got {other:?}"),
        }
    }

    #[test]
    fn test_noise_only_stays_above_weak_threshold() {
        // Peak over band mean: the largest of ~80 noise bins sits well above
        // their mean, so broadband noise alone is not rejected as weak
        let estimator = SpectralEstimator::default();
        for seed in 0..10 {
            let noise = sinusoid_with_noise(1.2, 0.0, 1.0, 900, 30.0, seed);
            let est = estimator.estimate(&noise).unwrap();
            assert!(est.snr >= estimator.min_snr, "seed {seed}: snr = {}", est.snr);
            assert!(est.snr < 10.0, "seed {seed}: snr = {}", est.snr);
        }
    }

    #[test]
    fn test_pulse_in_noise_scores_far_above_noise_alone() {
        let estimator = SpectralEstimator::default();
        for seed in 0..5 {
            let noise = estimator.estimate(&sinusoid_with_noise(1.2, 0.0, 0.5, 900, 30.0, seed)).unwrap();
            let pulse = estimator.estimate(&sinusoid_with_noise(1.2, 1.0, 0.5, 900, 30.0, seed)).unwrap();
            assert!(pulse.snr > 10.0, "seed {seed}: snr = {}", pulse.snr);
            assert!(pulse.snr > 2.0 * noise.snr);
            assert_eq!(pulse.quality, QualityLabel::Excellent);
        }
    }

    #[test]
    fn test_silent_signal_has_no_spectral_data() {
        let pulse = PulseSignal::new(Array1::zeros(900), 30.0);
        assert_eq!(SpectralEstimator::default().estimate(&pulse), Err(Rejection::NoValidSpectralData));
    }

    #[test]
    fn test_band_without_bins_has_no_spectral_data() {
        // 4 samples at 30 fps: bins at 0, 7.5, 15 Hz
        let pulse = PulseSignal::new(Array1::from(vec![0.0, 1.0, 0.0, -1.0]), 30.0);
        assert_eq!(SpectralEstimator::default().estimate(&pulse), Err(Rejection::NoValidSpectralData));
    }

    #[test]
    fn test_low_frame_rate_has_no_spectral_data() {
        let pulse = sinusoid_with_noise(1.0, 1.0, 0.0, 60, 6.0, 0);
        assert_eq!(SpectralEstimator::default().estimate(&pulse), Err(Rejection::NoValidSpectralData));
    }

    #[test]
    fn test_estimate_is_idempotent() {
        let pulse = sinusoid_with_noise(1.3, 1.0, 0.8, 600, 30.0, 11);
        let estimator = SpectralEstimator::default();
        assert_eq!(estimator.estimate(&pulse), estimator.estimate(&pulse));
    }

    proptest! {
        #[test]
        fn prop_snr_never_below_one(seed in 0u64..1000, amplitude in 0.0f64..2.0) {
            // The band peak is one of the bins the mean is taken over
            let pulse = sinusoid_with_noise(1.5, amplitude, 1.0, 300, 30.0, seed);
            match SpectralEstimator::default().estimate(&pulse) {
                Ok(est) => prop_assert!(est.snr >= 1.0),
                Err(Rejection::WeakSignal { snr, .. }) => prop_assert!(snr >= 1.0 - 1e-12),
                Err(other) => prop_assert!(false, "unexpected {:?}", other),
            }
        }

        #[test]
        fn prop_quality_label_monotonic(a in 0.0f64..10.0, b in 0.0f64..10.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(QualityLabel::from_snr(lo) <= QualityLabel::from_snr(hi));
        }

        #[test]
        fn prop_quality_label_matches_thresholds(snr in 0.0f64..10.0) {
            let label = QualityLabel::from_snr(snr);
            let expected = if snr > 3.0 {
                QualityLabel::Excellent
            } else if snr > 2.0 {
                QualityLabel::Good
            } else if snr > 1.5 {
                QualityLabel::Fair
            } else {
                QualityLabel::Poor
            };
            prop_assert_eq!(label, expected);
        }
    }
}
