//! Butterworth band-pass design as second-order sections
//!
//! Design path: analog low-pass prototype poles, low-pass to band-pass
//! transform at prewarped corners, bilinear transform. Every band-pass
//! section gets the numerator `1 - z^-2` (one zero at DC, one at Nyquist)
//! and a denominator built from one conjugate pole pair. Overall gain is set
//! so the response is exactly 1 at the band center.

use ndarray::Array1;
use num_complex::Complex64;
use std::f64::consts::PI;

/// Bilinear transform constant (2 * fs with fs normalized to 2)
const BILINEAR_K: f64 = 4.0;

/// Poles with a smaller imaginary part are treated as real
const REAL_POLE_TOLERANCE: f64 = 1e-12;

/// One biquad: `b0 + b1 z^-1 + b2 z^-2` over `1 + a1 z^-1 + a2 z^-2`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SosSection {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

impl SosSection {
    fn response(&self, z_inv: Complex64) -> Complex64 {
        let z_inv2 = z_inv * z_inv;
        let num = self.b[0] + z_inv * self.b[1] + z_inv2 * self.b[2];
        let den = self.a[0] + z_inv * self.a[1] + z_inv2 * self.a[2];
        num / den
    }
}

/// Digital Butterworth band-pass filter
#[derive(Debug, Clone, PartialEq)]
pub struct ButterworthBandpass {
    sections: Vec<SosSection>,
    sample_rate: f64,
}

impl ButterworthBandpass {
    /// Design an order-`order` band-pass between `low_hz` and `high_hz`
    ///
    /// Returns `None` unless `0 < low_hz < high_hz < sample_rate / 2` and
    /// `order > 0`.
    pub fn design(order: usize, low_hz: f64, high_hz: f64, sample_rate: f64) -> Option<Self> {
        let nyquist = sample_rate / 2.0;
        let valid = order > 0
            && sample_rate.is_finite()
            && low_hz > 0.0
            && low_hz < high_hz
            && high_hz < nyquist;
        if !valid {
            return None;
        }

        // Prewarp corners (normalized to Nyquist) for the bilinear transform
        let w1 = BILINEAR_K * (PI * (low_hz / nyquist) / 2.0).tan();
        let w2 = BILINEAR_K * (PI * (high_hz / nyquist) / 2.0).tan();
        let bw = w2 - w1;
        let wo = (w1 * w2).sqrt();

        let mut z_poles = Vec::with_capacity(2 * order);
        for p in prototype_poles(order) {
            let p_lp = p * (bw / 2.0);
            let disc = (p_lp * p_lp - wo * wo).sqrt();
            for s in [p_lp + disc, p_lp - disc] {
                z_poles.push((BILINEAR_K + s) / (BILINEAR_K - s));
            }
        }

        let mut sections = pair_poles(&z_poles)
            .into_iter()
            .map(|a| SosSection { b: [1.0, 0.0, -1.0], a })
            .collect::<Vec<_>>();

        // Unit gain at the digital image of the analog center frequency
        let center = 2.0 * (wo / BILINEAR_K).atan();
        let z_inv = Complex64::from_polar(1.0, -center);
        let h = sections
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, s| acc * s.response(z_inv));
        let gain = 1.0 / h.norm();
        if !gain.is_finite() {
            return None;
        }
        for coef in sections[0].b.iter_mut() {
            *coef *= gain;
        }

        Some(Self { sections, sample_rate })
    }

    pub fn sections(&self) -> &[SosSection] {
        &self.sections
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Magnitude response at `freq_hz`
    pub fn magnitude_at(&self, freq_hz: f64) -> f64 {
        let omega = 2.0 * PI * freq_hz / self.sample_rate;
        let z_inv = Complex64::from_polar(1.0, -omega);
        self.sections
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, s| acc * s.response(z_inv))
            .norm()
    }

    /// Run the cascade over `signal` from zero initial state
    ///
    /// Each section is a direct form II transposed biquad.
    pub fn filter(&self, signal: &Array1<f64>) -> Array1<f64> {
        let mut out = signal.clone();
        for section in &self.sections {
            let [b0, b1, b2] = section.b;
            let [_, a1, a2] = section.a;
            let (mut z1, mut z2) = (0.0, 0.0);
            for v in out.iter_mut() {
                let x = *v;
                let y = b0 * x + z1;
                z1 = b1 * x - a1 * y + z2;
                z2 = b2 * x - a2 * y;
                *v = y;
            }
        }
        out
    }
}

/// Analog Butterworth low-pass prototype poles (unit cutoff)
fn prototype_poles(order: usize) -> Vec<Complex64> {
    let n = order as i64;
    (-n + 1..n)
        .step_by(2)
        .map(|m| -Complex64::from_polar(1.0, PI * m as f64 / (2.0 * order as f64)))
        .collect()
}

/// Denominators `[1, a1, a2]` from conjugate pairs, then from real poles
/// taken two at a time
fn pair_poles(poles: &[Complex64]) -> Vec<[f64; 3]> {
    let mut denominators = Vec::with_capacity(poles.len() / 2);
    let mut real = Vec::new();

    for p in poles {
        if p.im > REAL_POLE_TOLERANCE {
            denominators.push([1.0, -2.0 * p.re, p.norm_sqr()]);
        } else if p.im.abs() <= REAL_POLE_TOLERANCE {
            real.push(p.re);
        }
    }

    real.sort_by(|a, b| a.total_cmp(b));
    for pair in real.chunks(2) {
        match *pair {
            [p1, p2] => denominators.push([1.0, -(p1 + p2), p1 * p2]),
            [p] => denominators.push([1.0, -p, 0.0]),
            _ => {}
        }
    }

    denominators
}
