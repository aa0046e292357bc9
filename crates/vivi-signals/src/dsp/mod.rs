//! DSP (Digital Signal Processing) module
//!
//! Signal processing for the pulse signal:
//! - `ButterworthBandpass` - second-order-sections band-pass design and filtering
//! - `SpectralEstimator` - detrend + FFT peak search with SNR gating
//! - `QualityLabel` - SNR-derived quality tier

mod butterworth;
mod spectrum;

pub use butterworth::{ButterworthBandpass, SosSection};
pub use spectrum::{
    confidence_from_snr, detrend_linear, magnitude_spectrum, QualityLabel, SpectralEstimator, SpectrumEstimate,
};
