//! Remote Photoplethysmography (rPPG) module
//!
//! Turns the buffered forehead colors into a one-dimensional pulse signal.
//!
//! - `PosExtractor` - POS chrominance projection with a minimum window
//! - `PulseSignal` - immutable pulse series handed to the spectral estimator

mod pos;

pub use pos::{pos_projection, PosExtractor, PulseSignal, POS_EPSILON};
