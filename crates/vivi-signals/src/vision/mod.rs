//! Vision module: frames, frame sources, face detection and forehead ROI
//!
//! This module provides:
//! - `Frame` for interleaved RGB8 images
//! - `FrameSource` for anything that yields frames in order
//! - `FaceDetector` trait for pluggable face detection backends
//! - Forehead ROI selection and mean-color sampling
//!
//! # Features
//!
//! - `image-processing`: still-image sequences through the `image` crate
//! - `seetaface`: learned frontal-face detector through `rustface`
//!
//! # Example
//!
//! ```ignore
//! use vivi_signals::vision::{locate_forehead, FaceRegion, FixedRegionDetector, Frame};
//!
//! let mut detector = FixedRegionDetector::new(FaceRegion::new(100, 50, 200, 200));
//! let obs = locate_forehead(&frame, &mut detector);
//! if let Some([r, g, b]) = obs.mean_rgb {
//!     println!("forehead color: {r:.1} {g:.1} {b:.1}");
//! }
//! ```

mod face_roi;
mod image_ops;
#[cfg(feature = "seetaface")]
mod seeta;
mod source;

// Face detection and ROI extraction
pub use face_roi::{
    largest_face, locate_forehead, FaceDetector, FaceRegion, FixedRegionDetector, RoiObservation,
    FOREHEAD_HEIGHT, FOREHEAD_LEFT, FOREHEAD_TOP, FOREHEAD_WIDTH, MIN_ROI_PIXELS,
};
#[cfg(feature = "seetaface")]
pub use seeta::{SeetaConfig, SeetaFaceDetector};

// Frames and sources
pub use image_ops::{Frame, Rect};
#[cfg(feature = "image-processing")]
pub use source::ImageSequenceSource;
pub use source::{FrameSource, RawVideoSource, SyntheticClip, SyntheticPulseSource};
