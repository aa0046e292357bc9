//! SeetaFace detector backed by the `rustface` crate

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::face_roi::{FaceDetector, FaceRegion};
use crate::error::{Result, SignalError};

/// Tuning knobs for the SeetaFace cascade
#[derive(Debug, Clone)]
pub struct SeetaConfig {
    /// Smallest face reported, in pixels (100 for clips, 120 for webcam)
    pub min_face_size: u32,
    pub score_thresh: f64,
    pub pyramid_scale_factor: f32,
    pub slide_window_step: (u32, u32),
}

impl Default for SeetaConfig {
    fn default() -> Self {
        Self {
            min_face_size: 100,
            score_thresh: 2.0,
            pyramid_scale_factor: 0.8,
            slide_window_step: (4, 4),
        }
    }
}

/// Learned frontal-face detector loaded from a SeetaFace model file
pub struct SeetaFaceDetector {
    model: rustface::Model,
    config: SeetaConfig,
}

impl SeetaFaceDetector {
    /// Load `seeta_fd_frontal_v1.0.bin` (or compatible) from disk
    pub fn from_model_file<P: AsRef<Path>>(path: P, config: SeetaConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| SignalError::Detector(format!("cannot open model {}: {e}", path.display())))?;
        let model = rustface::read_model(BufReader::new(file))
            .map_err(|e| SignalError::Detector(format!("cannot parse model {}: {e}", path.display())))?;
        Ok(Self { model, config })
    }
}

impl FaceDetector for SeetaFaceDetector {
    fn detect(&mut self, gray: &[u8], width: u32, height: u32) -> Vec<FaceRegion> {
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(self.config.min_face_size);
        detector.set_score_thresh(self.config.score_thresh);
        detector.set_pyramid_scale_factor(self.config.pyramid_scale_factor);
        let (step_x, step_y) = self.config.slide_window_step;
        detector.set_slide_window_step(step_x, step_y);

        let faces = detector.detect(&rustface::ImageData::new(gray, width, height));

        faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                FaceRegion {
                    x: bbox.x(),
                    y: bbox.y(),
                    width: bbox.width(),
                    height: bbox.height(),
                    confidence: face.score() as f32,
                }
            })
            .collect()
    }
}
