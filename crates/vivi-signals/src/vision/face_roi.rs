//! Face Detection Trait and Forehead ROI Extraction
//!
//! Provides the pluggable face detection interface, largest-face selection
//! and the fixed forehead sub-region sampled every frame.

use super::image_ops::{Frame, Rect};

/// Forehead offset from the face top, as a fraction of face height
pub const FOREHEAD_TOP: f64 = 0.20;
/// Forehead height, as a fraction of face height
pub const FOREHEAD_HEIGHT: f64 = 0.15;
/// Forehead offset from the face left edge, as a fraction of face width
pub const FOREHEAD_LEFT: f64 = 0.30;
/// Forehead width, as a fraction of face width
pub const FOREHEAD_WIDTH: f64 = 0.40;
/// A ROI must exceed this many pixels in both dimensions
pub const MIN_ROI_PIXELS: u32 = 10;

/// Face candidate in frame coordinates. Detectors may report boxes that
/// extend past the frame edge, hence signed origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// Detector score, informational only
    pub confidence: f32,
}

impl FaceRegion {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height, confidence: 1.0 }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Forehead rectangle clamped to the frame, or `None` when what remains
    /// is not larger than [`MIN_ROI_PIXELS`] in both dimensions.
    pub fn forehead_roi(&self, frame_width: u32, frame_height: u32) -> Option<Rect> {
        let h = self.height as f64;
        let w = self.width as f64;

        let top = self.y as i64 + (h * FOREHEAD_TOP) as i64;
        let left = self.x as i64 + (w * FOREHEAD_LEFT) as i64;
        let bottom = top + (h * FOREHEAD_HEIGHT) as i64;
        let right = left + (w * FOREHEAD_WIDTH) as i64;

        let x0 = left.clamp(0, frame_width as i64);
        let x1 = right.clamp(0, frame_width as i64);
        let y0 = top.clamp(0, frame_height as i64);
        let y1 = bottom.clamp(0, frame_height as i64);

        let roi_w = (x1 - x0).max(0) as u32;
        let roi_h = (y1 - y0).max(0) as u32;
        if roi_w <= MIN_ROI_PIXELS || roi_h <= MIN_ROI_PIXELS {
            return None;
        }

        Some(Rect::new(x0 as u32, y0 as u32, roi_w, roi_h))
    }
}

/// Pluggable face detection trait
///
/// Input is a row-major single-channel intensity image; output is every
/// face candidate found (possibly none). Implementations:
/// - [`FixedRegionDetector`] for externally tracked faces
/// - `SeetaFaceDetector` (feature `seetaface`)
pub trait FaceDetector: Send {
    fn detect(&mut self, gray: &[u8], width: u32, height: u32) -> Vec<FaceRegion>;
}

impl<D: FaceDetector + ?Sized> FaceDetector for Box<D> {
    fn detect(&mut self, gray: &[u8], width: u32, height: u32) -> Vec<FaceRegion> {
        (**self).detect(gray, width, height)
    }
}

/// Detector that always reports one caller-supplied face box
///
/// Use this when face tracking happens outside the engine (a mobile SDK,
/// a fixed kiosk camera) and only the ROI sampling is needed.
#[derive(Debug, Clone)]
pub struct FixedRegionDetector {
    region: FaceRegion,
}

impl FixedRegionDetector {
    pub fn new(region: FaceRegion) -> Self {
        Self { region }
    }
}

impl FaceDetector for FixedRegionDetector {
    fn detect(&mut self, _gray: &[u8], _width: u32, _height: u32) -> Vec<FaceRegion> {
        vec![self.region]
    }
}

/// Largest candidate by area; the first one wins a tie
pub fn largest_face(candidates: &[FaceRegion]) -> Option<FaceRegion> {
    candidates.iter().fold(None, |best: Option<FaceRegion>, face| match best {
        Some(b) if b.area() >= face.area() => Some(b),
        _ => Some(*face),
    })
}

/// Outcome of locating the forehead in one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiObservation {
    pub face: Option<FaceRegion>,
    pub roi: Option<Rect>,
    /// Mean color over `roi` when it was usable
    pub mean_rgb: Option<[f64; 3]>,
}

/// Detect the largest face and sample its forehead
pub fn locate_forehead<D: FaceDetector + ?Sized>(frame: &Frame, detector: &mut D) -> RoiObservation {
    let gray = frame.to_grayscale();
    let face = largest_face(&detector.detect(&gray, frame.width, frame.height));

    let roi = face.and_then(|f| f.forehead_roi(frame.width, frame.height));
    let mean_rgb = roi.and_then(|r| frame.roi_mean_rgb(r));

    RoiObservation { face, roi, mean_rgb }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ListDetector(Vec<FaceRegion>);

    impl FaceDetector for ListDetector {
        fn detect(&mut self, _gray: &[u8], _width: u32, _height: u32) -> Vec<FaceRegion> {
            self.0.clone()
        }
    }

    #[test]
    fn test_forehead_fractions() {
        let face = FaceRegion::new(100, 50, 200, 200);
        let roi = face.forehead_roi(640, 480).unwrap();
        assert_eq!(roi, Rect::new(160, 90, 80, 30));
    }

    #[test]
    fn test_forehead_truncates_like_integer_slicing() {
        // 0.15 * 75 = 11.25 -> 11 rows, 0.4 * 75 = 30
        let face = FaceRegion::new(0, 0, 75, 75);
        let roi = face.forehead_roi(100, 100).unwrap();
        assert_eq!(roi, Rect::new(22, 15, 30, 11));
    }

    #[test]
    fn test_small_face_has_no_usable_roi() {
        // 0.15 * 64 = 9 rows, not above the minimum
        let face = FaceRegion::new(0, 0, 64, 64);
        assert!(face.forehead_roi(640, 480).is_none());
    }

    #[test]
    fn test_roi_clamped_to_frame() {
        // Face hanging off the right edge: ROI is cut at the border
        let face = FaceRegion::new(560, 0, 200, 200);
        let roi = face.forehead_roi(640, 480).unwrap();
        assert_eq!(roi.x, 620);
        assert_eq!(roi.width, 20);

        // Cut so far that fewer than the minimum columns remain
        let face = FaceRegion::new(575, 0, 200, 200);
        assert!(face.forehead_roi(640, 480).is_none());

        // Entirely outside
        let face = FaceRegion::new(-400, -400, 200, 200);
        assert!(face.forehead_roi(640, 480).is_none());
    }

    #[test]
    fn test_largest_face_selection() {
        let small = FaceRegion::new(0, 0, 50, 50);
        let big = FaceRegion::new(100, 100, 120, 120);
        let also_big = FaceRegion::new(300, 100, 120, 120);

        assert_eq!(largest_face(&[]), None);
        assert_eq!(largest_face(&[small, big, also_big]), Some(big));
        assert_eq!(largest_face(&[also_big, small, big]), Some(also_big));
    }

    #[test]
    fn test_locate_forehead_samples_roi_color() {
        let mut frame = Frame::filled(200, 200, [10, 10, 10]);
        for y in 24..42 {
            for x in 36..84 {
                frame.set_pixel(x, y, [200, 100, 50]);
            }
        }

        let mut detector = ListDetector(vec![FaceRegion::new(0, 0, 40, 40), FaceRegion::new(0, 0, 120, 120)]);
        let obs = locate_forehead(&frame, &mut detector);

        assert_eq!(obs.face, Some(FaceRegion::new(0, 0, 120, 120)));
        assert_eq!(obs.roi, Some(Rect::new(36, 24, 48, 18)));
        let rgb = obs.mean_rgb.unwrap();
        assert!((rgb[0] - 200.0).abs() < 1e-9);
        assert!((rgb[2] - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_locate_forehead_without_face() {
        let frame = Frame::filled(100, 100, [0, 0, 0]);
        let obs = locate_forehead(&frame, &mut ListDetector(Vec::new()));
        assert!(obs.face.is_none());
        assert!(obs.mean_rgb.is_none());
    }

    #[test]
    fn test_fixed_region_detector() {
        let region = FaceRegion::new(5, 5, 100, 100);
        let mut detector = FixedRegionDetector::new(region);
        assert_eq!(detector.detect(&[], 0, 0), vec![region]);
    }
}
