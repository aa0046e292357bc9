//! Frame container and pixel operations
//!
//! Frames are interleaved RGB8, row-major. The `image-processing` feature
//! adds conversion from `image::DynamicImage` for still-frame sources.

#[cfg(feature = "image-processing")]
use image::DynamicImage;

use crate::error::{Result, SignalError};

/// Axis-aligned pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// One decoded video frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw RGB8 pixel data (row-major)
    pub data: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Position of the frame in its stream
    pub index: u64,
    /// Capture timestamp in microseconds
    pub timestamp_us: i64,
}

impl Frame {
    /// Wrap raw RGB8 data, checking it matches the declared geometry
    pub fn new(data: Vec<u8>, width: u32, height: u32, index: u64, timestamp_us: i64) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if width == 0 || height == 0 {
            return Err(SignalError::MalformedFrame(format!(
                "frame {index} has empty geometry {width}x{height}"
            )));
        }
        if data.len() != expected {
            return Err(SignalError::MalformedFrame(format!(
                "frame {index}: {} bytes for {width}x{height} RGB (expected {expected})",
                data.len()
            )));
        }
        Ok(Self { data, width, height, index, timestamp_us })
    }

    /// Frame filled with a single color
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self { data, width, height, index: 0, timestamp_us: 0 }
    }

    /// Get pixel at (x, y) as [R, G, B]
    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        if x >= self.width || y >= self.height {
            return [0, 0, 0];
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    /// Set pixel at (x, y)
    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        self.data[idx..idx + 3].copy_from_slice(&rgb);
    }

    /// Mean RGB over a rectangle. The rectangle must lie inside the frame;
    /// pixels outside are ignored.
    pub fn roi_mean_rgb(&self, roi: Rect) -> Option<[f64; 3]> {
        let x_end = roi.x.saturating_add(roi.width).min(self.width);
        let y_end = roi.y.saturating_add(roi.height).min(self.height);
        if roi.x >= x_end || roi.y >= y_end {
            return None;
        }

        let stride = self.width as usize * 3;
        let mut sum = [0u64; 3];
        for y in roi.y..y_end {
            let row = y as usize * stride;
            let start = row + roi.x as usize * 3;
            let end = row + x_end as usize * 3;
            for px in self.data[start..end].chunks_exact(3) {
                sum[0] += px[0] as u64;
                sum[1] += px[1] as u64;
                sum[2] += px[2] as u64;
            }
        }

        let count = ((x_end - roi.x) as u64 * (y_end - roi.y) as u64) as f64;
        Some([sum[0] as f64 / count, sum[1] as f64 / count, sum[2] as f64 / count])
    }

    /// Single-channel intensity image (ITU-R BT.601 luma, fixed point)
    pub fn to_grayscale(&self) -> Vec<u8> {
        self.data
            .chunks_exact(3)
            .map(|px| ((77 * px[0] as u32 + 150 * px[1] as u32 + 29 * px[2] as u32 + 128) >> 8) as u8)
            .collect()
    }
}

// === Image crate integration (optional) ===

#[cfg(feature = "image-processing")]
impl Frame {
    /// Convert from image crate DynamicImage
    pub fn from_dynamic_image(img: &DynamicImage, index: u64, timestamp_us: i64) -> Self {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        Self {
            data: rgb.into_raw(),
            width,
            height,
            index,
            timestamp_us,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let frame = Frame::new(vec![0u8; 100 * 100 * 3], 100, 100, 3, 100_000).unwrap();
        assert_eq!(frame.width, 100);
        assert_eq!(frame.index, 3);
        assert_eq!(frame.data.len(), 100 * 100 * 3);
    }

    #[test]
    fn test_frame_size_mismatch_is_malformed() {
        let err = Frame::new(vec![0u8; 10], 4, 4, 0, 0).unwrap_err();
        assert!(matches!(err, SignalError::MalformedFrame(_)));
        assert!(Frame::new(Vec::new(), 0, 4, 0, 0).is_err());
    }

    #[test]
    fn test_pixel_operations() {
        let mut frame = Frame::filled(10, 10, [0, 0, 0]);
        frame.set_pixel(5, 5, [255, 128, 64]);
        assert_eq!(frame.get_pixel(5, 5), [255, 128, 64]);
        assert_eq!(frame.get_pixel(50, 5), [0, 0, 0]);
    }

    #[test]
    fn test_roi_mean_rgb() {
        let mut frame = Frame::filled(4, 4, [128, 64, 32]);
        frame.set_pixel(3, 3, [0, 0, 0]);

        let mean = frame.roi_mean_rgb(Rect::new(0, 0, 2, 2)).unwrap();
        assert!((mean[0] - 128.0).abs() < 1e-9);
        assert!((mean[1] - 64.0).abs() < 1e-9);
        assert!((mean[2] - 32.0).abs() < 1e-9);

        let mean = frame.roi_mean_rgb(Rect::new(2, 2, 2, 2)).unwrap();
        assert!((mean[0] - 96.0).abs() < 1e-9);
    }

    #[test]
    fn test_roi_mean_rgb_clips_and_rejects_empty() {
        let frame = Frame::filled(4, 4, [10, 20, 30]);
        let mean = frame.roi_mean_rgb(Rect::new(2, 2, 10, 10)).unwrap();
        assert!((mean[2] - 30.0).abs() < 1e-9);
        assert!(frame.roi_mean_rgb(Rect::new(4, 0, 2, 2)).is_none());
        assert!(frame.roi_mean_rgb(Rect::new(0, 0, 0, 2)).is_none());
    }

    #[test]
    fn test_grayscale() {
        let data = vec![255, 255, 255, 0, 0, 0]; // White + Black pixels
        let frame = Frame::new(data, 2, 1, 0, 0).unwrap();
        let gray = frame.to_grayscale();
        assert_eq!(gray, vec![255, 0]);
    }
}
