//! Temporal signal buffer
//!
//! Holds one mean-color sample per frame that had a usable forehead ROI,
//! in frame order, plus the bookkeeping the validity gate needs. Offline
//! captures use an unbounded buffer; live capture keeps a sliding window of
//! the most recent samples.

use std::collections::VecDeque;

use ndarray::Array1;

/// Mean forehead color of one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorSample {
    /// Index of the frame the sample came from
    pub frame_index: u64,
    pub rgb: [f64; 3],
}

impl ColorSample {
    pub fn new(frame_index: u64, rgb: [f64; 3]) -> Self {
        Self { frame_index, rgb }
    }
}

/// RGB channels over time, one array per channel
#[derive(Debug, Clone, PartialEq)]
pub struct RgbSeries {
    pub r: Array1<f64>,
    pub g: Array1<f64>,
    pub b: Array1<f64>,
}

impl RgbSeries {
    pub fn from_rgb(samples: &[[f64; 3]]) -> Self {
        Self {
            r: samples.iter().map(|s| s[0]).collect(),
            g: samples.iter().map(|s| s[1]).collect(),
            b: samples.iter().map(|s| s[2]).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.r.len()
    }

    pub fn is_empty(&self) -> bool {
        self.r.is_empty()
    }
}

/// Immutable copy of the buffer state handed to the estimator
#[derive(Debug, Clone, PartialEq)]
pub struct BufferSnapshot {
    pub samples: Vec<ColorSample>,
    pub fps: f64,
    /// Frames seen since the buffer was created
    pub total_frames: usize,
    /// Frames that produced a usable sample (including evicted ones)
    pub face_frames: usize,
    /// Current run of frames without a usable sample
    pub consecutive_no_face: usize,
    /// Longest such run so far
    pub longest_no_face: usize,
}

impl BufferSnapshot {
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Seconds of video covered by buffered samples
    pub fn usable_seconds(&self) -> f64 {
        if self.fps > 0.0 {
            self.samples.len() as f64 / self.fps
        } else {
            0.0
        }
    }

    /// Percentage of frames with a usable face
    pub fn detection_rate(&self) -> f64 {
        if self.total_frames == 0 {
            0.0
        } else {
            self.face_frames as f64 / self.total_frames as f64 * 100.0
        }
    }

    /// Samples as an evenly spaced series
    ///
    /// With `gap_fill`, frames between two samples that had no usable face
    /// are linearly interpolated so the series keeps the frame-rate time
    /// base, so the series spans first to last sample frame and may be
    /// longer than [`sample_count`](Self::sample_count). Without it,
    /// samples are simply concatenated.
    pub fn series(&self, gap_fill: bool) -> RgbSeries {
        if !gap_fill || self.samples.len() < 2 {
            let rgb: Vec<[f64; 3]> = self.samples.iter().map(|s| s.rgb).collect();
            return RgbSeries::from_rgb(&rgb);
        }

        let first = self.samples[0].frame_index;
        let last = self.samples[self.samples.len() - 1].frame_index;
        let mut rgb = Vec::with_capacity((last - first + 1) as usize);

        rgb.push(self.samples[0].rgb);
        for pair in self.samples.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let gap = b.frame_index.saturating_sub(a.frame_index);
            for step in 1..gap {
                let t = step as f64 / gap as f64;
                rgb.push([
                    a.rgb[0] + (b.rgb[0] - a.rgb[0]) * t,
                    a.rgb[1] + (b.rgb[1] - a.rgb[1]) * t,
                    a.rgb[2] + (b.rgb[2] - a.rgb[2]) * t,
                ]);
            }
            rgb.push(b.rgb);
        }

        RgbSeries::from_rgb(&rgb)
    }
}

/// Outcome of recording one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Stored,
    /// Stored, and the oldest sample was evicted to make room
    Evicted,
    /// Frame had no usable face; carries the current no-face run length
    NoFace(usize),
}

/// Per-session sample buffer
#[derive(Debug, Clone)]
pub struct SignalBuffer {
    samples: VecDeque<ColorSample>,
    capacity: Option<usize>,
    fps: f64,
    total_frames: usize,
    face_frames: usize,
    consecutive_no_face: usize,
    longest_no_face: usize,
}

impl SignalBuffer {
    /// Buffer for a finite clip, never evicts
    pub fn unbounded(fps: f64) -> Self {
        Self::with_capacity(None, fps)
    }

    /// Sliding window of at most `capacity` samples
    pub fn sliding(capacity: usize, fps: f64) -> Self {
        Self::with_capacity(Some(capacity.max(1)), fps)
    }

    pub fn with_capacity(capacity: Option<usize>, fps: f64) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.unwrap_or(1024)),
            capacity,
            fps,
            total_frames: 0,
            face_frames: 0,
            consecutive_no_face: 0,
            longest_no_face: 0,
        }
    }

    /// Record one frame: a sample when the ROI was usable, `None` otherwise
    pub fn append(&mut self, sample: Option<ColorSample>) -> AppendOutcome {
        self.total_frames += 1;

        let Some(sample) = sample else {
            self.consecutive_no_face += 1;
            self.longest_no_face = self.longest_no_face.max(self.consecutive_no_face);
            return AppendOutcome::NoFace(self.consecutive_no_face);
        };

        self.consecutive_no_face = 0;
        self.face_frames += 1;
        self.samples.push_back(sample);

        match self.capacity {
            Some(cap) if self.samples.len() > cap => {
                self.samples.pop_front();
                AppendOutcome::Evicted
            }
            _ => AppendOutcome::Stored,
        }
    }

    pub fn snapshot(&self) -> BufferSnapshot {
        BufferSnapshot {
            samples: self.samples.iter().copied().collect(),
            fps: self.fps,
            total_frames: self.total_frames,
            face_frames: self.face_frames,
            consecutive_no_face: self.consecutive_no_face,
            longest_no_face: self.longest_no_face,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn face_frames(&self) -> usize {
        self.face_frames
    }

    pub fn consecutive_no_face(&self) -> usize {
        self.consecutive_no_face
    }

    /// Buffer fill ratio (0-1), 0 for unbounded buffers
    pub fn fill(&self) -> f64 {
        match self.capacity {
            Some(cap) => self.samples.len() as f64 / cap as f64,
            None => 0.0,
        }
    }
}
