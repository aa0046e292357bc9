//! Frame sources
//!
//! The engine pulls frames one at a time from anything implementing
//! [`FrameSource`]. Sources own their file/device handle and release it on
//! drop.

use std::f64::consts::PI;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::image_ops::{Frame, Rect};
use crate::error::{Result, SignalError};

/// Finite or endless ordered stream of frames
pub trait FrameSource {
    /// Declared frames per second (may be 0 when unknown)
    fn frame_rate(&self) -> f64;

    /// Total number of frames, when the source knows it up front
    fn frame_count(&self) -> Option<usize> {
        None
    }

    /// Next frame, `Ok(None)` at end of stream
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

impl<S: FrameSource + ?Sized> FrameSource for &mut S {
    fn frame_rate(&self) -> f64 {
        (**self).frame_rate()
    }

    fn frame_count(&self) -> Option<usize> {
        (**self).frame_count()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn frame_rate(&self) -> f64 {
        (**self).frame_rate()
    }

    fn frame_count(&self) -> Option<usize> {
        (**self).frame_count()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }
}

fn timestamp_us(index: u64, fps: f64) -> i64 {
    if fps > 0.0 {
        (index as f64 * 1_000_000.0 / fps).round() as i64
    } else {
        0
    }
}

/// Headerless RGB24 stream of fixed-size frames
///
/// Matches `ffmpeg -f rawvideo -pix_fmt rgb24` output, from a file or a
/// pipe. A truncated trailing frame ends the stream.
pub struct RawVideoSource<R: Read> {
    reader: R,
    width: u32,
    height: u32,
    fps: f64,
    frame_count: Option<usize>,
    next_index: u64,
    finished: bool,
}

impl RawVideoSource<BufReader<File>> {
    /// Open a raw video file; the frame count is derived from its length
    pub fn open<P: AsRef<Path>>(path: P, width: u32, height: u32, fps: f64) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| SignalError::SourceUnavailable(format!("cannot open {}: {e}", path.display())))?;
        let len = file.metadata()?.len();

        let mut source = Self::from_reader(BufReader::new(file), width, height, fps)?;
        source.frame_count = Some((len / source.frame_size() as u64) as usize);
        Ok(source)
    }
}

impl<R: Read> RawVideoSource<R> {
    pub fn from_reader(reader: R, width: u32, height: u32, fps: f64) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SignalError::SourceUnavailable(format!(
                "invalid raw video geometry {width}x{height}"
            )));
        }
        Ok(Self {
            reader,
            width,
            height,
            fps,
            frame_count: None,
            next_index: 0,
            finished: false,
        })
    }

    fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Fill `buf` until full or EOF, returning the bytes read
    fn read_full(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}

impl<R: Read> FrameSource for RawVideoSource<R> {
    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> Option<usize> {
        self.frame_count
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        let mut data = vec![0u8; self.frame_size()];
        let filled = self.read_full(&mut data)?;
        if filled < data.len() {
            if filled > 0 {
                log::warn!(
                    "raw video ended mid-frame ({filled} of {} bytes), dropping partial frame",
                    data.len()
                );
            }
            self.finished = true;
            return Ok(None);
        }

        let index = self.next_index;
        self.next_index += 1;
        Frame::new(data, self.width, self.height, index, timestamp_us(index, self.fps)).map(Some)
    }
}

/// Directory of still frames, read in file-name order
#[cfg(feature = "image-processing")]
pub struct ImageSequenceSource {
    paths: Vec<std::path::PathBuf>,
    fps: f64,
    next_index: usize,
}

#[cfg(feature = "image-processing")]
impl ImageSequenceSource {
    const EXTENSIONS: [&'static str; 3] = ["png", "jpg", "jpeg"];

    pub fn open<P: AsRef<Path>>(dir: P, fps: f64) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir)
            .map_err(|e| SignalError::SourceUnavailable(format!("cannot read {}: {e}", dir.display())))?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| Self::EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image {
                paths.push(path);
            }
        }

        if paths.is_empty() {
            return Err(SignalError::SourceUnavailable(format!(
                "no png/jpeg frames in {}",
                dir.display()
            )));
        }
        paths.sort();

        Ok(Self { paths, fps, next_index: 0 })
    }
}

#[cfg(feature = "image-processing")]
impl FrameSource for ImageSequenceSource {
    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> Option<usize> {
        Some(self.paths.len())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.paths.get(self.next_index) else {
            return Ok(None);
        };
        let img = image::open(path)?;
        let index = self.next_index as u64;
        self.next_index += 1;
        Ok(Some(Frame::from_dynamic_image(&img, index, timestamp_us(index, self.fps))))
    }
}

/// Parameters of a synthetic face clip
#[derive(Debug, Clone)]
pub struct SyntheticClip {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_seconds: f64,
    /// Injected pulse rate
    pub bpm: f64,
    /// Pulse amplitude on the green channel (8-bit levels)
    pub amplitude: f64,
    /// Peak uniform noise added per frame and channel (8-bit levels)
    pub noise: f64,
    /// Skin color the pulse rides on
    pub skin_rgb: [f64; 3],
    /// Region painted with skin color; the rest is a dark background
    pub face: Rect,
    pub seed: u64,
}

impl Default for SyntheticClip {
    fn default() -> Self {
        Self {
            width: 160,
            height: 120,
            fps: 30.0,
            duration_seconds: 30.0,
            bpm: 72.0,
            amplitude: 2.0,
            noise: 0.5,
            skin_rgb: [180.0, 120.0, 100.0],
            face: Rect::new(20, 0, 120, 120),
            seed: 7,
        }
    }
}

/// Deterministic synthetic face video with a pulse on the green channel
///
/// Fractional levels are rendered with an ordered dither so that the mean
/// over any reasonably sized region tracks the continuous value.
pub struct SyntheticPulseSource {
    clip: SyntheticClip,
    rng: StdRng,
    total_frames: usize,
    next_index: u64,
}

impl SyntheticPulseSource {
    pub fn new(clip: SyntheticClip) -> Self {
        let total_frames = (clip.duration_seconds * clip.fps).round().max(0.0) as usize;
        Self {
            rng: StdRng::seed_from_u64(clip.seed),
            clip,
            total_frames,
            next_index: 0,
        }
    }

    pub fn clip(&self) -> &SyntheticClip {
        &self.clip
    }

    fn render(&mut self, index: u64) -> Frame {
        let clip = &self.clip;
        let t = index as f64 / clip.fps;
        let pulse = clip.amplitude * (2.0 * PI * clip.bpm / 60.0 * t).sin();

        let mut level = clip.skin_rgb;
        level[1] += pulse;
        for channel in level.iter_mut() {
            *channel += self.rng.gen_range(-1.0..=1.0) * clip.noise;
            *channel = channel.clamp(0.0, 254.0);
        }

        let mut frame = Frame::filled(clip.width, clip.height, [16, 16, 16]);
        frame.index = index;
        frame.timestamp_us = timestamp_us(index, clip.fps);

        let x_end = (clip.face.x + clip.face.width).min(clip.width);
        let y_end = (clip.face.y + clip.face.height).min(clip.height);
        for y in clip.face.y..y_end {
            for x in clip.face.x..x_end {
                // Golden-ratio sequence: well spread thresholds in [0, 1)
                let threshold = ((y * clip.width + x) as f64 * 0.618_033_988_749_895).fract();
                let px = [
                    dither(level[0], threshold),
                    dither(level[1], threshold),
                    dither(level[2], threshold),
                ];
                frame.set_pixel(x, y, px);
            }
        }
        frame
    }
}

fn dither(value: f64, threshold: f64) -> u8 {
    let base = value.floor();
    let bump = if value - base > threshold { 1.0 } else { 0.0 };
    (base + bump) as u8
}

impl FrameSource for SyntheticPulseSource {
    fn frame_rate(&self) -> f64 {
        self.clip.fps
    }

    fn frame_count(&self) -> Option<usize> {
        Some(self.total_frames)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.next_index as usize >= self.total_frames {
            return Ok(None);
        }
        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(self.render(index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_raw_source_reads_frames_then_ends() {
        let mut bytes = vec![1u8; 2 * 2 * 3];
        bytes.extend(vec![2u8; 2 * 2 * 3]);
        let mut source = RawVideoSource::from_reader(Cursor::new(bytes), 2, 2, 25.0).unwrap();

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.get_pixel(1, 1), [1, 1, 1]);

        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(second.timestamp_us, 40_000);

        assert!(source.next_frame().unwrap().is_none());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_raw_source_drops_truncated_tail() {
        let bytes = vec![0u8; 2 * 2 * 3 + 5];
        let mut source = RawVideoSource::from_reader(Cursor::new(bytes), 2, 2, 30.0).unwrap();
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_raw_source_open_counts_frames() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![9u8; 4 * 4 * 3 * 5]).unwrap();

        let source = RawVideoSource::open(file.path(), 4, 4, 30.0).unwrap();
        assert_eq!(source.frame_count(), Some(5));
    }

    #[test]
    fn test_raw_source_missing_file() {
        let result = RawVideoSource::open("/definitely/not/here.rgb", 4, 4, 30.0);
        assert!(matches!(result, Err(SignalError::SourceUnavailable(_))));
    }

    #[test]
    fn test_synthetic_source_length_and_pulse() {
        let clip = SyntheticClip {
            duration_seconds: 2.0,
            noise: 0.0,
            ..SyntheticClip::default()
        };
        let face = clip.face;
        let mut source = SyntheticPulseSource::new(clip);
        assert_eq!(source.frame_count(), Some(60));

        let mut greens = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            greens.push(frame.roi_mean_rgb(face).unwrap()[1]);
        }
        assert_eq!(greens.len(), 60);

        let max = greens.iter().cloned().fold(f64::MIN, f64::max);
        let min = greens.iter().cloned().fold(f64::MAX, f64::min);
        // Peak-to-peak close to twice the amplitude
        assert!((max - min) > 3.5 && (max - min) < 4.5, "p2p = {}", max - min);
    }

    #[test]
    fn test_synthetic_source_is_deterministic() {
        let mut a = SyntheticPulseSource::new(SyntheticClip::default());
        let mut b = SyntheticPulseSource::new(SyntheticClip::default());
        for _ in 0..5 {
            assert_eq!(a.next_frame().unwrap().unwrap().data, b.next_frame().unwrap().unwrap().data);
        }
    }
}
