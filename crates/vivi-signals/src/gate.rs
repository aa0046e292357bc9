//! Validity gate
//!
//! Checkpoints applied around estimation: capture duration before any
//! processing, usable face coverage after sampling, physiological range of
//! the result, and (live only) frame-to-frame consistency of estimates.

use crate::buffer::BufferSnapshot;
use crate::config::MeasurementConfig;
use crate::measurement::Rejection;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidityGate {
    pub min_duration_seconds: f64,
    pub min_coverage_seconds: f64,
    pub min_bpm: f64,
    pub max_bpm: f64,
    pub max_no_face_seconds: Option<f64>,
}

impl ValidityGate {
    pub fn from_config(config: &MeasurementConfig) -> Self {
        Self {
            min_duration_seconds: config.min_acceptable_duration_seconds,
            min_coverage_seconds: config.min_face_coverage_seconds,
            min_bpm: config.min_bpm,
            max_bpm: config.max_bpm,
            max_no_face_seconds: config.max_no_face_seconds,
        }
    }

    /// Pre-check on the raw capture length
    pub fn check_duration(&self, actual_seconds: f64) -> Result<(), Rejection> {
        if actual_seconds < self.min_duration_seconds {
            return Err(Rejection::InputTooShort {
                required_seconds: self.min_duration_seconds,
                actual_seconds,
            });
        }
        Ok(())
    }

    /// Post-check on usable samples
    pub fn check_coverage(&self, snapshot: &BufferSnapshot) -> Result<(), Rejection> {
        let usable_seconds = snapshot.usable_seconds();
        if usable_seconds < self.min_coverage_seconds {
            return Err(Rejection::InsufficientFaceCoverage {
                usable_seconds,
                required_seconds: self.min_coverage_seconds,
                detection_rate: snapshot.detection_rate(),
            });
        }
        Ok(())
    }

    /// Result check, independent of SNR
    pub fn check_range(&self, bpm: f64) -> Result<(), Rejection> {
        if !(self.min_bpm..=self.max_bpm).contains(&bpm) {
            return Err(Rejection::OutOfPhysiologicalRange {
                bpm,
                min: self.min_bpm,
                max: self.max_bpm,
            });
        }
        Ok(())
    }

    /// Frames without a face after which offline decoding stops
    pub fn no_face_frame_limit(&self, fps: f64) -> Option<usize> {
        self.max_no_face_seconds
            .map(|seconds| (seconds * fps).floor().max(0.0) as usize)
    }

    /// True once the no-face run is longer than the allowed limit
    pub fn no_face_streak_exceeded(&self, consecutive_no_face: usize, fps: f64) -> bool {
        self.no_face_frame_limit(fps)
            .map(|limit| consecutive_no_face > limit)
            .unwrap_or(false)
    }
}

/// Outcome of the temporal-consistency check
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JumpVerdict {
    Accepted,
    /// Too far from the last accepted estimate; `previous` stays displayed
    Suppressed { previous: f64, delta: f64 },
}

/// Rejects estimates that jump too far from the last accepted one
///
/// A suppressed estimate does not move the reference, so the stream
/// recovers as soon as a later window agrees with it again.
#[derive(Debug, Clone)]
pub struct JumpGuard {
    max_jump_bpm: f64,
    last_accepted: Option<f64>,
}

impl JumpGuard {
    pub fn new(max_jump_bpm: f64) -> Self {
        Self { max_jump_bpm, last_accepted: None }
    }

    pub fn check(&mut self, bpm: f64) -> JumpVerdict {
        if let Some(previous) = self.last_accepted {
            let delta = (bpm - previous).abs();
            if delta > self.max_jump_bpm {
                return JumpVerdict::Suppressed { previous, delta };
            }
        }
        self.last_accepted = Some(bpm);
        JumpVerdict::Accepted
    }

    pub fn last_accepted(&self) -> Option<f64> {
        self.last_accepted
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{ColorSample, SignalBuffer};

    fn snapshot(faces: usize, total: usize) -> BufferSnapshot {
        let mut buf = SignalBuffer::unbounded(30.0);
        for i in 0..total {
            let sample = (i < faces).then(|| ColorSample::new(i as u64, [1.0, 1.0, 1.0]));
            buf.append(sample);
        }
        buf.snapshot()
    }

    #[test]
    fn test_duration_precheck() {
        let gate = ValidityGate::from_config(&MeasurementConfig::offline());
        assert!(gate.check_duration(25.0).is_ok());
        assert_eq!(
            gate.check_duration(10.0),
            Err(Rejection::InputTooShort { required_seconds: 25.0, actual_seconds: 10.0 })
        );
    }

    #[test]
    fn test_coverage_postcheck() {
        let gate = ValidityGate::from_config(&MeasurementConfig::offline());
        assert!(gate.check_coverage(&snapshot(450, 900)).is_ok());

        match gate.check_coverage(&snapshot(45, 900)) {
            Err(Rejection::InsufficientFaceCoverage { usable_seconds, detection_rate, .. }) => {
                assert!((usable_seconds - 1.5).abs() < 1e-9);
                assert!((detection_rate - 5.0).abs() < 1e-9);
            }
            other => panic!("expected coverage rejection, got {other:?}"),
        }

        let live = ValidityGate::from_config(&MeasurementConfig::live());
        assert!(live.check_coverage(&snapshot(300, 900)).is_ok());
        assert!(live.check_coverage(&snapshot(299, 900)).is_err());
    }

    #[test]
    fn test_range_check() {
        let gate = ValidityGate::from_config(&MeasurementConfig::offline());
        assert!(gate.check_range(40.0).is_ok());
        assert!(gate.check_range(200.0).is_ok());
        assert!(gate.check_range(39.9).is_err());
        assert!(matches!(
            gate.check_range(210.0),
            Err(Rejection::OutOfPhysiologicalRange { .. })
        ));
    }

    #[test]
    fn test_no_face_streak_limit() {
        let gate = ValidityGate::from_config(&MeasurementConfig::offline());
        assert_eq!(gate.no_face_frame_limit(30.0), Some(150));
        assert!(!gate.no_face_streak_exceeded(150, 30.0));
        assert!(gate.no_face_streak_exceeded(151, 30.0));

        let live = ValidityGate::from_config(&MeasurementConfig::live());
        assert!(!live.no_face_streak_exceeded(100_000, 30.0));
    }

    #[test]
    fn test_jump_guard_suppresses_glitch() {
        let mut guard = JumpGuard::new(20.0);
        assert_eq!(guard.check(70.0), JumpVerdict::Accepted);
        assert_eq!(guard.check(95.0), JumpVerdict::Suppressed { previous: 70.0, delta: 25.0 });
        assert_eq!(guard.last_accepted(), Some(70.0));
    }

    #[test]
    fn test_jump_guard_accepts_moderate_change() {
        let mut guard = JumpGuard::new(20.0);
        assert_eq!(guard.check(70.0), JumpVerdict::Accepted);
        assert_eq!(guard.check(82.0), JumpVerdict::Accepted);
        assert_eq!(guard.last_accepted(), Some(82.0));
    }

    #[test]
    fn test_jump_guard_recovers() {
        let mut guard = JumpGuard::new(20.0);
        guard.check(70.0);
        assert!(matches!(guard.check(120.0), JumpVerdict::Suppressed { .. }));
        assert_eq!(guard.check(75.0), JumpVerdict::Accepted);
        guard.reset();
        assert_eq!(guard.check(120.0), JumpVerdict::Accepted);
    }
}
