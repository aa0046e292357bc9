//! Live monitoring scenarios over synthetic streams

use std::sync::Arc;

use vivi_signals::vision::{FaceRegion, FixedRegionDetector, SyntheticClip, SyntheticPulseSource};
use vivi_signals::{
    DiagnosticEvent, EstimateStatus, LiveMonitor, LiveUpdate, MeasurementConfig, MemorySink, Rejection, RppgEngine,
    StopHandle,
};

fn monitor(config: MeasurementConfig, sink: Arc<MemorySink>) -> LiveMonitor {
    let detector = FixedRegionDetector::new(FaceRegion::new(20, 0, 120, 120));
    let engine = RppgEngine::new(config, detector).unwrap().with_sink(sink);
    LiveMonitor::new(engine, 30.0)
}

fn stream(seconds: f64) -> SyntheticPulseSource {
    SyntheticPulseSource::new(SyntheticClip { duration_seconds: seconds, ..SyntheticClip::default() })
}

#[test]
fn test_live_run_stops_at_target_duration() {
    let sink = Arc::new(MemorySink::new());
    let live = monitor(MeasurementConfig::live(), sink.clone());

    let mut updates: Vec<LiveUpdate> = Vec::new();
    let result = live
        .run(stream(40.0), &StopHandle::new(), |update| updates.push(update.clone()))
        .unwrap();

    assert_eq!(updates.len(), 900);
    assert!(updates.windows(2).all(|w| w[1].progress_percent >= w[0].progress_percent));
    let last = updates.last().unwrap();
    assert!((last.progress_percent - 100.0).abs() < 1e-6);
    assert_eq!(last.remaining_seconds, 0.0);

    // Nothing to estimate before ten seconds of samples
    assert!(updates[..299].iter().all(|u| u.status == EstimateStatus::Pending));
    assert!(updates.iter().any(|u| matches!(u.status, EstimateStatus::Accepted(_))));
    let shown = last.heart_rate.expect("displayed heart rate");
    assert!((shown - 72.0).abs() <= 3.0, "displayed = {shown}");

    let bpm = result.heart_rate().expect("accepted");
    assert!((bpm - 72.0).abs() <= 2.0, "bpm = {bpm}");
    assert!((result.stats().duration_seconds - 30.0).abs() < 1e-3);
    assert_eq!(sink.count_where(|e| matches!(e, DiagnosticEvent::Cancelled { .. })), 0);
}

#[test]
fn test_stop_handle_returns_partial_result() {
    let sink = Arc::new(MemorySink::new());
    let live = monitor(MeasurementConfig::live(), sink.clone());
    let stop = StopHandle::new();
    let trigger = stop.clone();

    let result = live
        .run(stream(40.0), &stop, |update| {
            if update.elapsed_seconds >= 12.0 {
                trigger.stop();
            }
        })
        .unwrap();

    assert!(result.is_success(), "{:?}", result.rejection());
    assert_eq!(result.stats().frames_processed, 360);
    assert!((result.stats().duration_seconds - 12.0).abs() < 1e-3);
    assert_eq!(sink.count_where(|e| matches!(e, DiagnosticEvent::Cancelled { .. })), 1);
}

#[test]
fn test_stopping_too_early_is_input_too_short() {
    let live = monitor(MeasurementConfig::live(), Arc::new(MemorySink::new()));
    let stop = StopHandle::new();
    let trigger = stop.clone();

    let result = live
        .run(stream(40.0), &stop, |update| {
            if update.elapsed_seconds >= 5.0 {
                trigger.stop();
            }
        })
        .unwrap();

    match result.rejection() {
        Some(Rejection::InputTooShort { required_seconds, .. }) => assert_eq!(*required_seconds, 10.0),
        other => panic!("expected InputTooShort, got {other:?}"),
    }
    let record = result.to_record();
    assert!(!record.success);
    assert_eq!(record.frames_processed, 150);
}

#[test]
fn test_background_estimation_does_not_block_capture() {
    let config = MeasurementConfig { background_estimation: true, ..MeasurementConfig::live() };
    let live = monitor(config, Arc::new(MemorySink::new()));

    let mut queued = 0;
    let mut frames = 0;
    let result = live
        .run(stream(30.0), &StopHandle::new(), |update| {
            frames += 1;
            if update.status == EstimateStatus::Queued {
                queued += 1;
            }
        })
        .unwrap();

    assert_eq!(frames, 900);
    assert!(queued > 0);
    let bpm = result.heart_rate().expect("accepted");
    assert!((bpm - 72.0).abs() <= 2.0, "bpm = {bpm}");
}

#[test]
fn test_continuous_mode_keeps_a_sliding_window() {
    let live = monitor(MeasurementConfig::live(), Arc::new(MemorySink::new())).continuous();

    let mut frames = 0;
    let result = live.run(stream(36.0), &StopHandle::new(), |_| frames += 1).unwrap();

    assert_eq!(frames, 1080);
    assert_eq!(result.stats().frames_processed, 1080);
    assert!((result.stats().usable_seconds - 30.0).abs() < 1e-9);
    let bpm = result.heart_rate().expect("accepted");
    assert!((bpm - 72.0).abs() <= 2.0, "bpm = {bpm}");
}
