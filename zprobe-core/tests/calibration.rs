//! Full calibration runs against the simulated bed and scripted fakes.

use std::collections::VecDeque;

use zprobe_core::RawSample;
use zprobe_core::acquisition::{SampleSource, SessionHandle};
use zprobe_core::error::{AcquisitionFault, MotionFault, RunFault};
use zprobe_core::motion::{Motion, Position};
use zprobe_core::run::{CalibrationRun, RunOutcome, RunSettings};
use zprobe_core::sim::SimulatedBed;
use zprobe_core::sink::{ChannelSink, LogSink};

fn settings(start_z: f64) -> RunSettings {
    RunSettings {
        probe_point: Position::new(100.0, 100.0, start_z),
        step: 0.01,
        min_precision: 0.005,
        frequency: 80.0,
        accel_per_hz: 1.5,
        amplitude_threshold: 700.0,
        decision_level: 0.015,
        safe_min_z: 0.5,
        cycles_per_test: 10,
        max_tests: 50,
        record_samples: true,
        approach_speed: 50.0,
        settle_dwell: 0.0,
    }
}

fn heights(records: &[zprobe_core::recorder::TestRecord]) -> Vec<f64> {
    records.iter().map(|r| r.height()).collect()
}

fn assert_close(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-9, "{a} != {b}");
}

#[test]
fn test_miss_then_hit_converges() {
    let bed = SimulatedBed::new(0.9937, 42);
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut run = CalibrationRun::new(
        settings(1.0),
        bed.motion(),
        bed.accelerometer(),
        ChannelSink::new(tx),
    );
    let result = run.run().unwrap();

    assert_eq!(result.outcome, RunOutcome::Converged { offset: result.offset().unwrap() });
    assert_close(result.offset().unwrap(), 0.99);
    let hs = heights(&result.records);
    assert_eq!(hs.len(), 2);
    assert_close(hs[0], 1.0);
    assert_close(hs[1], 0.99);
    assert!(result.records[0].rate_above_threshold() < 0.015);
    assert!(result.records[1].rate_above_threshold() >= 0.015);
    assert_eq!(result.records[0].sample_count(), 10 * 4 * 10);

    let reports: Vec<String> = rx.try_iter().collect();
    assert!(reports[0].starts_with("Testing Z: 1.0000. Received 400 samples"));
    assert_eq!(reports.last().unwrap(), "probe at 100.0000,100.0000 is z=0.990000");

    assert!(bed.shaping_enabled());
    assert!(!bed.session_open());
    assert_eq!(bed.acceleration(), Some(120.0));
}

#[test]
fn test_longer_search_approaches_from_above() {
    let bed = SimulatedBed::new(0.953, 3);
    let mut run = CalibrationRun::new(
        RunSettings {
            step: 0.04,
            ..settings(1.0)
        },
        bed.motion(),
        bed.accelerometer(),
        LogSink,
    );
    let result = run.run().unwrap();

    let expected = [1.0, 0.96, 0.94, 0.95, 0.96, 0.95];
    let hs = heights(&result.records);
    assert_eq!(hs.len(), expected.len());
    for (h, e) in hs.iter().zip(expected) {
        assert_close(*h, e);
    }
    assert_close(result.offset().unwrap(), 0.95);
}

#[test]
fn test_safety_limit_is_reported_with_full_log() {
    let bed = SimulatedBed::new(0.0, 1);
    let mut run = CalibrationRun::new(
        RunSettings {
            step: 0.2,
            safe_min_z: 0.75,
            ..settings(1.0)
        },
        bed.motion(),
        bed.accelerometer(),
        LogSink,
    );
    let result = run.run().unwrap();

    match result.outcome {
        RunOutcome::SafetyLimitReached { height } => assert_close(height, 0.7),
        other => panic!("expected safety limit, got {other:?}"),
    }
    assert_eq!(result.offset(), None);
    let hs = heights(&result.records);
    assert_eq!(hs.len(), 2);
    assert_close(hs[0], 1.0);
    assert_close(hs[1], 0.8);
}

#[test]
fn test_start_below_safe_minimum_tests_nothing() {
    let bed = SimulatedBed::new(0.0, 1);
    let mut run = CalibrationRun::new(settings(0.2), bed.motion(), bed.accelerometer(), LogSink);
    let result = run.run().unwrap();
    assert_eq!(result.outcome, RunOutcome::SafetyLimitReached { height: 0.2 });
    assert!(result.records.is_empty());
    assert_eq!(bed.move_count(), 1);
}

#[test]
fn test_continuous_detection_hits_test_budget() {
    let bed = SimulatedBed::new(5.0, 1);
    let mut run = CalibrationRun::new(
        RunSettings {
            max_tests: 5,
            ..settings(1.0)
        },
        bed.motion(),
        bed.accelerometer(),
        LogSink,
    );
    let result = run.run().unwrap();
    assert_eq!(result.outcome, RunOutcome::TestBudgetExhausted { tests: 5 });
    let hs = heights(&result.records);
    for (i, h) in hs.iter().enumerate() {
        assert_close(*h, 1.0 + 0.01 * i as f64);
    }
}

#[test]
fn test_endless_misses_hit_test_budget_above_safe_minimum() {
    // surface far below: every height misses and the heights close in on 1.0 - 2 * 0.01
    let bed = SimulatedBed::new(0.0, 1);
    let mut run = CalibrationRun::new(
        RunSettings {
            max_tests: 8,
            ..settings(1.0)
        },
        bed.motion(),
        bed.accelerometer(),
        LogSink,
    );
    let result = run.run().unwrap();

    assert_eq!(result.outcome, RunOutcome::TestBudgetExhausted { tests: 8 });
    let hs = heights(&result.records);
    assert_eq!(hs.len(), 8);
    assert_close(hs[0], 1.0);
    assert_close(hs[1], 0.99);
    assert_close(hs[2], 0.985);
    assert!(hs.windows(2).all(|w| w[1] < w[0]));
    assert!(hs.iter().all(|&h| h > 0.98));
    assert!(result.records.iter().all(|r| r.rate_above_threshold() < 0.015));
}

#[test]
fn test_shaping_left_off_when_it_was_off() {
    let bed = SimulatedBed::new(0.9937, 42).with_shaping(false);
    let mut run = CalibrationRun::new(settings(1.0), bed.motion(), bed.accelerometer(), LogSink);
    let result = run.run().unwrap();

    assert_close(result.offset().unwrap(), 0.99);
    assert!(!bed.shaping_enabled());
}

#[test]
fn test_motion_fault_aborts_with_partial_record() {
    // approach + settle + two cycle moves succeed, the third cycle move fails
    let bed = SimulatedBed::new(0.0, 1).fail_motion_after(4);
    let mut run = CalibrationRun::new(settings(1.0), bed.motion(), bed.accelerometer(), LogSink);
    let err = run.run().unwrap_err();

    assert!(matches!(err.fault, RunFault::Motion(MotionFault::MoveFailed { .. })));
    assert_eq!(err.records.len(), 1);
    assert_eq!(err.records[0].sample_count(), 20);
    assert!(!bed.session_open());
    assert!(bed.shaping_enabled());
    assert_eq!(bed.move_count(), 4);
}

#[test]
fn test_close_fault_still_records_metric() {
    let bed = SimulatedBed::new(0.0, 1).fail_on_close();
    let mut run = CalibrationRun::new(settings(1.0), bed.motion(), bed.accelerometer(), LogSink);
    let err = run.run().unwrap_err();

    assert!(matches!(
        err.fault,
        RunFault::Acquisition(AcquisitionFault::CloseFailed { .. })
    ));
    assert_eq!(err.records.len(), 1);
    assert_eq!(err.records[0].sample_count(), 400);
    assert_eq!(err.records[0].rate_above_threshold(), 0.0);
}

#[test]
fn test_empty_session_aborts_as_no_samples() {
    let bed = SimulatedBed::new(0.0, 1).with_sample_rate(0.0);
    let mut run = CalibrationRun::new(settings(1.0), bed.motion(), bed.accelerometer(), LogSink);
    let err = run.run().unwrap_err();

    assert_eq!(err.fault, RunFault::NoSamples { height: 1.0 });
    assert_eq!(err.records.len(), 1);
    assert_eq!(err.records[0].rate_above_threshold(), 0.0);
}

#[test]
fn test_pending_cancel_stops_before_first_test() {
    let bed = SimulatedBed::new(0.0, 1);
    let (cancel_tx, cancel_rx) = crossbeam_channel::bounded(1);
    cancel_tx.send(()).unwrap();
    let mut run = CalibrationRun::new(settings(1.0), bed.motion(), bed.accelerometer(), LogSink)
        .with_cancel(cancel_rx);
    let result = run.run().unwrap();

    assert_eq!(result.outcome, RunOutcome::Cancelled);
    assert!(result.records.is_empty());
    assert_eq!(bed.move_count(), 1);
}

#[test]
fn test_sample_keeping_can_be_disabled() {
    let bed = SimulatedBed::new(0.9937, 42);
    let mut run = CalibrationRun::new(
        RunSettings {
            record_samples: false,
            ..settings(1.0)
        },
        bed.motion(),
        bed.accelerometer(),
        LogSink,
    );
    let result = run.run().unwrap();
    assert_eq!(result.records.len(), 2);
    assert!(result.records.iter().all(|r| r.series().is_empty() && r.sample_count() == 400));
}

// --- scripted collaborators -------------------------------------------------

#[derive(Default)]
struct StillMotion {
    position: Position,
    moves: usize,
}

impl Motion for StillMotion {
    fn move_to(&mut self, target: Position, _max_velocity: f64) -> Result<(), MotionFault> {
        self.position = target;
        self.moves += 1;
        Ok(())
    }
    fn current_position(&self) -> Position {
        self.position
    }
    fn dwell(&mut self, _seconds: f64) {}
    fn wait_until_settled(&mut self) {}
    fn set_acceleration(&mut self, _accel: f64) -> Result<(), MotionFault> {
        Ok(())
    }
}

/// Replays one prepared recording per session.
struct ScriptedSource {
    recordings: VecDeque<Vec<RawSample>>,
    opened: u64,
    closed: u64,
}

impl ScriptedSource {
    fn new(recordings: Vec<Vec<RawSample>>) -> Self {
        Self {
            recordings: recordings.into(),
            opened: 0,
            closed: 0,
        }
    }
}

impl SampleSource for ScriptedSource {
    fn start_session(&mut self) -> Result<SessionHandle, AcquisitionFault> {
        let recording = self
            .recordings
            .pop_front()
            .ok_or_else(|| AcquisitionFault::StartFailed("script exhausted".into()))?;
        let (tx, rx) = crossbeam_channel::unbounded();
        for s in recording {
            tx.send(s).unwrap();
        }
        self.opened += 1;
        Ok(SessionHandle::new(self.opened, rx))
    }

    fn end_session(&mut self, _handle: &SessionHandle) -> Result<(), AcquisitionFault> {
        self.closed += 1;
        Ok(())
    }
}

/// 200 samples, `spikes` of them well beyond the amplitude threshold.
fn recording(spikes: usize) -> Vec<RawSample> {
    (0..200)
        .map(|i| {
            let z = if i < spikes { 5000.0 } else { 9806.0 };
            RawSample::new(i as f64 / 3200.0, 0.0, 0.0, z)
        })
        .collect()
}

#[test]
fn test_decision_level_is_inclusive() {
    let source = ScriptedSource::new(vec![recording(2), recording(3)]);
    let mut run = CalibrationRun::new(
        RunSettings {
            step: 0.005,
            ..settings(1.0)
        },
        StillMotion::default(),
        source,
        LogSink,
    );
    let result = run.run().unwrap();

    // 2/200 = 0.01 misses, 3/200 = 0.015 meets the 0.015 decision level
    let rates: Vec<f64> = result.records.iter().map(|r| r.rate_above_threshold()).collect();
    assert_close(rates[0], 0.01);
    assert_close(rates[1], 0.015);
    assert_close(result.offset().unwrap(), 0.995);

    let (motion, source, _) = run.into_parts();
    assert_eq!(source.opened, 2);
    assert_eq!(source.closed, 2);
    // approach, then per height one settle move and 10 cycles of 4 moves
    assert_eq!(motion.moves, 1 + 2 * (1 + 40));
}

#[test]
fn test_start_failure_aborts_without_record() {
    let mut run = CalibrationRun::new(
        settings(1.0),
        StillMotion::default(),
        ScriptedSource::new(Vec::new()),
        LogSink,
    );
    let err = run.run().unwrap_err();
    assert!(matches!(
        err.fault,
        RunFault::Acquisition(AcquisitionFault::StartFailed(_))
    ));
    assert!(err.records.is_empty());
}
