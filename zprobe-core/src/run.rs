//! # Calibration Run
//!
//! Orchestrates one calibration: approach the probe point, then repeatedly
//! move to the height the search asks for, shake and record, decide whether
//! contact was detected, and feed the decision back to the search.
//!
//! ## Termination
//! - `Converged` once the search settles on an offset
//! - `SafetyLimitReached` when the next height drops below `safe_min_z`
//! - `TestBudgetExhausted` after `max_tests` heights without convergence
//! - `Cancelled` when a cancel signal is pending between two tests
//! - `Err(RunError)` on any motion or acquisition fault, with the partial log
//!
//! Everything is strictly sequential; a test height is never interrupted.

use crossbeam_channel::Receiver;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::acquisition::{MeasureError, SampleSource, SignalAcquirer};
use crate::config::ProbeConfig;
use crate::error::{RunError, RunFault};
use crate::motion::{Motion, Position};
use crate::oscillation::{OscillationDriver, Z_AXIS};
use crate::recorder::{DiagnosticRecorder, TestRecord};
use crate::search::StepSearch;
use crate::sink::ReportSink;

/// Validated scalars a run works from.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub probe_point: Position,
    pub step: f64,
    pub min_precision: f64,
    pub frequency: f64,
    pub accel_per_hz: f64,
    pub amplitude_threshold: f64,
    /// Detection when `rate_above_threshold >= decision_level`.
    pub decision_level: f64,
    pub safe_min_z: f64,
    pub cycles_per_test: u32,
    pub max_tests: u32,
    pub record_samples: bool,
    pub approach_speed: f64,
    pub settle_dwell: f64,
}

impl RunSettings {
    /// Takes the settings from an already validated config.
    pub fn from_config(config: &ProbeConfig) -> Self {
        Self {
            probe_point: config.probe_point(),
            step: config.step_size,
            min_precision: config.samples_tolerance,
            frequency: config.z_vibration_freq,
            accel_per_hz: config.accel_per_hz,
            amplitude_threshold: config.amplitude_threshold,
            decision_level: config.rate_above_threshold,
            safe_min_z: config.safe_min_z,
            cycles_per_test: config.cycle_per_test,
            max_tests: config.max_tests,
            record_samples: config.record_samples,
            approach_speed: config.approach_speed,
            settle_dwell: config.settle_dwell,
        }
    }
}

/// How a run that did not fault ended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    Converged { offset: f64 },
    /// The search asked for `height`, which is below the safe minimum.
    SafetyLimitReached { height: f64 },
    TestBudgetExhausted { tests: u32 },
    Cancelled,
}

/// The product of a completed run. Read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationResult {
    pub outcome: RunOutcome,
    pub probe_point: Position,
    pub records: Vec<TestRecord>,
}

impl CalibrationResult {
    pub fn offset(&self) -> Option<f64> {
        match self.outcome {
            RunOutcome::Converged { offset } => Some(offset),
            _ => None,
        }
    }
}

pub struct CalibrationRun<M, S, R> {
    settings: RunSettings,
    motion: M,
    source: S,
    sink: R,
    cancel: Option<Receiver<()>>,
}

impl<M, S, R> CalibrationRun<M, S, R>
where
    M: Motion,
    S: SampleSource,
    R: ReportSink,
{
    pub fn new(settings: RunSettings, motion: M, source: S, sink: R) -> Self {
        Self {
            settings,
            motion,
            source,
            sink,
            cancel: None,
        }
    }

    /// Any message on `cancel` stops the run before the next height test.
    pub fn with_cancel(mut self, cancel: Receiver<()>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn into_parts(self) -> (M, S, R) {
        (self.motion, self.source, self.sink)
    }

    /// Runs the calibration to one of its terminal outcomes.
    ///
    /// Input shaping is disabled for the duration of the run. If it was active
    /// beforehand it is restored on every exit path.
    pub fn run(&mut self) -> Result<CalibrationResult, RunError> {
        let mut recorder = DiagnosticRecorder::new(self.settings.record_samples);
        let shaping_was_on = self.motion.disable_shaping();
        let result = self.search_loop(&mut recorder);
        if shaping_was_on {
            self.motion.restore_shaping();
        }

        let p = self.settings.probe_point;
        match result {
            Ok(outcome) => {
                match outcome {
                    RunOutcome::Converged { offset } => {
                        self.sink
                            .report(&format!("probe at {:.4},{:.4} is z={:.6}", p.x, p.y, offset));
                    }
                    RunOutcome::SafetyLimitReached { height } => {
                        warn!("[RUN] safe minimum reached at z={:.4}", height);
                        self.sink.report(&format!(
                            "safe_min_z {:.4} reached (next z={:.4}) before an offset was found",
                            self.settings.safe_min_z, height
                        ));
                    }
                    RunOutcome::TestBudgetExhausted { tests } => {
                        warn!("[RUN] test budget exhausted after {} heights", tests);
                        self.sink
                            .report(&format!("no offset found after {} tested heights", tests));
                    }
                    RunOutcome::Cancelled => {
                        self.sink.report("calibration cancelled");
                    }
                }
                info!("[RUN] finished: {:?} after {} heights", outcome, recorder.len());
                Ok(CalibrationResult {
                    outcome,
                    probe_point: p,
                    records: recorder.into_records(),
                })
            }
            Err(fault) => {
                self.sink.report(&format!("calibration aborted: {}", fault));
                Err(RunError {
                    fault,
                    records: recorder.into_records(),
                })
            }
        }
    }

    fn cancel_requested(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| rx.try_recv().is_ok())
    }

    fn settle_at(&mut self, target: Position) -> Result<(), RunFault> {
        self.motion.move_to(target, self.settings.approach_speed)?;
        self.motion.wait_until_settled();
        self.motion.dwell(self.settings.settle_dwell);
        Ok(())
    }

    fn search_loop(&mut self, recorder: &mut DiagnosticRecorder) -> Result<RunOutcome, RunFault> {
        let s = self.settings.clone();
        self.settle_at(s.probe_point)?;

        let driver = OscillationDriver::configure(
            s.frequency,
            s.accel_per_hz,
            self.motion.current_position(),
            Z_AXIS,
        );
        driver.arm(&mut self.motion)?;
        let mut acquirer = SignalAcquirer::new(driver);
        let mut search = StepSearch::new(s.probe_point.z, s.step, s.min_precision);
        let mut height = search.next_height();
        let mut tests = 0u32;

        loop {
            if let Some(offset) = search.state().converged_offset() {
                return Ok(RunOutcome::Converged { offset });
            }
            if height < s.safe_min_z {
                return Ok(RunOutcome::SafetyLimitReached { height });
            }
            if tests >= s.max_tests {
                return Ok(RunOutcome::TestBudgetExhausted { tests });
            }
            if self.cancel_requested() {
                return Ok(RunOutcome::Cancelled);
            }

            self.settle_at(s.probe_point.with_z(height))?;
            acquirer.driver_mut().recenter(self.motion.current_position());

            let measurement = match acquirer.measure(
                &mut self.motion,
                &mut self.source,
                s.cycles_per_test,
                s.amplitude_threshold,
            ) {
                Ok(m) => m,
                Err(MeasureError { fault, partial }) => {
                    if let Some(m) = partial {
                        recorder.record(height, m);
                    }
                    return Err(fault);
                }
            };
            tests += 1;

            let samples = measurement.sample_count();
            let rate = measurement.rate_above_threshold;
            self.sink.report(&format!(
                "Testing Z: {:.4}. Received {} samples in {:.2} seconds. Percentage above threshold: {:.1}%",
                height,
                samples,
                measurement.series.duration(),
                100.0 * rate
            ));
            recorder.record(height, measurement);

            if samples == 0 {
                warn!("[RUN] no samples at z={:.4}", height);
                return Err(RunFault::NoSamples { height });
            }

            let detected = rate >= s.decision_level;
            info!("[RUN] z={:.4} rate={:.4} detected={}", height, rate, detected);
            search.report_outcome(height, detected)?;
            height = search.next_height();
        }
    }
}
