//! # Signal Acquisition Module
//!
//! Records accelerometer data while the oscillation driver shakes the axis at
//! one fixed height, and reduces the recording to a single figure: the
//! fraction of samples whose Z acceleration exceeds an amplitude threshold.
//!
//! ## Pipeline
//! 1. Open a sample session on the [`SampleSource`]
//! 2. Run the requested number of oscillation cycles
//! 3. Close the session (always, even when a cycle failed)
//! 4. Drain the recorded samples
//! 5. Subtract each axis' median and count `|z| > threshold`

use crossbeam_channel::Receiver;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::RawSample;
use crate::error::{AcquisitionFault, RunFault};
use crate::motion::Motion;
use crate::oscillation::OscillationDriver;

/// An open recording on the accelerometer. Samples arrive on the channel
/// while the session is open; the source drops its sender when the session
/// ends, so draining afterwards always terminates.
#[derive(Debug)]
pub struct SessionHandle {
    id: u64,
    samples: Receiver<RawSample>,
}

impl SessionHandle {
    pub fn new(id: u64, samples: Receiver<RawSample>) -> Self {
        Self { id, samples }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Access to the accelerometer's recording sessions.
pub trait SampleSource {
    fn start_session(&mut self) -> Result<SessionHandle, AcquisitionFault>;

    /// Stops recording. The handle stays readable afterwards.
    fn end_session(&mut self, handle: &SessionHandle) -> Result<(), AcquisitionFault>;

    /// Lazily yields every sample recorded in the session. Exhausted after one pass.
    ///
    /// Blocks on batches the sensor is still flushing and ends once the source
    /// has dropped the session's sender.
    fn retrieve_samples<'a>(
        &mut self,
        handle: &'a SessionHandle,
    ) -> Box<dyn Iterator<Item = RawSample> + 'a> {
        Box::new(handle.samples.iter())
    }
}

/// Per-axis time series of one recording.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisSeries {
    pub time: Vec<f64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

impl AxisSeries {
    pub fn from_samples<I: IntoIterator<Item = RawSample>>(samples: I) -> Self {
        let mut series = AxisSeries::default();
        for s in samples {
            series.time.push(s.time);
            series.x.push(s.x);
            series.y.push(s.y);
            series.z.push(s.z);
        }
        series
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Seconds between the first and the last sample.
    pub fn duration(&self) -> f64 {
        match (self.time.first(), self.time.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    /// Removes the DC offset of every axis by subtracting its median.
    ///
    /// The median is used instead of the mean so that the few large spikes
    /// produced by a tap do not shift the baseline.
    pub fn remove_median(&mut self) {
        for axis in [&mut self.x, &mut self.y, &mut self.z] {
            if let Some(m) = median(axis) {
                axis.iter_mut().for_each(|v| *v -= m);
            }
        }
    }
}

/// Median of a slice; the mean of the two middle values for even lengths.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some(0.5 * (sorted[mid - 1] + sorted[mid]))
    } else {
        Some(sorted[mid])
    }
}

/// Fraction of values with `|v| > threshold`. An empty slice yields `0.0`.
pub fn fraction_above(values: &[f64], threshold: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let above = values.iter().filter(|v| v.abs() > threshold).count();
    above as f64 / values.len() as f64
}

/// The reduced result of one recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Median-subtracted samples.
    pub series: AxisSeries,
    /// Fraction of Z samples above the amplitude threshold, in `[0, 1]`.
    pub rate_above_threshold: f64,
}

impl Measurement {
    /// Reduces raw samples to a measurement. Pure in the samples and threshold.
    pub fn reduce<I: IntoIterator<Item = RawSample>>(samples: I, amplitude_threshold: f64) -> Self {
        let mut series = AxisSeries::from_samples(samples);
        series.remove_median();
        let rate_above_threshold = fraction_above(&series.z, amplitude_threshold);
        Self {
            series,
            rate_above_threshold,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.series.len()
    }
}

/// A failed measurement together with whatever was recorded before the failure.
#[derive(Debug)]
pub struct MeasureError {
    pub fault: RunFault,
    pub partial: Option<Measurement>,
}

/// Drives oscillation bursts while recording, then reduces the recording.
#[derive(Debug, Clone)]
pub struct SignalAcquirer {
    driver: OscillationDriver,
}

impl SignalAcquirer {
    pub fn new(driver: OscillationDriver) -> Self {
        Self { driver }
    }

    pub fn driver_mut(&mut self) -> &mut OscillationDriver {
        &mut self.driver
    }

    /// Runs `cycles` oscillation cycles inside one sample session and reduces
    /// the recording against `amplitude_threshold`.
    ///
    /// The session is closed before the metric is computed on every path past
    /// a successful start. When a cycle or the close fails, the samples that
    /// were recorded are still reduced and returned in [`MeasureError::partial`].
    pub fn measure<M, S>(
        &self,
        motion: &mut M,
        source: &mut S,
        cycles: u32,
        amplitude_threshold: f64,
    ) -> Result<Measurement, MeasureError>
    where
        M: Motion + ?Sized,
        S: SampleSource + ?Sized,
    {
        let handle = source.start_session().map_err(|fault| MeasureError {
            fault: fault.into(),
            partial: None,
        })?;
        debug!("[ACQUIRE] session {} open, {} cycles", handle.id(), cycles);

        let shaken = (0..cycles).try_for_each(|_| self.driver.one_cycle(&mut *motion));
        let closed = source.end_session(&handle);
        let measurement = Measurement::reduce(source.retrieve_samples(&handle), amplitude_threshold);
        debug!(
            "[ACQUIRE] session {} closed with {} samples",
            handle.id(),
            measurement.sample_count()
        );

        if let Err(fault) = shaken {
            if let Err(close_fault) = closed {
                warn!("[ACQUIRE] {} (after motion fault)", close_fault);
            }
            return Err(MeasureError {
                fault: fault.into(),
                partial: Some(measurement),
            });
        }
        if let Err(fault) = closed {
            return Err(MeasureError {
                fault: fault.into(),
                partial: Some(measurement),
            });
        }
        Ok(measurement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MotionFault;
    use crate::motion::Position;
    use crate::oscillation::Z_AXIS;
    use crossbeam_channel::Sender;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_median_ignores_single_spike() {
        let mut series = AxisSeries::from_samples(
            [10.0, 10.0, 10.0, 10.0, 5000.0]
                .iter()
                .enumerate()
                .map(|(i, &z)| RawSample::new(i as f64, 0.0, 0.0, z)),
        );
        series.remove_median();
        assert_eq!(series.z, vec![0.0, 0.0, 0.0, 0.0, 4990.0]);
    }

    #[test]
    fn test_zero_samples_yield_zero_rate() {
        let m = Measurement::reduce(Vec::new(), 700.0);
        assert_eq!(m.rate_above_threshold, 0.0);
        assert_eq!(m.sample_count(), 0);
        assert_eq!(m.series.duration(), 0.0);
    }

    #[test]
    fn test_threshold_is_strict_and_symmetric() {
        // 3 samples beyond +-700 out of 200, plus one sitting exactly on the threshold
        let mut zs = vec![0.0; 200];
        zs[10] = 900.0;
        zs[20] = -900.0;
        zs[30] = 701.0;
        zs[40] = 700.0;
        let samples = zs.iter().enumerate().map(|(i, &z)| RawSample::new(i as f64, 1.0, 2.0, z));
        let m = Measurement::reduce(samples, 700.0);
        assert!((m.rate_above_threshold - 0.015).abs() < 1e-12);
    }

    #[test]
    fn test_reduce_is_deterministic() {
        let samples: Vec<RawSample> = (0..500)
            .map(|i| {
                let t = i as f64 / 3200.0;
                RawSample::new(t, (t * 7.0).sin(), 3.0, 1000.0 * (t * 500.0).sin())
            })
            .collect();
        let a = Measurement::reduce(samples.clone(), 700.0);
        let b = Measurement::reduce(samples, 700.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_axes_centered_independently() {
        let samples = (0..5).map(|i| RawSample::new(i as f64, 100.0 + i as f64, -50.0, 9800.0));
        let m = Measurement::reduce(samples, 700.0);
        assert_eq!(m.series.x, vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
        assert!(m.series.y.iter().all(|&v| v == 0.0));
        assert!(m.series.z.iter().all(|&v| v == 0.0));
        assert_eq!(m.rate_above_threshold, 0.0);
    }

    #[derive(Default)]
    struct CountingMotion {
        position: Position,
        moves: usize,
    }

    impl Motion for CountingMotion {
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

    /// Buffers quiet samples while open; the tap batch is flushed from a
    /// sensor thread only after the session was closed.
    #[derive(Default)]
    struct LateFlushSource {
        sender: Option<Sender<RawSample>>,
        flusher: Option<thread::JoinHandle<()>>,
    }

    impl SampleSource for LateFlushSource {
        fn start_session(&mut self) -> Result<SessionHandle, AcquisitionFault> {
            let (tx, rx) = crossbeam_channel::unbounded();
            for i in 0..150 {
                tx.send(RawSample::new(i as f64 / 3200.0, 0.0, 0.0, 9806.0)).unwrap();
            }
            self.sender = Some(tx);
            Ok(SessionHandle::new(1, rx))
        }

        fn end_session(&mut self, _handle: &SessionHandle) -> Result<(), AcquisitionFault> {
            let tx = self.sender.take().unwrap();
            self.flusher = Some(thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                for i in 150..200 {
                    tx.send(RawSample::new(i as f64 / 3200.0, 0.0, 0.0, 5000.0)).unwrap();
                }
            }));
            Ok(())
        }
    }

    #[test]
    fn test_measure_waits_for_samples_flushed_after_close() {
        let driver = OscillationDriver::configure(80.0, 1.5, Position::new(0.0, 0.0, 1.0), Z_AXIS);
        let acquirer = SignalAcquirer::new(driver);
        let mut motion = CountingMotion::default();
        let mut source = LateFlushSource::default();

        let m = acquirer.measure(&mut motion, &mut source, 2, 700.0).unwrap();
        source.flusher.take().unwrap().join().unwrap();

        assert_eq!(m.sample_count(), 200);
        assert!((m.rate_above_threshold - 0.25).abs() < 1e-12);
        assert_eq!(motion.moves, 8);
    }
}
