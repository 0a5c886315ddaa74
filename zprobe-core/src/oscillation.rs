//! # Oscillation Driver
//!
//! Turns a target frequency and an acceleration-per-Hz figure into a short
//! back-and-forth move pattern about a fixed center. The driver knows nothing
//! about the search; it only shakes the axis when asked.
//!
//! ## Kinematics
//! One quarter period `t = 0.25 / f` is spent accelerating from rest, so with
//! `a = accel_per_hz * f`:
//! - max velocity `v = a * t`
//! - half span `s = 0.5 * a * t²`

use log::{debug, warn};

use crate::error::MotionFault;
use crate::motion::{Motion, Position};

/// Direction used when the configured axis vector is degenerate.
pub const Z_AXIS: Position = Position { x: 0.0, y: 0.0, z: 1.0 };

/// Derived oscillation figures. Inputs are expected to be strictly positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OscillationParameters {
    frequency: f64,
    accel_per_hz: f64,
    max_velocity: f64,
    half_span: f64,
}

impl OscillationParameters {
    pub fn new(frequency: f64, accel_per_hz: f64) -> Self {
        debug_assert!(frequency > 0.0 && accel_per_hz > 0.0);
        let mut params = Self {
            frequency,
            accel_per_hz,
            max_velocity: 0.0,
            half_span: 0.0,
        };
        params.recompute();
        params
    }

    fn recompute(&mut self) {
        let t_seg = 0.25 / self.frequency;
        let accel = self.acceleration();
        self.max_velocity = accel * t_seg;
        self.half_span = 0.5 * accel * t_seg * t_seg;
    }

    pub fn set_frequency(&mut self, frequency: f64) {
        self.frequency = frequency;
        self.recompute();
    }

    pub fn set_accel_per_hz(&mut self, accel_per_hz: f64) {
        self.accel_per_hz = accel_per_hz;
        self.recompute();
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn accel_per_hz(&self) -> f64 {
        self.accel_per_hz
    }

    /// Peak acceleration in mm/s².
    pub fn acceleration(&self) -> f64 {
        self.accel_per_hz * self.frequency
    }

    pub fn max_velocity(&self) -> f64 {
        self.max_velocity
    }

    pub fn half_span(&self) -> f64 {
        self.half_span
    }
}

/// Issues oscillation cycles about a center along a fixed unit axis.
#[derive(Debug, Clone)]
pub struct OscillationDriver {
    params: OscillationParameters,
    center: Position,
    axis: Position,
}

impl OscillationDriver {
    /// Computes the oscillation parameters and records the center position.
    ///
    /// # Arguments
    /// * `frequency` - Oscillation frequency in Hz
    /// * `accel_per_hz` - Acceleration per Hz in mm/s²/Hz
    /// * `center` - Position the cycles return to
    /// * `axis` - Oscillation direction; normalized here
    pub fn configure(frequency: f64, accel_per_hz: f64, center: Position, axis: Position) -> Self {
        let axis = axis.normalized().unwrap_or_else(|| {
            warn!("[OSC] degenerate oscillation axis {:?}, using +Z", axis);
            Z_AXIS
        });
        let params = OscillationParameters::new(frequency, accel_per_hz);
        debug!(
            "[OSC] f={:.1}Hz accel={:.1} v_max={:.4} half_span={:.6}",
            params.frequency(),
            params.acceleration(),
            params.max_velocity(),
            params.half_span()
        );
        Self { params, center, axis }
    }

    pub fn params(&self) -> &OscillationParameters {
        &self.params
    }

    pub fn center(&self) -> Position {
        self.center
    }

    pub fn axis(&self) -> Position {
        self.axis
    }

    /// Moves the oscillation center, e.g. after stepping to a new test height.
    pub fn recenter(&mut self, center: Position) {
        self.center = center;
    }

    /// Pushes the derived acceleration limit to the motion system.
    pub fn arm<M: Motion + ?Sized>(&self, motion: &mut M) -> Result<(), MotionFault> {
        motion.set_acceleration(self.params.acceleration())
    }

    /// The two extreme points of a cycle, `(center + span, center - span)`.
    pub fn extremes(&self) -> (Position, Position) {
        let offset = self.axis * self.params.half_span();
        (self.center + offset, self.center - offset)
    }

    /// Performs one full cycle: out, back, out the other way, back.
    pub fn one_cycle<M: Motion + ?Sized>(&self, motion: &mut M) -> Result<(), MotionFault> {
        let v = self.params.max_velocity();
        let (upper, lower) = self.extremes();
        for extreme in [upper, lower] {
            motion.move_to(extreme, v)?;
            motion.move_to(self.center, v)?;
        }
        motion.wait_until_settled();
        Ok(())
    }
}
