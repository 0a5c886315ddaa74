//! # Motion Collaborator
//!
//! The positioning system is external to the probe: the core only issues
//! blocking moves through the [`Motion`] trait and reads back where the
//! toolhead ended up. Every method returns only after the command has been
//! accepted, so program order is the only ordering guarantee the core needs.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

use crate::error::MotionFault;

/// A cartesian toolhead position in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Same position with the Z coordinate replaced.
    pub fn with_z(self, z: f64) -> Self {
        Self { z, ..self }
    }

    pub fn norm(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit vector in the same direction, or `None` for the zero vector.
    pub fn normalized(self) -> Option<Self> {
        let n = self.norm();
        if n > 0.0 && n.is_finite() {
            Some(self * (1.0 / n))
        } else {
            None
        }
    }
}

impl Add for Position {
    type Output = Position;
    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Position {
    type Output = Position;
    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Position {
    type Output = Position;
    fn mul(self, k: f64) -> Position {
        Position::new(self.x * k, self.y * k, self.z * k)
    }
}

/// Blocking access to the printer's motion system.
pub trait Motion {
    /// Moves to `target` at no more than `max_velocity` (mm/s).
    fn move_to(&mut self, target: Position, max_velocity: f64) -> Result<(), MotionFault>;

    fn current_position(&self) -> Position;

    /// Pauses the motion queue for `seconds`.
    fn dwell(&mut self, seconds: f64);

    /// Blocks until all queued moves have finished.
    fn wait_until_settled(&mut self);

    /// Sets the acceleration limit (mm/s²) used by subsequent moves.
    fn set_acceleration(&mut self, accel: f64) -> Result<(), MotionFault>;

    /// Turns off input shaping so oscillation moves are executed as issued.
    ///
    /// Returns whether shaping was active before the call.
    fn disable_shaping(&mut self) -> bool {
        false
    }

    /// Re-enables input shaping after [`Motion::disable_shaping`] reported it active.
    fn restore_shaping(&mut self) {}
}
