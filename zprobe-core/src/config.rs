//! # Probe Configuration
//!
//! The `[resonance_z_probe]` settings, loaded from JSON and checked against
//! the ranges the probe is known to work in. Unset fields take the defaults
//! below; only `probe_points` is required.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::motion::Position;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Acceleration per Hz of oscillation, mm/s²/Hz. The product with the
    /// frequency may be capped by the printer's own acceleration limit.
    pub accel_per_hz: f64,
    /// Initial search step in mm.
    pub step_size: f64,
    /// Search precision in mm; the search stops once the step is this small.
    pub samples_tolerance: f64,
    /// Oscillation frequency in Hz.
    pub z_vibration_freq: f64,
    /// Z acceleration (after median removal) that counts as a tap sample.
    pub amplitude_threshold: f64,
    /// Fraction of tap samples at or above which contact is detected.
    pub rate_above_threshold: f64,
    /// The search gives up below this height.
    pub safe_min_z: f64,
    /// X, Y and starting Z of the probe point.
    pub probe_points: Vec<f64>,
    pub cycle_per_test: u32,
    /// Upper bound on the number of tested heights.
    pub max_tests: u32,
    /// Keep every raw sample for the diagnostic export.
    pub record_samples: bool,
    /// Speed of the initial move to the probe point, mm/s.
    pub approach_speed: f64,
    /// Dwell after reaching a test height, seconds.
    pub settle_dwell: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            accel_per_hz: 1.5,
            step_size: 0.01,
            samples_tolerance: 0.005,
            z_vibration_freq: 80.0,
            amplitude_threshold: 700.0,
            rate_above_threshold: 0.015,
            safe_min_z: 1.0,
            probe_points: Vec::new(),
            cycle_per_test: 50,
            max_tests: 200,
            record_samples: true,
            approach_speed: 50.0,
            settle_dwell: 0.5,
        }
    }
}

fn check(
    field: &'static str,
    value: f64,
    ok: bool,
    expected: &'static str,
) -> Result<(), ConfigError> {
    if ok && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            expected,
        })
    }
}

impl ProbeConfig {
    /// Reads, parses and validates a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: ProbeConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the first setting outside its accepted range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check("accel_per_hz", self.accel_per_hz, self.accel_per_hz > 0.0, "> 0")?;
        check("step_size", self.step_size, self.step_size >= 0.005, ">= 0.005")?;
        check(
            "samples_tolerance",
            self.samples_tolerance,
            self.samples_tolerance > 0.0,
            "> 0",
        )?;
        check(
            "z_vibration_freq",
            self.z_vibration_freq,
            (50.0..=200.0).contains(&self.z_vibration_freq),
            "within [50, 200]",
        )?;
        check(
            "amplitude_threshold",
            self.amplitude_threshold,
            self.amplitude_threshold > 500.0,
            "> 500",
        )?;
        check(
            "rate_above_threshold",
            self.rate_above_threshold,
            (0.0..=1.0).contains(&self.rate_above_threshold),
            "within [0, 1]",
        )?;
        check("safe_min_z", self.safe_min_z, true, "finite")?;
        let cycles = f64::from(self.cycle_per_test);
        check(
            "cycle_per_test",
            cycles,
            (2..=500).contains(&self.cycle_per_test),
            "within [2, 500]",
        )?;
        check("max_tests", f64::from(self.max_tests), self.max_tests >= 1, ">= 1")?;
        check(
            "approach_speed",
            self.approach_speed,
            self.approach_speed > 0.0,
            "> 0",
        )?;
        check(
            "settle_dwell",
            self.settle_dwell,
            self.settle_dwell >= 0.0,
            ">= 0",
        )?;

        if self.probe_points.len() != 3 {
            return Err(ConfigError::ProbePoints(self.probe_points.len()));
        }
        for &coord in &self.probe_points {
            check("probe_points", coord, true, "finite")?;
        }
        Ok(())
    }

    /// The probe point as a position. Call after [`ProbeConfig::validate`].
    pub fn probe_point(&self) -> Position {
        match self.probe_points.as_slice() {
            [x, y, z] => Position::new(*x, *y, *z),
            _ => Position::default(),
        }
    }
}
