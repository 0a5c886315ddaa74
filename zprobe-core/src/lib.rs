// zprobe-core/src/lib.rs

//! The core logic for the resonance Z probe.
//! This crate is responsible for driving the oscillation bursts, reducing
//! the recorded accelerometer data to a detection decision, and searching
//! for the Z offset at which contact is detected. It is completely headless
//! and talks to the printer only through the collaborator traits in
//! [`motion`], [`acquisition`] and [`sink`].

pub mod acquisition;
pub mod config;
pub mod error;
pub mod motion;
pub mod oscillation;
pub mod recorder;
pub mod run;
pub mod search;
pub mod sim;
pub mod sink;
pub mod spectrum;

use serde::{Deserialize, Serialize};

/// One raw accelerometer reading as delivered by a sample session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Timestamp in seconds.
    pub time: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl RawSample {
    pub fn new(time: f64, x: f64, y: f64, z: f64) -> Self {
        Self { time, x, y, z }
    }
}
