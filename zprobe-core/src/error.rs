//! # Fault Taxonomy
//!
//! Every way a calibration run can fail. Motion and acquisition faults come
//! from the collaborators, `InvalidState` flags a caller bug in the search
//! controller, and `RunError` is what a run hands back when it aborts.
//!
//! Reaching the safe minimum height is *not* an error; see
//! [`crate::run::RunOutcome::SafetyLimitReached`].

use thiserror::Error;

use crate::recorder::TestRecord;

/// The motion collaborator could not complete a command.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MotionFault {
    #[error("move to ({x:.4}, {y:.4}, {z:.4}) failed: {reason}")]
    MoveFailed { x: f64, y: f64, z: f64, reason: String },
    #[error("motion system rejected command: {0}")]
    Rejected(String),
}

/// The accelerometer collaborator could not open or cleanly close a session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AcquisitionFault {
    #[error("could not start sample session: {0}")]
    StartFailed(String),
    #[error("sample session {session} did not close cleanly: {reason}")]
    CloseFailed { session: u64, reason: String },
}

/// The search controller was fed an outcome after it had converged.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("search already converged at z={offset:.6}, outcome for z={height:.6} rejected")]
pub struct InvalidState {
    pub offset: f64,
    pub height: f64,
}

/// A configuration value is outside its accepted range.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("`{field}` = {value} is out of range: {expected}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },
    #[error("`probe_points` needs exactly 3 coordinates, got {0}")]
    ProbePoints(usize),
    #[error("could not read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The fatal part of a run failure, without the diagnostic log.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunFault {
    #[error(transparent)]
    Motion(#[from] MotionFault),
    #[error(transparent)]
    Acquisition(#[from] AcquisitionFault),
    #[error(transparent)]
    InvalidState(#[from] InvalidState),
    #[error("no samples recorded at z={height:.4}")]
    NoSamples { height: f64 },
}

/// A run that stopped on a fatal fault, carrying everything tested so far.
#[derive(Debug, Error)]
#[error("calibration aborted after {} tested heights: {fault}", .records.len())]
pub struct RunError {
    pub fault: RunFault,
    pub records: Vec<TestRecord>,
}
