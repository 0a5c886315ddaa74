//! # Simulated Bed
//!
//! A software stand-in for the printer: a toolhead that moves instantly but
//! keeps a clock, and an accelerometer that records Gaussian noise plus a tap
//! spike whenever a move reaches the bed surface.
//!
//! Both halves share one state, so the accelerometer sees exactly the moves
//! the motion half executed. Used by the `zprobe` binary and the integration
//! tests.

use crossbeam_channel::Sender;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::RawSample;
use crate::acquisition::{SampleSource, SessionHandle};
use crate::error::{AcquisitionFault, MotionFault};
use crate::motion::{Motion, Position};

pub const DEFAULT_SAMPLE_RATE: f64 = 3200.0;
pub const DEFAULT_NOISE: f64 = 100.0;
pub const DEFAULT_TAP_AMPLITUDE: f64 = 3000.0;
/// Static Z reading of a level accelerometer, mm/s².
const GRAVITY: f64 = 9806.65;

struct BedState {
    position: Position,
    surface_z: f64,
    sample_rate: f64,
    noise: f64,
    tap_amplitude: f64,
    clock: f64,
    rng: StdRng,
    session: Option<(u64, Sender<RawSample>)>,
    next_session: u64,
    acceleration: Option<f64>,
    shaping_enabled: bool,
    moves: usize,
    fail_after_moves: Option<usize>,
    fail_on_close: bool,
}

impl BedState {
    fn noise_sample(&mut self, time: f64, spike: f64) -> RawSample {
        let n: [f64; 3] = [
            self.rng.sample(StandardNormal),
            self.rng.sample(StandardNormal),
            self.rng.sample(StandardNormal),
        ];
        RawSample::new(
            time,
            12.0 + self.noise * n[0],
            -8.0 + self.noise * n[1],
            GRAVITY + self.noise * n[2] + spike,
        )
    }

    /// Records `count` samples starting at the current clock and advances it.
    fn emit(&mut self, count: usize, duration: f64, tap: bool) {
        let Some((_, sender)) = self.session.clone() else {
            self.clock += duration;
            return;
        };
        let start = self.clock;
        for i in 0..count {
            let time = start + i as f64 / self.sample_rate;
            let spike = match (tap, count - i) {
                (true, 2) => self.tap_amplitude,
                (true, 1) => -self.tap_amplitude,
                _ => 0.0,
            };
            let sample = self.noise_sample(time, spike);
            let _ = sender.send(sample);
        }
        self.clock = start + duration;
    }

    fn samples_for(&self, duration: f64) -> usize {
        if self.sample_rate > 0.0 {
            (duration * self.sample_rate).round() as usize
        } else {
            0
        }
    }
}

/// Shared simulated printer bed. Cheap to clone.
#[derive(Clone)]
pub struct SimulatedBed {
    state: Arc<Mutex<BedState>>,
}

impl SimulatedBed {
    /// A bed whose surface is at `surface_z`, noise seeded with `seed`.
    pub fn new(surface_z: f64, seed: u64) -> Self {
        let state = BedState {
            position: Position::new(0.0, 0.0, 10.0),
            surface_z,
            sample_rate: DEFAULT_SAMPLE_RATE,
            noise: DEFAULT_NOISE,
            tap_amplitude: DEFAULT_TAP_AMPLITUDE,
            clock: 0.0,
            rng: StdRng::seed_from_u64(seed),
            session: None,
            next_session: 1,
            acceleration: None,
            shaping_enabled: true,
            moves: 0,
            fail_after_moves: None,
            fail_on_close: false,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_sample_rate(self, hz: f64) -> Self {
        self.lock().sample_rate = hz;
        self
    }

    pub fn with_noise(self, sigma: f64) -> Self {
        self.lock().noise = sigma;
        self
    }

    pub fn with_tap_amplitude(self, amplitude: f64) -> Self {
        self.lock().tap_amplitude = amplitude;
        self
    }

    /// Whether the printer starts with input shaping active.
    pub fn with_shaping(self, enabled: bool) -> Self {
        self.lock().shaping_enabled = enabled;
        self
    }

    /// Every move after the first `moves` fails.
    pub fn fail_motion_after(self, moves: usize) -> Self {
        self.lock().fail_after_moves = Some(moves);
        self
    }

    /// Closing a sample session reports a fault (the samples stay readable).
    pub fn fail_on_close(self) -> Self {
        self.lock().fail_on_close = true;
        self
    }

    pub fn motion(&self) -> SimMotion {
        SimMotion { bed: self.clone() }
    }

    pub fn accelerometer(&self) -> SimAccelerometer {
        SimAccelerometer { bed: self.clone() }
    }

    pub fn position(&self) -> Position {
        self.lock().position
    }

    pub fn surface_z(&self) -> f64 {
        self.lock().surface_z
    }

    pub fn acceleration(&self) -> Option<f64> {
        self.lock().acceleration
    }

    pub fn shaping_enabled(&self) -> bool {
        self.lock().shaping_enabled
    }

    pub fn session_open(&self) -> bool {
        self.lock().session.is_some()
    }

    pub fn move_count(&self) -> usize {
        self.lock().moves
    }
}

/// Motion half of a [`SimulatedBed`].
#[derive(Clone)]
pub struct SimMotion {
    bed: SimulatedBed,
}

impl Motion for SimMotion {
    fn move_to(&mut self, target: Position, max_velocity: f64) -> Result<(), MotionFault> {
        let mut st = self.bed.lock();
        if st.fail_after_moves.is_some_and(|limit| st.moves >= limit) {
            return Err(MotionFault::MoveFailed {
                x: target.x,
                y: target.y,
                z: target.z,
                reason: "simulated stepper fault".into(),
            });
        }
        if max_velocity <= 0.0 {
            return Err(MotionFault::Rejected(format!("velocity {max_velocity}")));
        }
        st.moves += 1;

        let from = st.position;
        let distance = (target - from).norm();
        // Accelerate for half the distance, decelerate for the other half.
        let duration = 2.0 * distance / max_velocity;
        let tap = from.z.min(target.z) <= st.surface_z;
        let count = if distance > 0.0 && st.sample_rate > 0.0 {
            st.samples_for(duration).max(1)
        } else {
            0
        };
        st.emit(count, duration, tap && count >= 2);
        st.position = target;
        Ok(())
    }

    fn current_position(&self) -> Position {
        self.bed.position()
    }

    fn dwell(&mut self, seconds: f64) {
        let mut st = self.bed.lock();
        let count = st.samples_for(seconds);
        st.emit(count, seconds, false);
    }

    fn wait_until_settled(&mut self) {}

    fn set_acceleration(&mut self, accel: f64) -> Result<(), MotionFault> {
        if accel <= 0.0 {
            return Err(MotionFault::Rejected(format!("acceleration {accel}")));
        }
        self.bed.lock().acceleration = Some(accel);
        Ok(())
    }

    fn disable_shaping(&mut self) -> bool {
        std::mem::replace(&mut self.bed.lock().shaping_enabled, false)
    }

    fn restore_shaping(&mut self) {
        self.bed.lock().shaping_enabled = true;
    }
}

/// Accelerometer half of a [`SimulatedBed`].
#[derive(Clone)]
pub struct SimAccelerometer {
    bed: SimulatedBed,
}

impl SampleSource for SimAccelerometer {
    fn start_session(&mut self) -> Result<SessionHandle, AcquisitionFault> {
        let mut st = self.bed.lock();
        let id = st.next_session;
        st.next_session += 1;
        let (tx, rx) = crossbeam_channel::unbounded();
        if let Some((stale, _)) = st.session.replace((id, tx)) {
            debug!("[SIM] session {} replaced by {}", stale, id);
        }
        Ok(SessionHandle::new(id, rx))
    }

    fn end_session(&mut self, handle: &SessionHandle) -> Result<(), AcquisitionFault> {
        let mut st = self.bed.lock();
        if st.session.as_ref().is_some_and(|(id, _)| *id == handle.id()) {
            st.session = None;
        }
        if st.fail_on_close {
            return Err(AcquisitionFault::CloseFailed {
                session: handle.id(),
                reason: "simulated sensor timeout".into(),
            });
        }
        Ok(())
    }
}
