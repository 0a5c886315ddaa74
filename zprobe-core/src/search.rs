//! # Step Search Controller
//!
//! Decides which height to test next from the outcome of the previous test,
//! and declares the offset found once the step has shrunk to the requested
//! precision and the latest test detected contact.
//!
//! ## Rule
//! - detected: remember the height; converge if `step <= min_precision`,
//!   otherwise continue at `height + step`
//! - not detected: continue at `height - step`, then halve the step
//!
//! The step only ever shrinks on a miss. Detections keep the step and push
//! the search back out of the contact zone at full stride, so the boundary
//! is always approached from the non-contact side.
//!
//! The controller itself has no iteration cap. Bounding the number of tests
//! is up to the caller, see [`crate::run::CalibrationRun`].

use log::debug;

use crate::error::InvalidState;

/// Where the search is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    NotStarted,
    Searching,
    Converged,
}

/// The result of testing one height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub height: f64,
    pub detected: bool,
}

impl Outcome {
    pub fn new(height: f64, detected: bool) -> Self {
        Self { height, detected }
    }
}

/// Immutable snapshot of the search. Transitions return a new state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchState {
    last_tested: Option<Outcome>,
    step: f64,
    min_precision: f64,
    next_height: f64,
    best_candidate: Option<f64>,
    converged_offset: Option<f64>,
}

impl SearchState {
    /// A fresh search that will first test `initial_height`.
    ///
    /// `step` and `min_precision` are expected to be strictly positive.
    pub fn start(initial_height: f64, step: f64, min_precision: f64) -> Self {
        debug_assert!(step > 0.0 && min_precision > 0.0);
        Self {
            last_tested: None,
            step,
            min_precision,
            next_height: initial_height,
            best_candidate: None,
            converged_offset: None,
        }
    }

    /// Applies one test outcome.
    ///
    /// # Errors
    /// [`InvalidState`] if the search has already converged.
    pub fn after(self, outcome: Outcome) -> Result<SearchState, InvalidState> {
        if let Some(offset) = self.converged_offset {
            return Err(InvalidState {
                offset,
                height: outcome.height,
            });
        }

        let h = outcome.height;
        let mut next = SearchState {
            last_tested: Some(outcome),
            ..self
        };
        if outcome.detected {
            next.best_candidate = Some(h);
            if self.step <= self.min_precision {
                next.converged_offset = Some(h);
                next.next_height = h;
            } else {
                next.next_height = h + self.step;
            }
        } else {
            next.next_height = h - self.step;
            next.step = self.step / 2.0;
        }
        Ok(next)
    }

    pub fn phase(&self) -> SearchPhase {
        if self.converged_offset.is_some() {
            SearchPhase::Converged
        } else if self.last_tested.is_some() {
            SearchPhase::Searching
        } else {
            SearchPhase::NotStarted
        }
    }

    /// The height to test next; the converged offset once converged.
    pub fn next_height(&self) -> f64 {
        self.converged_offset.unwrap_or(self.next_height)
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn min_precision(&self) -> f64 {
        self.min_precision
    }

    pub fn last_tested(&self) -> Option<Outcome> {
        self.last_tested
    }

    /// Most recent height at which contact was detected.
    pub fn best_candidate(&self) -> Option<f64> {
        self.best_candidate
    }

    pub fn converged_offset(&self) -> Option<f64> {
        self.converged_offset
    }

    pub fn has_started(&self) -> bool {
        self.last_tested.is_some()
    }

    pub fn is_converged(&self) -> bool {
        self.converged_offset.is_some()
    }
}

/// Mutable wrapper over [`SearchState`] for callers driving a loop.
#[derive(Debug, Clone)]
pub struct StepSearch {
    state: SearchState,
}

impl StepSearch {
    pub fn new(initial_height: f64, step: f64, min_precision: f64) -> Self {
        Self {
            state: SearchState::start(initial_height, step, min_precision),
        }
    }

    pub fn next_height(&self) -> f64 {
        self.state.next_height()
    }

    pub fn report_outcome(&mut self, height: f64, detected: bool) -> Result<(), InvalidState> {
        self.state = self.state.after(Outcome::new(height, detected))?;
        debug!(
            "[SEARCH] z={:.4} detected={} -> next z={:.4} step={:.5} phase={:?}",
            height,
            detected,
            self.state.next_height(),
            self.state.step(),
            self.state.phase()
        );
        Ok(())
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn phase(&self) -> SearchPhase {
        self.state.phase()
    }

    pub fn is_converged(&self) -> bool {
        self.state.is_converged()
    }
}
