//! Audio playback clocks that drive viseme scheduling.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioStatus {
    Playing,
    Completed,
    Failed(String),
}

/// One reading of an audio clock.
#[derive(Clone, Debug, PartialEq)]
pub struct ClockSample {
    pub time_ms: f64,
    pub status: AudioStatus,
}

/// Source of the current playback position of the speech audio.
pub trait AudioClock {
    /// Position in milliseconds from the start of the audio.
    fn current_time_ms(&self) -> f64;

    fn status(&self) -> AudioStatus;

    fn sample(&self) -> ClockSample {
        ClockSample {
            time_ms: self.current_time_ms(),
            status: self.status(),
        }
    }
}

#[derive(Debug)]
struct ManualState {
    time_ms: f64,
    status: AudioStatus,
}

/// Clock advanced by the caller. Clones share the same position, so one copy
/// can be handed to a lipsync feature while another drives it.
#[derive(Clone, Debug)]
pub struct ManualClock {
    state: Rc<RefCell<ManualState>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(ManualState {
                time_ms: 0.0,
                status: AudioStatus::Playing,
            })),
        }
    }

    pub fn set_time_ms(&self, time_ms: f64) {
        self.state.borrow_mut().time_ms = time_ms;
    }

    pub fn advance_ms(&self, delta_ms: f64) {
        self.state.borrow_mut().time_ms += delta_ms;
    }

    pub fn complete(&self) {
        self.state.borrow_mut().status = AudioStatus::Completed;
    }

    pub fn fail(&self, reason: impl Into<String>) {
        self.state.borrow_mut().status = AudioStatus::Failed(reason.into());
    }
}

impl AudioClock for ManualClock {
    fn current_time_ms(&self) -> f64 {
        self.state.borrow().time_ms
    }

    fn status(&self) -> AudioStatus {
        self.state.borrow().status.clone()
    }
}
