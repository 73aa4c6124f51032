//! Fill-threshold playback state machine
//!
//! Transitions depend only on the current state and the readable length
//! compared to the threshold:
//!
//! ```text
//! Uninitialized --initialize--> Ready
//! Ready   | Starved --(readable >= threshold)--> Playing
//! Playing ----------(readable == 0)----------> Starved
//! ```
//!
//! The threshold comparison is inclusive, so a threshold of 0 makes an
//! initialized machine eligible to play on its first evaluation.

use serde::{Deserialize, Serialize};

/// Playback state of a render core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Uninitialized,
    Ready,
    Playing,
    Starved,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Uninitialized => write!(f, "uninitialized"),
            PlaybackState::Ready => write!(f, "ready"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Starved => write!(f, "starved"),
        }
    }
}

/// Next state for `(current, readable, threshold)`, or `None` if nothing changes
pub fn next_state(
    current: PlaybackState,
    readable: usize,
    threshold: usize,
) -> Option<PlaybackState> {
    match current {
        PlaybackState::Uninitialized => None,
        PlaybackState::Playing if readable == 0 => Some(PlaybackState::Starved),
        PlaybackState::Ready | PlaybackState::Starved if readable >= threshold => {
            Some(PlaybackState::Playing)
        }
        _ => None,
    }
}

/// Current state plus threshold
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: PlaybackState,
    threshold: usize,
}

impl StateMachine {
    /// Create a machine in `Uninitialized`
    ///
    /// # Arguments
    /// * `threshold` - Frames that must be readable before `Ready` or
    ///   `Starved` moves to `Playing`
    pub fn new(threshold: usize) -> Self {
        Self {
            state: PlaybackState::Uninitialized,
            threshold,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Takes effect at the next evaluation; the current state is kept
    pub fn set_threshold(&mut self, threshold: usize) {
        self.threshold = threshold;
    }

    /// Leave `Uninitialized`; returns the new state if this was a transition
    pub fn initialize(&mut self) -> Option<PlaybackState> {
        if self.state == PlaybackState::Uninitialized {
            self.state = PlaybackState::Ready;
            Some(self.state)
        } else {
            None
        }
    }

    /// Apply one evaluation; returns the new state if it changed
    pub fn evaluate(&mut self, readable: usize) -> Option<PlaybackState> {
        let next = next_state(self.state, readable, self.threshold)?;
        self.state = next;
        Some(next)
    }
}
