//! Controller lifecycle states and the observable status snapshot

use crate::clock::{MediaTime, TimeReference};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique identity of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ControllerId(u64);

impl ControllerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player-{}", self.0)
    }
}

/// Controller lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerState {
    Unrealized,
    Realizing,
    Realized,
    Prefetching,
    Prefetched,
    Started,
    /// Terminal
    Closed,
}

/// One forward step of the lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Realize,
    Prefetch,
    Start,
}

impl ControllerState {
    /// Transitional states only exist while a command is running
    pub fn is_transitional(self) -> bool {
        matches!(self, ControllerState::Realizing | ControllerState::Prefetching)
    }

    /// States in which the engine is positioned on the media
    pub fn is_positioned(self) -> bool {
        matches!(self, ControllerState::Prefetched | ControllerState::Started)
    }

    /// Next step needed to reach `target`, or `None` if already there (or past it)
    pub fn step_toward(self, target: ControllerState) -> Option<Step> {
        use ControllerState::*;

        let step = match self {
            Unrealized | Realizing => Step::Realize,
            Realized | Prefetching => Step::Prefetch,
            Prefetched => Step::Start,
            Started | Closed => return None,
        };

        let needed = match (step, target) {
            (Step::Realize, Realized | Prefetched | Started) => true,
            (Step::Prefetch, Prefetched | Started) => true,
            (Step::Start, Started) => true,
            _ => false,
        };

        needed.then_some(step)
    }

    /// Stable state that a failed step falls back to
    pub fn settled(self) -> ControllerState {
        match self {
            ControllerState::Realizing => ControllerState::Unrealized,
            ControllerState::Prefetching => ControllerState::Realized,
            other => other,
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A `previous -> current (target)` transition carried by events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub previous: ControllerState,
    pub current: ControllerState,
    pub target: ControllerState,
}

impl Transition {
    pub fn new(previous: ControllerState, current: ControllerState, target: ControllerState) -> Self {
        Self {
            previous,
            current,
            target,
        }
    }

    /// Transition that leaves `state` unchanged
    pub fn unchanged(state: ControllerState) -> Self {
        Self::new(state, state, state)
    }
}

/// Mutable controller fields, guarded by the controller's lock
#[derive(Debug, Clone)]
pub(crate) struct CoreState {
    pub state: ControllerState,
    pub target_state: ControllerState,
    pub rate: f32,
    pub stop_time: Option<MediaTime>,
    pub reference: TimeReference,
    /// Handler's duration after the last command
    pub duration: Option<MediaTime>,
}

impl Default for CoreState {
    fn default() -> Self {
        Self {
            state: ControllerState::Unrealized,
            target_state: ControllerState::Unrealized,
            rate: 1.0,
            stop_time: None,
            reference: TimeReference::default(),
            duration: None,
        }
    }
}

impl CoreState {
    /// Current position; extrapolated only while the clock runs
    pub fn media_time(&self, now: i64) -> MediaTime {
        if self.state == ControllerState::Started {
            self.reference.position(now, self.rate)
        } else {
            self.reference.base_media_time
        }
    }

    pub fn snapshot(&self, now: i64) -> ControllerStatus {
        ControllerStatus {
            state: self.state,
            target_state: self.target_state,
            rate: self.rate,
            stop_time: self.stop_time,
            media_time: self.media_time(now),
        }
    }
}

/// Coherent copy of the controller's observable fields
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControllerStatus {
    pub state: ControllerState,
    pub target_state: ControllerState,
    pub rate: f32,
    pub stop_time: Option<MediaTime>,
    pub media_time: MediaTime,
}
