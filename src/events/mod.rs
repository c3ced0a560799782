//! Controller lifecycle events
//!
//! Events are produced on a controller's command worker and delivered to
//! listeners by that controller's [`EventDispatcher`] on a separate thread,
//! in emission order.

mod dispatcher;

pub use dispatcher::{EventDispatcher, ListenerId};

use crate::clock::MediaTime;
use crate::engine::EngineNotice;
use crate::player::{ControllerId, ControllerState, Transition};
use crate::utils::error::HookError;
use serde::{Serialize, Serializer};

/// Event emitted by a controller
#[derive(Debug, Clone, Serialize)]
pub struct ControllerEvent {
    pub source: ControllerId,
    pub kind: EventKind,
}

/// What happened
#[derive(Debug, Clone, Serialize)]
pub enum EventKind {
    /// Entered a transitional state
    Transition(Transition),

    RealizeComplete(Transition),

    PrefetchComplete(Transition),

    Start {
        transition: Transition,
        requested: Option<MediaTime>,
        media_time: MediaTime,
    },

    StopByRequest {
        transition: Transition,
        media_time: MediaTime,
    },

    EndOfMedia {
        transition: Transition,
        media_time: MediaTime,
    },

    Deallocate {
        transition: Transition,
        media_time: MediaTime,
    },

    RateChange {
        rate: f32,
    },

    MediaTimeSet {
        media_time: MediaTime,
    },

    /// The exclusive engine resource is held by another controller
    ResourceUnavailable {
        message: String,
    },

    /// A handler hook failed; the transition did not complete
    Error {
        #[serde(serialize_with = "serialize_display")]
        error: HookError,
        state: ControllerState,
    },

    /// Engine notification relayed to listeners
    Notice(EngineNotice),

    Closed,
}

fn serialize_display<S: Serializer>(error: &HookError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

impl ControllerEvent {
    pub fn new(source: ControllerId, kind: EventKind) -> Self {
        Self { source, kind }
    }

    /// State transition described by this event, if any
    pub fn transition(&self) -> Option<Transition> {
        match &self.kind {
            EventKind::Transition(t)
            | EventKind::RealizeComplete(t)
            | EventKind::PrefetchComplete(t) => Some(*t),
            EventKind::Start { transition, .. }
            | EventKind::StopByRequest { transition, .. }
            | EventKind::EndOfMedia { transition, .. }
            | EventKind::Deallocate { transition, .. } => Some(*transition),
            _ => None,
        }
    }

    /// Media time carried by this event, if any
    pub fn media_time(&self) -> Option<MediaTime> {
        match &self.kind {
            EventKind::Start { media_time, .. }
            | EventKind::StopByRequest { media_time, .. }
            | EventKind::EndOfMedia { media_time, .. }
            | EventKind::Deallocate { media_time, .. }
            | EventKind::MediaTimeSet { media_time } => Some(*media_time),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self.kind,
            EventKind::Error { .. } | EventKind::ResourceUnavailable { .. }
        )
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self.kind {
            EventKind::Transition(_) => "Transition",
            EventKind::RealizeComplete(_) => "RealizeComplete",
            EventKind::PrefetchComplete(_) => "PrefetchComplete",
            EventKind::Start { .. } => "Start",
            EventKind::StopByRequest { .. } => "StopByRequest",
            EventKind::EndOfMedia { .. } => "EndOfMedia",
            EventKind::Deallocate { .. } => "Deallocate",
            EventKind::RateChange { .. } => "RateChange",
            EventKind::MediaTimeSet { .. } => "MediaTimeSet",
            EventKind::ResourceUnavailable { .. } => "ResourceUnavailable",
            EventKind::Error { .. } => "Error",
            EventKind::Notice(_) => "Notice",
            EventKind::Closed => "Closed",
        }
    }
}

/// Receives controller events on the dispatcher thread
pub trait ControllerListener: Send + Sync {
    fn controller_update(&self, event: &ControllerEvent);
}

impl<F> ControllerListener for F
where
    F: Fn(&ControllerEvent) + Send + Sync,
{
    fn controller_update(&self, event: &ControllerEvent) {
        self(event)
    }
}
