//! Playback controller module for DiscPlayer
//!
//! A [`Controller`] owns one playback session. Public calls validate their
//! arguments on the caller's thread, then post commands to the controller's
//! single worker, which drives the lifecycle through the handler's
//! [`EngineHooks`] and publishes the outcome as events.

mod builder;
mod command;
mod controller;
mod state;

pub use builder::ControllerBuilder;
pub use controller::Controller;
pub use state::{ControllerId, ControllerState, ControllerStatus, Step, Transition};

pub(crate) use command::Command;
pub(crate) use state::CoreState;

use crate::clock::MediaTime;
use crate::controls::Controls;
use crate::engine::EngineNotice;
use crate::resource::ResourceKind;
use crate::utils::error::HookResult;

/// Controller fields visible to a hook while it runs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HookContext {
    pub id: ControllerId,
    pub state: ControllerState,
    pub rate: f32,
    /// Reference position of the time pair
    pub base_media_time: MediaTime,
    /// Position extrapolated to the moment the hook was called
    pub media_time: MediaTime,
}

/// What the controller should do after a handler saw an engine notice
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoticeOutcome {
    /// Drop it
    Ignored,
    /// Re-publish it to listeners
    Handled,
    /// The engine changed the playback rate on its own
    RateChanged(f32),
    /// Presentation of the current source ended
    EndOfMedia,
}

/// Source-specific engine operations driven by a [`Controller`]
///
/// Every hook runs on the controller's worker thread, one at a time, and
/// may block on the media engine for the duration of the call.
pub trait EngineHooks: Send + 'static {
    /// Handler-specific command payload, see [`Controller::run_action`]
    type Action: Send + 'static;

    /// Handler state readable while a command runs, see [`Controller::view`]
    type View: Send + Sync + 'static;

    /// Capability objects published by this handler
    fn controls(&self) -> Controls;

    /// Shared handle onto the state the handler publishes; taken once at build
    ///
    /// The handler keeps it current from inside its hooks.
    fn view(&self) -> Self::View;

    /// Exclusive resource needed to prefetch, if any
    fn resource(&self) -> Option<ResourceKind> {
        None
    }

    /// Connect to the source
    fn do_realize(&mut self, ctx: &HookContext) -> HookResult<()>;

    /// Position the engine on the source
    ///
    /// # Returns
    ///
    /// The engine's position if it differs from `ctx.base_media_time`
    fn do_prefetch(&mut self, ctx: &HookContext) -> HookResult<Option<MediaTime>>;

    /// Begin presentation
    ///
    /// # Arguments
    ///
    /// * `ctx` - Controller fields at the time of the call
    /// * `requested` - Position the caller asked to start at, if any
    ///
    /// # Returns
    ///
    /// The position presentation actually started at
    fn do_start(&mut self, ctx: &HookContext, requested: Option<MediaTime>) -> HookResult<MediaTime>;

    /// Halt presentation
    fn do_stop(&mut self, ctx: &HookContext) -> HookResult<()>;

    /// Give back what prefetch acquired
    fn do_deallocate(&mut self, ctx: &HookContext);

    /// Release everything; the handler is not used again
    fn do_close(&mut self);

    /// Move to `time`
    ///
    /// # Returns
    ///
    /// The position the source actually moved to
    fn do_seek_time(&mut self, ctx: &HookContext, time: MediaTime) -> HookResult<MediaTime>;

    /// Change the playback rate
    ///
    /// # Returns
    ///
    /// The rate now in effect
    fn do_set_rate(&mut self, ctx: &HookContext, rate: f32) -> HookResult<f32>;

    /// Length of the current source, when known
    fn duration(&self) -> Option<MediaTime>;

    /// Interpret an engine notice
    fn on_notice(&mut self, _ctx: &HookContext, _notice: &EngineNotice) -> NoticeOutcome {
        NoticeOutcome::Handled
    }

    /// Execute a handler-specific command
    ///
    /// # Returns
    ///
    /// A new reference position for the controller's clock, if the action moved it
    fn do_action(&mut self, ctx: &HookContext, action: Self::Action) -> Option<MediaTime>;
}
