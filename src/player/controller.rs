//! Controller state machine
//!
//! All state changes happen on the controller's command worker. Callers and
//! listeners only ever take the core lock long enough to copy a snapshot, so
//! a reader sees either the state before a command or the state after it.

use super::{
    Command, ControllerBuilder, ControllerId, ControllerState, ControllerStatus, CoreState, EngineHooks,
    HookContext, NoticeOutcome, Step, Transition,
};
use crate::clock::{MediaTime, TimeBase, TimeReference};
use crate::controls::{Control, ControlKind, Controls, GainControl};
use crate::engine::EngineNotice;
use crate::events::{ControllerEvent, ControllerListener, EventDispatcher, EventKind, ListenerId};
use crate::internal_error;
use crate::queue::CommandQueue;
use crate::resource::{ResourceArbiter, ResourceKind};
use crate::utils::config::ControllerConfig;
use crate::utils::error::{DiscPlayerError, HookError, Result};
use log::{debug, error, info, warn};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ControllerState::*;

struct Shared<H: EngineHooks> {
    id: ControllerId,

    /// Lifecycle and timing fields
    core: Mutex<CoreState>,

    /// Held by the worker for the whole of each command; taken before `core`
    handler: Mutex<H>,

    controls: Controls,
    resource: Option<ResourceKind>,
    view: H::View,

    events: EventDispatcher,
    queue: OnceCell<CommandQueue<Command<H::Action>>>,

    /// Set by the first `close()` call
    closing: AtomicBool,
    /// Set once the close command has run; commands are refused from then on
    closed: AtomicBool,

    time_base: Arc<dyn TimeBase>,
    arbiter: Arc<ResourceArbiter>,
    config: ControllerConfig,
}

/// Handle to a playback controller
///
/// Clones share the same controller.
pub struct Controller<H: EngineHooks> {
    shared: Arc<Shared<H>>,
}

impl<H: EngineHooks> Clone for Controller<H> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<H: EngineHooks> fmt::Debug for Controller<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish()
    }
}

impl<H: EngineHooks> Controller<H> {
    pub fn builder(handler: H) -> ControllerBuilder<H> {
        ControllerBuilder::new(handler)
    }

    pub(super) fn spawn(
        handler: H,
        config: ControllerConfig,
        time_base: Arc<dyn TimeBase>,
        arbiter: Arc<ResourceArbiter>,
        listeners: Vec<Arc<dyn ControllerListener>>,
    ) -> Result<Self> {
        let id = ControllerId::next();
        let events = EventDispatcher::new(&format!("{}-events-{}", config.queue_name, id.as_u64()))?;
        for listener in listeners {
            events.add_listener(listener);
        }

        let shared = Arc::new(Shared {
            id,
            core: Mutex::new(CoreState {
                duration: handler.duration(),
                ..CoreState::default()
            }),
            controls: handler.controls(),
            resource: handler.resource(),
            view: handler.view(),
            handler: Mutex::new(handler),
            events,
            queue: OnceCell::new(),
            closing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            time_base,
            arbiter,
            config,
        });

        // The worker must not keep the controller alive on its own
        let weak = Arc::downgrade(&shared);
        let queue = CommandQueue::spawn(&format!("{}-{}", shared.config.queue_name, id.as_u64()), move |command: Command<H::Action>| {
            if let Some(shared) = weak.upgrade() {
                shared.execute(command);
            }
        })?;
        if shared.queue.set(queue).is_err() {
            return Err(internal_error!("command queue for {} initialized twice", id));
        }

        shared.arbiter.register(id);
        info!("Created {}", id);
        Ok(Self { shared })
    }

    pub fn id(&self) -> ControllerId {
        self.shared.id
    }

    pub fn state(&self) -> ControllerState {
        self.shared.core.lock().state
    }

    pub fn target_state(&self) -> ControllerState {
        self.shared.core.lock().target_state
    }

    /// Coherent copy of state, rate and position
    pub fn status(&self) -> ControllerStatus {
        let now = self.shared.now();
        self.shared.core.lock().snapshot(now)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn rate(&self) -> f32 {
        self.shared.core.lock().rate
    }

    /// Current media position; never blocks on the worker
    pub fn media_time(&self) -> MediaTime {
        let now = self.shared.now();
        self.shared.core.lock().media_time(now)
    }

    pub fn media_nanoseconds(&self) -> i64 {
        self.media_time().as_nanos()
    }

    pub fn sync_time(&self) -> MediaTime {
        self.media_time()
    }

    /// Length of the current source, as the handler last reported it
    pub fn duration(&self) -> Option<MediaTime> {
        self.shared.core.lock().duration
    }

    pub fn stop_time(&self) -> Option<MediaTime> {
        self.shared.core.lock().stop_time
    }

    /// Record a stop time; it is reported back but does not stop presentation
    pub fn set_stop_time(&self, stop_time: Option<MediaTime>) -> Result<()> {
        self.require_realized("set_stop_time")?;
        self.shared.core.lock().stop_time = stop_time;
        Ok(())
    }

    pub fn start_latency(&self) -> Result<Duration> {
        self.require_realized("start_latency")?;
        Ok(self.shared.config.start_latency())
    }

    pub fn time_base(&self) -> Result<Arc<dyn TimeBase>> {
        self.require_realized("time_base")?;
        Ok(Arc::clone(&self.shared.time_base))
    }

    /// Media time corresponding to the running clock
    pub fn map_to_time_base(&self, _time: MediaTime) -> Result<MediaTime> {
        if self.state() != Started {
            return Err(DiscPlayerError::ClockStopped);
        }
        Ok(self.media_time())
    }

    pub fn gain_control(&self) -> Result<Option<Arc<GainControl>>> {
        self.require_realized("gain_control")?;
        Ok(self.shared.controls.gain(ControlKind::OverallGain))
    }

    pub fn controls(&self) -> &Controls {
        &self.shared.controls
    }

    pub fn control(&self, kind: ControlKind) -> Option<&Control> {
        self.shared.controls.get(kind)
    }

    pub fn control_by_name(&self, name: &str) -> Option<&Control> {
        self.shared.controls.by_name(name)
    }

    pub fn add_listener<L: ControllerListener + 'static>(&self, listener: L) -> ListenerId {
        self.shared.events.add_listener(Arc::new(listener))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.events.remove_listener(id)
    }

    /// Request `Realized`; returns once queued
    pub fn realize(&self) -> bool {
        self.post(Command::Realize)
    }

    /// Request `Prefetched`, realizing first if needed; returns once queued
    pub fn prefetch(&self) -> bool {
        self.post(Command::Prefetch)
    }

    /// Request `Started` from the current position; returns once queued
    pub fn start(&self) -> bool {
        self.post(Command::Start(None))
    }

    /// Start presentation at `at`; the controller must already be prefetched
    pub fn sync_start(&self, at: MediaTime) -> Result<bool> {
        if self.state() != Prefetched {
            return Err(DiscPlayerError::NotPrefetched("sync_start".to_string()));
        }
        Ok(self.post(Command::Start(Some(at))))
    }

    /// Stop presentation and wait for it
    pub fn stop(&self) -> bool {
        self.post_and_wait(Command::Stop)
    }

    /// Give back the engine resource and wait for it
    pub fn deallocate(&self) -> bool {
        self.post_and_wait(Command::Deallocate)
    }

    /// Stop, deallocate and shut the controller down
    ///
    /// Only the first call does anything.
    pub fn close(&self) {
        if self.shared.closing.swap(true, Ordering::SeqCst) {
            debug!("{} already closing", self.shared.id);
            return;
        }
        info!("Closing {}", self.shared.id);

        self.stop();
        self.deallocate();
        self.post_and_wait(Command::Close);
        self.shared.closed.store(true, Ordering::SeqCst);

        if let Some(queue) = self.shared.queue.get() {
            queue.shutdown();
        }

        let config = &self.shared.config;
        if let Some(outcome) = self
            .shared
            .events
            .shutdown(config.listener_stop_timeout(), config.interrupt_grace())
        {
            debug!("{} listener thread stopped: {:?}", self.shared.id, outcome);
        }
    }

    /// Seek and wait; the position ends up wherever the handler put it
    pub fn set_media_time(&self, time: MediaTime) -> Result<()> {
        self.require_realized("set_media_time")?;
        self.wait_for(Command::SeekTime(time))
    }

    /// Change the rate and wait; returns the rate now in effect
    pub fn set_rate(&self, rate: f32) -> Result<f32> {
        if !rate.is_finite() {
            return Err(DiscPlayerError::InvalidArgument(format!("rate {}", rate)));
        }
        self.require_realized("set_rate")?;
        self.wait_for(Command::SetRate(rate))?;
        Ok(self.rate())
    }

    /// Hand an engine callback to the worker; safe from any thread
    pub fn notify(&self, notice: EngineNotice) -> bool {
        self.post(Command::Notice(notice))
    }

    /// Queue a handler-specific action without waiting
    pub fn post_action(&self, action: H::Action) -> bool {
        self.post(Command::Action(action))
    }

    /// Queue a handler-specific action and wait for it to run
    pub fn run_action(&self, action: H::Action) -> bool {
        self.post_and_wait(Command::Action(action))
    }

    /// State the handler publishes for readers; never waits for a running command
    pub fn view(&self) -> &H::View {
        &self.shared.view
    }

    pub(crate) fn require_realized(&self, operation: &str) -> Result<ControllerState> {
        match self.state() {
            Unrealized => Err(DiscPlayerError::NotRealized(operation.to_string())),
            Closed => Err(DiscPlayerError::Closed),
            state => Ok(state),
        }
    }

    fn wait_for(&self, command: Command<H::Action>) -> Result<()> {
        let name = command.name();
        if self.post_and_wait(command) {
            Ok(())
        } else if self.is_closed() {
            Err(DiscPlayerError::Closed)
        } else {
            Err(internal_error!("{} was not executed by {}", name, self.shared.id))
        }
    }

    fn post(&self, command: Command<H::Action>) -> bool {
        if self.is_closed() {
            debug!("{} is closed, refusing {:?}", self.shared.id, command);
            return false;
        }
        self.shared.queue.get().map(|q| q.post(command)).unwrap_or(false)
    }

    fn post_and_wait(&self, command: Command<H::Action>) -> bool {
        if self.is_closed() {
            debug!("{} is closed, refusing {:?}", self.shared.id, command);
            return false;
        }
        self.shared.queue.get().map(|q| q.post_and_wait(command)).unwrap_or(false)
    }
}

impl<H: EngineHooks> Shared<H> {
    fn now(&self) -> i64 {
        self.time_base.nanoseconds()
    }

    fn context(&self) -> HookContext {
        let now = self.now();
        let core = self.core.lock();
        HookContext {
            id: self.id,
            state: core.state,
            rate: core.rate,
            base_media_time: core.reference.base_media_time,
            media_time: core.media_time(now),
        }
    }

    fn emit(&self, kind: EventKind) {
        self.events.emit(ControllerEvent::new(self.id, kind));
    }

    /// Returns the previous state
    fn set_state(&self, state: ControllerState) -> ControllerState {
        let mut core = self.core.lock();
        std::mem::replace(&mut core.state, state)
    }

    fn settle_target(&self) {
        let mut core = self.core.lock();
        core.target_state = core.state;
    }

    fn execute(&self, command: Command<H::Action>) {
        if self.core.lock().state == Closed {
            debug!("{} closed, dropping {:?}", self.id, command);
            return;
        }
        debug!("{} executing {:?}", self.id, command);

        let mut guard = self.handler.lock();
        let handler = &mut *guard;
        match command {
            Command::Realize => self.advance(handler, Realized, None),
            Command::Prefetch => self.advance(handler, Prefetched, None),
            Command::Start(at) => self.advance(handler, Started, at),
            Command::Stop => self.stop(handler),
            Command::Deallocate => self.deallocate(handler),
            Command::Close => self.close(handler),
            Command::SeekTime(time) => self.seek(handler, time),
            Command::SetRate(rate) => self.change_rate(handler, rate),
            Command::Notice(notice) => self.notice(handler, notice),
            Command::Action(action) => {
                let ctx = self.context();
                let position = handler.do_action(&ctx, action);
                self.publish_duration(handler);
                if let Some(position) = position {
                    self.rebase_at(position);
                }
            }
        }
        self.publish_duration(handler);
    }

    /// Cache the handler's duration for readers; called before events that may reveal it
    fn publish_duration(&self, handler: &H) {
        let duration = handler.duration();
        self.core.lock().duration = duration;
    }

    /// Step toward `target` until it is reached or a step fails
    fn advance(&self, handler: &mut H, target: ControllerState, requested: Option<MediaTime>) {
        let mut stepped = false;
        loop {
            let step = {
                let mut core = self.core.lock();
                let step = core.state.step_toward(target);
                if step.is_some() {
                    core.target_state = target;
                }
                step
            };
            let Some(step) = step else { break };
            stepped = true;

            let completed = match step {
                Step::Realize => self.realize(handler, target),
                Step::Prefetch => self.prefetch(handler, target),
                Step::Start => self.start(handler, requested),
            };
            if !completed {
                return;
            }
        }

        if !stepped {
            self.report_unchanged(target, requested);
        }
    }

    fn report_unchanged(&self, target: ControllerState, requested: Option<MediaTime>) {
        let now = self.now();
        let (state, media_time) = {
            let core = self.core.lock();
            (core.state, core.media_time(now))
        };
        let transition = Transition::unchanged(state);
        let kind = match target {
            Realized => EventKind::RealizeComplete(transition),
            Prefetched => EventKind::PrefetchComplete(transition),
            _ => EventKind::Start {
                transition,
                requested,
                media_time,
            },
        };
        self.emit(kind);
    }

    fn realize(&self, handler: &mut H, target: ControllerState) -> bool {
        let previous = self.set_state(Realizing);
        self.emit(EventKind::Transition(Transition::new(previous, Realizing, target)));

        let ctx = self.context();
        match handler.do_realize(&ctx) {
            Ok(()) => {
                self.publish_duration(handler);
                self.set_state(Realized);
                info!("{} realized", self.id);
                self.emit(EventKind::RealizeComplete(Transition::new(Realizing, Realized, target)));
                true
            }
            Err(e) => {
                self.fail(Realizing, e);
                false
            }
        }
    }

    fn prefetch(&self, handler: &mut H, target: ControllerState) -> bool {
        if let Some(kind) = self.resource {
            if !self.arbiter.allocate(self.id, kind) {
                let message = match self.arbiter.holder(kind) {
                    Some(holder) => format!("{:?} is held by {}", kind, holder),
                    None => format!("{:?} is unavailable", kind),
                };
                warn!("{} cannot prefetch: {}", self.id, message);
                self.settle_target();
                self.emit(EventKind::ResourceUnavailable { message });
                return false;
            }
        }

        let previous = self.set_state(Prefetching);
        self.emit(EventKind::Transition(Transition::new(previous, Prefetching, target)));

        let ctx = self.context();
        match handler.do_prefetch(&ctx) {
            Ok(position) => {
                let now = self.now();
                {
                    let mut core = self.core.lock();
                    if let Some(position) = position {
                        core.reference = TimeReference::new(position, now);
                    }
                    core.state = Prefetched;
                }
                info!("{} prefetched", self.id);
                self.emit(EventKind::PrefetchComplete(Transition::new(Prefetching, Prefetched, target)));
                true
            }
            Err(e) => {
                self.arbiter.release(self.id);
                self.fail(Prefetching, e);
                false
            }
        }
    }

    fn start(&self, handler: &mut H, requested: Option<MediaTime>) -> bool {
        let ctx = self.context();
        match handler.do_start(&ctx, requested) {
            Ok(actual) => {
                let now = self.now();
                {
                    let mut core = self.core.lock();
                    core.reference = TimeReference::new(actual, now);
                    core.state = Started;
                }
                match requested {
                    Some(at) if at != actual => info!("{} started at {} (requested {})", self.id, actual, at),
                    _ => info!("{} started at {}", self.id, actual),
                }
                self.emit(EventKind::Start {
                    transition: Transition::new(Prefetched, Started, Started),
                    requested,
                    media_time: actual,
                });
                true
            }
            Err(e) => {
                self.fail(Prefetched, e);
                false
            }
        }
    }

    /// Revert a failed step to the last stable state
    fn fail(&self, during: ControllerState, error: HookError) {
        let settled = during.settled();
        {
            let mut core = self.core.lock();
            core.state = settled;
            core.target_state = settled;
        }
        error!("{} failed while {}: {}", self.id, during, error);
        self.emit(EventKind::Error { error, state: settled });
    }

    /// Pin the clock at the current position and enter `state`
    fn freeze(&self, state: ControllerState, limit: Option<MediaTime>) -> MediaTime {
        let now = self.now();
        let mut core = self.core.lock();
        let mut position = core.media_time(now);
        if let Some(limit) = limit {
            position = position.min(limit);
        }
        core.reference = TimeReference::new(position, now);
        core.state = state;
        core.target_state = state;
        position
    }

    fn rebase_at(&self, position: MediaTime) {
        let now = self.now();
        self.core.lock().reference = TimeReference::new(position, now);
    }

    fn stop(&self, handler: &mut H) {
        let ctx = self.context();
        if ctx.state != Started {
            self.emit(EventKind::StopByRequest {
                transition: Transition::unchanged(ctx.state),
                media_time: ctx.media_time,
            });
            return;
        }

        if let Err(e) = handler.do_stop(&ctx) {
            error!("{} failed to stop: {}", self.id, e);
            self.emit(EventKind::Error { error: e, state: Started });
            return;
        }

        let media_time = self.freeze(Prefetched, None);
        info!("{} stopped at {}", self.id, media_time);
        self.emit(EventKind::StopByRequest {
            transition: Transition::new(Started, Prefetched, Prefetched),
            media_time,
        });
    }

    fn deallocate(&self, handler: &mut H) {
        let ctx = self.context();
        self.arbiter.release(self.id);

        let settled = match ctx.state {
            Realizing => Unrealized,
            Prefetching | Prefetched | Started => Realized,
            Unrealized | Realized | Closed => {
                self.emit(EventKind::Deallocate {
                    transition: Transition::unchanged(ctx.state),
                    media_time: ctx.media_time,
                });
                return;
            }
        };

        if ctx.state == Started {
            if let Err(e) = handler.do_stop(&ctx) {
                warn!("{} failed to stop before deallocating: {}", self.id, e);
            }
        }
        handler.do_deallocate(&ctx);

        let media_time = self.freeze(settled, None);
        info!("{} deallocated ({} -> {})", self.id, ctx.state, settled);
        self.emit(EventKind::Deallocate {
            transition: Transition::new(ctx.state, settled, settled),
            media_time,
        });
    }

    fn close(&self, handler: &mut H) {
        handler.do_close();
        self.arbiter.unregister(self.id);

        let previous = {
            let mut core = self.core.lock();
            core.target_state = Closed;
            std::mem::replace(&mut core.state, Closed)
        };
        info!("{} closed (was {})", self.id, previous);
        self.emit(EventKind::Closed);
    }

    fn seek(&self, handler: &mut H, time: MediaTime) {
        let ctx = self.context();
        match handler.do_seek_time(&ctx, time) {
            Ok(actual) => {
                self.rebase_at(actual);
                debug!("{} media time set to {} (requested {})", self.id, actual, time);
                self.emit(EventKind::MediaTimeSet { media_time: actual });
            }
            Err(e) => warn!("{} seek to {} ignored: {}", self.id, time, e),
        }
    }

    fn change_rate(&self, handler: &mut H, rate: f32) {
        let ctx = self.context();
        match handler.do_set_rate(&ctx, rate) {
            Ok(applied) => self.apply_rate(applied),
            Err(e) => warn!("{} rate change to {} ignored: {}", self.id, rate, e),
        }
    }

    fn apply_rate(&self, rate: f32) {
        let now = self.now();
        {
            let mut core = self.core.lock();
            if core.rate == rate {
                return;
            }
            if core.state == Started {
                // Carry the position accumulated at the old rate
                core.reference = core.reference.rebase(now, core.rate);
            }
            core.rate = rate;
        }
        info!("{} rate changed to {}", self.id, rate);
        self.emit(EventKind::RateChange { rate });
    }

    fn notice(&self, handler: &mut H, notice: EngineNotice) {
        let ctx = self.context();
        match handler.on_notice(&ctx, &notice) {
            NoticeOutcome::Ignored => debug!("{} ignored {:?}", self.id, notice),
            NoticeOutcome::Handled => self.emit(EventKind::Notice(notice)),
            NoticeOutcome::RateChanged(rate) => self.apply_rate(rate),
            NoticeOutcome::EndOfMedia => {
                if ctx.state != Started {
                    debug!("{} end of media while {}, ignored", self.id, ctx.state);
                    return;
                }
                if let Err(e) = handler.do_stop(&ctx) {
                    warn!("{} failed to stop at end of media: {}", self.id, e);
                }
                let media_time = self.freeze(Prefetched, handler.duration());
                info!("{} reached end of media at {}", self.id, media_time);
                self.emit(EventKind::EndOfMedia {
                    transition: Transition::new(Started, Prefetched, Prefetched),
                    media_time,
                });
            }
        }
    }
}

impl<H: EngineHooks> Drop for Shared<H> {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            debug!("{} dropped without close", self.id);
            self.arbiter.unregister(self.id);
        }
    }
}
