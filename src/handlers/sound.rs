//! Elementary sound playback
//!
//! Sounds are short clips mixed outside the playback engine, so they need
//! no exclusive resource. Rate changes only move the controller's clock.

use super::locator::Locator;
use crate::clock::MediaTime;
use crate::controls::{ControlKind, Controls};
use crate::player::{Controller, EngineHooks, HookContext};
use crate::utils::error::{DiscPlayerError, HookResult, Result};
use crossbeam::channel::{bounded, Sender};
use log::debug;
use parking_lot::RwLock;
use std::sync::Arc;

/// Controller playing a sound clip
pub type SoundPlayer = Controller<SoundHandler>;

const SOUND_CONTROLS: [ControlKind; 3] = [
    ControlKind::MediaTimePosition,
    ControlKind::OverallGain,
    ControlKind::Panning,
];

pub enum SoundAction {
    SetSource {
        locator: Locator,
        duration: Option<MediaTime>,
        reply: Sender<Result<()>>,
    },
}

/// Engine hooks for sound clips
pub struct SoundHandler {
    locator: Locator,
    published: Arc<RwLock<Locator>>,
    duration: Option<MediaTime>,
    controls: Controls,
}

impl SoundHandler {
    pub fn new(locator: &str, duration: Option<MediaTime>) -> Result<Self> {
        let locator = Self::parse(locator)?;
        Ok(Self {
            published: Arc::new(RwLock::new(locator.clone())),
            locator,
            duration,
            controls: Controls::with_kinds(&SOUND_CONTROLS),
        })
    }

    fn parse(locator: &str) -> Result<Locator> {
        let locator: Locator = locator.parse()?;
        if locator.sound_id().is_none() {
            return Err(DiscPlayerError::IncompatibleSource(locator.to_string()));
        }
        Ok(locator)
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    fn clamp(&self, time: MediaTime) -> MediaTime {
        let time = time.max(MediaTime::ZERO);
        match self.duration {
            Some(duration) => time.min(duration),
            None => time,
        }
    }
}

impl EngineHooks for SoundHandler {
    type Action = SoundAction;
    type View = Arc<RwLock<Locator>>;

    fn controls(&self) -> Controls {
        self.controls.clone()
    }

    fn view(&self) -> Self::View {
        Arc::clone(&self.published)
    }

    fn do_realize(&mut self, ctx: &HookContext) -> HookResult<()> {
        debug!("{} realizing {}", ctx.id, self.locator);
        Ok(())
    }

    fn do_prefetch(&mut self, _ctx: &HookContext) -> HookResult<Option<MediaTime>> {
        Ok(None)
    }

    fn do_start(&mut self, ctx: &HookContext, requested: Option<MediaTime>) -> HookResult<MediaTime> {
        Ok(self.clamp(requested.unwrap_or(ctx.base_media_time)))
    }

    fn do_stop(&mut self, _ctx: &HookContext) -> HookResult<()> {
        Ok(())
    }

    fn do_deallocate(&mut self, _ctx: &HookContext) {}

    fn do_close(&mut self) {}

    fn do_seek_time(&mut self, _ctx: &HookContext, time: MediaTime) -> HookResult<MediaTime> {
        Ok(self.clamp(time))
    }

    fn do_set_rate(&mut self, _ctx: &HookContext, rate: f32) -> HookResult<f32> {
        Ok(rate)
    }

    fn duration(&self) -> Option<MediaTime> {
        self.duration
    }

    fn do_action(&mut self, ctx: &HookContext, action: SoundAction) -> Option<MediaTime> {
        match action {
            SoundAction::SetSource {
                locator,
                duration,
                reply,
            } => {
                debug!("{} switching to {}", ctx.id, locator);
                *self.published.write() = locator.clone();
                self.locator = locator;
                self.duration = duration;
                let _ = reply.send(Ok(()));
                Some(MediaTime::ZERO)
            }
        }
    }
}

/// Sound-specific operations
impl Controller<SoundHandler> {
    /// Replace the clip and rewind
    pub fn set_source(&self, locator: &str, duration: Option<MediaTime>) -> Result<()> {
        let locator = SoundHandler::parse(locator)?;
        let (reply, result) = bounded(1);
        if !self.run_action(SoundAction::SetSource {
            locator,
            duration,
            reply,
        }) {
            return Err(DiscPlayerError::Closed);
        }
        result
            .try_recv()
            .map_err(|_| DiscPlayerError::Internal("set_source produced no result".to_string()))?
    }

    pub fn locator(&self) -> Locator {
        self.view().read().clone()
    }
}
