//! Timeline playlist playback

use super::locator::Locator;
use crate::clock::MediaTime;
use crate::controls::{ControlKind, Controls};
use crate::engine::{ClipInfo, EngineNotice, MediaEngine, PlaylistInfo, SourceSelection};
use crate::player::{Controller, ControllerState, EngineHooks, HookContext, NoticeOutcome};
use crate::resource::ResourceKind;
use crate::utils::error::{DiscPlayerError, EngineError, HookError, HookResult, Result};
use crossbeam::channel::{bounded, Sender};
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::sync::Arc;

/// Controller driving a disc playlist
pub type PlaylistPlayer = Controller<PlaylistHandler>;

/// Commands specific to playlist playback
pub enum PlaylistAction {
    SetSource {
        locator: Locator,
        /// Fail with `ClockStarted` instead of switching under a running clock
        refuse_while_started: bool,
        reply: Sender<Result<()>>,
    },
    SeekMark(u32),
    SeekItem(u32),
}

/// Locator and playlist details as of the last command
#[derive(Debug, Clone)]
struct PublishedSource {
    locator: Locator,
    info: Option<PlaylistInfo>,
}

/// What callers of a [`PlaylistPlayer`] can read without queueing
#[derive(Clone)]
pub struct PlaylistView {
    engine: Arc<dyn MediaEngine>,
    source: Arc<RwLock<PublishedSource>>,
}

/// Engine hooks for playlist playback
pub struct PlaylistHandler {
    engine: Arc<dyn MediaEngine>,
    locator: Locator,
    info: Option<PlaylistInfo>,
    published: Arc<RwLock<PublishedSource>>,
    controls: Controls,
}

impl PlaylistHandler {
    /// Handler for a playlist locator
    pub fn new(engine: Arc<dyn MediaEngine>, locator: &str) -> Result<Self> {
        let locator = Self::parse(locator)?;
        let published = Arc::new(RwLock::new(PublishedSource {
            locator: locator.clone(),
            info: None,
        }));
        Ok(Self {
            engine,
            locator,
            info: None,
            published,
            controls: Controls::with_kinds(&ControlKind::ALL),
        })
    }

    fn publish(&self) {
        *self.published.write() = PublishedSource {
            locator: self.locator.clone(),
            info: self.info.clone(),
        };
    }

    fn parse(locator: &str) -> Result<Locator> {
        let locator: Locator = locator.parse()?;
        if locator.playlist_id().is_none() {
            return Err(DiscPlayerError::IncompatibleSource(locator.to_string()));
        }
        Ok(locator)
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn playlist_info(&self) -> Option<&PlaylistInfo> {
        self.info.as_ref()
    }

    fn playlist(&self) -> u32 {
        self.locator.playlist_id().unwrap_or_default()
    }

    fn engine_position(&self) -> MediaTime {
        MediaTime::from_ticks(self.engine.current_time())
    }

    fn set_source(&mut self, ctx: &HookContext, locator: Locator, refuse_while_started: bool) -> Result<Option<MediaTime>> {
        if refuse_while_started && ctx.state == ControllerState::Started {
            return Err(DiscPlayerError::ClockStarted);
        }

        let playlist = locator.playlist_id().unwrap_or_default();
        let info = self
            .engine
            .playlist_info(playlist)
            .ok_or_else(|| DiscPlayerError::InvalidPlaylist(locator.to_string()))?;

        info!("{} switching to {}", ctx.id, locator);
        self.locator = locator;
        self.info = Some(info);
        self.publish();

        if ctx.state != ControllerState::Prefetched {
            return Ok(Some(MediaTime::ZERO));
        }

        let rewound = HookContext {
            base_media_time: MediaTime::ZERO,
            media_time: MediaTime::ZERO,
            ..*ctx
        };
        let position = self.do_prefetch(&rewound).map_err(|e| match e {
            HookError::Engine(e) => DiscPlayerError::Engine(e),
            other => DiscPlayerError::Internal(other.to_string()),
        })?;
        Ok(Some(position.unwrap_or(MediaTime::ZERO)))
    }

    /// Seek to a mark or item now, or remember it for the next prefetch
    fn seek_index(&mut self, ctx: &HookContext, action: &PlaylistAction) -> Option<MediaTime> {
        if !ctx.state.is_positioned() {
            match action {
                PlaylistAction::SeekMark(mark) => {
                    self.locator.mark = Some(*mark);
                    self.locator.item = None;
                }
                PlaylistAction::SeekItem(item) => {
                    self.locator.item = Some(*item);
                    self.locator.mark = None;
                }
                PlaylistAction::SetSource { .. } => {}
            }
            self.publish();
            return None;
        }

        let result = match action {
            PlaylistAction::SeekMark(mark) => self.engine.seek_to_mark(*mark),
            PlaylistAction::SeekItem(item) => self.engine.seek_to_item(*item),
            PlaylistAction::SetSource { .. } => return None,
        };
        match result {
            Ok(()) => Some(self.engine_position()),
            Err(e) => {
                warn!("{} seek ignored: {}", ctx.id, e);
                None
            }
        }
    }
}

impl EngineHooks for PlaylistHandler {
    type Action = PlaylistAction;
    type View = PlaylistView;

    fn controls(&self) -> Controls {
        self.controls.clone()
    }

    fn view(&self) -> PlaylistView {
        PlaylistView {
            engine: Arc::clone(&self.engine),
            source: Arc::clone(&self.published),
        }
    }

    fn resource(&self) -> Option<ResourceKind> {
        Some(ResourceKind::Playback)
    }

    fn do_realize(&mut self, ctx: &HookContext) -> HookResult<()> {
        let playlist = self.playlist();
        let info = self
            .engine
            .playlist_info(playlist)
            .ok_or(EngineError::PlaylistNotFound(playlist))?;
        debug!("{} found playlist {} with {} clips", ctx.id, playlist, info.clip_count());
        self.info = Some(info);
        self.publish();
        Ok(())
    }

    fn do_prefetch(&mut self, ctx: &HookContext) -> HookResult<Option<MediaTime>> {
        if !self.locator.streams.is_empty() {
            self.engine.select_streams(&self.locator.streams)?;
        }

        let time_ticks = (ctx.base_media_time != MediaTime::ZERO).then(|| ctx.base_media_time.to_ticks());
        self.engine.select_source(&SourceSelection {
            playlist: self.playlist(),
            item: self.locator.item,
            mark: self.locator.mark,
            time_ticks,
        })?;
        Ok(Some(self.engine_position()))
    }

    fn do_start(&mut self, ctx: &HookContext, requested: Option<MediaTime>) -> HookResult<MediaTime> {
        if let Some(at) = requested {
            self.engine.seek_to_time(at.to_ticks())?;
        }
        self.engine.set_rate(ctx.rate, true)?;
        Ok(self.engine_position())
    }

    fn do_stop(&mut self, _ctx: &HookContext) -> HookResult<()> {
        self.engine.set_rate(0.0, false)?;
        Ok(())
    }

    fn do_deallocate(&mut self, ctx: &HookContext) {
        debug!("{} releasing playlist {}", ctx.id, self.playlist());
    }

    fn do_close(&mut self) {
        self.info = None;
        self.publish();
    }

    fn do_seek_time(&mut self, ctx: &HookContext, time: MediaTime) -> HookResult<MediaTime> {
        if !ctx.state.is_positioned() {
            return Ok(time);
        }
        self.engine.seek_to_time(time.to_ticks())?;
        Ok(self.engine_position())
    }

    fn do_set_rate(&mut self, ctx: &HookContext, rate: f32) -> HookResult<f32> {
        if ctx.state == ControllerState::Started {
            // Resume presentation if a zero rate had paused it
            self.engine.set_rate(rate, rate != 0.0)?;
        }
        Ok(rate)
    }

    fn duration(&self) -> Option<MediaTime> {
        self.info.as_ref().map(PlaylistInfo::duration)
    }

    fn on_notice(&mut self, ctx: &HookContext, notice: &EngineNotice) -> NoticeOutcome {
        match notice {
            EngineNotice::EndOfMedia { playlist } if *playlist == self.playlist() => NoticeOutcome::EndOfMedia,
            EngineNotice::EndOfMedia { playlist } => {
                warn!("{} end of playlist {} while presenting {}, ignored", ctx.id, playlist, self.playlist());
                NoticeOutcome::Ignored
            }
            EngineNotice::RateChanged(rate) => NoticeOutcome::RateChanged(*rate),
            other => {
                self.controls.apply_notice(other);
                NoticeOutcome::Handled
            }
        }
    }

    fn do_action(&mut self, ctx: &HookContext, action: PlaylistAction) -> Option<MediaTime> {
        match action {
            PlaylistAction::SetSource {
                locator,
                refuse_while_started,
                reply,
            } => match self.set_source(ctx, locator, refuse_while_started) {
                Ok(position) => {
                    let _ = reply.send(Ok(()));
                    position
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                    None
                }
            },
            seek => self.seek_index(ctx, &seek),
        }
    }
}

/// Playlist-specific operations
impl Controller<PlaylistHandler> {
    /// Switch to another playlist locator and wait for the result
    pub fn set_source(&self, locator: &str) -> Result<()> {
        self.switch(locator, false)
    }

    /// Like [`set_source`](Self::set_source), refused while started
    pub fn select_playlist(&self, locator: &str) -> Result<()> {
        if self.state() == ControllerState::Started {
            return Err(DiscPlayerError::ClockStarted);
        }
        self.switch(locator, true)
    }

    fn switch(&self, locator: &str, refuse_while_started: bool) -> Result<()> {
        let locator = PlaylistHandler::parse(locator)?;
        let (reply, result) = bounded(1);
        let action = PlaylistAction::SetSource {
            locator,
            refuse_while_started,
            reply,
        };
        if !self.run_action(action) {
            return Err(DiscPlayerError::Closed);
        }
        result
            .try_recv()
            .map_err(|_| DiscPlayerError::Internal("set_source produced no result".to_string()))?
    }

    /// Seek to playlist mark `mark`
    pub fn seek_mark(&self, mark: u32) -> Result<()> {
        let count = self.index_bound("seek_mark", |info| info.mark_count())?;
        if mark as usize >= count {
            return Err(DiscPlayerError::InvalidArgument(format!("mark {} of {}", mark, count)));
        }
        self.run_or_closed(PlaylistAction::SeekMark(mark))
    }

    /// Seek to the start of play item `item`
    pub fn seek_play_item(&self, item: u32) -> Result<()> {
        let count = self.index_bound("seek_play_item", |info| info.clip_count())?;
        if item as usize >= count {
            return Err(DiscPlayerError::InvalidArgument(format!("item {} of {}", item, count)));
        }
        self.run_or_closed(PlaylistAction::SeekItem(item))
    }

    fn index_bound(&self, operation: &str, count: impl Fn(&PlaylistInfo) -> usize) -> Result<usize> {
        self.require_realized(operation)?;
        self.view()
            .source
            .read()
            .info
            .as_ref()
            .map(&count)
            .ok_or_else(|| DiscPlayerError::NotRealized(operation.to_string()))
    }

    fn run_or_closed(&self, action: PlaylistAction) -> Result<()> {
        if self.run_action(action) {
            Ok(())
        } else {
            Err(DiscPlayerError::Closed)
        }
    }

    /// Clip being presented; only known while the engine is positioned
    pub fn current_clip(&self) -> Option<ClipInfo> {
        if !self.state().is_positioned() {
            return None;
        }
        let view = self.view();
        let item = view.engine.current_item() as usize;
        let source = view.source.read();
        source.info.as_ref().and_then(|info| info.clips.get(item).cloned())
    }

    pub fn playlist_info(&self) -> Option<PlaylistInfo> {
        self.view().source.read().info.clone()
    }

    pub fn locator(&self) -> Locator {
        self.view().source.read().locator.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTimeBase;
    use crate::engine::{EngineOp, SimulatedEngine};
    use crate::events::ControllerEvent;
    use crate::resource::ResourceArbiter;
    use crate::utils::config::EngineConfig;
    use crossbeam::channel::{unbounded, Receiver};
    use std::time::Duration;

    struct Fixture {
        clock: Arc<ManualTimeBase>,
        engine: Arc<SimulatedEngine>,
        player: PlaylistPlayer,
        events: Receiver<ControllerEvent>,
    }

    fn fixture(locator: &str) -> Fixture {
        let clock = ManualTimeBase::new();
        let engine = Arc::new(SimulatedEngine::with_demo_disc(clock.clone(), &EngineConfig::default()));
        let (tx, events) = unbounded();
        let handler = PlaylistHandler::new(engine.clone(), locator).unwrap();
        let player = Controller::builder(handler)
            .with_time_base(clock.clone())
            .with_arbiter(Arc::new(ResourceArbiter::new()))
            .with_listener(move |e: &ControllerEvent| {
                let _ = tx.send(e.clone());
            })
            .build()
            .unwrap();
        Fixture {
            clock,
            engine,
            player,
            events,
        }
    }

    fn wait_for(events: &Receiver<ControllerEvent>, name: &str) -> ControllerEvent {
        loop {
            let event = events.recv_timeout(Duration::from_secs(2)).unwrap();
            if event.name() == name {
                return event;
            }
        }
    }

    #[test]
    fn test_rejects_sound_locator() {
        let clock = ManualTimeBase::new();
        let engine = Arc::new(SimulatedEngine::new(clock, &EngineConfig::default()));
        assert!(matches!(
            PlaylistHandler::new(engine, "bd://0.SOUND:1"),
            Err(DiscPlayerError::IncompatibleSource(_))
        ));
    }

    #[test]
    fn test_prefetch_positions_on_item() {
        let f = fixture("bd://0.PLAYLIST:00001.ITEM:2.A1:2");
        f.player.prefetch();
        wait_for(&f.events, "PrefetchComplete");

        // Demo playlists are 600 s with 4 items of 150 s
        assert_eq!(f.player.media_time(), MediaTime::from_millis(300_000));
        assert_eq!(f.engine.streams().primary_audio, 2);
        assert_eq!(f.player.current_clip().map(|c| c.clip_id), Some("00102".to_string()));
        assert_eq!(f.player.duration(), Some(MediaTime::from_millis(600_000)));
        f.player.close();
    }

    #[test]
    fn test_unknown_playlist_fails_realize() {
        let f = fixture("bd://0.PLAYLIST:00042");
        f.player.realize();
        let event = wait_for(&f.events, "Error");
        assert!(event.is_error());
        assert_eq!(f.player.state(), ControllerState::Unrealized);
        f.player.close();
    }

    #[test]
    fn test_select_playlist_rules() {
        let f = fixture("bd://0.PLAYLIST:00001");
        f.player.start();
        wait_for(&f.events, "Start");

        assert!(matches!(
            f.player.select_playlist("bd://0.PLAYLIST:00002"),
            Err(DiscPlayerError::ClockStarted)
        ));
        assert!(matches!(
            f.player.set_source("bd://0.PLAYLIST:00009"),
            Err(DiscPlayerError::InvalidPlaylist(_))
        ));
        assert!(matches!(
            f.player.set_source("bd://0.SOUND:1"),
            Err(DiscPlayerError::IncompatibleSource(_))
        ));

        f.player.stop();
        f.clock.advance(Duration::from_secs(10));
        f.player.select_playlist("bd://0.PLAYLIST:00002").unwrap();
        assert_eq!(f.engine.current_playlist(), Some(2));
        assert_eq!(f.player.media_time(), MediaTime::ZERO);
        assert_eq!(f.player.locator().playlist_id(), Some(2));
        f.player.close();
    }

    #[test]
    fn test_seek_mark_and_item() {
        let f = fixture("bd://0.PLAYLIST:00001");
        assert!(matches!(f.player.seek_mark(0), Err(DiscPlayerError::NotRealized(_))));

        f.player.prefetch();
        wait_for(&f.events, "PrefetchComplete");
        assert!(matches!(f.player.seek_mark(4), Err(DiscPlayerError::InvalidArgument(_))));

        f.player.seek_mark(3).unwrap();
        assert_eq!(f.player.media_time(), MediaTime::from_millis(450_000));
        f.player.seek_play_item(1).unwrap();
        assert_eq!(f.player.media_time(), MediaTime::from_millis(150_000));

        // An engine failure is absorbed
        f.engine.fail_on(EngineOp::SeekItem);
        f.player.seek_play_item(2).unwrap();
        assert_eq!(f.player.media_time(), MediaTime::from_millis(150_000));
        f.player.close();
    }

    #[test]
    fn test_notices() {
        let f = fixture("bd://0.PLAYLIST:00001");
        f.player.start();
        wait_for(&f.events, "Start");

        f.player.notify(EngineNotice::ChapterReached(2));
        wait_for(&f.events, "Notice");
        let playback = f.player.controls().playback().unwrap();
        assert_eq!(playback.chapter(), 2);

        // End of another playlist is ignored
        f.player.notify(EngineNotice::EndOfMedia { playlist: 3 });
        f.player.notify(EngineNotice::RateChanged(0.5));
        wait_for(&f.events, "RateChange");
        assert_eq!(f.player.state(), ControllerState::Started);

        f.player.notify(EngineNotice::EndOfMedia { playlist: 1 });
        wait_for(&f.events, "EndOfMedia");
        assert_eq!(f.player.state(), ControllerState::Prefetched);
        f.player.close();
    }
}
