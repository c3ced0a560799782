//! In-memory engine used by the demo binary and tests
//!
//! Presentation advances against a [`TimeBase`] at the selected rate. Seeks
//! snap down to a configurable tick granularity, so the position the engine
//! reports can differ from the one that was requested.

use crate::clock::{TimeBase, TICKS_PER_SECOND};
use crate::engine::{
    EngineResult, MediaEngine, PlaylistInfo, SourceSelection, StreamSelection,
};
use crate::utils::config::EngineConfig;
use crate::utils::error::EngineError;
use log::debug;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Engine operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    SelectSource,
    SeekTime,
    SeekMark,
    SeekItem,
    SetRate,
    SelectStreams,
}

/// Record of a call made against the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    SelectSource(SourceSelection),
    SeekTime(u64),
    SeekMark(u32),
    SeekItem(u32),
    SetRate { rate: f32, start: bool },
    SelectStreams(StreamSelection),
}

#[derive(Debug, Default)]
struct SimState {
    playlists: HashMap<u32, PlaylistInfo>,
    current: Option<u32>,

    /// Position at `anchored_at`
    position_ticks: u64,
    anchored_at: i64,
    rate: f32,
    presenting: bool,

    streams: StreamSelection,
    failures: HashSet<EngineOp>,
    calls: Vec<EngineCall>,
}

/// Simulated playback engine
pub struct SimulatedEngine {
    state: Mutex<SimState>,
    time_base: Arc<dyn TimeBase>,
    granularity: u64,
}

impl SimulatedEngine {
    pub fn new(time_base: Arc<dyn TimeBase>, config: &EngineConfig) -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            time_base,
            granularity: config.seek_granularity_ticks.max(1),
        }
    }

    /// Engine with playlists 1..=3 of `default_playlist_duration_secs` each
    pub fn with_demo_disc(time_base: Arc<dyn TimeBase>, config: &EngineConfig) -> Self {
        let engine = Self::new(time_base, config);
        let clip_secs = (config.default_playlist_duration_secs / 4).max(1);
        for playlist in 1..=3 {
            engine.add_playlist(PlaylistInfo::uniform(playlist, 4, clip_secs));
        }
        engine
    }

    pub fn add_playlist(&self, info: PlaylistInfo) {
        self.state.lock().playlists.insert(info.playlist, info);
    }

    /// Make every later call of `op` fail until cleared
    pub fn fail_on(&self, op: EngineOp) {
        self.state.lock().failures.insert(op);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    pub fn current_playlist(&self) -> Option<u32> {
        self.state.lock().current
    }

    pub fn engine_rate(&self) -> f32 {
        self.state.lock().rate
    }

    pub fn streams(&self) -> StreamSelection {
        self.state.lock().streams
    }

    fn check(&self, state: &SimState, op: EngineOp) -> EngineResult<()> {
        if state.failures.contains(&op) {
            return Err(EngineError::rejected(op_name(op), "injected failure"));
        }
        Ok(())
    }

    fn position_now(&self, state: &SimState) -> u64 {
        let mut ticks = state.position_ticks as i64;
        if state.presenting && state.rate != 0.0 {
            let elapsed = self.time_base.nanoseconds() - state.anchored_at;
            let advanced = elapsed as f64 * state.rate as f64 * TICKS_PER_SECOND as f64 / 1e9;
            ticks += advanced.round() as i64;
        }
        let duration = state
            .current
            .and_then(|pl| state.playlists.get(&pl))
            .map(|info| info.duration_ticks)
            .unwrap_or(u64::MAX);
        (ticks.max(0) as u64).min(duration)
    }

    fn reposition(&self, state: &mut SimState, ticks: u64) {
        let duration = state
            .current
            .and_then(|pl| state.playlists.get(&pl))
            .map(|info| info.duration_ticks)
            .unwrap_or(u64::MAX);
        let snapped = ticks - ticks % self.granularity;
        state.position_ticks = snapped.min(duration);
        state.anchored_at = self.time_base.nanoseconds();
    }

    fn current_info<'a>(&self, state: &'a SimState) -> EngineResult<&'a PlaylistInfo> {
        state
            .current
            .and_then(|pl| state.playlists.get(&pl))
            .ok_or(EngineError::NotReady)
    }
}

fn op_name(op: EngineOp) -> &'static str {
    match op {
        EngineOp::SelectSource => "select_source",
        EngineOp::SeekTime => "seek_to_time",
        EngineOp::SeekMark => "seek_to_mark",
        EngineOp::SeekItem => "seek_to_item",
        EngineOp::SetRate => "set_rate",
        EngineOp::SelectStreams => "select_streams",
    }
}

impl MediaEngine for SimulatedEngine {
    fn playlist_info(&self, playlist: u32) -> Option<PlaylistInfo> {
        self.state.lock().playlists.get(&playlist).cloned()
    }

    fn select_source(&self, selection: &SourceSelection) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::SelectSource(*selection));
        self.check(&state, EngineOp::SelectSource)?;

        let info = state
            .playlists
            .get(&selection.playlist)
            .cloned()
            .ok_or(EngineError::PlaylistNotFound(selection.playlist))?;

        let mut start = 0;
        if let Some(mark) = selection.mark.and_then(|m| info.marks.get(m as usize)) {
            start = mark.start_ticks;
        }
        if let Some(clip) = selection.item.and_then(|i| info.clips.get(i as usize)) {
            start = clip.start_ticks;
        }
        if let Some(time) = selection.time_ticks {
            start = time;
        }

        state.current = Some(selection.playlist);
        state.presenting = false;
        self.reposition(&mut state, start);
        debug!("Simulated engine selected playlist {} at {} ticks", selection.playlist, state.position_ticks);
        Ok(())
    }

    fn seek_to_time(&self, ticks: u64) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::SeekTime(ticks));
        self.check(&state, EngineOp::SeekTime)?;
        self.current_info(&state)?;
        self.reposition(&mut state, ticks);
        Ok(())
    }

    fn seek_to_mark(&self, mark: u32) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::SeekMark(mark));
        self.check(&state, EngineOp::SeekMark)?;
        let start = self
            .current_info(&state)?
            .marks
            .get(mark as usize)
            .map(|m| m.start_ticks)
            .ok_or_else(|| EngineError::rejected("seek_to_mark", format!("no mark {}", mark)))?;
        self.reposition(&mut state, start);
        Ok(())
    }

    fn seek_to_item(&self, item: u32) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::SeekItem(item));
        self.check(&state, EngineOp::SeekItem)?;
        let start = self
            .current_info(&state)?
            .clips
            .get(item as usize)
            .map(|c| c.start_ticks)
            .ok_or_else(|| EngineError::rejected("seek_to_item", format!("no item {}", item)))?;
        self.reposition(&mut state, start);
        Ok(())
    }

    fn set_rate(&self, rate: f32, start: bool) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::SetRate { rate, start });
        self.check(&state, EngineOp::SetRate)?;

        // Fold the elapsed presentation into the anchor before switching
        state.position_ticks = self.position_now(&state);
        state.anchored_at = self.time_base.nanoseconds();
        state.rate = rate;
        if start {
            state.presenting = true;
        } else if rate == 0.0 {
            state.presenting = false;
        }
        Ok(())
    }

    fn current_time(&self) -> u64 {
        let state = self.state.lock();
        self.position_now(&state)
    }

    fn current_item(&self) -> u32 {
        let state = self.state.lock();
        let position = self.position_now(&state);
        self.current_info(&state)
            .map(|info| info.item_at(position))
            .unwrap_or(0)
    }

    fn select_streams(&self, streams: &StreamSelection) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::SelectStreams(*streams));
        self.check(&state, EngineOp::SelectStreams)?;

        let current = state.streams;
        state.streams = StreamSelection {
            primary_audio: if streams.primary_audio > 0 { streams.primary_audio } else { current.primary_audio },
            pg_text: if streams.pg_text > 0 { streams.pg_text } else { current.pg_text },
            secondary_video: if streams.secondary_video > 0 { streams.secondary_video } else { current.secondary_video },
            secondary_audio: if streams.secondary_audio > 0 { streams.secondary_audio } else { current.secondary_audio },
        };
        Ok(())
    }
}
