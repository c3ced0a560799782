//! Media engine collaborator interface
//!
//! Handlers drive the native engine through [`MediaEngine`]. The engine
//! reports progress back asynchronously as [`EngineNotice`]s, which arrive
//! on engine-owned threads and must be re-posted to the controller through
//! [`Controller::notify`](crate::player::Controller::notify).

mod simulated;

pub use simulated::{EngineCall, EngineOp, SimulatedEngine};

use crate::clock::MediaTime;
use crate::utils::error::EngineError;
use serde::{Deserialize, Serialize};

/// Result type for engine calls
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Operations the playback engine exposes to handlers
///
/// Positions are 90 kHz ticks relative to the playlist start.
pub trait MediaEngine: Send + Sync {
    /// Metadata for a playlist on the disc
    fn playlist_info(&self, playlist: u32) -> Option<PlaylistInfo>;

    /// Select a playlist and position it
    fn select_source(&self, selection: &SourceSelection) -> EngineResult<()>;

    /// Seek the current playlist
    fn seek_to_time(&self, ticks: u64) -> EngineResult<()>;

    /// Seek to a playlist mark
    fn seek_to_mark(&self, mark: u32) -> EngineResult<()>;

    /// Seek to the start of a play item
    fn seek_to_item(&self, item: u32) -> EngineResult<()>;

    /// Change playback speed; `start` begins presentation
    fn set_rate(&self, rate: f32, start: bool) -> EngineResult<()>;

    /// Current presentation position in ticks
    fn current_time(&self) -> u64;

    /// Index of the play item being presented
    fn current_item(&self) -> u32;

    /// Apply stream selections (audio, subtitles, secondary streams)
    fn select_streams(&self, streams: &StreamSelection) -> EngineResult<()>;
}

/// Where to start presenting a playlist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceSelection {
    pub playlist: u32,
    pub item: Option<u32>,
    pub mark: Option<u32>,
    pub time_ticks: Option<u64>,
}

/// Stream numbers requested by a locator; zero fields are left untouched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSelection {
    pub primary_audio: u32,
    pub pg_text: u32,
    pub secondary_video: u32,
    pub secondary_audio: u32,
}

impl StreamSelection {
    pub fn is_empty(&self) -> bool {
        *self == StreamSelection::default()
    }
}

/// One clip referenced by a playlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipInfo {
    pub clip_id: String,
    /// Start of this item on the playlist timeline
    pub start_ticks: u64,
    pub duration_ticks: u64,
    pub audio_streams: u32,
    pub subtitle_streams: u32,
}

/// Playlist mark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkInfo {
    pub start_ticks: u64,
    /// Entry marks start chapters
    pub is_entry: bool,
}

/// Playlist metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub playlist: u32,
    pub duration_ticks: u64,
    pub clips: Vec<ClipInfo>,
    pub marks: Vec<MarkInfo>,
}

impl PlaylistInfo {
    /// Playlist of `clip_count` equal clips with one entry mark per clip
    pub fn uniform(playlist: u32, clip_count: u32, clip_secs: u64) -> Self {
        let clip_ticks = clip_secs * crate::clock::TICKS_PER_SECOND as u64;
        let clips: Vec<ClipInfo> = (0..clip_count)
            .map(|i| ClipInfo {
                clip_id: format!("{:05}", playlist * 100 + i),
                start_ticks: i as u64 * clip_ticks,
                duration_ticks: clip_ticks,
                audio_streams: 2,
                subtitle_streams: 1,
            })
            .collect();
        let marks = clips
            .iter()
            .map(|c| MarkInfo {
                start_ticks: c.start_ticks,
                is_entry: true,
            })
            .collect();

        Self {
            playlist,
            duration_ticks: clip_ticks * clip_count as u64,
            clips,
            marks,
        }
    }

    pub fn duration(&self) -> MediaTime {
        MediaTime::from_ticks(self.duration_ticks)
    }

    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    pub fn mark_count(&self) -> usize {
        self.marks.len()
    }

    /// Item containing the tick position
    pub fn item_at(&self, ticks: u64) -> u32 {
        self.clips
            .iter()
            .rposition(|c| c.start_ticks <= ticks)
            .unwrap_or(0) as u32
    }
}

/// Asynchronous notification raised by the engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EngineNotice {
    PlaylistStart(u32),
    ChapterReached(u32),
    MarkReached(u32),
    PlayItemReached(u32),
    AngleChanged(u32),
    SubtitleChanged(u32),
    PipChanged(u32),
    /// Rate changed by the engine itself
    RateChanged(f32),
    EndOfMedia { playlist: u32 },
}
