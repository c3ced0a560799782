//! Capability objects exposed by controllers
//!
//! Each handler publishes a fixed list of controls. Applications look them
//! up by [`ControlKind`] (or by name); controls that carry state are shared
//! with the handler, which updates them as engine notices arrive.

use crate::engine::EngineNotice;
use parking_lot::RwLock;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Capability identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Angle,
    AudioMetadata,
    BackgroundVideoPresentation,
    MediaSelection,
    MediaTimeEvents,
    MediaTimePosition,
    OverallGain,
    Panning,
    PiP,
    Playback,
    PlaylistChange,
    PrimaryAudio,
    PrimaryGain,
    SecondaryAudio,
    SecondaryGain,
    Subtitling,
    UoMaskTable,
    VideoFormat,
}

impl ControlKind {
    pub fn name(self) -> &'static str {
        match self {
            ControlKind::Angle => "AngleControl",
            ControlKind::AudioMetadata => "AudioMetadataControl",
            ControlKind::BackgroundVideoPresentation => "BackgroundVideoPresentationControl",
            ControlKind::MediaSelection => "MediaSelectionControl",
            ControlKind::MediaTimeEvents => "MediaTimeEventControl",
            ControlKind::MediaTimePosition => "MediaTimePositionControl",
            ControlKind::OverallGain => "OverallGainControl",
            ControlKind::Panning => "PanningControl",
            ControlKind::PiP => "PiPControl",
            ControlKind::Playback => "PlaybackControl",
            ControlKind::PlaylistChange => "PlaylistChangeControl",
            ControlKind::PrimaryAudio => "PrimaryAudioControl",
            ControlKind::PrimaryGain => "PrimaryGainControl",
            ControlKind::SecondaryAudio => "SecondaryAudioControl",
            ControlKind::SecondaryGain => "SecondaryGainControl",
            ControlKind::Subtitling => "SubtitlingControl",
            ControlKind::UoMaskTable => "UOMaskTableControl",
            ControlKind::VideoFormat => "VideoFormatControl",
        }
    }

    pub const ALL: [ControlKind; 18] = [
        ControlKind::Angle,
        ControlKind::AudioMetadata,
        ControlKind::BackgroundVideoPresentation,
        ControlKind::MediaSelection,
        ControlKind::MediaTimeEvents,
        ControlKind::MediaTimePosition,
        ControlKind::OverallGain,
        ControlKind::Panning,
        ControlKind::PiP,
        ControlKind::Playback,
        ControlKind::PlaylistChange,
        ControlKind::PrimaryAudio,
        ControlKind::PrimaryGain,
        ControlKind::SecondaryAudio,
        ControlKind::SecondaryGain,
        ControlKind::Subtitling,
        ControlKind::UoMaskTable,
        ControlKind::VideoFormat,
    ];
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ControlKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ControlKind::ALL.iter().copied().find(|k| k.name() == s).ok_or(())
    }
}

/// Gain stage with mute
#[derive(Debug)]
pub struct GainControl {
    /// Level (0.0 to 1.0)
    level: RwLock<f32>,

    muted: RwLock<bool>,
}

impl Default for GainControl {
    fn default() -> Self {
        Self {
            level: RwLock::new(1.0),
            muted: RwLock::new(false),
        }
    }
}

impl GainControl {
    /// Set the level, clamped to 0.0..=1.0; returns the applied level
    pub fn set_level(&self, level: f32) -> f32 {
        let clamped = level.clamp(0.0, 1.0);
        *self.level.write() = clamped;
        clamped
    }

    pub fn level(&self) -> f32 {
        *self.level.read()
    }

    pub fn set_mute(&self, muted: bool) {
        *self.muted.write() = muted;
    }

    pub fn is_muted(&self) -> bool {
        *self.muted.read()
    }

    /// Level after muting is applied
    pub fn effective_level(&self) -> f32 {
        if self.is_muted() {
            0.0
        } else {
            self.level()
        }
    }

    /// Level in decibels; negative infinity when silent
    pub fn db(&self) -> f32 {
        20.0 * self.effective_level().log10()
    }
}

/// Left/right and front/back balance
#[derive(Debug, Default)]
pub struct PanningControl {
    position: RwLock<(f32, f32)>,
}

impl PanningControl {
    /// Set balance; both axes clamp to -1.0..=1.0
    pub fn set_position(&self, x: f32, y: f32) -> (f32, f32) {
        let position = (x.clamp(-1.0, 1.0), y.clamp(-1.0, 1.0));
        *self.position.write() = position;
        position
    }

    pub fn position(&self) -> (f32, f32) {
        *self.position.read()
    }
}

/// Progress markers reported by the engine
#[derive(Debug, Default)]
pub struct PlaybackControl {
    playlist: AtomicU32,
    chapter: AtomicU32,
    mark: AtomicU32,
    item: AtomicU32,
}

impl PlaybackControl {
    pub fn playlist(&self) -> u32 {
        self.playlist.load(Ordering::SeqCst)
    }

    pub fn chapter(&self) -> u32 {
        self.chapter.load(Ordering::SeqCst)
    }

    pub fn mark(&self) -> u32 {
        self.mark.load(Ordering::SeqCst)
    }

    pub fn item(&self) -> u32 {
        self.item.load(Ordering::SeqCst)
    }
}

/// Currently presented stream number for one stream type
#[derive(Debug, Default)]
pub struct StreamControl {
    current: AtomicU32,
    changes: AtomicU64,
}

impl StreamControl {
    pub fn current(&self) -> u32 {
        self.current.load(Ordering::SeqCst)
    }

    /// Number of changes reported since creation
    pub fn changes(&self) -> u64 {
        self.changes.load(Ordering::SeqCst)
    }

    fn record(&self, stream: u32) {
        self.current.store(stream, Ordering::SeqCst);
        self.changes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Play item whose user-operation mask is in effect
#[derive(Debug, Default)]
pub struct UoMaskControl {
    item: AtomicU32,
    changes: AtomicU64,
}

impl UoMaskControl {
    pub fn item(&self) -> u32 {
        self.item.load(Ordering::SeqCst)
    }

    /// Mask table changes reported since creation
    pub fn changes(&self) -> u64 {
        self.changes.load(Ordering::SeqCst)
    }

    fn play_item_reached(&self, item: u32) {
        self.item.store(item, Ordering::SeqCst);
        self.changes.fetch_add(1, Ordering::SeqCst);
    }
}

/// A capability object
#[derive(Debug, Clone)]
pub enum Control {
    Gain(ControlKind, Arc<GainControl>),
    Panning(Arc<PanningControl>),
    Playback(Arc<PlaybackControl>),
    Stream(ControlKind, Arc<StreamControl>),
    UoMask(Arc<UoMaskControl>),
    /// Capability with no state held on this side of the engine
    Passive(ControlKind),
}

impl Control {
    pub fn kind(&self) -> ControlKind {
        match self {
            Control::Gain(kind, _) | Control::Stream(kind, _) | Control::Passive(kind) => *kind,
            Control::Panning(_) => ControlKind::Panning,
            Control::Playback(_) => ControlKind::Playback,
            Control::UoMask(_) => ControlKind::UoMaskTable,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }
}

/// Fixed, ordered set of controls owned by one handler
#[derive(Debug, Clone, Default)]
pub struct Controls {
    entries: Vec<Control>,
}

impl Controls {
    /// Build a set with a fresh control for each kind, in the order given
    pub fn with_kinds(kinds: &[ControlKind]) -> Self {
        let entries = kinds
            .iter()
            .map(|kind| match kind {
                ControlKind::OverallGain | ControlKind::PrimaryGain | ControlKind::SecondaryGain => {
                    Control::Gain(*kind, Arc::new(GainControl::default()))
                }
                ControlKind::Panning => Control::Panning(Arc::new(PanningControl::default())),
                ControlKind::Playback => Control::Playback(Arc::new(PlaybackControl::default())),
                ControlKind::Angle
                | ControlKind::Subtitling
                | ControlKind::PiP
                | ControlKind::PrimaryAudio
                | ControlKind::SecondaryAudio => Control::Stream(*kind, Arc::new(StreamControl::default())),
                ControlKind::UoMaskTable => Control::UoMask(Arc::new(UoMaskControl::default())),
                other => Control::Passive(*other),
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, kind: ControlKind) -> Option<&Control> {
        self.entries.iter().find(|c| c.kind() == kind)
    }

    pub fn by_name(&self, name: &str) -> Option<&Control> {
        name.parse().ok().and_then(|kind| self.get(kind))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Control> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn kinds(&self) -> Vec<ControlKind> {
        self.entries.iter().map(Control::kind).collect()
    }

    pub fn gain(&self, kind: ControlKind) -> Option<Arc<GainControl>> {
        match self.get(kind)? {
            Control::Gain(_, gain) => Some(Arc::clone(gain)),
            _ => None,
        }
    }

    pub fn panning(&self) -> Option<Arc<PanningControl>> {
        match self.get(ControlKind::Panning)? {
            Control::Panning(panning) => Some(Arc::clone(panning)),
            _ => None,
        }
    }

    pub fn playback(&self) -> Option<Arc<PlaybackControl>> {
        match self.get(ControlKind::Playback)? {
            Control::Playback(playback) => Some(Arc::clone(playback)),
            _ => None,
        }
    }

    pub fn stream(&self, kind: ControlKind) -> Option<Arc<StreamControl>> {
        match self.get(kind)? {
            Control::Stream(_, stream) => Some(Arc::clone(stream)),
            _ => None,
        }
    }

    pub fn uo_mask(&self) -> Option<Arc<UoMaskControl>> {
        match self.get(ControlKind::UoMaskTable)? {
            Control::UoMask(mask) => Some(Arc::clone(mask)),
            _ => None,
        }
    }

    /// Record a progress or stream notice; `false` if no control tracks it
    pub fn apply_notice(&self, notice: &EngineNotice) -> bool {
        match *notice {
            EngineNotice::PlaylistStart(n) => self.record_progress(|p| &p.playlist, n),
            EngineNotice::ChapterReached(n) => self.record_progress(|p| &p.chapter, n),
            EngineNotice::MarkReached(n) => self.record_progress(|p| &p.mark, n),
            EngineNotice::PlayItemReached(n) => {
                let progress = self.record_progress(|p| &p.item, n);
                let mask = match self.uo_mask() {
                    Some(mask) => {
                        mask.play_item_reached(n);
                        true
                    }
                    None => false,
                };
                progress || mask
            }
            EngineNotice::AngleChanged(n) => self.record_stream(ControlKind::Angle, n),
            EngineNotice::SubtitleChanged(n) => self.record_stream(ControlKind::Subtitling, n),
            EngineNotice::PipChanged(n) => self.record_stream(ControlKind::PiP, n),
            _ => false,
        }
    }

    fn record_progress(&self, field: fn(&PlaybackControl) -> &AtomicU32, value: u32) -> bool {
        match self.playback() {
            Some(playback) => {
                field(&playback).store(value, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    fn record_stream(&self, kind: ControlKind, stream: u32) -> bool {
        match self.stream(kind) {
            Some(control) => {
                control.record(stream);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_kind_and_name() {
        let controls = Controls::with_kinds(&[ControlKind::OverallGain, ControlKind::Panning]);
        assert_eq!(controls.len(), 2);
        assert!(controls.get(ControlKind::Panning).is_some());
        assert!(controls.get(ControlKind::Angle).is_none());
        assert_eq!(
            controls.by_name("OverallGainControl").map(Control::kind),
            Some(ControlKind::OverallGain)
        );
        assert!(controls.by_name("NoSuchControl").is_none());
    }

    #[test]
    fn test_gain_control() {
        let gain = GainControl::default();
        assert_eq!(gain.set_level(1.5), 1.0);
        assert_eq!(gain.db(), 0.0);
        gain.set_level(0.5);
        gain.set_mute(true);
        assert_eq!(gain.effective_level(), 0.0);
        gain.set_mute(false);
        assert_eq!(gain.effective_level(), 0.5);
    }

    #[test]
    fn test_panning_clamps() {
        let panning = PanningControl::default();
        assert_eq!(panning.set_position(-3.0, 0.25), (-1.0, 0.25));
    }

    #[test]
    fn test_notices_update_controls() {
        let controls = Controls::with_kinds(&[ControlKind::Playback, ControlKind::Angle]);
        assert!(controls.apply_notice(&EngineNotice::ChapterReached(4)));
        assert!(controls.apply_notice(&EngineNotice::AngleChanged(2)));
        assert!(!controls.apply_notice(&EngineNotice::SubtitleChanged(1)));
        assert!(!controls.apply_notice(&EngineNotice::RateChanged(2.0)));

        assert_eq!(controls.playback().unwrap().chapter(), 4);
        let angle = controls.stream(ControlKind::Angle).unwrap();
        assert_eq!(angle.current(), 2);
        assert_eq!(angle.changes(), 1);
    }

    #[test]
    fn test_play_item_updates_uo_mask_table() {
        let controls = Controls::with_kinds(&[ControlKind::Playback, ControlKind::UoMaskTable]);
        assert!(controls.apply_notice(&EngineNotice::PlayItemReached(3)));
        assert_eq!(controls.playback().unwrap().item(), 3);
        let mask = controls.uo_mask().unwrap();
        assert_eq!((mask.item(), mask.changes()), (3, 1));

        // Marks do not change the mask table
        assert!(controls.apply_notice(&EngineNotice::MarkReached(1)));
        assert_eq!(mask.changes(), 1);

        let mask_only = Controls::with_kinds(&[ControlKind::UoMaskTable]);
        assert!(mask_only.apply_notice(&EngineNotice::PlayItemReached(2)));
        assert!(!mask_only.apply_notice(&EngineNotice::ChapterReached(2)));
        assert_eq!(mask_only.uo_mask().unwrap().item(), 2);
    }
}
