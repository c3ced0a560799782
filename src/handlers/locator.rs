//! Disc locators
//!
//! ```text
//! bd://<disc>.PLAYLIST:<n>[.ITEM:<n>][.MARK:<n>][.A1:<n>][.A2:<n>][.P:<n>][.V2:<n>]
//! bd://<disc>.SOUND:<n>
//! ```

use crate::engine::StreamSelection;
use crate::utils::error::{DiscPlayerError, Result};
use std::fmt;
use std::str::FromStr;

const SCHEME: &str = "bd://";

/// What a locator points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorTarget {
    Playlist(u32),
    Sound(u32),
}

/// Parsed `bd://` locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub disc: String,
    pub target: LocatorTarget,
    pub item: Option<u32>,
    pub mark: Option<u32>,
    /// Stream numbers; zero means "leave as is"
    pub streams: StreamSelection,
}

impl Locator {
    pub fn playlist(disc: &str, playlist: u32) -> Self {
        Self::new(disc, LocatorTarget::Playlist(playlist))
    }

    pub fn sound(disc: &str, sound: u32) -> Self {
        Self::new(disc, LocatorTarget::Sound(sound))
    }

    fn new(disc: &str, target: LocatorTarget) -> Self {
        Self {
            disc: disc.to_string(),
            target,
            item: None,
            mark: None,
            streams: StreamSelection::default(),
        }
    }

    pub fn playlist_id(&self) -> Option<u32> {
        match self.target {
            LocatorTarget::Playlist(n) => Some(n),
            LocatorTarget::Sound(_) => None,
        }
    }

    pub fn sound_id(&self) -> Option<u32> {
        match self.target {
            LocatorTarget::Sound(n) => Some(n),
            LocatorTarget::Playlist(_) => None,
        }
    }
}

fn invalid(locator: &str, reason: &str) -> DiscPlayerError {
    DiscPlayerError::InvalidArgument(format!("locator '{}': {}", locator, reason))
}

impl FromStr for Locator {
    type Err = DiscPlayerError;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s.strip_prefix(SCHEME).ok_or_else(|| invalid(s, "expected bd:// scheme"))?;
        let mut parts = rest.split('.');
        let disc = parts.next().unwrap_or_default();

        let mut target = None;
        let mut item = None;
        let mut mark = None;
        let mut streams = StreamSelection::default();

        for part in parts {
            let (key, value) = part
                .split_once(':')
                .ok_or_else(|| invalid(s, &format!("malformed component '{}'", part)))?;
            let value: u32 = value
                .parse()
                .map_err(|_| invalid(s, &format!("bad number in '{}'", part)))?;

            match key {
                "PLAYLIST" | "SOUND" if target.is_some() => {
                    return Err(invalid(s, "more than one playlist or sound"));
                }
                "PLAYLIST" => target = Some(LocatorTarget::Playlist(value)),
                "SOUND" => target = Some(LocatorTarget::Sound(value)),
                "ITEM" => item = Some(value),
                "MARK" => mark = Some(value),
                "A1" => streams.primary_audio = value,
                "A2" => streams.secondary_audio = value,
                "P" => streams.pg_text = value,
                "V2" => streams.secondary_video = value,
                other => return Err(invalid(s, &format!("unknown component '{}'", other))),
            }
        }

        let target = target.ok_or_else(|| invalid(s, "no playlist or sound"))?;
        if matches!(target, LocatorTarget::Sound(_)) && (item.is_some() || mark.is_some() || !streams.is_empty()) {
            return Err(invalid(s, "sound locators take no other components"));
        }

        Ok(Self {
            disc: disc.to_string(),
            target,
            item,
            mark,
            streams,
        })
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", SCHEME, self.disc)?;
        match self.target {
            LocatorTarget::Playlist(n) => write!(f, ".PLAYLIST:{:05}", n)?,
            LocatorTarget::Sound(n) => write!(f, ".SOUND:{:02}", n)?,
        }
        if let Some(item) = self.item {
            write!(f, ".ITEM:{}", item)?;
        }
        if let Some(mark) = self.mark {
            write!(f, ".MARK:{}", mark)?;
        }
        let streams = [
            ("A1", self.streams.primary_audio),
            ("A2", self.streams.secondary_audio),
            ("P", self.streams.pg_text),
            ("V2", self.streams.secondary_video),
        ];
        for (key, value) in streams {
            if value > 0 {
                write!(f, ".{}:{}", key, value)?;
            }
        }
        Ok(())
    }
}
