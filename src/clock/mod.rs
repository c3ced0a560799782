//! Media time and time-base model
//!
//! A controller's position is extrapolated from a reference pair: the media
//! position `base_media_time` that was valid at time-base instant
//! `base_time`. While the clock runs, the position advances at `rate`
//! media-nanoseconds per time-base nanosecond.

mod time_base;

pub use time_base::{ManualTimeBase, SystemTimeBase, TimeBase};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

/// Engine clock frequency (90 kHz presentation ticks)
pub const TICKS_PER_SECOND: i64 = 90_000;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Media position in nanoseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MediaTime(i64);

impl MediaTime {
    pub const ZERO: MediaTime = MediaTime(0);

    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis * 1_000_000)
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * NANOS_PER_SECOND as f64).round() as i64)
    }

    /// Convert 90 kHz engine ticks to media time
    pub fn from_ticks(ticks: u64) -> Self {
        let ticks = ticks as i128;
        Self(((ticks * NANOS_PER_SECOND as i128 + TICKS_PER_SECOND as i128 / 2) / TICKS_PER_SECOND as i128) as i64)
    }

    /// Convert to 90 kHz engine ticks, clamping negative positions to zero
    pub fn to_ticks(self) -> u64 {
        if self.0 <= 0 {
            return 0;
        }
        ((self.0 as i128 * TICKS_PER_SECOND as i128) / NANOS_PER_SECOND as i128) as u64
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SECOND as f64
    }

    /// Non-negative positions as a `Duration`
    pub fn to_duration(self) -> Duration {
        Duration::from_nanos(self.0.max(0) as u64)
    }
}

impl From<Duration> for MediaTime {
    fn from(d: Duration) -> Self {
        Self(d.as_nanos().min(i64::MAX as u128) as i64)
    }
}

impl Add for MediaTime {
    type Output = MediaTime;

    fn add(self, rhs: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_add(rhs.0))
    }
}

impl Sub for MediaTime {
    type Output = MediaTime;

    fn sub(self, rhs: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.as_secs_f64())
    }
}

/// Reference pair from which the running position is extrapolated
///
/// Both fields are always replaced together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeReference {
    /// Media position valid at `base_time`
    pub base_media_time: MediaTime,
    /// Time-base reading in nanoseconds
    pub base_time: i64,
}

impl TimeReference {
    pub fn new(base_media_time: MediaTime, base_time: i64) -> Self {
        Self {
            base_media_time,
            base_time,
        }
    }

    /// Position at time-base instant `now` for a running clock
    pub fn position(&self, now: i64, rate: f32) -> MediaTime {
        if rate == 0.0 {
            return self.base_media_time;
        }
        let elapsed = now.saturating_sub(self.base_time);
        let scaled = (elapsed as f64 * rate as f64).round() as i64;
        self.base_media_time + MediaTime(scaled)
    }

    /// Re-anchor at `now`, carrying the position accumulated at `rate`
    pub fn rebase(&self, now: i64, rate: f32) -> TimeReference {
        TimeReference::new(self.position(now, rate), now)
    }
}
