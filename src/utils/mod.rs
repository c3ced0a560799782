//! Utility module for DiscPlayer
//!
//! This module provides common utilities used throughout the crate:
//! - Error handling with custom error types
//! - Configuration management
//! - Bounded shutdown of foreign threads
//! - Timecode formatting

pub mod config;
pub mod error;
pub mod thread;

// Re-export commonly used items
pub use config::{Config, ControllerConfig, EngineConfig, GeneralConfig};
pub use error::{DiscPlayerError, EngineError, HookError, HookResult, Result};

use crate::clock::MediaTime;

/// Initialize the application configuration
///
/// Loads configuration from:
/// 1. Default values
/// 2. System configuration file
/// 3. User configuration file
/// 4. Environment variables
pub fn load_config() -> Result<Config> {
    Config::load()
}

/// Format a media position as a disc timecode, `H:MM:SS.mmm`
pub fn format_timecode(time: MediaTime) -> String {
    let millis = time.as_nanos() / 1_000_000;
    let sign = if millis < 0 { "-" } else { "" };
    let millis = millis.unsigned_abs();
    format!(
        "{}{}:{:02}:{:02}.{:03}",
        sign,
        millis / 3_600_000,
        millis / 60_000 % 60,
        millis / 1000 % 60,
        millis % 1000
    )
}
