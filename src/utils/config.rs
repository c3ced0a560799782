//! Configuration management for DiscPlayer
//!
//! This module handles loading and managing configuration from config
//! files and environment variables.

use crate::utils::error::{DiscPlayerError, IntoPlayerError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Controller configuration
    pub controller: ControllerConfig,

    /// Simulated engine configuration
    pub engine: EngineConfig,

    /// General application settings
    pub general: GeneralConfig,
}

/// Controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Reported start latency in milliseconds
    pub start_latency_ms: u64,

    /// How long to wait for a listener thread to finish before interrupting it
    pub listener_stop_timeout_ms: u64,

    /// Grace period after an interrupt before the thread is abandoned
    pub interrupt_grace_ms: u64,

    /// Name given to command worker threads
    pub queue_name: String,
}

/// Simulated engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seek positions snap down to a multiple of this many 90 kHz ticks
    pub seek_granularity_ticks: u64,

    /// Duration of generated demo playlists
    pub default_playlist_duration_secs: u64,
}

/// General application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            start_latency_ms: 100,
            listener_stop_timeout_ms: 1000,
            interrupt_grace_ms: 200,
            queue_name: "MediaPlayer".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seek_granularity_ticks: 1,
            default_playlist_duration_secs: 600,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl ControllerConfig {
    pub fn start_latency(&self) -> Duration {
        Duration::from_millis(self.start_latency_ms)
    }

    pub fn listener_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.listener_stop_timeout_ms)
    }

    pub fn interrupt_grace(&self) -> Duration {
        Duration::from_millis(self.interrupt_grace_ms)
    }
}

impl Config {
    /// Load configuration from various sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. System config file (/etc/discplayer/config.toml on Linux)
    /// 3. User config file (~/.config/discplayer/config.toml on Linux)
    /// 4. Environment variables (DISCPLAYER_* prefix)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        let candidates = [Self::system_config_path(), Self::user_config_path()];
        for path in candidates.into_iter().flatten().filter(|p| p.exists()) {
            debug!("Loading configuration from {}", path.display());
            config = Self::read_file(&path)?;
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from an explicit file, then apply env overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to user config file
    pub fn save(&self) -> Result<()> {
        let path = Self::user_config_path()
            .ok_or_else(|| DiscPlayerError::Config("Cannot determine user config path".to_string()))?;
        self.save_to(&path)
    }

    /// Save configuration to the given path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).config_err("Failed to create config directory")?;
        }

        let toml = toml::to_string_pretty(self).config_err("Failed to serialize config")?;
        std::fs::write(path, toml).config_err("Failed to write config file")?;

        Ok(())
    }

    fn read_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).config_err("Failed to read config file")?;
        toml::from_str(&contents).config_err("Failed to parse config file")
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(latency) = std::env::var("DISCPLAYER_START_LATENCY_MS") {
            self.controller.start_latency_ms = latency
                .parse()
                .map_err(|_| DiscPlayerError::Config("Invalid DISCPLAYER_START_LATENCY_MS".to_string()))?;
        }

        if let Ok(timeout) = std::env::var("DISCPLAYER_LISTENER_STOP_TIMEOUT_MS") {
            self.controller.listener_stop_timeout_ms = timeout.parse().map_err(|_| {
                DiscPlayerError::Config("Invalid DISCPLAYER_LISTENER_STOP_TIMEOUT_MS".to_string())
            })?;
        }

        if let Ok(granularity) = std::env::var("DISCPLAYER_SEEK_GRANULARITY_TICKS") {
            self.engine.seek_granularity_ticks = granularity.parse().map_err(|_| {
                DiscPlayerError::Config("Invalid DISCPLAYER_SEEK_GRANULARITY_TICKS".to_string())
            })?;
        }

        if let Ok(log_level) = std::env::var("DISCPLAYER_LOG_LEVEL") {
            self.general.log_level = log_level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.engine.seek_granularity_ticks == 0 {
            return Err(DiscPlayerError::Config("Seek granularity must be non-zero".to_string()));
        }

        if self.controller.queue_name.is_empty() {
            return Err(DiscPlayerError::Config("Queue name must not be empty".to_string()));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(DiscPlayerError::Config(format!(
                "Invalid log level '{}', must be one of: {:?}",
                self.general.log_level, valid_log_levels
            )));
        }

        Ok(())
    }

    /// Get system config file path
    fn system_config_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        return Some(PathBuf::from("/etc/discplayer/config.toml"));

        #[cfg(target_os = "windows")]
        return std::env::var("PROGRAMDATA")
            .ok()
            .map(|p| PathBuf::from(p).join("DiscPlayer").join("config.toml"));

        #[cfg(target_os = "macos")]
        return Some(PathBuf::from("/Library/Application Support/DiscPlayer/config.toml"));

        #[allow(unreachable_code)]
        None
    }

    /// Get user config file path
    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("discplayer").join("config.toml"))
    }
}
