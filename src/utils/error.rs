//! Error types for DiscPlayer
//!
//! Synchronous caller-facing failures use [`DiscPlayerError`]. Failures that
//! happen on a controller's worker thread (engine calls made from handler
//! hooks) use [`HookError`] and travel to listeners inside events, so they
//! are `Clone`.

use thiserror::Error;

/// Main error type for DiscPlayer
#[derive(Error, Debug)]
pub enum DiscPlayerError {
    /// Operation requires a realized controller
    #[error("Not realized: {0}")]
    NotRealized(String),

    /// Operation requires a prefetched controller
    #[error("Not prefetched: {0}")]
    NotPrefetched(String),

    /// Operation is not allowed while the clock is running
    #[error("Clock already started")]
    ClockStarted,

    /// Operation requires a running clock
    #[error("Clock stopped")]
    ClockStopped,

    /// Controller has been closed
    #[error("Controller closed")]
    Closed,

    /// Invalid argument supplied by the caller
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Locator cannot be handled by this handler
    #[error("Incompatible source: {0}")]
    IncompatibleSource(String),

    /// Playlist does not exist on the disc
    #[error("Invalid playlist: {0}")]
    InvalidPlaylist(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Media engine errors surfaced to a synchronous caller
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Generic error for unexpected situations
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results in DiscPlayer
pub type Result<T> = std::result::Result<T, DiscPlayerError>;

/// Failure reported by the media engine collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("playlist {0} not found")]
    PlaylistNotFound(u32),

    #[error("{op} rejected: {reason}")]
    Rejected { op: &'static str, reason: String },

    #[error("engine not ready")]
    NotReady,
}

impl EngineError {
    pub fn rejected<S: Into<String>>(op: &'static str, reason: S) -> Self {
        EngineError::Rejected {
            op,
            reason: reason.into(),
        }
    }
}

/// Failure returned by a handler hook during a state transition
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HookError {
    /// Connection to the media source failed
    #[error("connection error: {0}")]
    Connection(String),

    /// Engine call failed
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Handler has no way to perform the request
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Result type for handler hooks
pub type HookResult<T> = std::result::Result<T, HookError>;

/// Extension trait for converting foreign errors into DiscPlayerError
pub trait IntoPlayerError<T> {
    fn config_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoPlayerError<T> for std::result::Result<T, E> {
    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| DiscPlayerError::Config(format!("{}: {}", context, e)))
    }
}

/// Helper macro for creating internal errors with file and line information
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::utils::error::DiscPlayerError::Internal(
            format!("{} at {}:{}", $msg, file!(), line!())
        )
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::utils::error::DiscPlayerError::Internal(
            format!("{} at {}:{}", format!($fmt, $($arg)*), file!(), line!())
        )
    };
}
