//! DiscPlayer - playback controllers for disc playlists and sounds
//!
//! Each [`Controller`](player::Controller) serializes lifecycle requests
//! (realize, prefetch, start, stop, seek, rate changes, deallocate, close)
//! onto its own worker thread, keeps a consistent media clock, and reports
//! every transition to listeners on a separate event thread.

pub mod clock;
pub mod controls;
pub mod engine;
pub mod events;
pub mod handlers;
pub mod player;
pub mod queue;
pub mod resource;
pub mod utils;

pub use clock::{MediaTime, TimeBase};
pub use events::{ControllerEvent, EventKind};
pub use player::{Controller, ControllerState, EngineHooks};
pub use utils::error::{DiscPlayerError, Result};
