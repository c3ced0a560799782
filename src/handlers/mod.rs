//! Concrete media handlers
//!
//! Each handler implements [`EngineHooks`](crate::player::EngineHooks) for
//! one kind of source and adds its own operations to the controller type.

mod locator;
mod playlist;
mod sound;

pub use locator::{Locator, LocatorTarget};
pub use playlist::{PlaylistAction, PlaylistHandler, PlaylistPlayer, PlaylistView};
pub use sound::{SoundAction, SoundHandler, SoundPlayer};
