//! Commands executed by a controller's worker

use crate::clock::MediaTime;
use crate::engine::EngineNotice;
use std::fmt;

pub(crate) enum Command<A> {
    Realize,
    Prefetch,
    Start(Option<MediaTime>),
    Stop,
    Deallocate,
    Close,
    SeekTime(MediaTime),
    SetRate(f32),
    /// Engine callback re-posted onto the worker
    Notice(EngineNotice),
    Action(A),
}

impl<A> Command<A> {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Realize => "realize",
            Command::Prefetch => "prefetch",
            Command::Start(_) => "start",
            Command::Stop => "stop",
            Command::Deallocate => "deallocate",
            Command::Close => "close",
            Command::SeekTime(_) => "seek",
            Command::SetRate(_) => "set_rate",
            Command::Notice(_) => "notice",
            Command::Action(_) => "action",
        }
    }
}

impl<A> fmt::Debug for Command<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Start(Some(at)) => write!(f, "start({})", at),
            Command::SeekTime(to) => write!(f, "seek({})", to),
            Command::SetRate(rate) => write!(f, "set_rate({})", rate),
            Command::Notice(notice) => write!(f, "notice({:?})", notice),
            other => f.write_str(other.name()),
        }
    }
}
