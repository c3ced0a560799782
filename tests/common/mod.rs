//! Shared fixtures for integration tests

#![allow(dead_code)]

use crossbeam::channel::{unbounded, Receiver};
use discplayer::clock::{ManualTimeBase, TimeBase};
use discplayer::engine::SimulatedEngine;
use discplayer::events::ControllerEvent;
use discplayer::handlers::{PlaylistHandler, PlaylistPlayer};
use discplayer::player::{Controller, ControllerState};
use discplayer::resource::ResourceArbiter;
use discplayer::utils::{ControllerConfig, EngineConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(3);

/// Route crate logs through the test harness; `RUST_LOG` picks the level
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Records every event a controller emits
#[derive(Clone)]
pub struct EventLog {
    events: Arc<Mutex<Vec<ControllerEvent>>>,
    rx: Receiver<ControllerEvent>,
}

impl EventLog {
    /// Attach a new log to `player`
    pub fn attach(player: &PlaylistPlayer) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = unbounded();
        let sink = Arc::clone(&events);
        player.add_listener(move |event: &ControllerEvent| {
            sink.lock().push(event.clone());
            let _ = tx.send(event.clone());
        });
        Self { events, rx }
    }

    /// Block until an event named `name` arrives, skipping others
    pub fn wait_for(&self, name: &str) -> ControllerEvent {
        let deadline = Instant::now() + WAIT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(event) if event.name() == name => return event,
                Ok(_) => continue,
                Err(_) => panic!("no {} event within {:?}; saw {:?}", name, WAIT, self.names()),
            }
        }
    }

    /// Block until any of `names` arrives
    pub fn wait_for_any(&self, names: &[&str]) -> ControllerEvent {
        loop {
            let event = self.rx.recv_timeout(WAIT).expect("timed out waiting for event");
            if names.contains(&event.name()) {
                return event;
            }
        }
    }

    pub fn all(&self) -> Vec<ControllerEvent> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(ControllerEvent::name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name() == name).count()
    }
}

/// A playlist player on a simulated disc with a manual clock and private arbiter
pub struct Fixture {
    pub clock: Arc<ManualTimeBase>,
    pub engine: Arc<SimulatedEngine>,
    pub arbiter: Arc<ResourceArbiter>,
    pub player: PlaylistPlayer,
    pub log: EventLog,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_engine_config(EngineConfig::default())
    }

    pub fn with_engine_config(config: EngineConfig) -> Self {
        let arbiter = Arc::new(ResourceArbiter::new());
        Self::build(config, arbiter, "bd://0.PLAYLIST:00001")
    }

    pub fn build(config: EngineConfig, arbiter: Arc<ResourceArbiter>, locator: &str) -> Self {
        init_logging();
        let clock = ManualTimeBase::new();
        let engine = Arc::new(SimulatedEngine::with_demo_disc(clock.clone(), &config));
        let player = playlist_player(engine.clone(), clock.clone(), Arc::clone(&arbiter), locator);
        let log = EventLog::attach(&player);
        Self {
            clock,
            engine,
            arbiter,
            player,
            log,
        }
    }
}

pub fn playlist_player(
    engine: Arc<SimulatedEngine>,
    time_base: Arc<dyn TimeBase>,
    arbiter: Arc<ResourceArbiter>,
    locator: &str,
) -> PlaylistPlayer {
    let handler = PlaylistHandler::new(engine, locator).expect("valid locator");
    Controller::builder(handler)
        .with_config(ControllerConfig::default())
        .with_time_base(time_base)
        .with_arbiter(arbiter)
        .build()
        .expect("controller")
}

/// Poll until the player reaches `state`
pub fn wait_for_state(player: &PlaylistPlayer, state: ControllerState) {
    let deadline = Instant::now() + WAIT;
    while player.state() != state {
        assert!(Instant::now() < deadline, "{:?} never reached {}", player, state);
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Whether `previous -> current` is a legal lifecycle move
pub fn is_legal(previous: ControllerState, current: ControllerState) -> bool {
    use ControllerState::*;
    previous == current
        || matches!(
            (previous, current),
            (Unrealized, Realizing)
                | (Realizing, Realized)
                | (Realizing, Unrealized)
                | (Realized, Prefetching)
                | (Prefetching, Prefetched)
                | (Prefetching, Realized)
                | (Prefetched, Started)
                | (Started, Prefetched)
                | (Prefetched, Realized)
                | (Started, Realized)
                | (_, Closed)
        )
}
