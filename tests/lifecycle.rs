//! Lifecycle integration tests
//!
//! These tests drive a playlist player through its state machine and check
//! the transitions, events and resource grants it reports.

mod common;

use anyhow::Result;
use common::{is_legal, wait_for_state, EventLog, Fixture};
use discplayer::clock::{MediaTime, SystemTimeBase};
use discplayer::engine::{EngineNotice, EngineOp, SimulatedEngine};
use discplayer::events::EventKind;
use discplayer::handlers::PlaylistHandler;
use discplayer::player::{Controller, ControllerState};
use discplayer::resource::{ResourceArbiter, ResourceKind};
use discplayer::utils::{Config, ControllerConfig, EngineConfig};
use discplayer::DiscPlayerError;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_observed_transitions_are_legal() -> Result<()> {
    let f = Fixture::new();
    let player = &f.player;

    player.prefetch();
    player.start();
    wait_for_state(player, ControllerState::Started);
    assert!(player.stop());
    assert!(player.deallocate());
    player.realize();
    player.start();
    wait_for_state(player, ControllerState::Started);
    assert!(player.deallocate());
    assert_eq!(player.state(), ControllerState::Realized);
    player.prefetch();
    player.close();

    for event in f.log.all() {
        if let Some(t) = event.transition() {
            assert!(is_legal(t.previous, t.current), "illegal {:?} in {}", t, event.name());
        }
    }
    assert_eq!(player.state(), ControllerState::Closed);
    assert_eq!(f.log.names().last(), Some(&"Closed"));
    Ok(())
}

#[test]
fn test_deallocate_releases_resource() -> Result<()> {
    let f = Fixture::new();
    f.player.prefetch();
    f.log.wait_for("PrefetchComplete");
    assert_eq!(f.arbiter.holder(ResourceKind::Playback), Some(f.player.id()));

    assert!(f.player.deallocate());
    let event = f.log.wait_for("Deallocate");
    let transition = event.transition().expect("deallocate carries a transition");
    assert_eq!(transition.previous, ControllerState::Prefetched);
    assert_eq!(transition.current, ControllerState::Realized);
    assert_eq!(f.arbiter.holder(ResourceKind::Playback), None);

    // Nothing held any more: reported, but unchanged
    f.player.deallocate();
    let event = f.log.wait_for("Deallocate");
    assert_eq!(event.transition().map(|t| t.previous), Some(ControllerState::Realized));
    f.player.close();
    Ok(())
}

#[test]
fn test_prefetch_failure_releases_resource() -> Result<()> {
    let f = Fixture::new();
    f.engine.fail_on(EngineOp::SelectSource);

    f.player.prefetch();
    let event = f.log.wait_for("Error");
    match event.kind {
        EventKind::Error { state, .. } => assert_eq!(state, ControllerState::Realized),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(f.player.state(), ControllerState::Realized);
    assert_eq!(f.arbiter.holder(ResourceKind::Playback), None);

    f.engine.clear_failures();
    f.player.prefetch();
    f.log.wait_for("PrefetchComplete");
    f.player.close();
    Ok(())
}

#[test]
fn test_close_is_idempotent() -> Result<()> {
    let f = Fixture::new();
    f.player.prefetch();

    let closers: Vec<_> = (0..4)
        .map(|_| {
            let player = f.player.clone();
            thread::spawn(move || player.close())
        })
        .collect();
    for closer in closers {
        closer.join().expect("close panicked");
    }
    f.player.close();

    assert!(f.player.is_closed());
    assert_eq!(f.log.count("Closed"), 1);
    assert!(f.arbiter.registered().is_empty());
    assert!(!f.player.prefetch());
    assert!(!f.player.stop());
    assert!(matches!(
        f.player.set_media_time(MediaTime::ZERO),
        Err(DiscPlayerError::Closed)
    ));
    Ok(())
}

#[test]
fn test_listener_can_remove_itself() -> Result<()> {
    let f = Fixture::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let own_id = Arc::new(OnceCell::new());

    let id = {
        let seen = Arc::clone(&seen);
        let own_id = Arc::clone(&own_id);
        let player = f.player.clone();
        f.player.add_listener(move |_: &discplayer::ControllerEvent| {
            seen.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = own_id.get() {
                player.remove_listener(*id);
            }
        })
    };
    own_id.set(id).expect("set once");

    f.player.realize();
    f.log.wait_for("RealizeComplete");
    f.player.close();

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_listener_can_close_player() -> Result<()> {
    let f = Fixture::new();
    {
        let player = f.player.clone();
        f.player.add_listener(move |event: &discplayer::ControllerEvent| {
            if matches!(event.kind, EventKind::EndOfMedia { .. }) {
                player.close();
            }
        });
    }

    f.player.start();
    f.log.wait_for("Start");
    f.player.notify(EngineNotice::EndOfMedia { playlist: 1 });
    f.log.wait_for("EndOfMedia");

    // Events queued by the close are still delivered to every listener
    f.log.wait_for("Closed");
    assert!(f.player.is_closed());
    assert_eq!(f.log.count("Closed"), 1);
    let names = f.log.names();
    let tail = &names[names.iter().position(|n| *n == "EndOfMedia").unwrap_or_default()..];
    assert_eq!(tail.last(), Some(&"Closed"));
    assert!(tail.contains(&"Deallocate"), "saw {:?}", tail);
    assert!(f.arbiter.registered().is_empty());
    Ok(())
}

#[test]
fn test_start_latency_comes_from_config() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[controller]\nstart_latency_ms = 250\nqueue_name = \"Latency\"\n")?;
    let config = Config::from_file(&path)?;

    let engine = Arc::new(SimulatedEngine::with_demo_disc(SystemTimeBase::shared(), &EngineConfig::default()));
    let player = Controller::builder(PlaylistHandler::new(engine, "bd://0.PLAYLIST:00002")?)
        .with_config(config.controller)
        .with_arbiter(Arc::new(ResourceArbiter::new()))
        .build()?;
    let log = EventLog::attach(&player);

    assert!(matches!(player.start_latency(), Err(DiscPlayerError::NotRealized(_))));
    player.realize();
    log.wait_for("RealizeComplete");
    assert_eq!(player.start_latency()?, Duration::from_millis(250));
    assert!(player.time_base().is_ok());
    assert!(player.gain_control()?.is_some());
    player.close();
    Ok(())
}

/// Real-time walk through prefetch, start, a rate change and stop
#[test]
fn test_example_scenario() -> Result<()> {
    let arbiter = Arc::new(ResourceArbiter::new());
    let engine = Arc::new(SimulatedEngine::with_demo_disc(SystemTimeBase::shared(), &EngineConfig::default()));
    let player = Controller::builder(PlaylistHandler::new(engine, "bd://0.PLAYLIST:00001")?)
        .with_config(ControllerConfig::default())
        .with_arbiter(Arc::clone(&arbiter))
        .build()?;
    let log = EventLog::attach(&player);
    assert_eq!(player.state(), ControllerState::Unrealized);

    player.prefetch();
    log.wait_for("PrefetchComplete");
    let transitions: Vec<_> = log.all().iter().filter_map(|e| e.transition()).collect();
    let moves: Vec<_> = transitions.iter().map(|t| (t.previous, t.current)).collect();
    assert_eq!(
        moves,
        vec![
            (ControllerState::Unrealized, ControllerState::Realizing),
            (ControllerState::Realizing, ControllerState::Realized),
            (ControllerState::Realized, ControllerState::Prefetching),
            (ControllerState::Prefetching, ControllerState::Prefetched),
        ]
    );
    assert_eq!(arbiter.holder(ResourceKind::Playback), Some(player.id()));

    player.start();
    let started = log.wait_for("Start");
    let at = started.media_time().expect("start carries a time");
    assert!(at.as_secs_f64().abs() < 0.05, "started at {}", at);

    assert_eq!(player.set_rate(2.0)?, 2.0);
    thread::sleep(Duration::from_secs(1));
    let running = player.media_time().as_secs_f64();
    assert!((running - 2.0).abs() < 0.25, "media time {} after 1s at 2x", running);

    assert!(player.stop());
    let stopped = log.wait_for("StopByRequest");
    assert_eq!(stopped.transition().map(|t| t.current), Some(ControllerState::Prefetched));
    let frozen = player.media_time();
    assert!((frozen.as_secs_f64() - 2.0).abs() < 0.3, "frozen at {}", frozen);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(player.media_time(), frozen);

    player.close();
    Ok(())
}
