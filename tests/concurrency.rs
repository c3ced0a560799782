//! Concurrency integration tests

mod common;

use anyhow::Result;
use common::{playlist_player, wait_for_state, EventLog, Fixture};
use discplayer::clock::{ManualTimeBase, MediaTime};
use discplayer::engine::{EngineNotice, SimulatedEngine};
use discplayer::handlers::PlaylistHandler;
use discplayer::player::{Controller, ControllerState};
use discplayer::resource::{ResourceArbiter, ResourceKind};
use discplayer::utils::EngineConfig;
use serial_test::serial;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn test_concurrent_prefetch_has_one_winner() -> Result<()> {
    let clock = ManualTimeBase::new();
    let engine = Arc::new(SimulatedEngine::with_demo_disc(clock.clone(), &EngineConfig::default()));
    let arbiter = Arc::new(ResourceArbiter::new());

    let players: Vec<_> = (1..=3)
        .map(|n| {
            let locator = format!("bd://0.PLAYLIST:{:05}", n);
            let player = playlist_player(engine.clone(), clock.clone(), Arc::clone(&arbiter), &locator);
            let log = EventLog::attach(&player);
            (player, log)
        })
        .collect();

    let barrier = Arc::new(Barrier::new(players.len()));
    let handles: Vec<_> = players
        .iter()
        .map(|(player, _)| {
            let player = player.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                player.prefetch()
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().expect("prefetch thread panicked"));
    }

    let mut winners = Vec::new();
    for (player, log) in &players {
        let event = log.wait_for_any(&["PrefetchComplete", "ResourceUnavailable"]);
        if event.name() == "PrefetchComplete" {
            winners.push(player.id());
        } else {
            assert!(event.is_error());
            assert_eq!(player.state(), ControllerState::Realized);
            assert_eq!(player.target_state(), ControllerState::Realized);
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(arbiter.holder(ResourceKind::Playback), Some(winners[0]));

    for (player, _) in &players {
        player.close();
    }
    assert_eq!(arbiter.holder(ResourceKind::Playback), None);
    assert!(arbiter.registered().is_empty());
    Ok(())
}

#[test]
fn test_notices_from_foreign_threads() -> Result<()> {
    let f = Fixture::new();
    f.player.start();
    wait_for_state(&f.player, ControllerState::Started);

    let notifiers: Vec<_> = (0..4)
        .map(|t| {
            let player = f.player.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    let notice = if t % 2 == 0 {
                        EngineNotice::ChapterReached(i)
                    } else {
                        EngineNotice::MarkReached(i)
                    };
                    assert!(player.notify(notice));
                }
            })
        })
        .collect();

    for i in 0..20 {
        let rate = if i % 2 == 0 { 2.0 } else { 1.0 };
        assert_eq!(f.player.set_rate(rate)?, rate);
    }
    for notifier in notifiers {
        notifier.join().expect("notifier panicked");
    }

    // Everything queued before this has run once it returns
    assert!(f.player.stop());
    f.player.close();

    assert_eq!(f.log.count("Notice"), 200);
    assert_eq!(f.log.count("RateChange"), 20);
    let playback = f.player.controls().playback().expect("playback control");
    assert!(playback.chapter() < 50);
    Ok(())
}

#[test]
fn test_readers_never_block_on_commands() -> Result<()> {
    let f = Fixture::new();
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let player = f.player.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut reads = 0u64;
                while !done.load(Ordering::SeqCst) {
                    let status = player.status();
                    assert!(status.media_time >= MediaTime::ZERO);
                    let _ = player.media_time();
                    reads += 1;
                }
                reads
            })
        })
        .collect();

    for round in 0..10 {
        f.player.start();
        wait_for_state(&f.player, ControllerState::Started);
        f.clock.advance(Duration::from_millis(100));
        f.player.set_media_time(MediaTime::from_secs_f64(round as f64))?;
        assert!(f.player.stop());
        assert!(f.player.deallocate());
    }

    done.store(true, Ordering::SeqCst);
    for reader in readers {
        assert!(reader.join().expect("reader panicked") > 0);
    }
    f.player.close();
    Ok(())
}

#[test]
fn test_handle_can_close_from_another_thread() {
    let f = Fixture::new();
    f.player.start();
    wait_for_state(&f.player, ControllerState::Started);

    let player = f.player.clone();
    thread::spawn(move || player.close()).join().expect("close panicked");

    assert!(f.player.is_closed());
    assert!(!f.player.start());
    assert_eq!(f.log.count("Closed"), 1);
    assert_eq!(f.arbiter.holder(ResourceKind::Playback), None);
}

#[test]
#[serial]
fn test_global_arbiter_tracks_players() -> Result<()> {
    let clock = ManualTimeBase::new();
    let engine = Arc::new(SimulatedEngine::with_demo_disc(clock.clone(), &EngineConfig::default()));
    let global = ResourceArbiter::global();

    let a = Controller::builder(PlaylistHandler::new(engine.clone(), "bd://0.PLAYLIST:00001")?)
        .with_time_base(clock.clone())
        .build()?;
    let b = Controller::builder(PlaylistHandler::new(engine, "bd://0.PLAYLIST:00002")?)
        .with_time_base(clock)
        .build()?;

    let registered = global.registered();
    assert!(registered.contains(&a.id()));
    assert!(registered.contains(&b.id()));

    a.prefetch();
    wait_for_state(&a, ControllerState::Prefetched);
    assert_eq!(global.holder(ResourceKind::Playback), Some(a.id()));

    // Dropping an unclosed handle still unregisters it
    let b_id = b.id();
    a.close();
    drop(b);
    let registered = global.registered();
    assert!(!registered.contains(&a.id()));
    assert!(!registered.contains(&b_id));
    Ok(())
}
