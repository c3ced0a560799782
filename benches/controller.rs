use criterion::{black_box, criterion_group, criterion_main, Criterion};
use discplayer::clock::{ManualTimeBase, MediaTime};
use discplayer::engine::SimulatedEngine;
use discplayer::handlers::PlaylistHandler;
use discplayer::player::{Controller, ControllerState};
use discplayer::resource::ResourceArbiter;
use discplayer::utils::EngineConfig;
use std::sync::Arc;
use std::time::Duration;

fn started_player() -> Controller<PlaylistHandler> {
    let clock = ManualTimeBase::new();
    let engine = Arc::new(SimulatedEngine::with_demo_disc(clock.clone(), &EngineConfig::default()));
    let handler = PlaylistHandler::new(engine, "bd://0.PLAYLIST:00001").unwrap();
    let player = Controller::builder(handler)
        .with_time_base(clock)
        .with_arbiter(Arc::new(ResourceArbiter::new()))
        .build()
        .unwrap();

    player.start();
    while player.state() != ControllerState::Started {
        std::thread::sleep(Duration::from_millis(1));
    }
    player
}

fn bench_media_time(c: &mut Criterion) {
    let player = started_player();
    c.bench_function("media_time", |b| b.iter(|| black_box(player.media_time())));
    c.bench_function("status", |b| b.iter(|| black_box(player.status())));
    player.close();
}

fn bench_commands(c: &mut Criterion) {
    let player = started_player();
    let mut position = 0;
    c.bench_function("set_media_time", |b| {
        b.iter(|| {
            position = (position + 1_000) % 500_000;
            player.set_media_time(MediaTime::from_millis(position)).unwrap();
        })
    });
    c.bench_function("set_rate", |b| {
        let mut fast = false;
        b.iter(|| {
            fast = !fast;
            player.set_rate(if fast { 2.0 } else { 1.0 }).unwrap()
        })
    });
    player.close();
}

criterion_group!(benches, bench_media_time, bench_commands);
criterion_main!(benches);
