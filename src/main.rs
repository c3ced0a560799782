use anyhow::{Context, Result};
use clap::Parser;
use discplayer::clock::{MediaTime, SystemTimeBase};
use discplayer::engine::SimulatedEngine;
use discplayer::events::{ControllerEvent, EventKind};
use discplayer::handlers::{Locator, PlaylistHandler, PlaylistPlayer};
use discplayer::player::{Controller, ControllerState};
use discplayer::utils::{self, Config};
use env_logger::Env;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// DiscPlayer - drive a playlist controller against a simulated disc
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to the system and user config files)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    /// Playlist to play
    #[arg(short, long, default_value = "1")]
    playlist: u32,

    /// Rate applied after playback starts
    #[arg(short, long, default_value = "2.0")]
    rate: f32,

    /// Seconds to play before stopping
    #[arg(long = "play-secs", value_name = "SECS", default_value = "1.0", value_parser = parse_play_time)]
    play_time: Duration,
}

fn parse_play_time(arg: &str) -> Result<Duration, String> {
    let secs: f64 = arg.parse().map_err(|e| format!("{}: {}", arg, e))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("{}: {}", arg, e))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => utils::load_config().context("loading configuration")?,
    };

    let log_level = if args.debug { "debug" } else { config.general.log_level.as_str() };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("Starting DiscPlayer v{}", env!("CARGO_PKG_VERSION"));

    let time_base = SystemTimeBase::shared();
    let engine = Arc::new(SimulatedEngine::with_demo_disc(Arc::clone(&time_base), &config.engine));
    let locator = Locator::playlist("0", args.playlist);

    let json = args.json;
    let player: PlaylistPlayer = Controller::builder(PlaylistHandler::new(engine, &locator.to_string())?)
        .with_config(config.controller.clone())
        .with_time_base(time_base)
        .with_listener(move |event: &ControllerEvent| print_event(event, json))
        .build()?;

    run(&player, &args);
    player.close();

    info!("DiscPlayer finished");
    Ok(())
}

fn run(player: &PlaylistPlayer, args: &Args) {
    player.prefetch();
    player.start();
    if !wait_for_state(player, ControllerState::Started, Duration::from_secs(5)) {
        error!("{} did not start (state {})", player.id(), player.state());
        return;
    }

    match player.set_rate(args.rate) {
        Ok(rate) => info!("Playing {} at {}x", player.locator(), rate),
        Err(e) => error!("Rate change failed: {}", e),
    }

    thread::sleep(args.play_time);
    player.stop();

    let status = player.status();
    info!(
        "Stopped at {} ({}) in {:?}",
        status.media_time,
        utils::format_timecode(status.media_time),
        status.state
    );
    if let Some(clip) = player.current_clip() {
        info!("Current clip {}", clip.clip_id);
    }
    if let Some(duration) = player.duration() {
        info!("Playlist length {}", utils::format_timecode(duration));
    }
    if status.media_time > MediaTime::ZERO {
        info!("Played {:.3}s of media", status.media_time.as_secs_f64());
    }
}

fn wait_for_state(player: &PlaylistPlayer, state: ControllerState, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while player.state() != state {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
    true
}

fn print_event(event: &ControllerEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("Cannot serialize {}: {}", event.name(), e),
        }
        return;
    }

    match &event.kind {
        EventKind::Transition(t) => println!("{}: {} -> {} (target {})", event.source, t.previous, t.current, t.target),
        EventKind::Start { media_time, .. } => println!("{}: started at {}", event.source, media_time),
        EventKind::RateChange { rate } => println!("{}: rate {}", event.source, rate),
        EventKind::Error { error, state } => println!("{}: error in {}: {}", event.source, state, error),
        EventKind::ResourceUnavailable { message } => println!("{}: resource unavailable: {}", event.source, message),
        _ => match (event.transition(), event.media_time()) {
            (Some(t), Some(at)) => println!("{}: {} {} -> {} at {}", event.source, event.name(), t.previous, t.current, at),
            (Some(t), None) => println!("{}: {} {} -> {}", event.source, event.name(), t.previous, t.current),
            _ => println!("{}: {}", event.source, event.name()),
        },
    }
}
