//! xrp-player - command-line front end for the playback engine
//!
//! Plays the given files or http(s) URLs in order through `GeneralPlayer`,
//! logging engine events until the queue is exhausted or Ctrl+C is pressed.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xrp_common::time::format_clock;
use xrp_common::{LoopMode, PlayerEvent, Status};
use xrp_player::audio::AudioSink;
use xrp_player::config::CONFIG_ENV_VAR;
use xrp_player::{
    GeneralPlayer, PlayerConfig, PlaylistCollaborator, QueuePlaylist, Track, TrackSource,
};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", ",
    env!("BUILD_PROFILE"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

/// Command-line arguments for xrp-player
#[derive(Parser, Debug)]
#[command(name = "xrp-player")]
#[command(about = "Play audio files and streams through the XRP playback engine")]
#[command(version, long_version = LONG_VERSION)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Starting volume (0.0-1.0), overrides the configuration file
    #[arg(long)]
    volume: Option<f32>,

    /// What happens at the end of a track: off, song, playlist or random
    #[arg(long, default_value = "off", value_parser = parse_loop_mode)]
    loop_mode: LoopMode,

    /// Disable the volume fade around seeks
    #[arg(long)]
    no_seek_fade: bool,

    /// Print engine events as JSON lines on stdout
    #[arg(long)]
    json_events: bool,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Files or http(s) URLs to play
    items: Vec<String>,
}

fn parse_loop_mode(s: &str) -> std::result::Result<LoopMode, String> {
    LoopMode::from_str(s).ok_or_else(|| format!("unknown loop mode '{}'", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xrp_player=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    if args.list_devices {
        for name in AudioSink::list_devices().context("Failed to list output devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    if args.items.is_empty() {
        bail!("Nothing to play: pass one or more files or URLs");
    }

    let config_path =
        xrp_common::config::resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR);
    let mut config =
        PlayerConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    if let Some(volume) = args.volume {
        config.playback.initial_volume = volume;
    }
    if args.no_seek_fade {
        config.playback.seek_fade_enabled = false;
    }
    config.validate();

    info!(
        "Starting xrp-player {} with {} item(s)",
        LONG_VERSION,
        args.items.len()
    );

    let tracks: Vec<Track> = args
        .items
        .iter()
        .map(|item| Track::new(TrackSource::parse(item)))
        .collect();
    let playlist = Arc::new(QueuePlaylist::new(tracks));
    playlist.set_loop_mode(args.loop_mode);

    let player = GeneralPlayer::new(&config, playlist.clone());
    player.set_loop_mode(args.loop_mode);
    let mut events = player.subscribe();

    match playlist.play_next_item() {
        Some(first) => player.play(first),
        None => bail!("No playable items"),
    }

    let mut state = player.state();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    log_event(&event, args.json_events);
                    if is_queue_exhausted(&event, &playlist) {
                        info!("Queue finished");
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("Event log lagged, {} events dropped", missed)
                }
                Err(RecvError::Closed) => break,
            },
            _ = &mut shutdown => break,
            changed = state.changed() => {
                if changed.is_none() {
                    break;
                }
            }
        }
    }

    player.dispose().await;
    info!("Player shutdown complete");
    Ok(())
}

/// A stop or a skipped track with no active playlist means the engine ran
/// out of items
fn is_queue_exhausted(event: &PlayerEvent, playlist: &QueuePlaylist) -> bool {
    let ends_item = matches!(
        event,
        PlayerEvent::StatusChanged {
            new_status: Status::Stopped,
            ..
        } | PlayerEvent::PlaybackError { .. }
    );
    ends_item && !playlist.is_active()
}

fn log_event(event: &PlayerEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to serialize event: {}", e),
        }
        return;
    }

    match event {
        PlayerEvent::ItemChanged { title, .. } => info!("Now playing: {}", title),
        PlayerEvent::PlaybackStarted { duration_ms, .. } => match duration_ms {
            Some(ms) => info!(
                "Duration {}",
                format_clock(xrp_common::time::millis_to_duration(*ms))
            ),
            None => info!("Duration unknown"),
        },
        PlayerEvent::PlaybackEnded { .. } => info!("Track ended"),
        PlayerEvent::SeekDone { position_ms, .. } => info!(
            "Seeked to {}",
            format_clock(xrp_common::time::millis_to_duration(*position_ms))
        ),
        PlayerEvent::PlaybackError { reason, .. } => warn!("Skipped track: {}", reason),
        PlayerEvent::StatusChanged {
            old_status,
            new_status,
            ..
        } => info!("Status {} -> {}", old_status, new_status),
        PlayerEvent::PlayedThresholdReached { listened_ms, .. } => {
            info!("Counted as played after {} ms", listened_ms)
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
