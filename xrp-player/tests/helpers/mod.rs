//! Test helpers for xrp-player engine integration tests
//!
//! - `MockControl`/`MockProvider`: scripted backends that record every call
//! - `RecordingPlaylist`: playlist collaborator that records what the engine asks

#![allow(dead_code)]

pub mod mock_backend;
pub mod recording_playlist;

pub use mock_backend::{Call, MockControl, OpenBehavior};
pub use recording_playlist::RecordingPlaylist;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use xrp_common::PlayerEvent;
use xrp_player::{GeneralPlayer, PlayerConfig};

/// Default config with a known starting volume
pub fn test_config() -> PlayerConfig {
    let mut config = PlayerConfig::default();
    config.playback.initial_volume = 0.8;
    config
}

/// Same as `test_config` with the seek fade switched off
pub fn no_fade_config() -> PlayerConfig {
    let mut config = test_config();
    config.playback.seek_fade_enabled = false;
    config
}

/// Engine over mock backends plus its controls
pub struct Harness {
    pub player: GeneralPlayer,
    pub control: MockControl,
    pub playlist: Arc<RecordingPlaylist>,
    pub events: broadcast::Receiver<PlayerEvent>,
}

impl Harness {
    pub fn start(config: PlayerConfig) -> Self {
        let control = MockControl::new();
        let playlist = Arc::new(RecordingPlaylist::new());
        let player = GeneralPlayer::with_provider(&config, control.provider(), playlist.clone());
        let events = player.subscribe();
        Self {
            player,
            control,
            playlist,
            events,
        }
    }

    /// Every event received since the last call
    pub fn drain_events(&mut self) -> Vec<PlayerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    /// Let virtual time pass, then wait for the engine to settle
    pub async fn advance(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
        self.player.flush().await;
    }
}

/// Event type names, for compact ordering assertions
pub fn kinds(events: &[PlayerEvent]) -> Vec<&str> {
    events.iter().map(PlayerEvent::event_type).collect()
}
