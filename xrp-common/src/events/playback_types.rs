//! Playback-related type definitions
//!
//! Supporting types for the playback state record and the event stream.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Playback status of the engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Nothing has been played yet, or the backend state is not known
    #[default]
    Unknown,
    Playing,
    Paused,
    Stopped,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Unknown => write!(f, "unknown"),
            Status::Playing => write!(f, "playing"),
            Status::Paused => write!(f, "paused"),
            Status::Stopped => write!(f, "stopped"),
        }
    }
}

/// What happens when a track reaches its end
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    /// Advance to the next playlist item, stop when there is none
    #[default]
    Off,
    /// Repeat the current track
    Song,
    /// Advance and wrap around the playlist
    Playlist,
    /// Advance to a random playlist item
    Random,
}

impl LoopMode {
    /// Parse loop mode from a CLI or configuration string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "none" => Some(LoopMode::Off),
            "song" | "track" | "one" => Some(LoopMode::Song),
            "playlist" | "all" => Some(LoopMode::Playlist),
            "random" | "shuffle" => Some(LoopMode::Random),
            _ => None,
        }
    }
}

impl std::fmt::Display for LoopMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopMode::Off => write!(f, "off"),
            LoopMode::Song => write!(f, "song"),
            LoopMode::Playlist => write!(f, "playlist"),
            LoopMode::Random => write!(f, "random"),
        }
    }
}

/// Stable identity of a track handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub Uuid);

impl TrackId {
    /// Generate a fresh random identity
    pub fn new() -> Self {
        TrackId(Uuid::new_v4())
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
