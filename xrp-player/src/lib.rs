//! # xrp-player
//!
//! Playback engine for a desktop media player. One `GeneralPlayer` plays one
//! track at a time through whichever backend can handle it:
//!
//! - `backend`: the backend contract, the three implementations and the selector
//! - `audio`: decode, resample and device output used by the PCM backends
//! - `playback`: the engine task, seek fading, the real-time clock and listen timers
//! - `state`: the observable playback state record
//! - `playlist`: the collaborator the engine asks for the next item
//! - `track`: track handles and format classification

pub mod audio;
pub mod backend;
pub mod config;
pub mod error;
pub mod playback;
pub mod playlist;
pub mod state;
pub mod track;

pub use backend::{BackendKind, BackendProvider, BackendSelector, PlaybackBackend, SystemBackends};
pub use config::PlayerConfig;
pub use error::{BackendError, Error, Result};
pub use playback::GeneralPlayer;
pub use playlist::{PlaylistCollaborator, QueuePlaylist};
pub use state::{PlaybackState, PlaybackStateReader, SharedPlaybackState};
pub use track::{AudioFormat, Track, TrackSource};
