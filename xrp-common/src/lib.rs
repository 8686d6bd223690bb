//! # XRP Common Library
//!
//! Shared code for the XRP playback engine and the UI layers built on it:
//! - Error type
//! - Playback enums and the external event record (`PlayerEvent`)
//! - Fade curve definitions and calculations
//! - Configuration file resolution
//! - Time conversion helpers

pub mod config;
pub mod error;
pub mod events;
pub mod fade_curves;
pub mod time;

pub use error::{Error, Result};
pub use events::{EventBus, LoopMode, PlayerEvent, Status, TrackId};
pub use fade_curves::FadeCurve;
