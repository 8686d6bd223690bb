//! Playback engine and its helpers
//!
//! - `engine`: the `GeneralPlayer` handle and the engine task behind it
//! - `real_time`: engine-side position clock, re-based on seeks
//! - `seek_fade`: volume ramp around seeks
//! - `timers`: listened-time thresholds

pub mod engine;
pub mod real_time;
pub mod seek_fade;
pub mod timers;

pub use engine::GeneralPlayer;
pub use real_time::RealTimeClock;
pub use seek_fade::{FadeSettings, FadeStep, SeekFade};
pub use timers::{ListenTimer, ListenTimers, TimerKind};
