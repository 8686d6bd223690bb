//! Configuration for the xrp-player playback engine
//!
//! Loaded from a TOML file resolved by `xrp_common::config` (command line,
//! then `XRP_CONFIG`, then the per-user config directory). Every field has a
//! built-in default, so an empty or missing file yields a working engine.

use crate::error::Result;
use crate::track::AudioFormat;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::warn;
use xrp_common::FadeCurve;

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "XRP_CONFIG";

/// Complete player configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    pub output: OutputConfig,
    pub playback: PlaybackConfig,
    pub backends: BackendConfig,
}

/// Audio output settings
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Output device name (None = system default device)
    pub device: Option<String>,
}

/// Engine behaviour settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Volume at startup (0.0-1.0)
    pub initial_volume: f32,

    /// Ramp volume down and up around seeks
    pub seek_fade_enabled: bool,

    /// Length of each half of the seek fade
    pub seek_fade_ms: u64,

    /// Fade-out curve applied before the seek
    pub seek_fade_out_curve: FadeCurve,

    /// Fade-in curve applied after the seek
    pub seek_fade_in_curve: FadeCurve,

    /// Fade animation tick interval
    pub fade_tick_ms: u64,

    /// How often real time is republished while playing (clamped to 20-5000ms)
    pub position_interval_ms: u64,

    /// Listened time after which a track counts as played
    pub count_as_played_after_ms: u64,

    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            initial_volume: 0.75,
            seek_fade_enabled: true,
            seek_fade_ms: 150,
            seek_fade_out_curve: FadeCurve::Logarithmic,
            seek_fade_in_curve: FadeCurve::Exponential,
            fade_tick_ms: 10,
            position_interval_ms: 100,
            count_as_played_after_ms: 10_000,
            event_capacity: 256,
        }
    }
}

impl PlaybackConfig {
    pub fn seek_fade_duration(&self) -> Duration {
        Duration::from_millis(self.seek_fade_ms)
    }

    pub fn fade_tick(&self) -> Duration {
        Duration::from_millis(self.fade_tick_ms)
    }

    pub fn position_interval(&self) -> Duration {
        Duration::from_millis(self.position_interval_ms)
    }

    pub fn count_as_played_after(&self) -> Duration {
        Duration::from_millis(self.count_as_played_after_ms)
    }
}

/// Backend selection settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Formats routed to the media framework backend (by extension name)
    pub framework_formats: Vec<String>,

    /// Allow the network streaming backend for http(s) sources
    pub stream_enabled: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            framework_formats: ["mp3", "mp4", "m4a", "wav"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            stream_enabled: true,
        }
    }
}

impl BackendConfig {
    /// Parse `framework_formats` into formats, skipping unknown names
    pub fn framework_formats(&self) -> Vec<AudioFormat> {
        self.framework_formats
            .iter()
            .filter_map(|name| match AudioFormat::from_extension(name) {
                AudioFormat::Unknown => {
                    warn!(format = %name, "Ignoring unknown format in framework_formats");
                    None
                }
                format => Some(format),
            })
            .collect()
    }
}

impl PlayerConfig {
    /// Load configuration from a resolved file path (None = defaults)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config: PlayerConfig = xrp_common::config::load_toml(path)?;
        config.validate();
        Ok(config)
    }

    /// Clamp out-of-range values, logging each correction
    pub fn validate(&mut self) {
        let playback = &mut self.playback;

        if !(0.0..=1.0).contains(&playback.initial_volume) || playback.initial_volume.is_nan() {
            let clamped = if playback.initial_volume.is_nan() {
                PlaybackConfig::default().initial_volume
            } else {
                playback.initial_volume.clamp(0.0, 1.0)
            };
            warn!(
                "initial_volume {} out of range, using {}",
                playback.initial_volume, clamped
            );
            playback.initial_volume = clamped;
        }

        if playback.fade_tick_ms == 0 {
            warn!("fade_tick_ms must be positive, using 10");
            playback.fade_tick_ms = 10;
        }

        let interval = playback.position_interval_ms.clamp(20, 5000);
        if interval != playback.position_interval_ms {
            warn!(
                "position_interval_ms {} out of range, using {}",
                playback.position_interval_ms, interval
            );
            playback.position_interval_ms = interval;
        }

        if playback.event_capacity == 0 {
            warn!("event_capacity must be positive, using 256");
            playback.event_capacity = 256;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.playback.initial_volume, 0.75);
        assert!(config.playback.seek_fade_enabled);
        assert_eq!(config.playback.seek_fade_duration(), Duration::from_millis(150));
        assert_eq!(config.playback.seek_fade_out_curve, FadeCurve::Logarithmic);
        assert_eq!(config.playback.seek_fade_in_curve, FadeCurve::Exponential);
        assert!(config.backends.stream_enabled);
        assert_eq!(
            config.backends.framework_formats(),
            vec![AudioFormat::Mp3, AudioFormat::Mp4, AudioFormat::M4a, AudioFormat::Wav]
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: PlayerConfig = toml::from_str(
            r#"
            [playback]
            seek_fade_ms = 80

            [backends]
            framework_formats = ["flac", "bogus"]
            "#,
        )
        .unwrap();

        assert_eq!(config.playback.seek_fade_ms, 80);
        assert_eq!(config.playback.initial_volume, 0.75);
        assert_eq!(config.backends.framework_formats(), vec![AudioFormat::Flac]);
        assert!(config.output.device.is_none());
    }

    #[test]
    fn test_validate_clamps() {
        let mut config = PlayerConfig::default();
        config.playback.initial_volume = 3.0;
        config.playback.fade_tick_ms = 0;
        config.playback.position_interval_ms = 1;
        config.validate();

        assert_eq!(config.playback.initial_volume, 1.0);
        assert_eq!(config.playback.fade_tick_ms, 10);
        assert_eq!(config.playback.position_interval_ms, 20);
    }

    #[test]
    fn test_load_without_file() {
        assert_eq!(PlayerConfig::load(None).unwrap(), PlayerConfig::default());
    }
}
