//! Backend selection
//!
//! Maps a track to the backend that should play it. Selection is a pure
//! function of the track's source and format plus the configured allow-list.

use super::BackendKind;
use crate::config::BackendConfig;
use crate::track::{AudioFormat, Track, TrackSource};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSelector {
    framework_formats: HashSet<AudioFormat>,
    stream_enabled: bool,
}

impl Default for BackendSelector {
    fn default() -> Self {
        Self::from_config(&BackendConfig::default())
    }
}

impl BackendSelector {
    pub fn new(
        framework_formats: impl IntoIterator<Item = AudioFormat>,
        stream_enabled: bool,
    ) -> Self {
        Self {
            framework_formats: framework_formats.into_iter().collect(),
            stream_enabled,
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(config.framework_formats(), config.stream_enabled)
    }

    /// Backend for `track`, or `None` when nothing can play it
    pub fn select(&self, track: &Track) -> Option<BackendKind> {
        let format = track.format();
        let source = track.source();

        match source {
            TrackSource::Uri(_) if source.is_remote() => {
                return self.stream_enabled.then_some(BackendKind::Stream);
            }
            TrackSource::Uri(_) => return None,
            TrackSource::File(_) => {}
        }

        if !format.is_playback_supported() {
            None
        } else if self.framework_formats.contains(&format) {
            Some(BackendKind::Framework)
        } else {
            Some(BackendKind::Pcm)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> Track {
        Track::from_path(format!("/music/{}", name))
    }

    fn uri(uri: &str) -> Track {
        Track::new(TrackSource::Uri(uri.to_string()))
    }

    #[test]
    fn test_default_routing_table() {
        let selector = BackendSelector::default();
        let cases = [
            ("a.mp3", Some(BackendKind::Framework)),
            ("a.MP4", Some(BackendKind::Framework)),
            ("a.m4a", Some(BackendKind::Framework)),
            ("a.wav", Some(BackendKind::Framework)),
            ("a.flac", Some(BackendKind::Pcm)),
            ("a.ogg", Some(BackendKind::Pcm)),
            ("a.aac", Some(BackendKind::Pcm)),
            ("a.aiff", Some(BackendKind::Pcm)),
            ("a.opus", None),
            ("a.txt", None),
            ("noextension", None),
        ];
        for (name, expected) in cases {
            assert_eq!(selector.select(&file(name)), expected, "{}", name);
        }
    }

    #[test]
    fn test_other_formats_go_to_pcm() {
        // Framework handles only FLAC; everything else goes to the PCM backend
        let selector = BackendSelector::new([AudioFormat::Flac], true);
        assert_eq!(selector.select(&file("a.flac")), Some(BackendKind::Framework));
        assert_eq!(selector.select(&file("a.mp3")), Some(BackendKind::Pcm));
    }

    #[test]
    fn test_remote_sources() {
        let enabled = BackendSelector::new([], true);
        let disabled = BackendSelector::new([], false);
        let radio = uri("https://radio.example/live");

        assert_eq!(enabled.select(&radio), Some(BackendKind::Stream));
        assert_eq!(disabled.select(&radio), None);
        assert_eq!(enabled.select(&uri("ftp://host/a.mp3")), None);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let selector = BackendSelector::default();
        let track = file("a.flac");
        assert_eq!(selector.select(&track), selector.select(&track));
    }
}
