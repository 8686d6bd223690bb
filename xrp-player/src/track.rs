//! Track handles
//!
//! A `Track` is owned by the playlist collaborator and handed to the engine
//! by value (it is a cheap `Arc` clone). The engine never mutates it except to
//! raise the playback-error flag, which playlists read to skip known-bad items.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use xrp_common::TrackId;

/// Container/codec format, classified from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Mp3,
    Mp4,
    M4a,
    Wav,
    Aac,
    Flac,
    Ogg,
    Opus,
    Aiff,
    Unknown,
}

impl AudioFormat {
    /// Classify an extension (without the dot), case-insensitively
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "mp3" => AudioFormat::Mp3,
            "mp4" => AudioFormat::Mp4,
            "m4a" => AudioFormat::M4a,
            "wav" | "wave" => AudioFormat::Wav,
            "aac" => AudioFormat::Aac,
            "flac" => AudioFormat::Flac,
            "ogg" | "oga" => AudioFormat::Ogg,
            "opus" => AudioFormat::Opus,
            "aif" | "aiff" => AudioFormat::Aiff,
            _ => AudioFormat::Unknown,
        }
    }

    /// Classify a file path by its extension
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(AudioFormat::Unknown)
    }

    /// Classify a URI by the extension of its path component
    pub fn from_uri(uri: &str) -> Self {
        let without_query = uri.split(['?', '#']).next().unwrap_or(uri);
        let last_segment = without_query.rsplit('/').next().unwrap_or(without_query);
        match last_segment.rsplit_once('.') {
            Some((_, ext)) => Self::from_extension(ext),
            None => AudioFormat::Unknown,
        }
    }

    /// Whether any backend is able to decode this format
    ///
    /// Opus needs a libopus-backed decoder that the bundled codec set does
    /// not include.
    pub fn is_playback_supported(&self) -> bool {
        !matches!(self, AudioFormat::Unknown | AudioFormat::Opus)
    }

    /// Canonical lowercase extension, used as a decoder probe hint
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            AudioFormat::Mp3 => Some("mp3"),
            AudioFormat::Mp4 => Some("mp4"),
            AudioFormat::M4a => Some("m4a"),
            AudioFormat::Wav => Some("wav"),
            AudioFormat::Aac => Some("aac"),
            AudioFormat::Flac => Some("flac"),
            AudioFormat::Ogg => Some("ogg"),
            AudioFormat::Opus => Some("opus"),
            AudioFormat::Aiff => Some("aiff"),
            AudioFormat::Unknown => None,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension().unwrap_or("unknown"))
    }
}

/// Where the track's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackSource {
    File(PathBuf),
    Uri(String),
}

impl TrackSource {
    /// Interpret a command-line style argument: anything with a URI scheme is
    /// a URI, everything else a file path
    pub fn parse(input: &str) -> Self {
        match input.split_once("://") {
            Some((scheme, _))
                if !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric()) =>
            {
                if scheme.eq_ignore_ascii_case("file") {
                    TrackSource::File(PathBuf::from(&input[scheme.len() + 3..]))
                } else {
                    TrackSource::Uri(input.to_string())
                }
            }
            _ => TrackSource::File(PathBuf::from(input)),
        }
    }

    /// True for http/https URIs
    pub fn is_remote(&self) -> bool {
        match self {
            TrackSource::Uri(uri) => {
                let lower = uri.to_ascii_lowercase();
                lower.starts_with("http://") || lower.starts_with("https://")
            }
            TrackSource::File(_) => false,
        }
    }
}

impl fmt::Display for TrackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackSource::File(path) => write!(f, "{}", path.display()),
            TrackSource::Uri(uri) => write!(f, "{}", uri),
        }
    }
}

#[derive(Debug)]
struct TrackInner {
    id: TrackId,
    source: TrackSource,
    format: AudioFormat,
    title: String,
    playback_error: AtomicBool,
}

/// Addressable audio item
#[derive(Debug, Clone)]
pub struct Track {
    inner: Arc<TrackInner>,
}

impl Track {
    /// Create a track with a fresh identity, classifying its format from the source
    pub fn new(source: TrackSource) -> Self {
        let format = match &source {
            TrackSource::File(path) => AudioFormat::from_path(path),
            TrackSource::Uri(uri) => AudioFormat::from_uri(uri),
        };
        Self::with_format(source, format)
    }

    /// Create a track with an explicitly known format
    pub fn with_format(source: TrackSource, format: AudioFormat) -> Self {
        let title = match &source {
            TrackSource::File(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            TrackSource::Uri(uri) => uri.clone(),
        };
        Self {
            inner: Arc::new(TrackInner {
                id: TrackId::new(),
                source,
                format,
                title,
                playback_error: AtomicBool::new(false),
            }),
        }
    }

    /// Convenience constructor for a local file
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::new(TrackSource::File(path.into()))
    }

    pub fn id(&self) -> TrackId {
        self.inner.id
    }

    /// Identity comparison: clones of one handle are the same track, two
    /// handles for the same file are not
    pub fn same(&self, other: &Track) -> bool {
        self.inner.id == other.inner.id
    }

    pub fn format(&self) -> AudioFormat {
        self.inner.format
    }

    pub fn source(&self) -> &TrackSource {
        &self.inner.source
    }

    pub fn title(&self) -> &str {
        &self.inner.title
    }

    /// Whether the engine failed to play this track
    pub fn playback_error(&self) -> bool {
        self.inner.playback_error.load(Ordering::Acquire)
    }

    pub(crate) fn mark_playback_error(&self) {
        self.inner.playback_error.store(true, Ordering::Release);
    }
}
