//! Network streaming backend
//!
//! Plays http(s) sources through the PCM pipeline. The response body is read
//! progressively by the decoder on the worker thread, so playback starts as
//! soon as the container header has arrived. Streams without a declared
//! length report no duration and cannot seek.

use super::pcm::PcmPlayer;
use super::{
    BackendKind, Lifecycle, OutputParams, PlaybackBackend, PlaybackReady, PlaybackRequest,
};
use crate::audio::TrackDecoder;
use crate::error::{Error, Result};
use crate::track::{AudioFormat, Track, TrackSource};
use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_TYPE;
use std::io::Read;
use std::sync::Mutex;
use std::time::Duration;
use symphonia::core::io::{MediaSourceStream, ReadOnlySource};
use tracing::{debug, info};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("xrp-player/", env!("CARGO_PKG_VERSION"));

/// PCM player fed from an HTTP(S) response
#[derive(Debug)]
pub struct StreamPlayer {
    inner: PcmPlayer,
}

impl StreamPlayer {
    pub fn new(device: Option<String>) -> Self {
        Self {
            inner: PcmPlayer::with_opener(BackendKind::Stream, device, open_remote),
        }
    }
}

impl PlaybackBackend for StreamPlayer {
    fn kind(&self) -> BackendKind {
        BackendKind::Stream
    }

    fn lifecycle(&self) -> Lifecycle {
        self.inner.lifecycle()
    }

    fn create_playback(&mut self, request: PlaybackRequest) -> PlaybackReady {
        self.inner.create_playback(request)
    }

    fn play(&mut self) {
        self.inner.play();
    }

    fn pause(&mut self) {
        self.inner.pause();
    }

    fn resume(&mut self) {
        self.inner.resume();
    }

    fn stop(&mut self) {
        self.inner.stop();
    }

    fn seek(&mut self, position: Duration) {
        self.inner.seek(position);
    }

    fn set_output(&mut self, params: OutputParams) {
        self.inner.set_output(params);
    }

    fn dispose_playback(&mut self) {
        self.inner.dispose_playback();
    }

    fn dispose(&mut self) {
        self.inner.dispose();
    }
}

/// Response body as a symphonia source
///
/// `MediaSource` must be `Sync`; the mutex provides that without relying on
/// the HTTP client's internals.
struct HttpBody(Mutex<Response>);

impl Read for HttpBody {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0
            .get_mut()
            .map_err(|_| std::io::Error::other("response body poisoned"))?
            .read(buf)
    }
}

/// Classify a `Content-Type` header value
fn format_from_content_type(content_type: &str) -> AudioFormat {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "audio/mpeg" | "audio/mp3" => AudioFormat::Mp3,
        "audio/aac" | "audio/aacp" => AudioFormat::Aac,
        "audio/mp4" | "audio/x-m4a" => AudioFormat::M4a,
        "audio/flac" | "audio/x-flac" => AudioFormat::Flac,
        "audio/ogg" | "application/ogg" | "audio/vorbis" => AudioFormat::Ogg,
        "audio/opus" => AudioFormat::Opus,
        "audio/wav" | "audio/x-wav" | "audio/wave" => AudioFormat::Wav,
        _ => AudioFormat::Unknown,
    }
}

/// Connect and open a decoder on the response body (worker thread)
fn open_remote(track: &Track) -> Result<TrackDecoder> {
    let uri = match track.source() {
        TrackSource::Uri(uri) if track.source().is_remote() => uri,
        other => {
            return Err(Error::Network(format!("not an http(s) source: {}", other)));
        }
    };

    let client = Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(None::<Duration>)
        .build()
        .map_err(|e| Error::Network(e.to_string()))?;

    debug!(uri = %uri, "Connecting to stream");
    let response = client
        .get(uri.as_str())
        .send()
        .and_then(Response::error_for_status)
        .map_err(|e| Error::Network(e.to_string()))?;

    let mut format = track.format();
    if format == AudioFormat::Unknown {
        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
        {
            format = format_from_content_type(content_type);
        }
    }
    if format == AudioFormat::Opus {
        return Err(Error::UnsupportedFormat(format!("{} is an opus stream", uri)));
    }

    info!(
        uri = %uri,
        format = %format,
        content_length = response.content_length(),
        "Stream connected"
    );

    let source = ReadOnlySource::new(HttpBody(Mutex::new(response)));
    let mss = MediaSourceStream::new(Box::new(source), Default::default());
    TrackDecoder::open(mss, format)
}
