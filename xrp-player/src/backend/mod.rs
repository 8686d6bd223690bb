//! Playback backends
//!
//! A backend turns one track into sound. Three implementations exist and the
//! set is closed, so they are gathered in the `Backend` enum and dispatched
//! through the single `PlaybackBackend` trait:
//!
//! - `FrameworkPlayer`: rodio's `Sink` (the media-framework player)
//! - `PcmPlayer`: symphonia decode, rubato resample, cpal output
//! - `StreamPlayer`: the PCM pipeline fed from an HTTP(S) response
//!
//! Every backend owns a private worker thread. Opening a track is the only
//! asynchronous operation; its outcome is delivered exactly once through a
//! `Completion`/`PlaybackReady` pair. While playing, the worker reports
//! positions, the end of media, or a runtime failure through `BackendEvents`,
//! which the engine tags with its generation counter.

pub mod framework;
pub mod pcm;
pub mod selector;
pub mod stream;
pub(crate) mod worker;

pub use framework::FrameworkPlayer;
pub use pcm::PcmPlayer;
pub use selector::BackendSelector;
pub use stream::StreamPlayer;

use crate::error::BackendError;
use crate::state::PlaybackState;
use crate::track::Track;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Which backend implementation handles a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Framework,
    Pcm,
    Stream,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Framework => write!(f, "framework"),
            BackendKind::Pcm => write!(f, "pcm"),
            BackendKind::Stream => write!(f, "stream"),
        }
    }
}

/// Per-instance backend lifecycle
///
/// `Uninitialized → Opening → {Ready | Failed} → Playing ⇄ Paused → Stopped → Disposed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
    Uninitialized = 0,
    Opening = 1,
    Ready = 2,
    Failed = 3,
    Playing = 4,
    Paused = 5,
    Stopped = 6,
    Disposed = 7,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Lifecycle::Opening,
            2 => Lifecycle::Ready,
            3 => Lifecycle::Failed,
            4 => Lifecycle::Playing,
            5 => Lifecycle::Paused,
            6 => Lifecycle::Stopped,
            7 => Lifecycle::Disposed,
            _ => Lifecycle::Uninitialized,
        }
    }

    /// Playback resources exist and accept transport commands
    pub fn has_playback(&self) -> bool {
        matches!(
            self,
            Lifecycle::Ready | Lifecycle::Playing | Lifecycle::Paused | Lifecycle::Stopped
        )
    }
}

/// Lifecycle shared between a backend and its worker thread
///
/// `Disposed` is terminal: once stored, later transitions are ignored.
#[derive(Debug, Clone)]
pub struct SharedLifecycle(Arc<AtomicU8>);

impl SharedLifecycle {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(Lifecycle::Uninitialized as u8)))
    }

    pub fn get(&self) -> Lifecycle {
        Lifecycle::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, next: Lifecycle) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != Lifecycle::Disposed as u8).then_some(next as u8)
            });
    }
}

impl Default for SharedLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// What a backend learned while opening a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MediaInfo {
    pub duration: Option<Duration>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

/// Output parameters pushed from the engine to the backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputParams {
    pub volume: f32,
    pub balance: f32,
    pub mute: bool,
    pub rate: f32,
}

impl OutputParams {
    /// Volume after muting
    pub fn effective_volume(&self) -> f32 {
        if self.mute {
            0.0
        } else {
            self.volume
        }
    }
}

impl Default for OutputParams {
    fn default() -> Self {
        Self::from(&PlaybackState::default())
    }
}

impl From<&PlaybackState> for OutputParams {
    fn from(state: &PlaybackState) -> Self {
        Self {
            volume: state.volume(),
            balance: state.balance(),
            mute: state.mute(),
            rate: state.rate(),
        }
    }
}

type OpenResult = Result<MediaInfo, BackendError>;

/// Single-use resolver for a `PlaybackReady`
///
/// Consuming `ready`/`fail` makes double resolution unrepresentable; dropping
/// it unresolved makes the paired `PlaybackReady` resolve to
/// `BackendError::Abandoned`.
#[derive(Debug)]
pub struct Completion {
    tx: oneshot::Sender<OpenResult>,
}

impl Completion {
    pub fn ready(self, info: MediaInfo) {
        let _ = self.tx.send(Ok(info));
    }

    pub fn fail(self, error: BackendError) {
        let _ = self.tx.send(Err(error));
    }

    pub fn resolve(self, result: OpenResult) {
        let _ = self.tx.send(result);
    }
}

/// Future outcome of `create_playback`
#[derive(Debug)]
pub struct PlaybackReady {
    rx: oneshot::Receiver<OpenResult>,
}

impl PlaybackReady {
    /// An unresolved future together with its resolver
    pub fn pending() -> (Completion, PlaybackReady) {
        let (tx, rx) = oneshot::channel();
        (Completion { tx }, PlaybackReady { rx })
    }

    /// An already resolved future
    pub fn resolved(result: OpenResult) -> Self {
        let (completion, ready) = Self::pending();
        completion.resolve(result);
        ready
    }
}

impl Future for PlaybackReady {
    type Output = OpenResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(BackendError::Abandoned)))
    }
}

/// Runtime notifications from a backend to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Current playback position
    Position(Duration),
    /// Media duration became known or changed
    Duration(Duration),
    /// Reached the end of the media
    Finished,
    /// Playback broke after a successful open
    Failed(BackendError),
}

/// A `BackendEvent` together with the engine generation it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: BackendEvent,
}

/// Sender half used by backends to report `BackendEvent`s
///
/// Sending never fails from the backend's point of view: once the engine is
/// gone events are silently dropped.
#[derive(Debug, Clone)]
pub struct BackendEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl BackendEvents {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    /// Sender plus receiver, for driving a backend outside the engine
    pub fn channel(generation: u64) -> (Self, mpsc::UnboundedReceiver<TaggedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(generation, tx), rx)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn send(&self, event: BackendEvent) {
        let _ = self.tx.send(TaggedEvent {
            generation: self.generation,
            event,
        });
    }

    pub fn position(&self, position: Duration) {
        self.send(BackendEvent::Position(position));
    }

    pub fn duration(&self, duration: Duration) {
        self.send(BackendEvent::Duration(duration));
    }

    pub fn finished(&self) {
        self.send(BackendEvent::Finished);
    }

    pub fn failed(&self, error: BackendError) {
        self.send(BackendEvent::Failed(error));
    }
}

/// Everything a backend needs to open a track
#[derive(Debug, Clone)]
pub struct PlaybackRequest {
    pub track: Track,
    pub output: OutputParams,
    pub events: BackendEvents,
}

/// Uniform contract implemented by every backend
///
/// Only the engine calls these, never concurrently on one instance. Transport
/// calls made before `create_playback` resolves are queued by the backend and
/// applied once the track is open; calls after `dispose` are no-ops.
pub trait PlaybackBackend: Send + 'static {
    fn kind(&self) -> BackendKind;

    fn lifecycle(&self) -> Lifecycle;

    /// Start opening `request.track` off the calling thread
    fn create_playback(&mut self, request: PlaybackRequest) -> PlaybackReady;

    fn play(&mut self);

    fn pause(&mut self);

    fn resume(&mut self);

    fn stop(&mut self);

    /// Seek to `position`, clamped to the media duration
    fn seek(&mut self, position: Duration);

    /// Apply volume, balance, mute and rate
    fn set_output(&mut self, params: OutputParams);

    /// Release per-track resources; idempotent
    fn dispose_playback(&mut self);

    /// Retire the backend permanently
    fn dispose(&mut self);
}

/// Creates backends on demand, one per track
pub trait BackendProvider: Send + 'static {
    type Backend: PlaybackBackend;

    fn create(&mut self, kind: BackendKind) -> Self::Backend;
}

/// The closed set of production backends
#[derive(Debug)]
pub enum Backend {
    Framework(FrameworkPlayer),
    Pcm(PcmPlayer),
    Stream(StreamPlayer),
}

macro_rules! delegate {
    ($self:ident, $backend:ident => $call:expr) => {
        match $self {
            Backend::Framework($backend) => $call,
            Backend::Pcm($backend) => $call,
            Backend::Stream($backend) => $call,
        }
    };
}

impl PlaybackBackend for Backend {
    fn kind(&self) -> BackendKind {
        delegate!(self, b => b.kind())
    }

    fn lifecycle(&self) -> Lifecycle {
        delegate!(self, b => b.lifecycle())
    }

    fn create_playback(&mut self, request: PlaybackRequest) -> PlaybackReady {
        delegate!(self, b => b.create_playback(request))
    }

    fn play(&mut self) {
        delegate!(self, b => b.play())
    }

    fn pause(&mut self) {
        delegate!(self, b => b.pause())
    }

    fn resume(&mut self) {
        delegate!(self, b => b.resume())
    }

    fn stop(&mut self) {
        delegate!(self, b => b.stop())
    }

    fn seek(&mut self, position: Duration) {
        delegate!(self, b => b.seek(position))
    }

    fn set_output(&mut self, params: OutputParams) {
        delegate!(self, b => b.set_output(params))
    }

    fn dispose_playback(&mut self) {
        delegate!(self, b => b.dispose_playback())
    }

    fn dispose(&mut self) {
        delegate!(self, b => b.dispose())
    }
}

/// Provider of real audio backends
#[derive(Debug, Clone, Default)]
pub struct SystemBackends {
    /// Output device name (None = default device)
    pub device: Option<String>,
}

impl SystemBackends {
    pub fn new(device: Option<String>) -> Self {
        Self { device }
    }
}

impl BackendProvider for SystemBackends {
    type Backend = Backend;

    fn create(&mut self, kind: BackendKind) -> Backend {
        match kind {
            BackendKind::Framework => Backend::Framework(FrameworkPlayer::new(self.device.clone())),
            BackendKind::Pcm => Backend::Pcm(PcmPlayer::new(self.device.clone())),
            BackendKind::Stream => Backend::Stream(StreamPlayer::new(self.device.clone())),
        }
    }
}
