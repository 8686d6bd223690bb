//! Scripted backends
//!
//! Each `MockBackend` records its calls into a shared log and resolves
//! `create_playback` according to the behaviour registered for the track.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use xrp_common::TrackId;
use xrp_player::backend::{
    BackendEvents, BackendKind, BackendProvider, Completion, Lifecycle, MediaInfo, OutputParams,
    PlaybackBackend, PlaybackReady, PlaybackRequest,
};
use xrp_player::{BackendError, Track};

/// Duration every mock track reports unless told otherwise
pub const MOCK_DURATION: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(BackendKind),
    CreatePlayback(TrackId, OutputParams),
    Play,
    Pause,
    Resume,
    Stop,
    Seek(Duration),
    SetOutput(OutputParams),
    DisposePlayback,
    Dispose,
}

#[derive(Debug, Clone)]
pub enum OpenBehavior {
    Succeed(MediaInfo),
    Fail(BackendError),
    /// Keep the open pending until `MockControl::complete`
    Hold,
}

#[derive(Default)]
struct ControlInner {
    calls: Vec<(usize, Call)>,
    behaviors: HashMap<TrackId, OpenBehavior>,
    held: HashMap<TrackId, Completion>,
    events: HashMap<TrackId, BackendEvents>,
    next_index: usize,
}

/// Shared script and call log for every backend a provider creates
#[derive(Clone, Default)]
pub struct MockControl {
    inner: Arc<Mutex<ControlInner>>,
}

impl MockControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(&self) -> MockProvider {
        MockProvider {
            control: self.clone(),
        }
    }

    pub fn on_open(&self, track: &Track, behavior: OpenBehavior) {
        self.inner.lock().unwrap().behaviors.insert(track.id(), behavior);
    }

    /// Resolve a held open; false if nothing was held for `track`
    pub fn complete(&self, track: &Track, result: Result<MediaInfo, BackendError>) -> bool {
        let held = self.inner.lock().unwrap().held.remove(&track.id());
        match held {
            Some(completion) => {
                completion.resolve(result);
                true
            }
            None => false,
        }
    }

    /// Event sender handed to the backend that opened `track`
    pub fn events_for(&self, track: &Track) -> BackendEvents {
        self.inner
            .lock()
            .unwrap()
            .events
            .get(&track.id())
            .cloned()
            .expect("track was never opened")
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.iter().map(|(_, c)| c.clone()).collect()
    }

    /// Calls made on the `index`-th created backend
    pub fn calls_on(&self, index: usize) -> Vec<Call> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(i, _)| *i == index)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    pub fn created(&self) -> Vec<BackendKind> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Create(kind) => Some(kind),
                _ => None,
            })
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::CreatePlayback(..)))
            .count()
    }

    pub fn seeks(&self) -> Vec<Duration> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Seek(position) => Some(position),
                _ => None,
            })
            .collect()
    }

    pub fn outputs(&self) -> Vec<OutputParams> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::SetOutput(params) => Some(params),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    fn record(&self, index: usize, call: Call) {
        self.inner.lock().unwrap().calls.push((index, call));
    }
}

pub struct MockProvider {
    control: MockControl,
}

impl BackendProvider for MockProvider {
    type Backend = MockBackend;

    fn create(&mut self, kind: BackendKind) -> MockBackend {
        let index = {
            let mut inner = self.control.inner.lock().unwrap();
            let index = inner.next_index;
            inner.next_index += 1;
            index
        };
        self.control.record(index, Call::Create(kind));
        MockBackend {
            index,
            kind,
            control: self.control.clone(),
            lifecycle: Lifecycle::Uninitialized,
        }
    }
}

pub struct MockBackend {
    index: usize,
    kind: BackendKind,
    control: MockControl,
    lifecycle: Lifecycle,
}

impl MockBackend {
    fn record(&self, call: Call) {
        self.control.record(self.index, call);
    }
}

impl PlaybackBackend for MockBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn create_playback(&mut self, request: PlaybackRequest) -> PlaybackReady {
        let id = request.track.id();
        self.record(Call::CreatePlayback(id, request.output));
        self.lifecycle = Lifecycle::Opening;

        let behavior = {
            let mut inner = self.control.inner.lock().unwrap();
            inner.events.insert(id, request.events);
            inner.behaviors.get(&id).cloned()
        };
        let behavior = behavior.unwrap_or(OpenBehavior::Succeed(MediaInfo {
            duration: Some(MOCK_DURATION),
            sample_rate: Some(44_100),
            channels: Some(2),
        }));

        match behavior {
            OpenBehavior::Succeed(info) => {
                self.lifecycle = Lifecycle::Ready;
                PlaybackReady::resolved(Ok(info))
            }
            OpenBehavior::Fail(error) => {
                self.lifecycle = Lifecycle::Failed;
                PlaybackReady::resolved(Err(error))
            }
            OpenBehavior::Hold => {
                let (completion, ready) = PlaybackReady::pending();
                self.control.inner.lock().unwrap().held.insert(id, completion);
                ready
            }
        }
    }

    fn play(&mut self) {
        self.record(Call::Play);
        self.lifecycle = Lifecycle::Playing;
    }

    fn pause(&mut self) {
        self.record(Call::Pause);
        self.lifecycle = Lifecycle::Paused;
    }

    fn resume(&mut self) {
        self.record(Call::Resume);
        self.lifecycle = Lifecycle::Playing;
    }

    fn stop(&mut self) {
        self.record(Call::Stop);
        self.lifecycle = Lifecycle::Stopped;
    }

    fn seek(&mut self, position: Duration) {
        self.record(Call::Seek(position));
    }

    fn set_output(&mut self, params: OutputParams) {
        self.record(Call::SetOutput(params));
    }

    fn dispose_playback(&mut self) {
        self.record(Call::DisposePlayback);
    }

    fn dispose(&mut self) {
        self.record(Call::Dispose);
        self.lifecycle = Lifecycle::Disposed;
    }
}
