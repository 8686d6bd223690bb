//! Media-framework backend built on rodio
//!
//! rodio owns decoding, mixing and the device stream; this backend only
//! drives a `Sink` from its worker thread. `OutputStream` is not `Send`, so
//! the stream is opened, used and dropped on that thread.
//!
//! `Sink` has no pan control, so balance is applied by a `Balanced` source
//! wrapped around each decoder. Rate maps to `Sink::set_speed`, which also
//! shifts pitch.

use super::worker::{Command, DeviceGate, WorkerHandle, REPORT_INTERVAL};
use super::{
    BackendEvents, BackendKind, Completion, Lifecycle, MediaInfo, OutputParams, PlaybackBackend,
    PlaybackReady, PlaybackRequest, SharedLifecycle,
};
use crate::error::{BackendError, Error, Result};
use crate::track::TrackSource;
use rodio::cpal::traits::HostTrait;
use rodio::source::SeekError;
use rodio::{Decoder, DeviceTrait, OutputStream, OutputStreamHandle, Sample, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

type FileDecoder = Decoder<BufReader<File>>;

fn open_decoder(path: &Path) -> Result<FileDecoder> {
    let file = File::open(path)?;
    Decoder::new(BufReader::new(file)).map_err(|e| Error::Decode(e.to_string()))
}

/// Balance shared between the worker and the sources it appended
#[derive(Debug, Clone, Default)]
struct BalanceControl(Arc<AtomicU32>);

impl BalanceControl {
    fn set(&self, balance: f32) {
        self.0.store(balance.clamp(-1.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Left and right multipliers; the opposite channel is attenuated
    fn gains(&self) -> (f32, f32) {
        let balance = f32::from_bits(self.0.load(Ordering::Relaxed));
        (1.0 - balance.max(0.0), 1.0 + balance.min(0.0))
    }
}

/// Source adapter scaling the left and right channels of stereo input
///
/// Input with any other channel count passes through unchanged.
struct Balanced<S> {
    inner: S,
    control: BalanceControl,
    channel: u16,
}

impl<S> Balanced<S> {
    fn new(inner: S, control: BalanceControl) -> Self {
        Self {
            inner,
            control,
            channel: 0,
        }
    }
}

impl<S> Iterator for Balanced<S>
where
    S: Source,
    S::Item: Sample,
{
    type Item = S::Item;

    fn next(&mut self) -> Option<S::Item> {
        let sample = self.inner.next()?;
        let channels = self.inner.channels();
        let channel = self.channel;
        self.channel = if channels == 0 { 0 } else { (channel + 1) % channels };
        if channels != 2 {
            return Some(sample);
        }
        let (left, right) = self.control.gains();
        Some(sample.amplify(if channel == 0 { left } else { right }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<S> Source for Balanced<S>
where
    S: Source,
    S::Item: Sample,
{
    fn current_frame_len(&self) -> Option<usize> {
        self.inner.current_frame_len()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }

    fn try_seek(&mut self, position: Duration) -> std::result::Result<(), SeekError> {
        self.inner.try_seek(position)?;
        self.channel = 0;
        Ok(())
    }
}

fn open_stream(device_name: Option<&str>) -> Result<(OutputStream, OutputStreamHandle)> {
    let host = rodio::cpal::default_host();

    if let Some(name) = device_name {
        let found = host
            .output_devices()
            .ok()
            .and_then(|mut devices| devices.find(|d| d.name().ok().as_deref() == Some(name)));
        match found {
            Some(device) => {
                return OutputStream::try_from_device(&device)
                    .map_err(|e| Error::AudioOutput(format!("Failed to open '{}': {}", name, e)));
            }
            None => warn!("Requested device '{}' not found, falling back to default device", name),
        }
    }

    OutputStream::try_default().map_err(|e| Error::AudioOutput(e.to_string()))
}

/// rodio `Sink` player
#[derive(Debug)]
pub struct FrameworkPlayer {
    device: Option<String>,
    lifecycle: SharedLifecycle,
    worker: Option<WorkerHandle>,
    disposed: bool,
}

impl FrameworkPlayer {
    pub fn new(device: Option<String>) -> Self {
        Self {
            device,
            lifecycle: SharedLifecycle::new(),
            worker: None,
            disposed: false,
        }
    }

    fn send(&self, command: Command) {
        if let Some(worker) = &self.worker {
            worker.send(command);
        }
    }
}

impl PlaybackBackend for FrameworkPlayer {
    fn kind(&self) -> BackendKind {
        BackendKind::Framework
    }

    fn lifecycle(&self) -> Lifecycle {
        if self.disposed {
            Lifecycle::Disposed
        } else if self.worker.is_none() {
            Lifecycle::Uninitialized
        } else {
            self.lifecycle.get()
        }
    }

    fn create_playback(&mut self, request: PlaybackRequest) -> PlaybackReady {
        if self.disposed {
            return PlaybackReady::resolved(Err(BackendError::Disposed));
        }
        self.dispose_playback();

        let path = match request.track.source() {
            TrackSource::File(path) => path.clone(),
            TrackSource::Uri(uri) => {
                return PlaybackReady::resolved(Err(BackendError::Open(format!(
                    "framework playback needs a local file, got {}",
                    uri
                ))));
            }
        };

        let lifecycle = SharedLifecycle::new();
        lifecycle.set(Lifecycle::Opening);
        self.lifecycle = lifecycle.clone();

        let (completion, ready) = PlaybackReady::pending();
        let job = FrameworkJob {
            path,
            device: self.device.clone(),
            output: request.output,
            events: request.events,
            lifecycle,
        };

        match WorkerHandle::spawn("framework-playback", move |commands, gate| {
            job.run(commands, &gate, completion)
        }) {
            Ok(worker) => self.worker = Some(worker),
            Err(e) => {
                error!("Failed to spawn framework worker: {}", e);
                self.lifecycle.set(Lifecycle::Failed);
            }
        }
        ready
    }

    fn play(&mut self) {
        self.send(Command::Play);
    }

    fn pause(&mut self) {
        self.send(Command::Pause);
    }

    fn resume(&mut self) {
        self.send(Command::Resume);
    }

    fn stop(&mut self) {
        self.send(Command::Stop);
    }

    fn seek(&mut self, position: Duration) {
        self.send(Command::Seek(position));
    }

    fn set_output(&mut self, params: OutputParams) {
        self.send(Command::Output(params));
    }

    fn dispose_playback(&mut self) {
        if let Some(worker) = self.worker.take() {
            debug!("Disposing framework playback");
            worker.shutdown();
        }
    }

    fn dispose(&mut self) {
        self.dispose_playback();
        self.lifecycle.set(Lifecycle::Disposed);
        self.disposed = true;
    }
}

impl Drop for FrameworkPlayer {
    fn drop(&mut self) {
        self.dispose_playback();
    }
}

struct FrameworkJob {
    path: PathBuf,
    device: Option<String>,
    output: OutputParams,
    events: BackendEvents,
    lifecycle: SharedLifecycle,
}

impl FrameworkJob {
    fn run(self, commands: Receiver<Command>, gate: &DeviceGate, completion: Completion) {
        let decoder = match open_decoder(&self.path) {
            Ok(decoder) => decoder,
            Err(e) => {
                warn!(path = %self.path.display(), "Cannot open track: {}", e);
                self.lifecycle.set(Lifecycle::Failed);
                completion.fail(e.into());
                return;
            }
        };
        let info = MediaInfo {
            duration: decoder.total_duration(),
            sample_rate: Some(decoder.sample_rate()),
            channels: Some(decoder.channels()),
        };

        let opened = gate.open_device(|| {
            let (stream, handle) = open_stream(self.device.as_deref())?;
            let sink = Sink::try_new(&handle).map_err(|e| Error::AudioOutput(e.to_string()))?;
            Ok::<_, Error>((stream, sink))
        });
        let (stream, sink) = match opened {
            Some(Ok(opened)) => opened,
            Some(Err(e)) => {
                error!("Cannot open audio output: {}", e);
                self.lifecycle.set(Lifecycle::Failed);
                completion.fail(e.into());
                return;
            }
            None => {
                completion.fail(BackendError::Disposed);
                return;
            }
        };

        let balance = BalanceControl::default();
        sink.pause();
        apply_output(&sink, &balance, self.output);
        sink.append(Balanced::new(decoder, balance.clone()));

        info!(path = %self.path.display(), "Track ready");
        self.lifecycle.set(Lifecycle::Ready);
        completion.ready(info);

        FrameworkWorker {
            path: self.path,
            sink,
            balance,
            duration: info.duration,
            lifecycle: self.lifecycle,
            events: self.events,
            playing: false,
        }
        .run(commands);

        drop(stream);
    }
}

fn apply_output(sink: &Sink, balance: &BalanceControl, params: OutputParams) {
    sink.set_volume(params.effective_volume());
    sink.set_speed(params.rate);
    balance.set(params.balance);
}

struct FrameworkWorker {
    path: PathBuf,
    sink: Sink,
    balance: BalanceControl,
    duration: Option<Duration>,
    lifecycle: SharedLifecycle,
    events: BackendEvents,
    playing: bool,
}

impl FrameworkWorker {
    fn run(mut self, commands: Receiver<Command>) {
        let mut last_report = Instant::now();
        loop {
            match commands.recv_timeout(REPORT_INTERVAL) {
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => {}
            }

            if !self.playing {
                continue;
            }
            if self.sink.empty() {
                self.playing = false;
                self.lifecycle.set(Lifecycle::Stopped);
                self.events.position(self.duration.unwrap_or_else(|| self.sink.get_pos()));
                self.events.finished();
            } else if last_report.elapsed() >= REPORT_INTERVAL {
                self.events.position(self.sink.get_pos());
                last_report = Instant::now();
            }
        }
        self.sink.stop();
        debug!("Framework worker exiting");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Play | Command::Resume => {
                if self.sink.empty() && !self.reload() {
                    return;
                }
                self.sink.play();
                self.playing = true;
                self.lifecycle.set(Lifecycle::Playing);
            }
            Command::Pause => {
                self.sink.pause();
                self.playing = false;
                self.lifecycle.set(Lifecycle::Paused);
                self.events.position(self.sink.get_pos());
            }
            Command::Stop => {
                self.sink.pause();
                self.playing = false;
                self.seek_to(Duration::ZERO);
                self.lifecycle.set(Lifecycle::Stopped);
            }
            Command::Seek(position) => self.seek_to(position),
            Command::Output(params) => apply_output(&self.sink, &self.balance, params),
            Command::Shutdown => {}
        }
    }

    /// Append a fresh decoder after the previous one ran out
    fn reload(&mut self) -> bool {
        match open_decoder(&self.path) {
            Ok(decoder) => {
                self.sink.append(Balanced::new(decoder, self.balance.clone()));
                true
            }
            Err(e) => {
                error!("Cannot reopen {}: {}", self.path.display(), e);
                self.playing = false;
                self.lifecycle.set(Lifecycle::Failed);
                self.events.failed(e.into());
                false
            }
        }
    }

    fn seek_to(&mut self, target: Duration) {
        let target = match self.duration {
            Some(duration) => target.min(duration),
            None => target,
        };
        if self.sink.empty() && !self.reload() {
            return;
        }
        if let Err(e) = self.sink.try_seek(target) {
            warn!("Seek to {:?} failed: {}", target, e);
        }
        self.events.position(self.sink.get_pos());
    }
}
