//! PCM backend: symphonia decode, rubato resample, cpal output
//!
//! One worker thread per track owns the decoder and the `AudioSink`. While
//! playing it keeps roughly 200ms of audio queued ahead of the device and
//! reports the position of what was actually heard. When the device rate
//! differs from the track rate the audio goes through a `StreamResampler`.
//!
//! Playback rate is accepted but not applied: this pipeline always plays at
//! 1.0x.

use super::worker::{Command, DeviceGate, WorkerHandle, IDLE_WAIT, REPORT_INTERVAL};
use super::{
    BackendEvents, BackendKind, Completion, Lifecycle, MediaInfo, OutputParams, PlaybackBackend,
    PlaybackReady, PlaybackRequest, SharedLifecycle,
};
use crate::audio::{AudioSink, OutputGain, StreamResampler, TrackDecoder};
use crate::error::{BackendError, Error, Result};
use crate::track::{Track, TrackSource};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Sleep while the output queue is full
const FILL_WAIT: Duration = Duration::from_millis(5);

/// Opens a decoder for a track; runs on the worker thread
pub(crate) type OpenTrack = fn(&Track) -> Result<TrackDecoder>;

fn open_local(track: &Track) -> Result<TrackDecoder> {
    match track.source() {
        TrackSource::File(path) => TrackDecoder::open_file(path, track.format()),
        TrackSource::Uri(uri) => Err(Error::Playback(format!(
            "local playback cannot open URI {}",
            uri
        ))),
    }
}

/// Decode-to-device player for local files
#[derive(Debug)]
pub struct PcmPlayer {
    kind: BackendKind,
    device: Option<String>,
    open: OpenTrack,
    lifecycle: SharedLifecycle,
    worker: Option<WorkerHandle>,
    disposed: bool,
}

impl PcmPlayer {
    pub fn new(device: Option<String>) -> Self {
        Self::with_opener(BackendKind::Pcm, device, open_local)
    }

    /// Same pipeline with a different source opener
    pub(crate) fn with_opener(kind: BackendKind, device: Option<String>, open: OpenTrack) -> Self {
        Self {
            kind,
            device,
            open,
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

impl PlaybackBackend for PcmPlayer {
    fn kind(&self) -> BackendKind {
        self.kind
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

        let lifecycle = SharedLifecycle::new();
        lifecycle.set(Lifecycle::Opening);
        self.lifecycle = lifecycle.clone();

        let (completion, ready) = PlaybackReady::pending();
        let job = PcmJob {
            open: self.open,
            track: request.track,
            device: self.device.clone(),
            output: request.output,
            events: request.events,
            lifecycle,
        };

        let name = format!("{}-playback", self.kind);
        let spawned = WorkerHandle::spawn(&name, move |commands, gate| {
            job.run(commands, &gate, completion)
        });
        match spawned {
            Ok(worker) => self.worker = Some(worker),
            Err(e) => {
                // The completion went down with the closure; `ready` resolves as abandoned
                error!("Failed to spawn {} worker: {}", self.kind, e);
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
            debug!(kind = %self.kind, "Disposing playback");
            worker.shutdown();
        }
    }

    fn dispose(&mut self) {
        self.dispose_playback();
        self.lifecycle.set(Lifecycle::Disposed);
        self.disposed = true;
    }
}

impl Drop for PcmPlayer {
    fn drop(&mut self) {
        self.dispose_playback();
    }
}

/// Everything the worker thread needs to open a track
struct PcmJob {
    open: OpenTrack,
    track: Track,
    device: Option<String>,
    output: OutputParams,
    events: BackendEvents,
    lifecycle: SharedLifecycle,
}

impl PcmJob {
    fn run(self, commands: Receiver<Command>, gate: &DeviceGate, completion: Completion) {
        let decoder = match (self.open)(&self.track) {
            Ok(decoder) => decoder,
            Err(e) => {
                warn!(track = %self.track.source(), "Cannot open track: {}", e);
                self.lifecycle.set(Lifecycle::Failed);
                completion.fail(e.into());
                return;
            }
        };

        let gain = Arc::new(OutputGain::new(self.output));
        let opened = gate.open_device(|| {
            AudioSink::open(self.device.as_deref(), decoder.sample_rate(), Arc::clone(&gain))
        });
        let sink = match opened {
            Some(Ok(sink)) => sink,
            Some(Err(e)) => {
                error!("Cannot open audio output: {}", e);
                self.lifecycle.set(Lifecycle::Failed);
                completion.fail(e.into());
                return;
            }
            None => {
                debug!("Playback disposed while opening");
                completion.fail(BackendError::Disposed);
                return;
            }
        };

        let resampler = if sink.sample_rate() != decoder.sample_rate() {
            match StreamResampler::new(decoder.sample_rate(), sink.sample_rate(), 2) {
                Ok(resampler) => Some(resampler),
                Err(e) => {
                    self.lifecycle.set(Lifecycle::Failed);
                    completion.fail(e.into());
                    return;
                }
            }
        } else {
            None
        };

        let info = MediaInfo {
            duration: decoder.duration(),
            sample_rate: Some(decoder.sample_rate()),
            channels: Some(decoder.channels() as u16),
        };
        info!(
            track = %self.track.source(),
            sample_rate = decoder.sample_rate(),
            output_rate = sink.sample_rate(),
            "Track ready"
        );
        self.lifecycle.set(Lifecycle::Ready);
        completion.ready(info);

        PcmWorker {
            decoder,
            sink,
            resampler,
            gain,
            lifecycle: self.lifecycle,
            events: self.events,
            playing: false,
            end_of_stream: false,
            base: Duration::ZERO,
            last_report: Instant::now(),
        }
        .run(commands);
    }
}

/// Playback loop state for one open track
struct PcmWorker {
    decoder: TrackDecoder,
    sink: AudioSink,
    resampler: Option<StreamResampler>,
    gain: Arc<OutputGain>,
    lifecycle: SharedLifecycle,
    events: BackendEvents,
    playing: bool,
    end_of_stream: bool,
    /// Stream position of the first frame queued since the last clear
    base: Duration,
    last_report: Instant,
}

impl PcmWorker {
    fn run(mut self, commands: Receiver<Command>) {
        loop {
            let next = if self.playing {
                match commands.try_recv() {
                    Ok(command) => Some(command),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => break,
                }
            } else {
                match commands.recv_timeout(IDLE_WAIT) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            };

            match next {
                Some(Command::Shutdown) => break,
                Some(command) => self.handle(command),
                None if self.playing => self.pump(),
                None => {}
            }
        }
        let _ = self.sink.pause();
        debug!("PCM worker exiting");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Play | Command::Resume => {
                if let Err(e) = self.sink.play() {
                    self.fail(e);
                    return;
                }
                self.playing = true;
                self.lifecycle.set(Lifecycle::Playing);
            }
            Command::Pause => {
                let _ = self.sink.pause();
                self.playing = false;
                self.lifecycle.set(Lifecycle::Paused);
                self.events.position(self.position());
            }
            Command::Stop => {
                let _ = self.sink.pause();
                self.playing = false;
                self.reposition(Duration::ZERO);
                self.lifecycle.set(Lifecycle::Stopped);
            }
            Command::Seek(position) => self.reposition(position),
            Command::Output(params) => self.gain.set(params),
            Command::Shutdown => {}
        }
    }

    /// Move the decoder, drop queued audio and report the new position
    fn reposition(&mut self, target: Duration) {
        let current = self.position();
        self.base = match self.decoder.seek(target) {
            Ok(reached) => reached,
            Err(e) => {
                warn!("Seek to {:?} failed: {}", target, e);
                current
            }
        };
        self.sink.clear();
        if let Some(resampler) = &mut self.resampler {
            resampler.reset();
        }
        self.end_of_stream = false;
        self.events.position(self.base);
        self.last_report = Instant::now();
    }

    /// Decode ahead while the output queue is short; detect the end of media
    fn pump(&mut self) {
        let target_frames = (self.sink.sample_rate() / 5) as usize;
        let buffered = self.sink.buffered_frames();

        if !self.end_of_stream && buffered < target_frames {
            match self.decoder.next_chunk() {
                Ok(Some(chunk)) => {
                    let samples = match &mut self.resampler {
                        Some(resampler) => match resampler.process(&chunk.samples) {
                            Ok(samples) => samples,
                            Err(e) => return self.fail(e),
                        },
                        None => chunk.samples,
                    };
                    self.sink.push(&samples);
                }
                Ok(None) => {
                    debug!("End of stream reached, draining output");
                    self.end_of_stream = true;
                }
                Err(e) => return self.fail(e),
            }
        } else if self.end_of_stream && buffered == 0 {
            return self.finish();
        } else {
            thread::sleep(FILL_WAIT);
        }

        if self.last_report.elapsed() >= REPORT_INTERVAL {
            self.events.position(self.position());
            self.last_report = Instant::now();
        }
    }

    fn position(&self) -> Duration {
        let position = self.base + self.sink.played();
        match self.decoder.duration() {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    fn finish(&mut self) {
        let _ = self.sink.pause();
        self.playing = false;
        self.lifecycle.set(Lifecycle::Stopped);
        self.events.position(self.position());
        self.events.finished();
    }

    fn fail(&mut self, e: Error) {
        error!("Playback failed: {}", e);
        let _ = self.sink.pause();
        self.playing = false;
        self.lifecycle.set(Lifecycle::Failed);
        self.events.failed(e.into());
    }
}
