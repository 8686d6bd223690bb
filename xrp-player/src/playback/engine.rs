//! Playback engine
//!
//! `GeneralPlayer` is the handle UIs hold. Every operation is a message to a
//! single engine task, which owns the active backend, the shared playback
//! state and all timers. Nothing outside that task mutates engine state, so
//! the handle needs no locks.
//!
//! **Generations:** each `play` of a new track bumps a counter. Backend events
//! and open results carry the generation they were created for; anything
//! tagged with an older one belongs to a track that has since been replaced
//! and is dropped.
//!
//! **Turn order:** an internally queued "play next" runs first, then the
//! result of the pending open, then backend events, then handle commands,
//! then the fade and clock ticks.

use crate::backend::{
    BackendEvent, BackendEvents, BackendKind, BackendProvider, BackendSelector, MediaInfo,
    OutputParams, PlaybackBackend, PlaybackReady, PlaybackRequest, SystemBackends, TaggedEvent,
};
use crate::config::PlayerConfig;
use crate::error::BackendError;
use crate::playback::real_time::RealTimeClock;
use crate::playback::seek_fade::{FadeSettings, FadeStep, SeekFade};
use crate::playback::timers::{ListenTimers, TimerKind};
use crate::playlist::PlaylistCollaborator;
use crate::state::{PlaybackState, PlaybackStateReader, SharedPlaybackState};
use crate::track::Track;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use xrp_common::time::{self, duration_to_millis, format_clock};
use xrp_common::{EventBus, LoopMode, PlayerEvent, Status};

/// Messages from the handle to the engine task
#[derive(Debug)]
enum EngineCommand {
    Play(Track),
    Pause,
    Resume,
    PauseResume,
    Stop,
    Seek(Duration),
    SetVolume(f32),
    SetBalance(f32),
    SetMute(bool),
    SetRate(f32),
    SetLoopMode(LoopMode),
    ChangeState(PlaybackState),
    Flush(oneshot::Sender<()>),
    Dispose(oneshot::Sender<()>),
}

/// Timing knobs the engine reads from `PlaybackConfig`
#[derive(Debug, Clone, Copy)]
struct EngineSettings {
    fade_tick: Duration,
    position_interval: Duration,
    count_as_played_after: Duration,
}

/// Handle to the playback engine
///
/// Dropping the last handle shuts the engine down and disposes the active
/// backend.
pub struct GeneralPlayer {
    commands: mpsc::UnboundedSender<EngineCommand>,
    state: PlaybackStateReader,
    events: Arc<EventBus>,
    now_playing: watch::Receiver<Option<Track>>,
    task: JoinHandle<()>,
}

impl GeneralPlayer {
    /// Engine backed by the real audio backends
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: &PlayerConfig, playlist: Arc<dyn PlaylistCollaborator>) -> Self {
        let provider = SystemBackends::new(config.output.device.clone());
        Self::with_provider(config, provider, playlist)
    }

    /// Engine using `provider` to create backends
    pub fn with_provider<P: BackendProvider>(
        config: &PlayerConfig,
        provider: P,
        playlist: Arc<dyn PlaylistCollaborator>,
    ) -> Self {
        let playback = &config.playback;
        let state = SharedPlaybackState::new(PlaybackState::with_volume(playback.initial_volume));
        let reader = state.reader();
        let events = Arc::new(EventBus::new(playback.event_capacity));
        let (now_playing_tx, now_playing) = watch::channel(None);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (backend_tx, backend_rx) = mpsc::unbounded_channel();

        let settings = EngineSettings {
            fade_tick: playback.fade_tick(),
            position_interval: playback.position_interval(),
            count_as_played_after: playback.count_as_played_after(),
        };
        let rate = state.snapshot().rate();

        let engine = Engine {
            provider,
            selector: BackendSelector::from_config(&config.backends),
            playlist,
            state,
            events: Arc::clone(&events),
            now_playing: now_playing_tx,
            settings,
            active: None,
            opening: None,
            generation: 0,
            deferred: None,
            fade: SeekFade::new(FadeSettings::from(playback)),
            clock: RealTimeClock::new(rate),
            timers: ListenTimers::new(),
            seeks_in_flight: 0,
            first_playback: true,
            backend_tx,
        };

        info!(
            seek_fade = playback.seek_fade_enabled,
            initial_volume = playback.initial_volume,
            "Starting playback engine"
        );
        let task = tokio::spawn(engine.run(commands_rx, backend_rx));

        Self {
            commands: commands_tx,
            state: reader,
            events,
            now_playing,
            task,
        }
    }

    fn send(&self, command: EngineCommand) {
        if self.commands.send(command).is_err() {
            debug!("Playback engine has shut down; command ignored");
        }
    }

    /// Play `track`, or restart it if it is already the active track
    pub fn play(&self, track: Track) {
        self.send(EngineCommand::Play(track));
    }

    pub fn pause(&self) {
        self.send(EngineCommand::Pause);
    }

    pub fn resume(&self) {
        self.send(EngineCommand::Resume);
    }

    /// Pause when playing, resume otherwise
    pub fn pause_resume(&self) {
        self.send(EngineCommand::PauseResume);
    }

    pub fn stop(&self) {
        self.send(EngineCommand::Stop);
    }

    pub fn seek(&self, position: Duration) {
        self.send(EngineCommand::Seek(position));
    }

    pub fn set_volume(&self, volume: f32) {
        self.send(EngineCommand::SetVolume(volume));
    }

    pub fn set_balance(&self, balance: f32) {
        self.send(EngineCommand::SetBalance(balance));
    }

    pub fn set_mute(&self, mute: bool) {
        self.send(EngineCommand::SetMute(mute));
    }

    pub fn set_rate(&self, rate: f32) {
        self.send(EngineCommand::SetRate(rate));
    }

    pub fn set_loop_mode(&self, loop_mode: LoopMode) {
        self.send(EngineCommand::SetLoopMode(loop_mode));
    }

    /// Replace the whole playback state and push it to the backend
    pub fn change_state(&self, state: PlaybackState) {
        self.send(EngineCommand::ChangeState(state));
    }

    /// Read-only view of the playback state
    pub fn state(&self) -> PlaybackStateReader {
        self.state.clone()
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    /// Track whose playback last started successfully (None after stop)
    pub fn now_playing(&self) -> Option<Track> {
        self.now_playing.borrow().clone()
    }

    /// Observer of the now-playing track
    pub fn now_playing_watch(&self) -> watch::Receiver<Option<Track>> {
        self.now_playing.clone()
    }

    /// Wait until every command sent before this call has been handled,
    /// along with open results and backend events already delivered
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(EngineCommand::Flush(tx));
        let _ = rx.await;
    }

    /// Dispose the active backend and stop the engine task; idempotent
    pub async fn dispose(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(EngineCommand::Dispose(tx));
        let _ = rx.await;
    }

    /// Whether the engine task has exited
    pub fn is_disposed(&self) -> bool {
        self.task.is_finished()
    }
}

impl std::fmt::Debug for GeneralPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneralPlayer")
            .field("state", &self.state.snapshot())
            .finish()
    }
}

/// Backend bound to one track
struct Active<B> {
    track: Track,
    backend: B,
    kind: BackendKind,
    generation: u64,
    opened: bool,
    /// Start playing once opened (cleared by a pause during the open)
    autoplay: bool,
}

/// Open in flight for the current generation
struct PendingOpen {
    generation: u64,
    ready: PlaybackReady,
}

/// Result of one engine turn
enum Step {
    Opened(u64, Result<MediaInfo, BackendError>),
    Backend(TaggedEvent),
    Command(Option<EngineCommand>),
    FadeTick,
    ClockTick,
}

async fn wait_open(opening: &mut Option<PendingOpen>) -> (u64, Result<MediaInfo, BackendError>) {
    match opening {
        Some(pending) => (pending.generation, (&mut pending.ready).await),
        None => std::future::pending().await,
    }
}

struct Engine<P: BackendProvider> {
    provider: P,
    selector: BackendSelector,
    playlist: Arc<dyn PlaylistCollaborator>,
    state: SharedPlaybackState,
    events: Arc<EventBus>,
    now_playing: watch::Sender<Option<Track>>,
    settings: EngineSettings,

    active: Option<Active<P::Backend>>,
    opening: Option<PendingOpen>,
    generation: u64,
    /// Track to play at the start of the next turn
    deferred: Option<Track>,

    fade: SeekFade,
    clock: RealTimeClock,
    timers: ListenTimers,
    /// Backend seeks applied but not yet confirmed by a position report;
    /// each confirmation emits one SeekDone
    seeks_in_flight: usize,
    /// Listen timers are not armed for the very first playback
    first_playback: bool,

    backend_tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl<P: BackendProvider> Engine<P> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<EngineCommand>,
        mut backend_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    ) {
        let mut fade_tick = interval(self.settings.fade_tick);
        fade_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut clock_tick = interval(self.settings.position_interval);
        clock_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if let Some(track) = self.deferred.take() {
                self.play(track);
                continue;
            }

            let fading = self.fade.is_active();
            let running = self.clock.is_running();
            let mut opening = self.opening.take();

            let step = tokio::select! {
                biased;
                (generation, result) = wait_open(&mut opening) => Step::Opened(generation, result),
                Some(event) = backend_rx.recv() => Step::Backend(event),
                command = commands.recv() => Step::Command(command),
                _ = fade_tick.tick(), if fading => Step::FadeTick,
                _ = clock_tick.tick(), if running => Step::ClockTick,
            };

            if !matches!(step, Step::Opened(..)) {
                self.opening = opening;
            }

            match step {
                Step::Opened(generation, result) => self.on_opened(generation, result),
                Step::Backend(event) => self.on_backend_event(event),
                Step::Command(Some(EngineCommand::Dispose(ack))) => {
                    self.shutdown();
                    let _ = ack.send(());
                    break;
                }
                Step::Command(Some(command)) => self.handle(command),
                Step::Command(None) => {
                    debug!("All player handles dropped");
                    self.shutdown();
                    break;
                }
                Step::FadeTick => self.on_fade_tick(),
                Step::ClockTick => self.on_clock_tick(),
            }
        }

        info!("Playback engine stopped");
    }

    fn handle(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Play(track) => self.play(track),
            EngineCommand::Pause => self.pause(),
            EngineCommand::Resume => self.resume(),
            EngineCommand::PauseResume => {
                if self.state.snapshot().status() == Status::Playing {
                    self.pause();
                } else {
                    self.resume();
                }
            }
            EngineCommand::Stop => self.stop(),
            EngineCommand::Seek(position) => self.seek(position),
            EngineCommand::SetVolume(volume) => self.set_volume(volume),
            EngineCommand::SetBalance(balance) => {
                self.state.update(|s| s.set_balance(balance));
                self.push_output();
            }
            EngineCommand::SetMute(mute) => {
                self.state.update(|s| s.set_mute(mute));
                self.push_output();
            }
            EngineCommand::SetRate(rate) => {
                self.state.update(|s| s.set_rate(rate));
                let rate = self.state.snapshot().rate();
                self.clock.set_rate(rate, Instant::now());
                self.push_output();
            }
            EngineCommand::SetLoopMode(loop_mode) => {
                self.state.update(|s| s.set_loop_mode(loop_mode));
            }
            EngineCommand::ChangeState(next) => self.change_state(next),
            EngineCommand::Flush(ack) => {
                let _ = ack.send(());
            }
            EngineCommand::Dispose(ack) => {
                // Handled by the run loop; kept for exhaustiveness
                let _ = ack.send(());
            }
        }
    }

    // ========================================================================
    // Track lifecycle
    // ========================================================================

    fn play(&mut self, track: Track) {
        let replay = self
            .active
            .as_ref()
            .is_some_and(|active| active.track.same(&track));
        if replay {
            self.replay();
            return;
        }

        self.teardown_active();
        self.generation += 1;
        let generation = self.generation;

        let Some(kind) = self.selector.select(&track) else {
            let reason = format!(
                "no backend can play {} ({})",
                track.source(),
                track.format()
            );
            self.fail_track(&track, reason);
            return;
        };

        info!(generation, backend = %kind, title = track.title(), "Opening track");
        let mut backend = self.provider.create(kind);
        let ready = backend.create_playback(PlaybackRequest {
            track: track.clone(),
            output: self.output_params(),
            events: BackendEvents::new(generation, self.backend_tx.clone()),
        });

        self.active = Some(Active {
            track,
            backend,
            kind,
            generation,
            opened: false,
            autoplay: true,
        });
        self.opening = Some(PendingOpen { generation, ready });
    }

    /// `play` of the track that is already active: restart from the top
    fn replay(&mut self) {
        debug!("Replaying active track from the start");
        self.seek(Duration::ZERO);
        let status = self.state.snapshot().status();
        if matches!(status, Status::Paused | Status::Stopped) {
            self.resume();
        }
    }

    fn on_opened(&mut self, generation: u64, result: Result<MediaInfo, BackendError>) {
        let Some(active) = self
            .active
            .as_mut()
            .filter(|active| active.generation == generation && generation == self.generation)
        else {
            debug!(generation, current = self.generation, "Discarding stale open result");
            return;
        };

        let info = match result {
            Ok(info) => info,
            Err(e) => {
                let track = active.track.clone();
                warn!(title = track.title(), backend = %active.kind, "Open failed: {}", e);
                self.teardown_active();
                self.fail_track(&track, e.to_string());
                self.settle_if_exhausted();
                return;
            }
        };

        active.opened = true;
        let track = active.track.clone();
        let autoplay = active.autoplay;
        if autoplay {
            active.backend.play();
        }

        let now = Instant::now();
        self.state.update(|s| {
            s.set_duration(info.duration);
            s.set_current_time(Duration::ZERO);
            s.set_real_time(Duration::ZERO);
        });
        self.clock.start(now);
        if !autoplay {
            self.clock.pause(now);
        }
        self.set_status(if autoplay { Status::Playing } else { Status::Paused });

        info!(
            title = track.title(),
            duration = %info.duration.map(format_clock).unwrap_or_else(|| "?".into()),
            "Playback started"
        );
        self.now_playing.send_replace(Some(track.clone()));
        self.emit(PlayerEvent::ItemChanged {
            track_id: track.id(),
            title: track.title().to_string(),
            timestamp: time::now(),
        });
        self.emit(PlayerEvent::PlaybackStarted {
            track_id: track.id(),
            duration_ms: info.duration.map(duration_to_millis),
            timestamp: time::now(),
        });

        if self.first_playback {
            self.first_playback = false;
        } else {
            self.timers.arm(
                track.id(),
                TimerKind::CountedAsPlayed,
                self.settings.count_as_played_after,
            );
        }
    }

    /// Flag `track`, report it, and queue the playlist's next item
    fn fail_track(&mut self, track: &Track, reason: String) {
        warn!(title = track.title(), "Skipping track: {}", reason);
        track.mark_playback_error();
        self.emit(PlayerEvent::PlaybackError {
            track_id: track.id(),
            reason,
            timestamp: time::now(),
        });
        self.deferred = self.playlist.play_next_item();
    }

    /// After a failed open or a runtime failure with nothing queued, leave
    /// the engine stopped rather than reporting the torn-down track
    fn settle_if_exhausted(&mut self) {
        if self.deferred.is_none() {
            debug!("Playlist exhausted after failure");
            self.state.update(|s| s.set_duration(None));
            self.stop();
        }
    }

    fn on_backend_event(&mut self, tagged: TaggedEvent) {
        if tagged.generation != self.generation {
            debug!(
                generation = tagged.generation,
                current = self.generation,
                "Discarding stale backend event"
            );
            return;
        }
        if self.active.is_none() {
            return;
        }

        match tagged.event {
            BackendEvent::Position(position) => {
                let now = Instant::now();
                self.state.update(|s| s.set_current_time(position));
                if self.seeks_in_flight > 0 {
                    self.seeks_in_flight -= 1;
                    self.clock.post_seek(position, now);
                    debug!(position = %format_clock(position), "Seek done");
                    self.emit(PlayerEvent::SeekDone {
                        position_ms: duration_to_millis(position),
                        timestamp: time::now(),
                    });
                }
                self.publish_real_time(now);
            }
            BackendEvent::Duration(duration) => {
                self.state.update(|s| s.set_duration(Some(duration)));
            }
            BackendEvent::Finished => self.on_finished(),
            BackendEvent::Failed(error) => {
                if let Some(active) = &self.active {
                    let track = active.track.clone();
                    warn!(title = track.title(), "Playback failed: {}", error);
                    self.teardown_active();
                    self.set_status(Status::Stopped);
                    self.fail_track(&track, error.to_string());
                    self.settle_if_exhausted();
                }
            }
        }
    }

    fn on_finished(&mut self) {
        let Some(track) = self.active.as_ref().map(|active| active.track.clone()) else {
            return;
        };
        let now = Instant::now();
        info!(title = track.title(), "Playback ended");
        self.emit(PlayerEvent::PlaybackEnded {
            track_id: track.id(),
            timestamp: time::now(),
        });

        if self.state.snapshot().loop_mode() == LoopMode::Song {
            if let Some(active) = self.active.as_mut() {
                active.backend.seek(Duration::ZERO);
                active.backend.play();
            }
            self.clock.start(now);
            self.state.update(|s| {
                s.set_current_time(Duration::ZERO);
                s.set_real_time(Duration::ZERO);
            });
            return;
        }

        self.clock.pause(now);
        match self.playlist.play_next_item() {
            Some(next) => self.deferred = Some(next),
            None => {
                debug!("Playlist exhausted");
                self.stop();
            }
        }
    }

    /// Dispose the active backend and forget everything tied to it
    fn teardown_active(&mut self) {
        self.opening = None;
        if let Some(restore) = self.fade.cancel() {
            self.state.update(|s| s.set_volume(restore));
        }
        self.seeks_in_flight = 0;
        self.timers.clear();
        self.clock.reset();
        self.now_playing.send_replace(None);

        if let Some(mut active) = self.active.take() {
            debug!(backend = %active.kind, generation = active.generation, "Disposing backend");
            active.backend.dispose_playback();
            active.backend.dispose();
        }
    }

    fn shutdown(&mut self) {
        self.deferred = None;
        self.teardown_active();
    }

    // ========================================================================
    // Transport
    // ========================================================================

    fn pause(&mut self) {
        let Some(active) = self.active.as_mut() else {
            debug!("Pause with no active backend");
            return;
        };
        if !active.opened {
            active.autoplay = false;
            return;
        }
        active.backend.pause();
        let now = Instant::now();
        self.clock.pause(now);
        self.publish_real_time(now);
        self.set_status(Status::Paused);
    }

    fn resume(&mut self) {
        let Some(active) = self.active.as_mut() else {
            debug!("Resume with no active backend");
            return;
        };
        if !active.opened {
            active.autoplay = true;
            return;
        }

        match self.state.snapshot().status() {
            Status::Playing => return,
            Status::Stopped => active.backend.play(),
            Status::Paused | Status::Unknown => active.backend.resume(),
        }
        if self.now_playing.borrow().is_none() {
            self.now_playing.send_replace(Some(active.track.clone()));
        }
        self.clock.resume(Instant::now());
        self.set_status(Status::Playing);
    }

    fn stop(&mut self) {
        if let Some(restore) = self.fade.cancel() {
            self.state.update(|s| s.set_volume(restore));
            self.push_output();
        }
        if let Some(active) = self.active.as_mut() {
            active.backend.stop();
        }
        self.seeks_in_flight = 0;
        self.timers.clear();
        self.clock.reset();

        self.set_status(Status::Stopped);
        self.state.update(|s| {
            s.set_current_time(Duration::ZERO);
            s.set_real_time(Duration::ZERO);
        });
        self.now_playing.send_replace(None);
        self.playlist.update_playing_item(None);
        self.playlist.clear_active_playlist();
    }

    fn seek(&mut self, position: Duration) {
        let Some(active) = self.active.as_mut() else {
            debug!("Seek with no active backend");
            return;
        };

        let snapshot = self.state.snapshot();
        let target = match snapshot.duration() {
            Some(duration) => position.min(duration),
            None => position,
        };

        if snapshot.status() == Status::Stopped {
            // Some backends cannot seek from a stopped state
            active.backend.pause();
            self.set_status(Status::Paused);
        }

        let now = Instant::now();
        self.clock.pre_seek(now);
        debug!(target = %format_clock(target), "Seek requested");
        if let Some(target) = self.fade.request(target, snapshot.volume(), now) {
            self.apply_seek(target);
        }
    }

    fn apply_seek(&mut self, target: Duration) {
        if let Some(active) = self.active.as_mut() {
            active.backend.seek(target);
            self.seeks_in_flight += 1;
        }
    }

    // ========================================================================
    // Output parameters
    // ========================================================================

    fn set_volume(&mut self, volume: f32) {
        if self.fade.is_active() {
            // The fade owns the output volume; move its destination
            let mut probe = self.state.snapshot();
            probe.set_volume(volume);
            self.fade.retarget(probe.volume());
            return;
        }
        self.state.update(|s| s.set_volume(volume));
        self.push_output();
    }

    fn change_state(&mut self, mut next: PlaybackState) {
        let before = self.state.snapshot();
        if self.fade.is_active() {
            self.fade.retarget(next.volume());
            next.set_volume(before.volume());
        }
        self.state.change(&next);

        if next.rate() != before.rate() {
            self.clock.set_rate(next.rate(), Instant::now());
        }
        if next.status() != before.status() {
            self.emit(PlayerEvent::StatusChanged {
                old_status: before.status(),
                new_status: next.status(),
                timestamp: time::now(),
            });
        }
        self.push_output();
    }

    fn output_params(&self) -> OutputParams {
        OutputParams::from(&self.state.snapshot())
    }

    fn push_output(&mut self) {
        let params = self.output_params();
        if let Some(active) = self.active.as_mut() {
            active.backend.set_output(params);
        }
    }

    fn set_status(&mut self, status: Status) {
        let old = self.state.snapshot().status();
        if old == status {
            return;
        }
        self.state.update(|s| s.set_status(status));
        debug!(%old, new = %status, "Status changed");
        self.emit(PlayerEvent::StatusChanged {
            old_status: old,
            new_status: status,
            timestamp: time::now(),
        });
    }

    // ========================================================================
    // Ticks
    // ========================================================================

    fn on_fade_tick(&mut self) {
        match self.fade.tick(Instant::now()) {
            Some(FadeStep::Volume(volume)) | Some(FadeStep::Finished(volume)) => {
                self.state.update(|s| s.set_volume(volume));
                self.push_output();
            }
            Some(FadeStep::Seek(target)) => {
                self.state.update(|s| s.set_volume(0.0));
                self.push_output();
                self.apply_seek(target);
            }
            None => {}
        }
    }

    fn on_clock_tick(&mut self) {
        let now = Instant::now();
        self.publish_real_time(now);

        let listened = self.clock.listened(now);
        let active_id = self.active.as_ref().map(|active| active.track.id());
        for timer in self.timers.take_due(listened) {
            if Some(timer.track_id) != active_id {
                continue;
            }
            match timer.kind {
                TimerKind::CountedAsPlayed => {
                    debug!(listened = %format_clock(listened), "Track counted as played");
                    self.emit(PlayerEvent::PlayedThresholdReached {
                        track_id: timer.track_id,
                        listened_ms: duration_to_millis(listened),
                        timestamp: time::now(),
                    });
                }
            }
        }
    }

    fn publish_real_time(&self, now: Instant) {
        let real_time = self.clock.real_time(now);
        self.state.update(|s| s.set_real_time(real_time));
    }

    fn emit(&self, event: PlayerEvent) {
        self.events.emit_lossy(event);
    }
}
