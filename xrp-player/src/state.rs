//! Shared playback state
//!
//! `PlaybackState` is a plain value record. The engine owns the only
//! `SharedPlaybackState` (the writer); UI observers hold cloneable
//! `PlaybackStateReader`s backed by a `tokio::sync::watch` channel, so they can
//! read a consistent snapshot or wait for the next change but never write.

use std::time::Duration;
use tokio::sync::watch;
use xrp_common::{LoopMode, Status};

/// Smallest and largest accepted playback rate
pub const RATE_RANGE: (f32, f32) = (0.1, 4.0);

/// Observable record of playback parameters
///
/// Setters clamp to the valid range; readers never need to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    volume: f32,
    balance: f32,
    mute: bool,
    rate: f32,
    status: Status,
    loop_mode: LoopMode,
    duration: Option<Duration>,
    current_time: Duration,
    real_time: Duration,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            volume: 1.0,
            balance: 0.0,
            mute: false,
            rate: 1.0,
            status: Status::Unknown,
            loop_mode: LoopMode::Off,
            duration: None,
            current_time: Duration::ZERO,
            real_time: Duration::ZERO,
        }
    }
}

impl PlaybackState {
    /// Default state with the given starting volume
    pub fn with_volume(volume: f32) -> Self {
        let mut state = Self::default();
        state.set_volume(volume);
        state
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn balance(&self) -> f32 {
        self.balance
    }

    pub fn mute(&self) -> bool {
        self.mute
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    /// Media duration, once the backend knows it
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Backend-reported position
    pub fn current_time(&self) -> Duration {
        self.current_time
    }

    /// Engine-reconciled elapsed position
    pub fn real_time(&self) -> Duration {
        self.real_time
    }

    /// Volume actually sent to the output: zero while muted
    pub fn effective_volume(&self) -> f32 {
        if self.mute {
            0.0
        } else {
            self.volume
        }
    }

    /// Set volume, clamped to [0, 1]; NaN is ignored
    pub fn set_volume(&mut self, volume: f32) {
        if !volume.is_nan() {
            self.volume = volume.clamp(0.0, 1.0);
        }
    }

    /// Set balance, clamped to [-1, 1]; NaN is ignored
    pub fn set_balance(&mut self, balance: f32) {
        if !balance.is_nan() {
            self.balance = balance.clamp(-1.0, 1.0);
        }
    }

    pub fn set_mute(&mut self, mute: bool) {
        self.mute = mute;
    }

    /// Set rate, clamped to `RATE_RANGE`; non-positive or non-finite values are ignored
    pub fn set_rate(&mut self, rate: f32) {
        if rate.is_finite() && rate > 0.0 {
            self.rate = rate.clamp(RATE_RANGE.0, RATE_RANGE.1);
        }
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    pub fn set_loop_mode(&mut self, loop_mode: LoopMode) {
        self.loop_mode = loop_mode;
    }

    /// Set duration; re-clamps the current time to the new bound
    pub fn set_duration(&mut self, duration: Option<Duration>) {
        self.duration = duration;
        self.set_current_time(self.current_time);
    }

    /// Set current time, clamped to [0, duration] when duration is known
    pub fn set_current_time(&mut self, time: Duration) {
        self.current_time = match self.duration {
            Some(duration) => time.min(duration),
            None => time,
        };
    }

    pub fn set_real_time(&mut self, time: Duration) {
        self.real_time = time;
    }
}

/// Writer side of the playback state, owned by the engine
#[derive(Debug)]
pub struct SharedPlaybackState {
    tx: watch::Sender<PlaybackState>,
}

impl SharedPlaybackState {
    pub fn new(initial: PlaybackState) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> PlaybackState {
        *self.tx.borrow()
    }

    /// Mutate in place; observers are woken only if something changed
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut PlaybackState),
    {
        self.tx.send_if_modified(|state| {
            let before = *state;
            f(state);
            *state != before
        });
    }

    /// Atomically replace every field with `other`'s
    pub fn change(&self, other: &PlaybackState) {
        self.tx.send_replace(*other);
    }

    /// New read-only observer handle
    pub fn reader(&self) -> PlaybackStateReader {
        PlaybackStateReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read-only observer of the playback state
#[derive(Debug, Clone)]
pub struct PlaybackStateReader {
    rx: watch::Receiver<PlaybackState>,
}

impl PlaybackStateReader {
    /// Copy of the current state
    pub fn snapshot(&self) -> PlaybackState {
        *self.rx.borrow()
    }

    /// Wait for the next change and return the new state
    ///
    /// Returns `None` once the engine has been dropped.
    pub async fn changed(&mut self) -> Option<PlaybackState> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_and_balance_are_clamped() {
        let mut state = PlaybackState::default();

        state.set_volume(1.5);
        assert_eq!(state.volume(), 1.0);
        state.set_volume(-0.5);
        assert_eq!(state.volume(), 0.0);
        state.set_volume(f32::NAN);
        assert_eq!(state.volume(), 0.0);

        state.set_balance(-3.0);
        assert_eq!(state.balance(), -1.0);
        state.set_balance(0.25);
        assert_eq!(state.balance(), 0.25);
    }

    #[test]
    fn test_rate_rejects_non_positive() {
        let mut state = PlaybackState::default();
        state.set_rate(0.0);
        assert_eq!(state.rate(), 1.0);
        state.set_rate(-2.0);
        assert_eq!(state.rate(), 1.0);
        state.set_rate(f32::INFINITY);
        assert_eq!(state.rate(), 1.0);
        state.set_rate(1.5);
        assert_eq!(state.rate(), 1.5);
        state.set_rate(100.0);
        assert_eq!(state.rate(), RATE_RANGE.1);
    }

    #[test]
    fn test_current_time_within_duration() {
        let mut state = PlaybackState::default();
        state.set_current_time(Duration::from_secs(500));
        assert_eq!(state.current_time(), Duration::from_secs(500));

        // Learning the duration re-clamps the position
        state.set_duration(Some(Duration::from_secs(180)));
        assert_eq!(state.current_time(), Duration::from_secs(180));

        state.set_current_time(Duration::from_secs(200));
        assert_eq!(state.current_time(), Duration::from_secs(180));
    }

    #[test]
    fn test_effective_volume_respects_mute() {
        let mut state = PlaybackState::with_volume(0.6);
        assert_eq!(state.effective_volume(), 0.6);
        state.set_mute(true);
        assert_eq!(state.effective_volume(), 0.0);
        assert_eq!(state.volume(), 0.6);
    }

    #[test]
    fn test_change_round_trip() {
        let shared = SharedPlaybackState::new(PlaybackState::default());
        let reader = shared.reader();

        let mut other = PlaybackState::with_volume(0.3);
        other.set_balance(-0.4);
        other.set_mute(true);
        other.set_rate(1.25);
        other.set_status(Status::Paused);
        other.set_loop_mode(LoopMode::Random);
        other.set_duration(Some(Duration::from_secs(240)));
        other.set_current_time(Duration::from_secs(61));
        other.set_real_time(Duration::from_secs(64));

        shared.change(&other);

        let read = reader.snapshot();
        assert_eq!(read, other);
        assert_eq!(read.volume(), 0.3);
        assert_eq!(read.balance(), -0.4);
        assert!(read.mute());
        assert_eq!(read.rate(), 1.25);
        assert_eq!(read.status(), Status::Paused);
        assert_eq!(read.loop_mode(), LoopMode::Random);
        assert_eq!(read.duration(), Some(Duration::from_secs(240)));
        assert_eq!(read.current_time(), Duration::from_secs(61));
        assert_eq!(read.real_time(), Duration::from_secs(64));
    }

    #[tokio::test]
    async fn test_reader_observes_changes() {
        let shared = SharedPlaybackState::new(PlaybackState::default());
        let mut reader = shared.reader();

        shared.update(|s| s.set_status(Status::Playing));
        let seen = reader.changed().await.expect("engine alive");
        assert_eq!(seen.status(), Status::Playing);
    }

    #[tokio::test]
    async fn test_reader_ends_when_writer_dropped() {
        let shared = SharedPlaybackState::new(PlaybackState::default());
        let mut reader = shared.reader();
        drop(shared);
        assert!(reader.changed().await.is_none());
    }
}
