//! Real-time reconciliation
//!
//! Backends report positions coarsely and some reset them across seeks. The
//! engine keeps its own clock: `real_time = origin + elapsed_while_playing * rate`,
//! re-based to the target position after every seek. The same clock
//! accumulates `listened` wall-clock time, which never re-bases and drives
//! the listen timers.
//!
//! All methods take the current instant explicitly so the arithmetic is
//! independent of any scheduler.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RealTimeClock {
    origin: Duration,
    /// Media time accumulated since `origin` by finished running segments
    advanced: Duration,
    listened: Duration,
    rate: f32,
    running_since: Option<Instant>,
    /// Whether the clock was running when a seek froze it
    resume_after_seek: Option<bool>,
}

impl Default for RealTimeClock {
    fn default() -> Self {
        Self {
            origin: Duration::ZERO,
            advanced: Duration::ZERO,
            listened: Duration::ZERO,
            rate: 1.0,
            running_since: None,
            resume_after_seek: None,
        }
    }
}

impl RealTimeClock {
    pub fn new(rate: f32) -> Self {
        Self {
            rate,
            ..Default::default()
        }
    }

    /// Playback of a new track started at position zero
    pub fn start(&mut self, now: Instant) {
        let rate = self.rate;
        *self = Self::new(rate);
        self.running_since = Some(now);
    }

    pub fn pause(&mut self, now: Instant) {
        if self.resume_after_seek.is_some() {
            // Frozen for a seek; stay frozen after post_seek
            self.resume_after_seek = Some(false);
        }
        self.fold(now);
        self.running_since = None;
    }

    pub fn resume(&mut self, now: Instant) {
        if self.resume_after_seek.is_some() {
            // Frozen for a seek; post_seek restarts the clock
            self.resume_after_seek = Some(true);
        } else if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    /// Freeze before a seek, remembering whether the clock was running
    pub fn pre_seek(&mut self, now: Instant) {
        if self.resume_after_seek.is_none() {
            self.resume_after_seek = Some(self.running_since.is_some());
        }
        self.fold(now);
        self.running_since = None;
    }

    /// Re-base on the position the backend seeked to
    ///
    /// Without a pending freeze (a second seek landing after the first one
    /// already restarted the clock) the running state is kept.
    pub fn post_seek(&mut self, position: Duration, now: Instant) {
        let resume = match self.resume_after_seek.take() {
            Some(resume) => resume,
            None => self.running_since.is_some(),
        };
        self.fold(now);
        self.origin = position;
        self.advanced = Duration::ZERO;
        self.running_since = resume.then_some(now);
    }

    /// Back to zero and stopped
    pub fn reset(&mut self) {
        let rate = self.rate;
        *self = Self::new(rate);
    }

    pub fn set_rate(&mut self, rate: f32, now: Instant) {
        self.fold(now);
        self.rate = rate;
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn real_time(&self, now: Instant) -> Duration {
        let running = self
            .running_since
            .map(|since| now.saturating_duration_since(since).mul_f32(self.rate))
            .unwrap_or_default();
        self.origin + self.advanced + running
    }

    /// Wall-clock time spent playing since `start`
    pub fn listened(&self, now: Instant) -> Duration {
        let running = self
            .running_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or_default();
        self.listened + running
    }

    /// Close the current running segment at `now` and open a new one
    fn fold(&mut self, now: Instant) {
        if let Some(since) = self.running_since {
            let wall = now.saturating_duration_since(since);
            self.advanced += wall.mul_f32(self.rate);
            self.listened += wall;
            self.running_since = Some(now);
        }
    }
}
