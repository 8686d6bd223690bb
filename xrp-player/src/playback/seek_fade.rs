//! Seek fade guard
//!
//! Some outputs click when the read position jumps at full volume. The guard
//! ramps the volume down, lets the engine apply the seek at silence, and
//! ramps back up to the volume that was set before the seek.
//!
//! Rapid seeks coalesce:
//! - a seek during fade-out only replaces the pending target
//! - a seek during fade-in starts a new fade-out from the current volume
//!
//! Either way the volume restored at the end is the one captured before the
//! first seek of the burst (or a later `retarget`).

use crate::config::PlaybackConfig;
use std::time::Duration;
use tokio::time::Instant;
use xrp_common::FadeCurve;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeSettings {
    pub enabled: bool,
    /// Length of each half (out and in)
    pub duration: Duration,
    pub out_curve: FadeCurve,
    pub in_curve: FadeCurve,
}

impl From<&PlaybackConfig> for FadeSettings {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            enabled: config.seek_fade_enabled,
            duration: config.seek_fade_duration(),
            out_curve: config.seek_fade_out_curve,
            in_curve: config.seek_fade_in_curve,
        }
    }
}

impl Default for FadeSettings {
    fn default() -> Self {
        Self::from(&PlaybackConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Idle,
    Out {
        started: Instant,
        from: f32,
        target: Duration,
    },
    In {
        started: Instant,
        from: f32,
    },
}

/// What the engine must do after a fade tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FadeStep {
    /// Set the output volume
    Volume(f32),
    /// Fade-out is complete: the volume is zero, apply the seek now
    Seek(Duration),
    /// Fade-in is complete: the volume is back at this value
    Finished(f32),
}

#[derive(Debug)]
pub struct SeekFade {
    settings: FadeSettings,
    phase: Phase,
    restore: f32,
}

impl SeekFade {
    pub fn new(settings: FadeSettings) -> Self {
        Self {
            settings,
            phase: Phase::Idle,
            restore: 0.0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Volume that will be restored, while a fade is running
    pub fn restore_volume(&self) -> Option<f32> {
        self.is_active().then_some(self.restore)
    }

    /// Ask for a seek to `target` while the output is at `volume`
    ///
    /// Returns the target when it must be applied right away (guard
    /// disabled); otherwise the seek is delivered later by `tick`.
    pub fn request(&mut self, target: Duration, volume: f32, now: Instant) -> Option<Duration> {
        if !self.settings.enabled {
            return Some(target);
        }

        self.phase = match self.phase {
            Phase::Idle => {
                self.restore = volume;
                Phase::Out {
                    started: now,
                    from: volume,
                    target,
                }
            }
            Phase::Out { started, from, .. } => Phase::Out {
                started,
                from,
                target,
            },
            Phase::In { .. } => Phase::Out {
                started: now,
                from: volume,
                target,
            },
        };
        None
    }

    /// Change the volume the fade will end on
    pub fn retarget(&mut self, volume: f32) {
        self.restore = volume;
    }

    /// Abandon the fade; returns the volume to put back
    pub fn cancel(&mut self) -> Option<f32> {
        let restore = self.restore_volume();
        self.phase = Phase::Idle;
        restore
    }

    /// Advance the animation to `now`
    pub fn tick(&mut self, now: Instant) -> Option<FadeStep> {
        match self.phase {
            Phase::Idle => None,
            Phase::Out {
                started,
                from,
                target,
            } => {
                let x = self.progress(started, now);
                if x >= 1.0 {
                    self.phase = Phase::In {
                        started: now,
                        from: 0.0,
                    };
                    Some(FadeStep::Seek(target))
                } else {
                    Some(FadeStep::Volume(from * self.settings.out_curve.calculate_fade_out(x)))
                }
            }
            Phase::In { started, from } => {
                let x = self.progress(started, now);
                if x >= 1.0 {
                    self.phase = Phase::Idle;
                    Some(FadeStep::Finished(self.restore))
                } else {
                    let gain = self.settings.in_curve.calculate_fade_in(x);
                    Some(FadeStep::Volume(from + (self.restore - from) * gain))
                }
            }
        }
    }

    fn progress(&self, started: Instant, now: Instant) -> f32 {
        if self.settings.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(started);
        (elapsed.as_secs_f32() / self.settings.duration.as_secs_f32()).min(1.0)
    }
}
