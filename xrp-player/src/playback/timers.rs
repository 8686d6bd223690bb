//! Listen timers
//!
//! "Playback position reached" timers are measured in listened time (time
//! actually spent playing), so they pause with playback and ignore seeks.

use std::time::Duration;
use xrp_common::TrackId;

/// What a timer means when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// The track has been heard long enough to count as played
    CountedAsPlayed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenTimer {
    pub track_id: TrackId,
    pub kind: TimerKind,
    pub threshold: Duration,
}

/// Pending timers for the active track
#[derive(Debug, Default)]
pub struct ListenTimers {
    pending: Vec<ListenTimer>,
}

impl ListenTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, track_id: TrackId, kind: TimerKind, threshold: Duration) {
        self.pending.retain(|t| !(t.track_id == track_id && t.kind == kind));
        self.pending.push(ListenTimer {
            track_id,
            kind,
            threshold,
        });
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remove and return every timer whose threshold `listened` has reached
    pub fn take_due(&mut self, listened: Duration) -> Vec<ListenTimer> {
        let (due, pending): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|timer| listened >= timer.threshold);
        self.pending = pending;
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_at_threshold() {
        let track = TrackId::new();
        let mut timers = ListenTimers::new();
        timers.arm(track, TimerKind::CountedAsPlayed, Duration::from_secs(10));

        assert!(timers.take_due(Duration::from_secs(9)).is_empty());
        let due = timers.take_due(Duration::from_secs(10));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].track_id, track);
        assert_eq!(due[0].kind, TimerKind::CountedAsPlayed);

        assert!(timers.take_due(Duration::from_secs(60)).is_empty());
        assert!(timers.is_empty());
    }

    #[test]
    fn test_rearm_replaces() {
        let track = TrackId::new();
        let mut timers = ListenTimers::new();
        timers.arm(track, TimerKind::CountedAsPlayed, Duration::from_secs(10));
        timers.arm(track, TimerKind::CountedAsPlayed, Duration::from_secs(20));

        assert!(timers.take_due(Duration::from_secs(15)).is_empty());
        assert_eq!(timers.take_due(Duration::from_secs(20)).len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut timers = ListenTimers::new();
        timers.arm(TrackId::new(), TimerKind::CountedAsPlayed, Duration::ZERO);
        timers.clear();
        assert!(timers.take_due(Duration::from_secs(1)).is_empty());
    }
}
