//! Event types for the XRP event system
//!
//! Provides the `PlayerEvent` record emitted by the playback engine and the
//! `EventBus` used to fan it out to UI observers.

mod playback_types;

pub use playback_types::{LoopMode, Status, TrackId};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Playback engine events
///
/// Emitted by the engine on its event task and serialized as JSON objects
/// tagged with `"type"` for UIs that consume them over a transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// A different track became the active one
    ItemChanged {
        track_id: TrackId,
        /// Display title of the track
        title: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback of the active track started
    PlaybackStarted {
        track_id: TrackId,
        /// Media duration in milliseconds, when the backend knows it
        duration_ms: Option<u64>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The active track reached its end
    PlaybackEnded {
        track_id: TrackId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The backend reported its first position after a seek
    SeekDone {
        position_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track could not be played and was skipped
    PlaybackError {
        track_id: TrackId,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Engine status changed
    StatusChanged {
        old_status: Status,
        new_status: Status,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The track has been listened to long enough to count as played
    PlayedThresholdReached {
        track_id: TrackId,
        listened_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlayerEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            PlayerEvent::ItemChanged { .. } => "ItemChanged",
            PlayerEvent::PlaybackStarted { .. } => "PlaybackStarted",
            PlayerEvent::PlaybackEnded { .. } => "PlaybackEnded",
            PlayerEvent::SeekDone { .. } => "SeekDone",
            PlayerEvent::PlaybackError { .. } => "PlaybackError",
            PlayerEvent::StatusChanged { .. } => "StatusChanged",
            PlayerEvent::PlayedThresholdReached { .. } => "PlayedThresholdReached",
        }
    }
}

/// Broadcast bus for `PlayerEvent`s
///
/// Slow subscribers lose the oldest events once `capacity` is exceeded.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eventbus_subscribe() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        let _rx = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        assert_eq!(bus.capacity(), 10);
    }

    #[test]
    fn test_eventbus_emit() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit(PlayerEvent::StatusChanged {
            old_status: Status::Paused,
            new_status: Status::Playing,
            timestamp: chrono::Utc::now(),
        })
        .expect("emit should succeed");

        let received = rx.try_recv().expect("Should receive event");
        assert_eq!(received.event_type(), "StatusChanged");
    }

    #[test]
    fn test_eventbus_emit_without_subscribers() {
        let bus = EventBus::new(2);
        let event = PlayerEvent::SeekDone {
            position_ms: 0,
            timestamp: chrono::Utc::now(),
        };
        assert!(bus.emit(event.clone()).is_err());
        // Lossy emit never fails
        bus.emit_lossy(event);
    }

    #[test]
    fn test_event_json_shape() {
        let track_id = TrackId::new();
        let event = PlayerEvent::PlaybackError {
            track_id,
            reason: "no backend for format".to_string(),
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PlaybackError");
        assert_eq!(json["track_id"], track_id.0.to_string());
        assert_eq!(json["reason"], "no backend for format");

        let back: PlayerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.event_type(), "PlaybackError");
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&Status::Playing).unwrap(), "\"playing\"");
        assert_eq!(Status::default(), Status::Unknown);
        assert_eq!(format!("{}", Status::Stopped), "stopped");
    }

    #[test]
    fn test_loop_mode_parse() {
        assert_eq!(LoopMode::from_str("Song"), Some(LoopMode::Song));
        assert_eq!(LoopMode::from_str("shuffle"), Some(LoopMode::Random));
        assert_eq!(LoopMode::from_str("all"), Some(LoopMode::Playlist));
        assert_eq!(LoopMode::from_str("sideways"), None);
        assert_eq!(LoopMode::default(), LoopMode::Off);
    }
}
