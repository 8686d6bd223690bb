//! Playlist collaborator
//!
//! The engine does not own playlists. It only asks the collaborator for the
//! next item (after a failure or at end of media) and tells it when playback
//! stops. `QueuePlaylist` is a minimal in-memory implementation used by the
//! command-line player.

use crate::track::Track;
use std::sync::Mutex;
use tracing::debug;
use xrp_common::LoopMode;

/// Narrow interface the engine uses to talk to whatever owns the playlist
pub trait PlaylistCollaborator: Send + Sync + 'static {
    /// Advance and return the track to play next, if any
    fn play_next_item(&self) -> Option<Track>;

    /// Move the "currently playing" marker (None clears it)
    fn update_playing_item(&self, index: Option<usize>);

    /// Forget which playlist is the active one
    fn clear_active_playlist(&self);
}

#[derive(Debug, Default)]
struct QueueInner {
    items: Vec<Track>,
    playing: Option<usize>,
    active: bool,
    loop_mode: LoopMode,
    random_seed: u64,
}

/// Ordered in-memory playlist
///
/// Items flagged with a playback error are skipped when advancing. Running
/// out of items deactivates the playlist.
#[derive(Debug, Default)]
pub struct QueuePlaylist {
    inner: Mutex<QueueInner>,
}

impl QueuePlaylist {
    pub fn new(items: Vec<Track>) -> Self {
        let random_seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9E37_79B9_7F4A_7C15);
        Self {
            inner: Mutex::new(QueueInner {
                items,
                random_seed,
                ..Default::default()
            }),
        }
    }

    /// Set the advance policy (`Song` behaves like `Off` here; the engine
    /// handles single-track repeat itself)
    pub fn set_loop_mode(&self, loop_mode: LoopMode) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.loop_mode = loop_mode;
        }
    }

    /// Index of the item currently marked as playing
    pub fn playing_index(&self) -> Option<usize> {
        self.inner.lock().ok().and_then(|inner| inner.playing)
    }

    /// Whether this playlist is the active one
    pub fn is_active(&self) -> bool {
        self.inner.lock().map(|inner| inner.active).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QueueInner {
    fn next_candidate(&mut self, from: Option<usize>) -> Option<usize> {
        let len = self.items.len();
        if len == 0 {
            return None;
        }
        match self.loop_mode {
            LoopMode::Random => {
                // xorshift64; quality is irrelevant for shuffling a play queue
                let mut x = self.random_seed.max(1);
                x ^= x << 13;
                x ^= x >> 7;
                x ^= x << 17;
                self.random_seed = x;
                Some((x % len as u64) as usize)
            }
            LoopMode::Playlist => Some(from.map(|i| (i + 1) % len).unwrap_or(0)),
            LoopMode::Off | LoopMode::Song => {
                let next = from.map(|i| i + 1).unwrap_or(0);
                (next < len).then_some(next)
            }
        }
    }
}

impl PlaylistCollaborator for QueuePlaylist {
    fn play_next_item(&self) -> Option<Track> {
        let mut inner = self.inner.lock().ok()?;
        let mut cursor = inner.playing;

        // Each item is considered at most once per call
        for _ in 0..inner.items.len() {
            let index = inner.next_candidate(cursor)?;
            let track = inner.items[index].clone();
            if track.playback_error() {
                debug!(index, title = track.title(), "Skipping track with playback error");
                cursor = Some(index);
                continue;
            }
            inner.playing = Some(index);
            inner.active = true;
            return Some(track);
        }
        inner.active = false;
        None
    }

    fn update_playing_item(&self, index: Option<usize>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.playing = index;
        }
    }

    fn clear_active_playlist(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.active = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracks(n: usize) -> Vec<Track> {
        (0..n)
            .map(|i| Track::from_path(format!("/music/{}.flac", i)))
            .collect()
    }

    #[test]
    fn test_advances_in_order_and_stops() {
        let items = tracks(2);
        let playlist = QueuePlaylist::new(items.clone());

        assert!(playlist.play_next_item().unwrap().same(&items[0]));
        assert!(playlist.is_active());
        assert!(playlist.play_next_item().unwrap().same(&items[1]));
        assert!(playlist.play_next_item().is_none());
        assert!(!playlist.is_active());
    }

    #[test]
    fn test_skips_flagged_tracks() {
        let items = tracks(3);
        items[1].mark_playback_error();
        let playlist = QueuePlaylist::new(items.clone());

        assert!(playlist.play_next_item().unwrap().same(&items[0]));
        assert!(playlist.play_next_item().unwrap().same(&items[2]));
        assert_eq!(playlist.playing_index(), Some(2));
    }

    #[test]
    fn test_playlist_loop_wraps() {
        let items = tracks(2);
        let playlist = QueuePlaylist::new(items.clone());
        playlist.set_loop_mode(LoopMode::Playlist);

        playlist.play_next_item();
        playlist.play_next_item();
        assert!(playlist.play_next_item().unwrap().same(&items[0]));
    }

    #[test]
    fn test_all_flagged_returns_none() {
        let items = tracks(2);
        items.iter().for_each(Track::mark_playback_error);
        let playlist = QueuePlaylist::new(items);
        playlist.set_loop_mode(LoopMode::Playlist);
        assert!(playlist.play_next_item().is_none());
    }

    #[test]
    fn test_random_stays_in_bounds() {
        let playlist = QueuePlaylist::new(tracks(5));
        playlist.set_loop_mode(LoopMode::Random);
        for _ in 0..50 {
            assert!(playlist.play_next_item().is_some());
            assert!(playlist.playing_index().unwrap() < 5);
        }
    }

    #[test]
    fn test_stop_markers() {
        let playlist = QueuePlaylist::new(tracks(2));
        playlist.play_next_item();
        playlist.update_playing_item(None);
        playlist.clear_active_playlist();
        assert_eq!(playlist.playing_index(), None);
        assert!(!playlist.is_active());
    }
}
