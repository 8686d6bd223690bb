//! Playlist collaborator that hands out a fixed queue and records calls

use std::collections::VecDeque;
use std::sync::Mutex;
use xrp_player::{PlaylistCollaborator, Track};

#[derive(Default)]
struct Recorded {
    queue: VecDeque<Track>,
    next_calls: usize,
    playing_updates: Vec<Option<usize>>,
    clear_calls: usize,
}

#[derive(Default)]
pub struct RecordingPlaylist {
    inner: Mutex<Recorded>,
}

impl RecordingPlaylist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `track` as the next item handed to the engine
    pub fn push(&self, track: Track) {
        self.inner.lock().unwrap().queue.push_back(track);
    }

    pub fn next_calls(&self) -> usize {
        self.inner.lock().unwrap().next_calls
    }

    pub fn playing_updates(&self) -> Vec<Option<usize>> {
        self.inner.lock().unwrap().playing_updates.clone()
    }

    pub fn clear_calls(&self) -> usize {
        self.inner.lock().unwrap().clear_calls
    }
}

impl PlaylistCollaborator for RecordingPlaylist {
    fn play_next_item(&self) -> Option<Track> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_calls += 1;
        inner.queue.pop_front()
    }

    fn update_playing_item(&self, index: Option<usize>) {
        self.inner.lock().unwrap().playing_updates.push(index);
    }

    fn clear_active_playlist(&self) {
        self.inner.lock().unwrap().clear_calls += 1;
    }
}
