//! Backend worker threads
//!
//! Audio device handles (`cpal::Stream`, `rodio::OutputStream`) are not
//! `Send`, so each backend keeps them on a dedicated thread and drives it
//! with `Command`s. The thread is spawned by `create_playback`; commands sent
//! while the track is still opening wait in the channel.
//!
//! `DeviceGate` serializes "open the output device" against "dispose": a
//! disposed worker that has not yet reached its device never opens it, and
//! one that has is joined, so two backends never hold the device at once.

use super::OutputParams;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// How often a playing worker reports its position
pub(crate) const REPORT_INTERVAL: Duration = Duration::from_millis(100);

/// How long an idle worker blocks waiting for the next command
pub(crate) const IDLE_WAIT: Duration = Duration::from_millis(50);

/// Transport request for a worker thread
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Command {
    Play,
    Pause,
    Resume,
    Stop,
    Seek(Duration),
    Output(OutputParams),
    Shutdown,
}

#[derive(Debug, Default)]
struct GateState {
    cancelled: bool,
    device_open: bool,
}

#[derive(Debug, Default)]
pub(crate) struct DeviceGate {
    state: Mutex<GateState>,
}

impl DeviceGate {
    /// Run `open` unless the worker was cancelled
    ///
    /// Returns `None` when cancelled. The gate stays locked while `open`
    /// runs, so a concurrent `cancel` waits for the outcome.
    pub(crate) fn open_device<T, E>(
        &self,
        open: impl FnOnce() -> Result<T, E>,
    ) -> Option<Result<T, E>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.cancelled {
            return None;
        }
        let result = open();
        state.device_open = result.is_ok();
        Some(result)
    }

    /// Forbid opening the device; returns whether it is already open
    fn cancel(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.cancelled = true;
        state.device_open
    }
}

/// Owning handle for one worker thread
#[derive(Debug)]
pub(crate) struct WorkerHandle {
    commands: Sender<Command>,
    thread: Option<JoinHandle<()>>,
    gate: Arc<DeviceGate>,
}

impl WorkerHandle {
    /// Spawn `body` on a named thread with a fresh command channel and gate
    pub(crate) fn spawn<F>(name: &str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce(Receiver<Command>, Arc<DeviceGate>) + Send + 'static,
    {
        let (commands, rx) = mpsc::channel();
        let gate = Arc::new(DeviceGate::default());
        let worker_gate = Arc::clone(&gate);
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(rx, worker_gate))?;
        Ok(Self {
            commands,
            thread: Some(thread),
            gate,
        })
    }

    pub(crate) fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!(?command, "Worker already exited, dropping command");
        }
    }

    /// Stop the worker and release its device
    ///
    /// Joins when the device was opened; otherwise the thread is detached
    /// and exits on its own once its (possibly slow) open finishes.
    pub(crate) fn shutdown(mut self) {
        let device_open = self.gate.cancel();
        let _ = self.commands.send(Command::Shutdown);
        let Some(thread) = self.thread.take() else {
            return;
        };
        if device_open {
            if thread.join().is_err() {
                warn!("Backend worker panicked");
            }
        } else {
            debug!("Detaching worker that never opened the device");
        }
    }
}
