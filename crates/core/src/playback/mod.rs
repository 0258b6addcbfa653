//! Playback sessions and the cursor that follows them.
//!
//! [`PlaybackController`] owns at most one device session at a time. While a
//! session plays, a background thread advances the published position once
//! per tick so displays can draw a cursor that follows the audio. Position
//! and state live behind a single mutex shared by the control path and the
//! cursor thread.

use std::{
    fmt,
    sync::{Arc, Condvar, Mutex, MutexGuard},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::{EditorError, Result, SampleBuffer};

/// Output device capable of playing raw PCM.
///
/// `open` starts playback immediately. Handles are moved between the control
/// thread and the cursor thread, so they must be `Send`.
pub trait PlaybackDevice: Send + Sync + 'static {
    type Handle: Send + 'static;

    fn open(
        &self,
        raw: &[u8],
        channel_count: u16,
        sample_width_bytes: u16,
        sample_rate: u32,
    ) -> Result<Self::Handle>;

    fn is_playing(&self, handle: &Self::Handle) -> bool;

    fn stop(&self, handle: &Self::Handle) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing playing; initial state and the state after natural completion.
    Idle,
    Playing,
    /// Playback was cut short by [`PlaybackController::stop`].
    Stopped,
}

/// Consistent view of state and position taken under one lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    /// Frames played so far; `0` unless `state` is `Playing`.
    pub position: usize,
    /// Length of the buffer being played, `0` when idle.
    pub total_frames: usize,
}

struct Session<H> {
    state: PlaybackState,
    position: usize,
    total_frames: usize,
    generation: u64,
    handle: Option<H>,
}

impl<H> Session<H> {
    /// Leaves `Playing`, handing back the device handle to be stopped.
    fn end(&mut self, state: PlaybackState) -> Option<H> {
        self.state = state;
        self.position = 0;
        self.total_frames = 0;
        self.generation += 1;
        self.handle.take()
    }
}

struct Shared<H> {
    session: Mutex<Session<H>>,
    ended: Condvar,
}

impl<H> Shared<H> {
    fn lock(&self) -> Result<MutexGuard<'_, Session<H>>> {
        self.session
            .lock()
            .map_err(|_| EditorError::device("playback session has been poisoned"))
    }
}

struct Worker {
    stop_tx: Sender<()>,
    thread: JoinHandle<()>,
}

/// Starts and stops playback and publishes the playback position.
///
/// All methods take `&self`; the controller can be shared between a thread
/// that waits for playback to finish and one that issues `stop`.
pub struct PlaybackController<D: PlaybackDevice> {
    device: Arc<D>,
    tick: Duration,
    shared: Arc<Shared<D::Handle>>,
    worker: Mutex<Option<Worker>>,
}

impl<D: PlaybackDevice> PlaybackController<D> {
    pub fn new(device: D, tick: Duration) -> Self {
        Self {
            device: Arc::new(device),
            tick,
            shared: Arc::new(Shared {
                session: Mutex::new(Session {
                    state: PlaybackState::Idle,
                    position: 0,
                    total_frames: 0,
                    generation: 0,
                    handle: None,
                }),
                ended: Condvar::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Plays `buffer` from the start.
    ///
    /// Any session already playing is stopped, and its cursor thread joined,
    /// before the device is opened again, so at most one device stream exists.
    pub fn start(&self, buffer: &SampleBuffer) -> Result<()> {
        if buffer.is_empty() {
            return Err(EditorError::NoAudioLoaded);
        }

        let mut worker = self.lock_worker()?;
        self.stop_locked(&mut worker)?;

        let handle = self.device.open(
            &buffer.to_le_bytes(),
            buffer.channel_count(),
            buffer.sample_width_bytes(),
            buffer.sample_rate(),
        )?;

        let generation = {
            let mut session = self.shared.lock()?;
            session.generation += 1;
            session.state = PlaybackState::Playing;
            session.position = 0;
            session.total_frames = buffer.frames();
            session.handle = Some(handle);
            session.generation
        };

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let cursor = Cursor {
            device: self.device.clone(),
            shared: self.shared.clone(),
            generation,
            total_frames: buffer.frames(),
            sample_rate: buffer.sample_rate(),
            tick: self.tick,
            stop_rx,
        };

        match thread::Builder::new()
            .name("playback-cursor".to_string())
            .spawn(move || cursor.run())
        {
            Ok(thread) => {
                *worker = Some(Worker { stop_tx, thread });
                tracing::info!(frames = buffer.frames(), "playback started");
                Ok(())
            }
            Err(err) => {
                let handle = self.shared.lock()?.end(PlaybackState::Idle);
                self.shared.ended.notify_all();
                if let Some(handle) = handle {
                    self.device.stop(&handle)?;
                }
                Err(err.into())
            }
        }
    }

    /// Stops the active session. Does nothing when no session is playing.
    pub fn stop(&self) -> Result<()> {
        let mut worker = self.lock_worker()?;
        self.stop_locked(&mut worker)
    }

    /// Current playback position in frames; `0` unless playing.
    pub fn position(&self) -> Result<usize> {
        Ok(self.shared.lock()?.position)
    }

    pub fn state(&self) -> Result<PlaybackState> {
        Ok(self.shared.lock()?.state)
    }

    pub fn snapshot(&self) -> Result<PlaybackSnapshot> {
        let session = self.shared.lock()?;
        Ok(PlaybackSnapshot {
            state: session.state,
            position: session.position,
            total_frames: session.total_frames,
        })
    }

    /// Blocks until the current session is no longer playing.
    ///
    /// Must not be called from the thread that is expected to call `stop`.
    pub fn wait(&self) -> Result<()> {
        let mut session = self.shared.lock()?;
        while session.state == PlaybackState::Playing {
            session = self
                .shared
                .ended
                .wait(session)
                .map_err(|_| EditorError::device("playback session has been poisoned"))?;
        }
        Ok(())
    }

    fn stop_locked(&self, worker: &mut Option<Worker>) -> Result<()> {
        let handle = {
            let mut session = self.shared.lock()?;
            if session.state == PlaybackState::Playing {
                session.end(PlaybackState::Stopped)
            } else {
                None
            }
        };
        self.shared.ended.notify_all();

        let stopped = match &handle {
            Some(handle) => self.device.stop(handle),
            None => Ok(()),
        };

        if let Some(Worker { stop_tx, thread }) = worker.take() {
            let _ = stop_tx.try_send(());
            thread
                .join()
                .map_err(|_| EditorError::device("playback cursor thread panicked"))?;
        }

        if handle.is_some() {
            tracing::info!("playback stopped");
        }
        stopped
    }

    fn lock_worker(&self) -> Result<MutexGuard<'_, Option<Worker>>> {
        self.worker
            .lock()
            .map_err(|_| EditorError::device("playback worker has been poisoned"))
    }
}

impl<D: PlaybackDevice> Drop for PlaybackController<D> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::warn!(%err, "failed to stop playback on shutdown");
        }
    }
}

impl<D: PlaybackDevice> fmt::Debug for PlaybackController<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackController")
            .field("tick", &self.tick)
            .field("snapshot", &self.snapshot().ok())
            .finish()
    }
}

/// Background loop advancing the position of one session.
struct Cursor<D: PlaybackDevice> {
    device: Arc<D>,
    shared: Arc<Shared<D::Handle>>,
    generation: u64,
    total_frames: usize,
    sample_rate: u32,
    tick: Duration,
    stop_rx: Receiver<()>,
}

impl<D: PlaybackDevice> Cursor<D> {
    fn run(self) {
        let started = Instant::now();
        loop {
            match self.stop_rx.recv_timeout(self.tick) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }

            // Position follows wall-clock time since the device was opened so
            // late wakeups do not make the cursor drift behind the audio.
            let elapsed = started.elapsed().as_secs_f64() * self.sample_rate as f64;
            let target = (elapsed as usize).min(self.total_frames);

            let Ok(mut session) = self.shared.session.lock() else {
                break;
            };
            if session.generation != self.generation || session.state != PlaybackState::Playing {
                break;
            }

            session.position = session.position.max(target);
            let device_done = session
                .handle
                .as_ref()
                .map_or(true, |handle| !self.device.is_playing(handle));

            if session.position >= self.total_frames || device_done {
                let handle = session.end(PlaybackState::Idle);
                drop(session);
                self.shared.ended.notify_all();

                if let Some(handle) = handle {
                    if let Err(err) = self.device.stop(&handle) {
                        tracing::warn!(%err, "failed to release device after playback ended");
                    }
                }
                tracing::debug!(device_done, "playback reached the end of the buffer");
                break;
            }
        }
    }
}
