//! The recording supervisor.
//!
//! Owns at most one encoder process at a time and drives it through the
//! session lifecycle: spawn, rotate when the time limit elapses, restart
//! after an unexpected exit, tear down on stop. All transitions are
//! serialized through a single driver task per session; the rotation/stop
//! race is decided by one compare-and-swap on the session state, so two
//! conflicting exit behaviors can never be attached to the same process.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{RecorderCategory, RecorderConfig};
use crate::encoder::{EncoderError, EncoderHandle};
use crate::paths;

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    #[error("operation requires the {expected} category")]
    CategoryMismatch { expected: RecorderCategory },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lifecycle of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// No session started yet
    Idle = 0,
    /// Encoder running (or about to be respawned after a crash)
    Recording = 1,
    /// Old segment's process asked to stop, next one not yet spawned
    RotationPending = 2,
    /// Terminal; session torn down
    Stopped = 3,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionState::Idle,
            1 => SessionState::Recording,
            2 => SessionState::RotationPending,
            _ => SessionState::Stopped,
        }
    }
}

struct Shared {
    state: AtomicU8,
    current_segment: std::sync::Mutex<Option<PathBuf>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Idle as u8),
            current_segment: std::sync::Mutex::new(None),
        }
    }

    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, next: SessionState) {
        self.state.store(next as u8, Ordering::SeqCst);
    }

    /// The rotation/stop tie-break: whoever swaps first wins, the loser's
    /// transition fails and becomes a no-op.
    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn set_segment(&self, path: Option<PathBuf>) {
        *self.current_segment.lock().unwrap() = path;
    }

    fn segment(&self) -> Option<PathBuf> {
        self.current_segment.lock().unwrap().clone()
    }
}

/// Supervises one logical camera session.
///
/// A `Recorder` is single-use: once stopped it stays stopped. Dropping a
/// recorder signals its driver task to tear the session down.
pub struct Recorder {
    config: RecorderConfig,
    id: Uuid,
    shared: Arc<Shared>,
    stop_tx: watch::Sender<bool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Recorder {
    /// Create a new recorder. The session id is fixed here for the
    /// session's whole lifetime.
    pub fn new(config: RecorderConfig) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            config,
            id: Uuid::new_v4(),
            shared: Arc::new(Shared::new()),
            stop_tx,
            driver: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Path of the segment currently being written, if any.
    pub fn current_segment(&self) -> Option<PathBuf> {
        self.shared.segment()
    }

    fn display_name(&self) -> String {
        self.config
            .name
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }

    /// Start the session.
    ///
    /// Returns `Ok(None)` without starting anything when no source URL is
    /// resolvable (and mock mode is off) - a no-op, not an error. Calling
    /// `start` on an already started recorder returns the existing session
    /// id and spawns nothing.
    pub async fn start(&self) -> Result<Option<Uuid>, RecorderError> {
        let Some(source_url) = self.config.effective_source_url() else {
            tracing::warn!("Source URL not found for cam: {}", self.display_name());
            return Ok(None);
        };
        if self.config.category == RecorderCategory::Image {
            tracing::warn!(
                "Image category captures single frames, use capture_image: {}",
                self.display_name()
            );
            return Ok(None);
        }
        if !self
            .shared
            .transition(SessionState::Idle, SessionState::Recording)
        {
            // Already started (or already stopped); never spawn a second
            // process for the same session.
            return Ok(Some(self.id));
        }

        if let Err(err) = self.prepare_directories(Local::now()).await {
            self.shared.set_state(SessionState::Stopped);
            return Err(err);
        }

        match self.config.category {
            RecorderCategory::Record => {
                tracing::info!("Starting to record to disk cam: {}", self.display_name());
            }
            RecorderCategory::Stream => {
                tracing::info!(
                    "Restreaming cam: {} (session {})",
                    self.display_name(),
                    self.id
                );
            }
            _ => {
                tracing::info!("Starting capture for cam: {}", self.display_name());
            }
        }

        let ctx = DriverCtx {
            config: self.config.clone(),
            id: self.id,
            source_url,
            shared: Arc::clone(&self.shared),
        };
        let stop_rx = self.stop_tx.subscribe();
        *self.driver.lock().await = Some(tokio::spawn(drive(ctx, stop_rx)));

        Ok(Some(self.id))
    }

    /// Stop the session: cancel the pending rotation, terminate the active
    /// process and, for stream sessions, remove the temp directory.
    /// Idempotent; stopping a never-started recorder is a no-op. Returns
    /// once teardown has finished.
    pub async fn stop(&self) {
        match self.shared.state() {
            SessionState::Idle | SessionState::Stopped => return,
            _ => {}
        }
        self.shared.set_state(SessionState::Stopped);
        let _ = self.stop_tx.send(true);
        tracing::info!("Stopped recording cam: {}", self.display_name());

        if let Some(driver) = self.driver.lock().await.take() {
            let _ = driver.await;
        }
    }

    /// Capture a single frame. Only valid for the image category; runs the
    /// encoder once and waits for it, no rotation loop and no restart.
    pub async fn capture_image(&self) -> Result<Option<PathBuf>, RecorderError> {
        if self.config.category != RecorderCategory::Image {
            return Err(RecorderError::CategoryMismatch {
                expected: RecorderCategory::Image,
            });
        }
        let Some(source_url) = self.config.effective_source_url() else {
            tracing::warn!("Source URL not found for cam: {}", self.display_name());
            return Ok(None);
        };

        let now = Local::now();
        let folder = paths::session_path(&self.config, now, &self.id);
        paths::ensure_dir(&folder)
            .await
            .map_err(|source| RecorderError::DirectoryCreate {
                path: folder.clone(),
                source,
            })?;
        let output = paths::file_name(&self.config, now, &folder);

        let mut encoder = EncoderHandle::spawn(&source_url, &output, RecorderCategory::Image)?;
        let status = encoder.wait().await?;
        tracing::debug!("Captured frame {} ({})", output.display(), status);
        Ok(Some(output))
    }

    async fn prepare_directories(&self, now: DateTime<Local>) -> Result<(), RecorderError> {
        let base = paths::directory_path(&self.config);
        paths::ensure_dir(&base)
            .await
            .map_err(|source| RecorderError::DirectoryCreate {
                path: base.clone(),
                source,
            })?;
        // For record this is today's directory, for stream the per-session
        // temp directory. Failure here is fatal for the session's startup.
        let session = paths::session_path(&self.config, now, &self.id);
        paths::ensure_dir(&session)
            .await
            .map_err(|source| RecorderError::DirectoryCreate {
                path: session.clone(),
                source,
            })?;
        Ok(())
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        // Losing the recorder tears the session down; the driver task
        // terminates the child and cleans up.
        self.shared.set_state(SessionState::Stopped);
        let _ = self.stop_tx.send(true);
    }
}

struct DriverCtx {
    config: RecorderConfig,
    id: Uuid,
    source_url: String,
    shared: Arc<Shared>,
}

enum Event {
    Exited(Option<std::process::ExitStatus>),
    RotationDue,
    StopRequested,
}

/// The per-session driver loop. Each iteration supervises exactly one
/// segment; the select below is the only place timers, process exits and
/// stop requests meet, so each occurrence is consumed exactly once.
async fn drive(ctx: DriverCtx, mut stop_rx: watch::Receiver<bool>) {
    let time_limit = Duration::from_secs(ctx.config.time_limit_secs.max(1));

    loop {
        if ctx.shared.state() == SessionState::Stopped || *stop_rx.borrow() {
            break;
        }

        // Re-resolve per segment: the date may have rolled over since the
        // previous rotation.
        let now = Local::now();
        let folder = paths::session_path(&ctx.config, now, &ctx.id);
        if let Err(err) = paths::ensure_dir(&folder).await {
            tracing::error!(
                "Cannot create segment directory {}: {}",
                folder.display(),
                err
            );
            if !wait_next_tick(&mut stop_rx, time_limit).await {
                break;
            }
            continue;
        }
        let output = paths::file_name(&ctx.config, now, &folder);

        let mut encoder = match EncoderHandle::spawn(&ctx.source_url, &output, ctx.config.category)
        {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!("Failed to spawn encoder for {}: {}", output.display(), err);
                if !wait_next_tick(&mut stop_rx, time_limit).await {
                    break;
                }
                continue;
            }
        };
        ctx.shared.set_segment(Some(output.clone()));
        tracing::debug!("Saving to file: {}", output.display());

        let deadline = tokio::time::Instant::now() + time_limit;
        let event = tokio::select! {
            status = encoder.wait() => Event::Exited(status.ok()),
            _ = tokio::time::sleep_until(deadline) => Event::RotationDue,
            _ = stop_rx.changed() => Event::StopRequested,
        };

        match event {
            Event::Exited(status) => {
                if ctx.shared.state() == SessionState::Stopped {
                    // Stop won the race against the exit notification
                    tracing::debug!("Finished recording: {}", output.display());
                    break;
                }
                tracing::info!(
                    "Encoder for {} exited unexpectedly ({}), restarting",
                    output.display(),
                    status
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "unknown".to_string())
                );
                // Crash-restart: next loop iteration starts a new segment
            }
            Event::RotationDue => {
                if !ctx
                    .shared
                    .transition(SessionState::Recording, SessionState::RotationPending)
                {
                    // A concurrent stop claimed the session first
                    let _ = encoder.shutdown().await;
                    break;
                }
                tracing::debug!("Segment time limit reached: {}", output.display());
                // Exit-driven rotation: the old process is terminated and
                // reaped before the next segment's path is opened.
                let _ = encoder.shutdown().await;
                if !ctx
                    .shared
                    .transition(SessionState::RotationPending, SessionState::Recording)
                {
                    break;
                }
            }
            Event::StopRequested => {
                let _ = encoder.shutdown().await;
                tracing::debug!("Finished recording: {}", output.display());
                break;
            }
        }
    }

    finalize(&ctx).await;
}

/// Sleep out the rest of a failed tick, or return false on a stop request.
async fn wait_next_tick(stop_rx: &mut watch::Receiver<bool>, time_limit: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(time_limit) => true,
        _ = stop_rx.changed() => false,
    }
}

async fn finalize(ctx: &DriverCtx) {
    ctx.shared.set_state(SessionState::Stopped);
    ctx.shared.set_segment(None);
    if ctx.config.category == RecorderCategory::Stream {
        let folder = paths::directory_path(&ctx.config).join(ctx.id.to_string());
        tracing::debug!("Removing temp streaming folder: {}", folder.display());
        if let Err(err) = tokio::fs::remove_dir_all(&folder).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::error!(
                    "Failed to remove temp streaming folder {}: {}",
                    folder.display(),
                    err
                );
            }
        }
    }
}
