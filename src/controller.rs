//! Recording controller
//!
//! Orchestrates the recording lifecycle: permission gate → buffer
//! snapshot → assembler start → live append routing → finalize →
//! persistence hand-off. Owns the single active assembler; no two
//! recording sessions are ever concurrently active.

use crate::assembler::{AssemblerError, OutputHandle, VideoAssembler, WriterBackend};
use crate::buffer::ReplayBuffer;
use crate::codec::FrameCodec;
use crate::config::ReplayConfig;
use crate::permission::PermissionGate;
use crate::persistence::{SaveError, StorageSink};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors surfaced by controller operations
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Already recording")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,

    #[error("Capture permission denied")]
    PermissionDenied,

    #[error(transparent)]
    Assembler(#[from] AssemblerError),

    #[error(transparent)]
    Save(#[from] SaveError),
}

/// Current state of the recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No recording in progress
    Idle,
    /// Capturing buffered history plus live frames
    Recording,
    /// Finalizing and persisting the artifact
    Saving,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Events emitted during recording
#[derive(Debug, Clone)]
pub enum RecordingEvent {
    /// Recording started
    Started,
    /// Recording stopped and the artifact was persisted
    Stopped,
    /// A fatal error ended the session
    Error(String),
    /// Elapsed recording time in whole seconds
    Progress(u64),
}

/// Result of a completed recording
#[derive(Debug, Clone)]
pub struct RecordingOutcome {
    /// The finished artifact as reported by the assembler
    pub artifact: OutputHandle,

    /// Where the persistence sink filed the recording
    pub saved_to: PathBuf,
}

/// Sequences the replay buffer and the video assembler into complete
/// recording sessions.
pub struct RecordingController {
    buffer: Arc<ReplayBuffer>,
    codec: Arc<dyn FrameCodec>,
    backend: Arc<dyn WriterBackend>,
    gate: Arc<dyn PermissionGate>,
    sink: Arc<dyn StorageSink>,
    config: ReplayConfig,

    state: Arc<RwLock<SessionState>>,
    assembler: Option<VideoAssembler>,
    started_at: Option<Instant>,
    ticker: Option<tokio::task::JoinHandle<()>>,
    event_tx: broadcast::Sender<RecordingEvent>,
}

impl RecordingController {
    pub fn new(
        buffer: Arc<ReplayBuffer>,
        codec: Arc<dyn FrameCodec>,
        backend: Arc<dyn WriterBackend>,
        gate: Arc<dyn PermissionGate>,
        sink: Arc<dyn StorageSink>,
        config: ReplayConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            buffer,
            codec,
            backend,
            gate,
            sink,
            config,
            state: Arc::new(RwLock::new(SessionState::Idle)),
            assembler: None,
            started_at: None,
            ticker: None,
            event_tx,
        }
    }

    /// The replay buffer shared with the ingestion path
    pub fn buffer(&self) -> Arc<ReplayBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    /// Elapsed time of the active session in whole seconds
    pub fn elapsed_secs(&self) -> u64 {
        self.started_at
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    /// Start a recording seeded with the buffered history.
    pub async fn start_recording(&mut self) -> Result<(), ControllerError> {
        if self.state() != SessionState::Idle {
            return Err(ControllerError::AlreadyRecording);
        }

        if !self.gate.is_authorized() && !self.gate.request() {
            return Err(ControllerError::PermissionDenied);
        }

        let snapshot = self.buffer.snapshot();
        tracing::info!("Starting recording with {} buffered frames", snapshot.len());

        let mut assembler = VideoAssembler::new(
            Arc::clone(&self.codec),
            Arc::clone(&self.backend),
            &self.config,
        );
        assembler.start(&snapshot)?;

        // Live appends are accepted only from here on; the drain above
        // has already completed.
        self.assembler = Some(assembler);
        self.started_at = Some(Instant::now());
        *self.state.write() = SessionState::Recording;
        self.spawn_ticker();

        let _ = self.event_tx.send(RecordingEvent::Started);
        tracing::info!("Recording started");
        Ok(())
    }

    /// Route a live frame into the active session.
    ///
    /// Outside Recording this is a no-op: routing, not state checking,
    /// is the caller-visible contract here. A fatal append error tears
    /// the session down and is reported through the event channel.
    pub fn handle_live_frame(&mut self, payload: &[u8], timestamp_ms: u64) {
        if self.state() != SessionState::Recording {
            return;
        }
        let Some(assembler) = self.assembler.as_mut() else {
            return;
        };

        if let Err(e) = assembler.append_live(payload, timestamp_ms) {
            tracing::error!("Live append failed, discarding session: {}", e);
            self.teardown_session();
            let _ = self.event_tx.send(RecordingEvent::Error(e.to_string()));
        }
    }

    /// Stop the recording, finalize the artifact, and hand it to the
    /// persistence sink.
    ///
    /// The session is destroyed on completion, success or failure.
    pub async fn stop_recording(&mut self) -> Result<RecordingOutcome, ControllerError> {
        if self.state() != SessionState::Recording {
            return Err(ControllerError::NotRecording);
        }

        tracing::info!("Stopping recording");
        *self.state.write() = SessionState::Saving;
        self.cancel_ticker();

        let Some(mut assembler) = self.assembler.take() else {
            *self.state.write() = SessionState::Idle;
            return Err(ControllerError::NotRecording);
        };

        let handle = match assembler.finish() {
            Ok(handle) => handle,
            Err(e) => {
                self.finish_session();
                let _ = self.event_tx.send(RecordingEvent::Error(e.to_string()));
                return Err(e.into());
            }
        };

        // The gate is consulted again before the artifact leaves the
        // staging area; the temporary file stays put on failure.
        if !self.gate.is_authorized() {
            self.finish_session();
            tracing::warn!(
                "Persistence not authorized, leaving artifact at {}",
                handle.path.display()
            );
            let _ = self
                .event_tx
                .send(RecordingEvent::Error("persistence not authorized".to_string()));
            return Err(ControllerError::PermissionDenied);
        }

        let saved_to = match self.sink.save_and_delete(&handle.path).await {
            Ok(saved_to) => saved_to,
            Err(e) => {
                self.finish_session();
                let _ = self.event_tx.send(RecordingEvent::Error(e.to_string()));
                return Err(e.into());
            }
        };

        self.finish_session();
        let _ = self.event_tx.send(RecordingEvent::Stopped);
        tracing::info!(
            "Recording stopped: {} frames, saved to {}",
            handle.frames_written,
            saved_to.display()
        );

        Ok(RecordingOutcome {
            artifact: handle,
            saved_to,
        })
    }

    /// The streaming session ended; the buffer's lifetime is bound to it.
    pub fn streaming_stopped(&mut self) {
        self.buffer.clear();
    }

    /// Per-second elapsed-time ticker, live only while Recording
    fn spawn_ticker(&mut self) {
        let event_tx = self.event_tx.clone();
        let started = Instant::now();
        self.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.tick().await; // immediate first tick
            loop {
                interval.tick().await;
                let _ = event_tx.send(RecordingEvent::Progress(started.elapsed().as_secs()));
            }
        }));
    }

    fn cancel_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    /// Discard a live session after a fatal append failure
    fn teardown_session(&mut self) {
        self.cancel_ticker();
        self.assembler = None;
        self.started_at = None;
        *self.state.write() = SessionState::Idle;
    }

    /// Return to Idle after a stop attempt, successful or not
    fn finish_session(&mut self) {
        self.assembler = None;
        self.started_at = None;
        *self.state.write() = SessionState::Idle;
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        self.cancel_ticker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::writer::mock::MockBackend;
    use crate::codec::png::encode_test_png;
    use crate::codec::PngCodec;
    use crate::persistence::DirectorySink;
    use async_trait::async_trait;
    use std::path::Path;

    struct DenyGate;

    impl PermissionGate for DenyGate {
        fn is_authorized(&self) -> bool {
            false
        }

        fn request(&self) -> bool {
            false
        }
    }

    struct FailingSink;

    #[async_trait]
    impl StorageSink for FailingSink {
        async fn save_and_delete(&self, _artifact: &Path) -> Result<PathBuf, SaveError> {
            Err(SaveError::SaveFailed("sink unavailable".to_string()))
        }
    }

    struct Fixture {
        controller: RecordingController,
        backend: Arc<MockBackend>,
        library: tempfile::TempDir,
    }

    fn fixture_with_gate(gate: Arc<dyn PermissionGate>) -> Fixture {
        let backend = Arc::new(MockBackend::new());
        let library = tempfile::tempdir().unwrap();
        let controller = RecordingController::new(
            Arc::new(ReplayBuffer::new(720)),
            Arc::new(PngCodec::new()),
            Arc::clone(&backend) as Arc<dyn WriterBackend>,
            gate,
            Arc::new(DirectorySink::new(library.path())),
            ReplayConfig::default(),
        );
        Fixture {
            controller,
            backend,
            library,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_gate(Arc::new(crate::permission::AlwaysAllow))
    }

    fn seed_buffer(controller: &RecordingController, frames: u64) {
        let payload = encode_test_png(64, 64, [1, 2, 3, 255]);
        let buffer = controller.buffer();
        for i in 0..frames {
            buffer.push(payload.clone(), 1_000 + i);
        }
    }

    #[tokio::test]
    async fn start_requires_permission() {
        let mut fx = fixture_with_gate(Arc::new(DenyGate));
        seed_buffer(&fx.controller, 10);

        let result = fx.controller.start_recording().await;
        assert!(matches!(result, Err(ControllerError::PermissionDenied)));
        assert_eq!(fx.controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn start_with_empty_buffer_fails() {
        let mut fx = fixture();
        let result = fx.controller.start_recording().await;
        assert!(matches!(
            result,
            Err(ControllerError::Assembler(AssemblerError::NoBufferedFrames))
        ));
        assert_eq!(fx.controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let mut fx = fixture();
        seed_buffer(&fx.controller, 5);

        fx.controller.start_recording().await.unwrap();
        let result = fx.controller.start_recording().await;
        assert!(matches!(result, Err(ControllerError::AlreadyRecording)));
    }

    #[tokio::test]
    async fn stop_without_start_is_rejected() {
        let mut fx = fixture();
        let result = fx.controller.stop_recording().await;
        assert!(matches!(result, Err(ControllerError::NotRecording)));
    }

    #[tokio::test]
    async fn live_frames_outside_recording_are_ignored() {
        let mut fx = fixture();
        fx.controller.handle_live_frame(b"frame", 0);
        assert_eq!(fx.controller.state(), SessionState::Idle);
        assert!(fx.backend.handle.log.lock().appended_pts.is_empty());
    }

    #[tokio::test]
    async fn full_session_records_history_and_live_tail() {
        let mut fx = fixture();
        seed_buffer(&fx.controller, 720);

        let mut events = fx.controller.subscribe();

        fx.controller.start_recording().await.unwrap();
        assert_eq!(fx.controller.state(), SessionState::Recording);

        let live = encode_test_png(64, 64, [7, 7, 7, 255]);
        for i in 0..24u64 {
            fx.controller.handle_live_frame(&live, 5_000 + i);
        }

        let outcome = fx.controller.stop_recording().await.unwrap();
        assert_eq!(fx.controller.state(), SessionState::Idle);
        assert_eq!(outcome.artifact.frames_written, 744);
        assert!((outcome.artifact.duration_secs - 31.0).abs() < 1e-9);
        assert!(outcome.saved_to.starts_with(fx.library.path()));
        assert!(outcome.saved_to.exists());
        // The temporary artifact was handed off and removed
        assert!(!outcome.artifact.path.exists());

        assert!(matches!(events.try_recv(), Ok(RecordingEvent::Started)));
        assert!(matches!(events.try_recv(), Ok(RecordingEvent::Stopped)));
    }

    #[tokio::test]
    async fn failed_save_keeps_the_artifact_and_returns_idle() {
        let backend = Arc::new(MockBackend::new());
        let mut controller = RecordingController::new(
            Arc::new(ReplayBuffer::new(32)),
            Arc::new(PngCodec::new()),
            Arc::clone(&backend) as Arc<dyn WriterBackend>,
            Arc::new(crate::permission::AlwaysAllow),
            Arc::new(FailingSink),
            ReplayConfig::default(),
        );
        seed_buffer(&controller, 8);

        controller.start_recording().await.unwrap();
        let result = controller.stop_recording().await;
        assert!(matches!(
            result,
            Err(ControllerError::Save(SaveError::SaveFailed(_)))
        ));
        assert_eq!(controller.state(), SessionState::Idle);

        // The finished artifact is still on disk for the host to recover
        let log = backend.handle.log.lock();
        assert!(log.finished);
    }

    #[tokio::test]
    async fn streaming_stop_clears_the_buffer() {
        let mut fx = fixture();
        seed_buffer(&fx.controller, 40);
        assert_eq!(fx.controller.buffer().len(), 40);

        fx.controller.streaming_stopped();
        assert!(fx.controller.buffer().is_empty());
    }
}
