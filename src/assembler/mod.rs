//! Video assembly
//!
//! Turns a snapshot of buffered frames plus a live frame stream into one
//! finished container file with monotonic presentation timing. The
//! assembler owns a single recording session at a time and drives the
//! underlying streaming writer; every frame, buffered or live, occupies
//! exactly one nominal frame interval in the output.

pub mod ffmpeg;
pub mod writer;

pub use ffmpeg::FfmpegBackend;
pub use writer::{
    BackpressureWait, EncoderSettings, StreamingWriter, WriterBackend, WriterError,
};

use crate::buffer::Frame;
use crate::codec::FrameCodec;
use crate::config::ReplayConfig;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Fatal, session-level assembly errors.
///
/// Any of these leaves the assembler unusable; the caller discards it and
/// returns to idle. Frame-level decode failures are not errors — they are
/// counted as drops and never surface here.
#[derive(Error, Debug)]
pub enum AssemblerError {
    #[error("Already recording")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,

    #[error("No buffered frames to start from")]
    NoBufferedFrames,

    #[error("Writer initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Finalization failed: {0}")]
    FinalizationFailed(String),

    #[error("Writer stalled: {0}")]
    WriterStalled(String),
}

/// Result type for assembler operations
pub type AssemblerResult<T> = Result<T, AssemblerError>;

/// Externally observable assembler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssemblerState {
    /// No session in progress
    Idle,
    /// Session open, accepting live frames
    Recording,
    /// A fatal error occurred; the assembler must be discarded
    Failed,
}

/// Handle to a finished recording artifact
#[derive(Debug, Clone)]
pub struct OutputHandle {
    /// Path of the completed container file
    pub path: PathBuf,

    /// Frames successfully written to the output
    pub frames_written: u64,

    /// Frames skipped because the codec could not decode them
    pub frames_dropped: u64,

    /// Output duration in seconds (framesWritten / frameRate)
    pub duration_secs: f64,
}

/// One in-progress recording session
struct ActiveSession {
    writer: Box<dyn StreamingWriter>,
    width: u32,
    height: u32,
    frames_written: u64,
    frames_dropped: u64,
    clock: Duration,
    frame_interval: Duration,
}

enum Phase {
    Idle,
    Recording(ActiveSession),
    Failed,
}

/// Stateful video assembler for a single recording session.
///
/// State machine: Idle → `start` → Recording → `finish` → Idle, with any
/// fatal failure landing in Failed. Wrong-state calls are errors, never
/// silent no-ops.
pub struct VideoAssembler {
    codec: Arc<dyn FrameCodec>,
    backend: Arc<dyn WriterBackend>,
    frame_rate: u32,
    bitrate_bps: u32,
    backpressure: BackpressureWait,
    phase: Phase,
}

impl VideoAssembler {
    pub fn new(
        codec: Arc<dyn FrameCodec>,
        backend: Arc<dyn WriterBackend>,
        config: &ReplayConfig,
    ) -> Self {
        Self {
            codec,
            backend,
            frame_rate: config.frame_rate,
            bitrate_bps: config.bitrate_bps,
            backpressure: BackpressureWait::new(config.poll_interval(), config.writer_timeout()),
            phase: Phase::Idle,
        }
    }

    /// Current state of the assembler
    pub fn state(&self) -> AssemblerState {
        match self.phase {
            Phase::Idle => AssemblerState::Idle,
            Phase::Recording(_) => AssemblerState::Recording,
            Phase::Failed => AssemblerState::Failed,
        }
    }

    /// Frames written in the current session (0 outside a session)
    pub fn frames_written(&self) -> u64 {
        match &self.phase {
            Phase::Recording(session) => session.frames_written,
            _ => 0,
        }
    }

    /// Frames dropped in the current session (0 outside a session)
    pub fn frames_dropped(&self) -> u64 {
        match &self.phase {
            Phase::Recording(session) => session.frames_dropped,
            _ => 0,
        }
    }

    /// Open a session seeded with the buffered history.
    ///
    /// The first frame establishes the fixed output dimensions; the whole
    /// initial set is then drained through the same append path used for
    /// live frames. The assembler is Recording only once the drain has
    /// completed.
    pub fn start(&mut self, initial_frames: &[Frame]) -> AssemblerResult<()> {
        match self.phase {
            Phase::Idle => {}
            Phase::Recording(_) => return Err(AssemblerError::AlreadyRecording),
            Phase::Failed => {
                return Err(AssemblerError::InitializationFailed(
                    "assembler is in a failed state and must be discarded".to_string(),
                ))
            }
        }

        if initial_frames.is_empty() {
            return Err(AssemblerError::NoBufferedFrames);
        }

        // The first frame fixes the output size for the whole session
        let Some((width, height)) = self.codec.probe(&initial_frames[0].payload) else {
            self.phase = Phase::Failed;
            return Err(AssemblerError::InitializationFailed(
                "could not decode first buffered frame".to_string(),
            ));
        };

        let settings = EncoderSettings::for_dimensions(
            width,
            height,
            self.frame_rate,
            self.bitrate_bps,
        );
        let writer = match self.backend.open(&settings) {
            Ok(writer) => writer,
            Err(e) => {
                self.phase = Phase::Failed;
                return Err(AssemblerError::InitializationFailed(e.to_string()));
            }
        };

        let mut session = ActiveSession {
            writer,
            width,
            height,
            frames_written: 0,
            frames_dropped: 0,
            clock: Duration::ZERO,
            frame_interval: Duration::from_secs_f64(1.0 / self.frame_rate as f64),
        };

        tracing::info!(
            "Starting recording session: {}x{} @ {}fps, {} buffered frames",
            width,
            height,
            self.frame_rate,
            initial_frames.len()
        );

        // Drain the buffered history before accepting any live frame
        for frame in initial_frames {
            if let Err(e) = append_one(
                &mut session,
                self.codec.as_ref(),
                &self.backpressure,
                &frame.payload,
            ) {
                self.phase = Phase::Failed;
                return Err(e);
            }
        }

        tracing::info!(
            "Initial drain complete: {} written, {} dropped",
            session.frames_written,
            session.frames_dropped
        );

        self.phase = Phase::Recording(session);
        Ok(())
    }

    /// Append one live frame at the current presentation-clock position.
    ///
    /// The capture timestamp is used only for buffer ordering upstream;
    /// presentation timing always advances by one nominal frame interval.
    pub fn append_live(&mut self, payload: &[u8], timestamp_ms: u64) -> AssemblerResult<()> {
        let Phase::Recording(session) = &mut self.phase else {
            return Err(AssemblerError::NotRecording);
        };

        tracing::trace!(timestamp_ms, "live frame");

        if let Err(e) = append_one(session, self.codec.as_ref(), &self.backpressure, payload) {
            self.phase = Phase::Failed;
            return Err(e);
        }
        Ok(())
    }

    /// Finalize the session into a finished artifact.
    pub fn finish(&mut self) -> AssemblerResult<OutputHandle> {
        if !matches!(self.phase, Phase::Recording(_)) {
            return Err(AssemblerError::NotRecording);
        }

        let Phase::Recording(session) = std::mem::replace(&mut self.phase, Phase::Idle) else {
            unreachable!("phase checked above");
        };

        if session.frames_written == 0 {
            // Dropping the writer discards the half-open artifact
            self.phase = Phase::Failed;
            return Err(AssemblerError::FinalizationFailed(
                "no frames written".to_string(),
            ));
        }

        let frames_written = session.frames_written;
        let frames_dropped = session.frames_dropped;

        let path = match session.writer.finish() {
            Ok(path) => path,
            Err(e) => {
                self.phase = Phase::Failed;
                return Err(AssemblerError::FinalizationFailed(e.to_string()));
            }
        };

        let handle = OutputHandle {
            path,
            frames_written,
            frames_dropped,
            duration_secs: frames_written as f64 / self.frame_rate as f64,
        };

        tracing::info!(
            "Recording finished: {} frames ({} dropped), {:.2}s, {}",
            handle.frames_written,
            handle.frames_dropped,
            handle.duration_secs,
            handle.path.display()
        );

        Ok(handle)
    }
}

/// Shared append path for buffered and live frames.
///
/// Waits for writer readiness, decodes to the fixed session size, and
/// appends at the current clock value. Decode failure drops the frame;
/// the clock advances either way.
fn append_one(
    session: &mut ActiveSession,
    codec: &dyn FrameCodec,
    backpressure: &BackpressureWait,
    payload: &[u8],
) -> AssemblerResult<()> {
    backpressure
        .wait_until(|| session.writer.is_ready())
        .map_err(|e| AssemblerError::WriterStalled(e.to_string()))?;

    let pts = session.clock;
    session.clock += session.frame_interval;

    let Some(surface) = codec.decode(payload, session.width, session.height) else {
        session.frames_dropped += 1;
        tracing::debug!("Dropped undecodable frame at pts {:?}", pts);
        return Ok(());
    };

    session
        .writer
        .append(&surface.data, pts)
        .map_err(|e| match e {
            WriterError::Stalled(_) => AssemblerError::WriterStalled(e.to_string()),
            other => AssemblerError::FinalizationFailed(other.to_string()),
        })?;

    session.frames_written += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::writer::mock::MockBackend;
    use super::*;
    use crate::codec::png::encode_test_png;
    use crate::codec::{PixelSurface, PngCodec};
    use std::sync::atomic::Ordering;

    fn test_config() -> ReplayConfig {
        ReplayConfig {
            poll_interval_ms: 1,
            writer_timeout_ms: 30,
            ..ReplayConfig::default()
        }
    }

    fn png_frames(count: u64) -> Vec<Frame> {
        let payload = encode_test_png(64, 64, [1, 2, 3, 255]);
        (0..count)
            .map(|i| Frame {
                payload: payload.clone(),
                timestamp_ms: i,
                sequence: i,
            })
            .collect()
    }

    fn assembler_with(backend: Arc<MockBackend>) -> VideoAssembler {
        VideoAssembler::new(Arc::new(PngCodec::new()), backend, &test_config())
    }

    /// Codec that never decodes anything
    struct RejectingCodec;

    impl FrameCodec for RejectingCodec {
        fn probe(&self, _payload: &[u8]) -> Option<(u32, u32)> {
            Some((64, 64))
        }

        fn decode(&self, _payload: &[u8], _w: u32, _h: u32) -> Option<PixelSurface> {
            None
        }
    }

    #[test]
    fn start_with_empty_set_fails() {
        let mut assembler = assembler_with(Arc::new(MockBackend::new()));
        let result = assembler.start(&[]);
        assert!(matches!(result, Err(AssemblerError::NoBufferedFrames)));
        assert_eq!(assembler.state(), AssemblerState::Idle);
    }

    #[test]
    fn double_start_fails() {
        let mut assembler = assembler_with(Arc::new(MockBackend::new()));
        assembler.start(&png_frames(3)).unwrap();

        let result = assembler.start(&png_frames(3));
        assert!(matches!(result, Err(AssemblerError::AlreadyRecording)));
        assert_eq!(assembler.state(), AssemblerState::Recording);
    }

    #[test]
    fn append_before_start_fails() {
        let mut assembler = assembler_with(Arc::new(MockBackend::new()));
        let result = assembler.append_live(b"frame", 0);
        assert!(matches!(result, Err(AssemblerError::NotRecording)));
    }

    #[test]
    fn finish_before_start_fails() {
        let mut assembler = assembler_with(Arc::new(MockBackend::new()));
        assert!(matches!(
            assembler.finish(),
            Err(AssemblerError::NotRecording)
        ));
    }

    #[test]
    fn undecodable_first_frame_fails_initialization() {
        let mut assembler = assembler_with(Arc::new(MockBackend::new()));
        let frames = vec![Frame {
            payload: b"garbage".to_vec(),
            timestamp_ms: 0,
            sequence: 0,
        }];
        let result = assembler.start(&frames);
        assert!(matches!(
            result,
            Err(AssemblerError::InitializationFailed(_))
        ));
        assert_eq!(assembler.state(), AssemblerState::Failed);
    }

    #[test]
    fn failed_writer_open_poisons_the_assembler() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_open.store(true, Ordering::Relaxed);

        let mut assembler = assembler_with(Arc::clone(&backend));
        let result = assembler.start(&png_frames(2));
        assert!(matches!(
            result,
            Err(AssemblerError::InitializationFailed(_))
        ));
        assert_eq!(assembler.state(), AssemblerState::Failed);
    }

    #[test]
    fn output_dimensions_come_from_first_frame() {
        let backend = Arc::new(MockBackend::new());
        let mut assembler = assembler_with(Arc::clone(&backend));
        assembler.start(&png_frames(1)).unwrap();

        let opened = backend.opened_settings.lock();
        assert_eq!(opened.len(), 1);
        assert_eq!((opened[0].width, opened[0].height), (64, 64));
        assert_eq!(opened[0].keyframe_interval, opened[0].frame_rate);
    }

    #[test]
    fn finish_with_zero_written_frames_fails() {
        let backend = Arc::new(MockBackend::new());
        let mut assembler = VideoAssembler::new(
            Arc::new(RejectingCodec),
            backend.clone(),
            &test_config(),
        );

        // Every drain frame drops, so nothing is ever written
        assembler.start(&png_frames(5)).unwrap();
        assert_eq!(assembler.frames_dropped(), 5);

        let result = assembler.finish();
        assert!(matches!(
            result,
            Err(AssemblerError::FinalizationFailed(_))
        ));
        assert_eq!(assembler.state(), AssemblerState::Failed);
    }

    #[test]
    fn dropped_frames_advance_the_clock() {
        let backend = Arc::new(MockBackend::new());
        let mut assembler = assembler_with(Arc::clone(&backend));

        assembler.start(&png_frames(2)).unwrap();
        // Undecodable live frame: dropped, but the next frame still lands
        // one interval later
        assembler.append_live(b"garbage", 100).unwrap();
        assembler
            .append_live(&encode_test_png(64, 64, [9, 9, 9, 255]), 101)
            .unwrap();

        let log = backend.handle.log.lock();
        let interval = Duration::from_secs_f64(1.0 / 24.0);
        assert_eq!(log.appended_pts.len(), 3);
        assert_eq!(log.appended_pts[0], Duration::ZERO);
        assert_eq!(log.appended_pts[1], interval);
        // pts 2 was consumed by the dropped frame
        assert_eq!(log.appended_pts[2], interval * 3);
    }

    #[test]
    fn stalled_writer_fails_fast_and_poisons_the_session() {
        let backend = Arc::new(MockBackend::new());
        let mut assembler = assembler_with(Arc::clone(&backend));
        assembler.start(&png_frames(1)).unwrap();

        backend.handle.ready.store(false, Ordering::Relaxed);
        let result = assembler.append_live(&encode_test_png(64, 64, [0, 0, 0, 255]), 0);
        assert!(matches!(result, Err(AssemblerError::WriterStalled(_))));
        assert_eq!(assembler.state(), AssemblerState::Failed);

        // The poisoned session rejects everything afterwards
        assert!(matches!(
            assembler.finish(),
            Err(AssemblerError::NotRecording)
        ));
    }

    #[test]
    fn end_to_end_buffered_history_plus_live_tail() {
        let backend = Arc::new(MockBackend::new());
        let mut assembler = assembler_with(Arc::clone(&backend));

        // 30 seconds of buffered history at 24 fps
        assembler.start(&png_frames(720)).unwrap();
        assert_eq!(assembler.state(), AssemblerState::Recording);

        // One more second of live frames
        let live = encode_test_png(64, 64, [4, 5, 6, 255]);
        for i in 0..24u64 {
            assembler.append_live(&live, 2_000 + i).unwrap();
        }

        let handle = assembler.finish().unwrap();
        assert_eq!(assembler.state(), AssemblerState::Idle);
        assert_eq!(handle.frames_written, 744);
        assert_eq!(handle.frames_dropped, 0);
        assert!((handle.duration_secs - 31.0).abs() < 1e-9);
        assert!(handle.path.exists());

        // Presentation timestamps are strictly monotonic at one nominal
        // interval per frame
        let log = backend.handle.log.lock();
        assert!(log.finished);
        assert_eq!(log.appended_pts.len(), 744);
        let interval = Duration::from_secs_f64(1.0 / 24.0);
        for (i, pts) in log.appended_pts.iter().enumerate() {
            assert_eq!(*pts, interval * i as u32);
        }
        // Every appended frame is a full 64x64 RGBA surface
        assert!(log.appended_bytes.iter().all(|&len| len == 64 * 64 * 4));
    }
}
