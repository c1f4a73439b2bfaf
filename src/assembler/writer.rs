//! Streaming writer seam
//!
//! The video assembler drives an underlying streaming writer through this
//! trait: the writer exposes a readiness signal, accepts timed frame
//! appends, and performs a blocking finalize into the output artifact.

use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors reported by a streaming writer
#[derive(Error, Debug)]
pub enum WriterError {
    #[error("Writer configuration failed: {0}")]
    Configure(String),

    #[error("Frame append failed: {0}")]
    Append(String),

    #[error("Finalize failed: {0}")]
    Finalize(String),

    #[error("Writer not ready after {0:?}")]
    Stalled(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encoder parameters fixed at the start of a recording session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    /// Output width in pixels, taken from the first decoded frame
    pub width: u32,

    /// Output height in pixels, taken from the first decoded frame
    pub height: u32,

    /// Nominal frame rate in frames per second
    pub frame_rate: u32,

    /// Target bitrate in bits per second
    pub bitrate_bps: u32,

    /// Key-frame spacing in frames (one key frame per second)
    pub keyframe_interval: u32,
}

impl EncoderSettings {
    /// Settings for a session at the given output size
    pub fn for_dimensions(width: u32, height: u32, frame_rate: u32, bitrate_bps: u32) -> Self {
        Self {
            width,
            height,
            frame_rate,
            bitrate_bps,
            keyframe_interval: frame_rate,
        }
    }

    /// Byte length of one tightly packed RGBA frame at these dimensions
    pub fn frame_byte_len(&self) -> usize {
        (self.width as usize) * (self.height as usize) * 4
    }
}

/// A stateful, single-session video writer.
///
/// All appends must be serialized by the caller; the writer paces
/// ingestion through `is_ready`.
pub trait StreamingWriter: Send {
    /// Whether the writer can accept more data right now
    fn is_ready(&self) -> bool;

    /// Append one RGBA frame at the given presentation timestamp
    fn append(&mut self, rgba: &[u8], pts: Duration) -> Result<(), WriterError>;

    /// Mark the input finished, block until the writer completes, and
    /// return the path of the finished artifact. Releases all resources.
    fn finish(self: Box<Self>) -> Result<PathBuf, WriterError>;
}

/// Opens streaming writers for new recording sessions.
///
/// A successful `open` produces a fresh artifact at a unique temporary
/// path; a failed one must leave no artifact behind.
pub trait WriterBackend: Send + Sync {
    fn open(&self, settings: &EncoderSettings) -> Result<Box<dyn StreamingWriter>, WriterError>;
}

/// Bounded poll-and-sleep wait for writer readiness.
///
/// The writer's readiness signal is the only flow-control mechanism in
/// the append path; this wait polls it at a fixed interval and gives up
/// after the configured timeout so a stalled writer fails fast instead
/// of hanging the caller.
#[derive(Debug, Clone, Copy)]
pub struct BackpressureWait {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl BackpressureWait {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// Block until `ready` reports true, or until the timeout elapses.
    pub fn wait_until<F>(&self, ready: F) -> Result<(), WriterError>
    where
        F: Fn() -> bool,
    {
        let deadline = Instant::now() + self.timeout;
        while !ready() {
            if Instant::now() >= deadline {
                return Err(WriterError::Stalled(self.timeout));
            }
            std::thread::sleep(self.poll_interval);
        }
        Ok(())
    }
}
