//! Instant Replay - rolling frame capture, made simple.
//!
//! This crate implements the core of an instant-replay pipeline: a
//! fixed-capacity replay buffer continuously ingests frames from a
//! camera source, and on demand a recording session assembles the
//! buffered history plus newly arriving frames into one continuous
//! H.264/MP4 file with monotonic presentation timing.
//!
//! The presentation layer, device pairing, concrete capture transports,
//! and the media library that consumes finished files are external
//! collaborators; this crate specifies them only at their boundaries
//! ([`source::FrameSource`], [`permission::PermissionGate`],
//! [`persistence::StorageSink`]).

pub mod assembler;
pub mod buffer;
pub mod codec;
pub mod config;
pub mod controller;
pub mod permission;
pub mod persistence;
pub mod source;

pub use assembler::{
    AssemblerError, AssemblerState, FfmpegBackend, OutputHandle, VideoAssembler,
};
pub use buffer::{Frame, ReplayBuffer};
pub use codec::{FrameCodec, PixelSurface, PngCodec};
pub use config::ReplayConfig;
pub use controller::{
    ControllerError, RecordingController, RecordingEvent, RecordingOutcome, SessionState,
};
pub use permission::PermissionGate;
pub use persistence::{DirectorySink, SaveError, StorageSink};
pub use source::{FrameEvent, FrameFeed, FrameSource};
