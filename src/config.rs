//! Replay capture configuration
//!
//! Defines the tunable parameters for the replay buffer and the
//! recording pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Nominal frame rate of the capture stream, in frames per second.
pub const DEFAULT_FRAME_RATE: u32 = 24;

/// Default rolling window: 30 seconds at the nominal frame rate.
pub const DEFAULT_BUFFER_CAPACITY: usize = 720;

/// Configuration for the replay capture pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayConfig {
    /// Maximum number of frames retained in the replay buffer
    pub buffer_capacity: usize,

    /// Output frame rate in frames per second
    pub frame_rate: u32,

    /// Target video bitrate in bits per second
    pub bitrate_bps: u32,

    /// Sleep between writer-readiness polls (milliseconds)
    pub poll_interval_ms: u64,

    /// Give up waiting for writer readiness after this long (milliseconds)
    pub writer_timeout_ms: u64,

    /// Directory for temporary recording artifacts (None = system temp dir)
    pub artifact_dir: Option<PathBuf>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            frame_rate: DEFAULT_FRAME_RATE,
            bitrate_bps: 8_000_000,
            poll_interval_ms: 10,
            writer_timeout_ms: 5_000,
            artifact_dir: None,
        }
    }
}

impl ReplayConfig {
    /// Duration of one nominal frame interval (1 / frameRate)
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate as f64)
    }

    /// Sleep between writer-readiness polls
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Upper bound on a single writer-readiness wait
    pub fn writer_timeout(&self) -> Duration {
        Duration::from_millis(self.writer_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_window_is_thirty_seconds() {
        let config = ReplayConfig::default();
        assert_eq!(
            config.buffer_capacity,
            (config.frame_rate * 30) as usize
        );
    }

    #[test]
    fn frame_interval_matches_rate() {
        let config = ReplayConfig::default();
        let interval = config.frame_interval();
        assert!((interval.as_secs_f64() - 1.0 / 24.0).abs() < 1e-9);
    }

    #[test]
    fn config_deserializes_from_camel_case() {
        let config: ReplayConfig = serde_json::from_str(
            r#"{
                "bufferCapacity": 240,
                "frameRate": 24,
                "bitrateBps": 8000000,
                "pollIntervalMs": 10,
                "writerTimeoutMs": 5000,
                "artifactDir": null
            }"#,
        )
        .unwrap();
        assert_eq!(config.buffer_capacity, 240);
        assert!(config.artifact_dir.is_none());
    }
}
