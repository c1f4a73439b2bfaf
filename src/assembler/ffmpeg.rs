//! FFmpeg streaming writer
//!
//! Feeds raw RGBA frames to an FFmpeg child process over stdin and muxes
//! them into an H.264 MP4. A dedicated writer thread drains a bounded
//! queue so the append path can observe readiness without blocking on
//! pipe IO.

use super::writer::{EncoderSettings, StreamingWriter, WriterBackend, WriterError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Frames queued ahead of the encoder before the writer reports busy
const QUEUE_DEPTH: usize = 8;

/// Opens [`FfmpegWriter`]s, one unique MP4 artifact per session
pub struct FfmpegBackend {
    artifact_dir: Option<PathBuf>,
}

impl FfmpegBackend {
    /// Write artifacts into `artifact_dir`, or the system temp dir if None
    pub fn new(artifact_dir: Option<PathBuf>) -> Self {
        Self { artifact_dir }
    }

    fn artifact_path(&self) -> PathBuf {
        let dir = self
            .artifact_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        dir.join(format!("replay-{}.mp4", uuid::Uuid::new_v4()))
    }
}

impl WriterBackend for FfmpegBackend {
    fn open(&self, settings: &EncoderSettings) -> Result<Box<dyn StreamingWriter>, WriterError> {
        let output_path = self.artifact_path();
        let writer = FfmpegWriter::spawn(settings, &output_path)?;
        Ok(Box::new(writer))
    }
}

/// Command-line arguments for the encoding session
fn encoder_args(settings: &EncoderSettings, output_path: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pixel_format".to_string(),
        "rgba".to_string(),
        "-video_size".to_string(),
        format!("{}x{}", settings.width, settings.height),
        "-framerate".to_string(),
        settings.frame_rate.to_string(),
        "-i".to_string(),
        "-".to_string(), // raw frames from stdin
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-b:v".to_string(),
        settings.bitrate_bps.to_string(),
        "-g".to_string(),
        settings.keyframe_interval.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        output_path.to_string_lossy().to_string(),
    ]
}

/// Streaming H.264/MP4 writer backed by an FFmpeg child process
pub struct FfmpegWriter {
    child: Option<Child>,
    sender: Option<SyncSender<Vec<u8>>>,
    pending: Arc<AtomicUsize>,
    worker: Option<JoinHandle<std::io::Result<()>>>,
    output_path: PathBuf,
    frame_len: usize,
    finished: bool,
}

impl FfmpegWriter {
    fn spawn(settings: &EncoderSettings, output_path: &Path) -> Result<Self, WriterError> {
        let args = encoder_args(settings, output_path);

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| WriterError::Configure(format!("Failed to start FFmpeg: {}", e)))?;

        let Some(mut stdin) = child.stdin.take() else {
            // Do not leave a half-open session or its artifact behind
            let _ = child.kill();
            let _ = child.wait();
            let _ = std::fs::remove_file(output_path);
            return Err(WriterError::Configure(
                "Failed to capture FFmpeg stdin".to_string(),
            ));
        };

        let (sender, receiver): (SyncSender<Vec<u8>>, Receiver<Vec<u8>>) =
            std::sync::mpsc::sync_channel(QUEUE_DEPTH);
        let pending = Arc::new(AtomicUsize::new(0));

        let worker_pending = Arc::clone(&pending);
        let worker = std::thread::spawn(move || -> std::io::Result<()> {
            while let Ok(frame) = receiver.recv() {
                stdin.write_all(&frame)?;
                worker_pending.fetch_sub(1, Ordering::AcqRel);
            }
            // Channel closed: dropping stdin signals EOF to FFmpeg
            Ok(())
        });

        tracing::info!(
            "Started FFmpeg encoder: {}x{} @ {}fps, {} bps, gop={}, output: {}",
            settings.width,
            settings.height,
            settings.frame_rate,
            settings.bitrate_bps,
            settings.keyframe_interval,
            output_path.display()
        );

        Ok(Self {
            child: Some(child),
            sender: Some(sender),
            pending,
            worker: Some(worker),
            output_path: output_path.to_path_buf(),
            frame_len: settings.frame_byte_len(),
            finished: false,
        })
    }
}

impl StreamingWriter for FfmpegWriter {
    fn is_ready(&self) -> bool {
        self.sender.is_some() && self.pending.load(Ordering::Acquire) < QUEUE_DEPTH
    }

    fn append(&mut self, rgba: &[u8], _pts: Duration) -> Result<(), WriterError> {
        if rgba.len() != self.frame_len {
            return Err(WriterError::Append(format!(
                "Frame size mismatch: got {} bytes, expected {}",
                rgba.len(),
                self.frame_len
            )));
        }

        let Some(sender) = self.sender.as_ref() else {
            return Err(WriterError::Append("Writer already finalized".to_string()));
        };

        self.pending.fetch_add(1, Ordering::AcqRel);
        if sender.send(rgba.to_vec()).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(WriterError::Append(
                "Writer thread terminated".to_string(),
            ));
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<PathBuf, WriterError> {
        // Closing the channel lets the worker drain, then end the stream
        self.sender.take();

        let stream_result = match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| WriterError::Finalize("Writer thread panicked".to_string()))?,
            None => Ok(()),
        };

        let child = self
            .child
            .take()
            .ok_or_else(|| WriterError::Finalize("Writer already finalized".to_string()))?;

        let output = child
            .wait_with_output()
            .map_err(|e| WriterError::Finalize(format!("Failed to wait for FFmpeg: {}", e)))?;

        if let Err(e) = stream_result {
            return Err(WriterError::Finalize(format!(
                "Frame stream write failed: {}",
                e
            )));
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WriterError::Finalize(format!(
                "FFmpeg exited with error: {}",
                stderr
            )));
        }

        self.finished = true;
        tracing::info!("FFmpeg encoder finished: {}", self.output_path.display());
        Ok(self.output_path.clone())
    }
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // Abandoned session: stop the encoder and discard its artifact
        self.sender.take();
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        let _ = std::fs::remove_file(&self.output_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_args_carry_session_settings() {
        let settings = EncoderSettings::for_dimensions(320, 240, 24, 8_000_000);
        let args = encoder_args(&settings, Path::new("/tmp/out.mp4"));

        let joined = args.join(" ");
        assert!(joined.contains("-video_size 320x240"));
        assert!(joined.contains("-framerate 24"));
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-b:v 8000000"));
        assert!(joined.contains("-g 24"));
        assert!(joined.contains("-movflags +faststart"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.mp4"));
    }

    #[test]
    fn artifact_paths_are_unique() {
        let backend = FfmpegBackend::new(None);
        assert_ne!(backend.artifact_path(), backend.artifact_path());
    }
}
