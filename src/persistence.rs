//! Persistence boundary
//!
//! The storage sink consumes a finished recording artifact: it persists
//! the file into its destination and removes the temporary artifact, but
//! only after the hand-off has succeeded.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors surfaced by the storage sink
#[derive(Error, Debug)]
pub enum SaveError {
    #[error("Permission denied")]
    PermissionDenied,

    #[error("Artifact not found")]
    FileNotFound,

    #[error("Save failed: {0}")]
    SaveFailed(String),
}

/// Consumes finished recording artifacts.
#[async_trait]
pub trait StorageSink: Send + Sync {
    /// Persist the artifact and delete the temporary file.
    ///
    /// The temporary artifact must survive any failure; it is removed
    /// only after the persisted copy exists. Returns the persisted
    /// location.
    async fn save_and_delete(&self, artifact: &Path) -> Result<PathBuf, SaveError>;
}

/// Sink that files recordings into a destination directory under a
/// timestamped name.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn destination(&self) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
        self.dir.join(format!("Replay_{}.mp4", timestamp))
    }
}

fn map_io(e: std::io::Error) -> SaveError {
    match e.kind() {
        std::io::ErrorKind::NotFound => SaveError::FileNotFound,
        std::io::ErrorKind::PermissionDenied => SaveError::PermissionDenied,
        _ => SaveError::SaveFailed(e.to_string()),
    }
}

#[async_trait]
impl StorageSink for DirectorySink {
    async fn save_and_delete(&self, artifact: &Path) -> Result<PathBuf, SaveError> {
        if !artifact.exists() {
            return Err(SaveError::FileNotFound);
        }

        tokio::fs::create_dir_all(&self.dir).await.map_err(map_io)?;

        let destination = self.destination();
        tokio::fs::copy(artifact, &destination)
            .await
            .map_err(map_io)?;

        // The temporary artifact outlives only a successful hand-off
        if let Err(e) = tokio::fs::remove_file(artifact).await {
            tracing::warn!(
                "Saved {} but failed to remove temporary artifact {}: {}",
                destination.display(),
                artifact.display(),
                e
            );
        }

        tracing::info!("Recording saved to {}", destination.display());
        Ok(destination)
    }
}
