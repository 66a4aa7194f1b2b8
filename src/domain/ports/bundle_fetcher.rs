//! Bundle fetcher port - moving an attempt's audio to local files.

use async_trait::async_trait;
use std::path::Path;
use tempfile::TempDir;
use thiserror::Error;

use crate::domain::models::{LocalRecording, PendingJob, RecordingKey};

/// Errors raised while fetching a bundle.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Bundle unavailable: network, storage or HTTP failure. Retried next cycle.
    #[error("bundle unavailable: {0}")]
    Transient(String),

    /// The bundle arrived but its manifest is missing or disagrees with its payload.
    #[error("malformed bundle: {0}")]
    Malformed(String),
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Transient(err.to_string())
    }
}

/// An attempt's recordings materialized in a job-scoped temporary directory.
///
/// The directory and every file in it are removed when the bundle is dropped,
/// on every exit path of the job.
#[derive(Debug)]
pub struct FetchedBundle {
    recordings: Vec<LocalRecording>,
    workspace: TempDir,
}

impl FetchedBundle {
    /// Create a new bundle owning `workspace`.
    pub fn new(recordings: Vec<LocalRecording>, workspace: TempDir) -> Self {
        Self {
            recordings,
            workspace,
        }
    }

    /// Recordings materialized in the workspace.
    pub fn recordings(&self) -> &[LocalRecording] {
        &self.recordings
    }

    /// Split into recordings and the workspace guard keeping them on disk.
    pub fn into_recordings(self) -> (Vec<LocalRecording>, TempDir) {
        (self.recordings, self.workspace)
    }

    /// Root of the workspace directory.
    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }

    /// Whether the bundle holds no recordings.
    pub fn is_empty(&self) -> bool {
        self.recordings.is_empty()
    }
}

/// Source of attempt bundles.
#[async_trait]
pub trait BundleFetcher: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Fetch every recording of the job's attempt, or fail as a whole.
    async fn fetch(&self, job: &PendingJob) -> Result<FetchedBundle, FetchError>;

    /// Download one recording standalone to `dest`, optionally normalized to
    /// the canonical encoding. Returns the number of bytes written.
    async fn download_recording(
        &self,
        key: &RecordingKey,
        normalize: bool,
        dest: &Path,
    ) -> Result<u64, FetchError>;
}
