//! Bundle fetcher that reads audio straight out of the record store.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use super::archive::relative_path_for;
use crate::domain::models::{LocalRecording, PendingJob, RecordingKey};
use crate::domain::ports::{BundleFetcher, FetchError, FetchedBundle, RecordingRepository};

/// Builds bundles from audio held in the record store.
pub struct StoreBundleFetcher {
    store: Arc<dyn RecordingRepository>,
}

impl StoreBundleFetcher {
    /// Create a new fetcher over `store`.
    pub fn new(store: Arc<dyn RecordingRepository>) -> Self {
        Self { store }
    }
}

fn is_wav(audio: &[u8]) -> bool {
    audio.len() >= 12 && &audio[0..4] == b"RIFF" && &audio[8..12] == b"WAVE"
}

#[async_trait]
impl BundleFetcher for StoreBundleFetcher {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn fetch(&self, job: &PendingJob) -> Result<FetchedBundle, FetchError> {
        let stored = self
            .store
            .list_for_attempt(&job.patient_id, job.attempt)
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        let workspace = tempfile::Builder::new()
            .prefix(&format!("{}_{}_", job.patient_id, job.attempt))
            .tempdir()?;

        let mut recordings = Vec::with_capacity(stored.len());
        for recording in stored {
            let path = workspace.path().join(relative_path_for(recording.key()));
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &recording.audio).await?;
            recordings.push(LocalRecording {
                meta: recording.meta,
                path,
            });
        }

        Ok(FetchedBundle::new(recordings, workspace))
    }

    async fn download_recording(
        &self,
        key: &RecordingKey,
        normalize: bool,
        dest: &Path,
    ) -> Result<u64, FetchError> {
        let recording = self
            .store
            .get(key)
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?
            .ok_or_else(|| FetchError::Transient(format!("recording {key} not found")))?;

        // Stored audio is not transcoded locally; only WAV passes as normalized.
        if normalize && !is_wav(&recording.audio) {
            return Err(FetchError::Malformed(format!(
                "recording {key} is not WAV and cannot be normalized from the local store"
            )));
        }

        tokio::fs::write(dest, &recording.audio).await?;
        Ok(recording.audio.len() as u64)
    }
}
