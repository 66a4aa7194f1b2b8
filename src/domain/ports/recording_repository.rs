//! Recording repository port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{PendingJob, Recording, RecordingKey, ScoreRecord, StoredScore, WriteOutcome};

/// Record store port for recordings and their scores
#[async_trait]
pub trait RecordingRepository: Send + Sync {
    /// Insert a captured recording. Re-inserting an existing key replaces its
    /// audio and re-opens it as pending.
    async fn insert(&self, recording: &Recording) -> DomainResult<()>;

    /// Get a recording by its full key
    async fn get(&self, key: &RecordingKey) -> DomainResult<Option<Recording>>;

    /// All recordings of one attempt, including superseded duplicates
    async fn list_for_attempt(&self, patient_id: &str, attempt: i64) -> DomainResult<Vec<Recording>>;

    /// Distinct attempts owning at least one pending canonical recording.
    ///
    /// Attempts whose only pending recordings are superseded duplicates are
    /// excluded.
    async fn list_pending_jobs(&self) -> DomainResult<Vec<PendingJob>>;

    /// Upsert scores and flip the matching recordings from pending to
    /// complete, atomically. Idempotent: repeating a call changes nothing.
    async fn write_scores(
        &self,
        patient_id: &str,
        attempt: i64,
        scores: &[ScoreRecord],
    ) -> DomainResult<WriteOutcome>;

    /// Stored scores of one attempt
    async fn list_scores(&self, patient_id: &str, attempt: i64) -> DomainResult<Vec<StoredScore>>;

    /// Remove an attempt's scores and return its recordings to pending.
    /// Returns the number of score rows removed.
    async fn delete_scores(&self, patient_id: &str, attempt: i64) -> DomainResult<u64>;
}
