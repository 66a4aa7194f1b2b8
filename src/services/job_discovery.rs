//! Job discovery: which attempts need scoring this cycle.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::domain::errors::DomainResult;
use crate::domain::models::PendingJob;
use crate::domain::ports::{JobLeaseRepository, RecordingRepository};

/// Finds the attempts a worker should process this cycle.
pub struct JobDiscovery {
    recordings: Arc<dyn RecordingRepository>,
    leases: Arc<dyn JobLeaseRepository>,
}

impl JobDiscovery {
    /// Create a new discovery service.
    pub fn new(recordings: Arc<dyn RecordingRepository>, leases: Arc<dyn JobLeaseRepository>) -> Self {
        Self { recordings, leases }
    }

    /// Pending attempts, minus those stuck or still backing off at `now`.
    ///
    /// A store failure surfaces as an error; the caller treats it as "no
    /// jobs this cycle".
    pub async fn discover(&self, now: DateTime<Utc>) -> DomainResult<Vec<PendingJob>> {
        let pending = self.recordings.list_pending_jobs().await?;
        let mut ready = Vec::with_capacity(pending.len());

        for job in pending {
            match self.leases.failure(&job.patient_id, job.attempt).await? {
                Some(failure) if failure.blocks_at(now) => {
                    debug!(
                        patient_id = %job.patient_id,
                        attempt = job.attempt,
                        stuck = failure.stuck,
                        next_retry_at = ?failure.next_retry_at,
                        "Holding back failing job"
                    );
                }
                _ => ready.push(job),
            }
        }

        Ok(ready)
    }

    /// Pending attempts with no filtering, for inspection.
    pub async fn list_all(&self) -> DomainResult<Vec<PendingJob>> {
        self.recordings.list_pending_jobs().await
    }
}
