//! Job lease and failure bookkeeping port.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::errors::DomainResult;
use crate::domain::models::JobFailure;

/// Port for job leases and consecutive-failure bookkeeping
#[async_trait]
pub trait JobLeaseRepository: Send + Sync {
    /// Claim `(patient_id, attempt)` for `owner` for `ttl`.
    ///
    /// Succeeds when the job is unleased, its lease has expired, or `owner`
    /// already holds it.
    async fn try_claim(
        &self,
        patient_id: &str,
        attempt: i64,
        owner: &str,
        ttl: Duration,
    ) -> DomainResult<bool>;

    /// Drop `owner`'s lease on the job, if held
    async fn release(&self, patient_id: &str, attempt: i64, owner: &str) -> DomainResult<()>;

    /// Current failure record for the job
    async fn failure(&self, patient_id: &str, attempt: i64) -> DomainResult<Option<JobFailure>>;

    /// Store the job's failure record, replacing any previous one
    async fn save_failure(&self, failure: &JobFailure) -> DomainResult<()>;

    /// Forget the job's failures after a success or an operator reset
    async fn clear_failures(&self, patient_id: &str, attempt: i64) -> DomainResult<bool>;

    /// Jobs currently marked stuck
    async fn list_stuck(&self) -> DomainResult<Vec<JobFailure>>;
}
