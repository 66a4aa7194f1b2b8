//! SQLite implementation of the JobLeaseRepository.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use sqlx::SqlitePool;
use std::time::Duration;

use super::{parse_datetime, parse_optional_datetime};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::JobFailure;
use crate::domain::ports::JobLeaseRepository;

/// SQLite-backed job leases and failure records.
pub struct SqliteJobLeaseRepository {
    pool: SqlitePool,
}

impl SqliteJobLeaseRepository {
    /// Create a new repository on `pool`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobLeaseRepository for SqliteJobLeaseRepository {
    async fn try_claim(
        &self,
        patient_id: &str,
        attempt: i64,
        owner: &str,
        ttl: Duration,
    ) -> DomainResult<bool> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| DomainError::ValidationFailed(format!("lease ttl out of range: {e}")))?;

        // fixed-width UTC timestamps compare in time order
        let result = sqlx::query(
            r#"INSERT INTO job_leases (patient_id, attempt, owner, expires_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(patient_id, attempt) DO UPDATE SET
                   owner = excluded.owner,
                   expires_at = excluded.expires_at
               WHERE job_leases.expires_at <= ? OR job_leases.owner = excluded.owner"#
        )
        .bind(patient_id)
        .bind(attempt)
        .bind(owner)
        .bind((now + ttl).to_rfc3339_opts(SecondsFormat::Micros, true))
        .bind(now.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, patient_id: &str, attempt: i64, owner: &str) -> DomainResult<()> {
        sqlx::query("DELETE FROM job_leases WHERE patient_id = ? AND attempt = ? AND owner = ?")
            .bind(patient_id)
            .bind(attempt)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn failure(&self, patient_id: &str, attempt: i64) -> DomainResult<Option<JobFailure>> {
        let row: Option<JobFailureRow> = sqlx::query_as(
            "SELECT * FROM job_failures WHERE patient_id = ? AND attempt = ?"
        )
        .bind(patient_id)
        .bind(attempt)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_into()).transpose()
    }

    async fn save_failure(&self, failure: &JobFailure) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO job_failures (patient_id, attempt, consecutive_failures, last_error, last_failed_at, next_retry_at, stuck)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(patient_id, attempt) DO UPDATE SET
                   consecutive_failures = excluded.consecutive_failures,
                   last_error = excluded.last_error,
                   last_failed_at = excluded.last_failed_at,
                   next_retry_at = excluded.next_retry_at,
                   stuck = excluded.stuck"#
        )
        .bind(&failure.patient_id)
        .bind(failure.attempt)
        .bind(i64::from(failure.consecutive_failures))
        .bind(&failure.last_error)
        .bind(failure.last_failed_at.to_rfc3339())
        .bind(failure.next_retry_at.map(|dt| dt.to_rfc3339()))
        .bind(failure.stuck)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear_failures(&self, patient_id: &str, attempt: i64) -> DomainResult<bool> {
        let result = sqlx::query("DELETE FROM job_failures WHERE patient_id = ? AND attempt = ?")
            .bind(patient_id)
            .bind(attempt)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_stuck(&self) -> DomainResult<Vec<JobFailure>> {
        let rows: Vec<JobFailureRow> = sqlx::query_as(
            "SELECT * FROM job_failures WHERE stuck = 1 ORDER BY last_failed_at"
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }
}

#[derive(sqlx::FromRow)]
struct JobFailureRow {
    patient_id: String,
    attempt: i64,
    consecutive_failures: i64,
    last_error: String,
    last_failed_at: String,
    next_retry_at: Option<String>,
    stuck: bool,
}

impl TryFrom<JobFailureRow> for JobFailure {
    type Error = DomainError;

    fn try_from(row: JobFailureRow) -> Result<Self, Self::Error> {
        let consecutive_failures = u32::try_from(row.consecutive_failures).map_err(|_| {
            DomainError::SerializationError(format!("Invalid failure count: {}", row.consecutive_failures))
        })?;

        Ok(JobFailure {
            patient_id: row.patient_id,
            attempt: row.attempt,
            consecutive_failures,
            last_error: row.last_error,
            last_failed_at: parse_datetime(&row.last_failed_at)?,
            next_retry_at: parse_optional_datetime(row.next_retry_at)?,
            stuck: row.stuck,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn setup_test_repo() -> SqliteJobLeaseRepository {
        SqliteJobLeaseRepository::new(create_migrated_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_lease_excludes_other_owner_until_released() {
        let repo = setup_test_repo().await;
        let ttl = Duration::from_secs(600);

        assert!(repo.try_claim("1001", 1, "worker-a", ttl).await.unwrap());
        assert!(!repo.try_claim("1001", 1, "worker-b", ttl).await.unwrap());
        assert!(repo.try_claim("1001", 1, "worker-a", ttl).await.unwrap());
        assert!(repo.try_claim("1001", 2, "worker-b", ttl).await.unwrap());

        repo.release("1001", 1, "worker-a").await.unwrap();
        assert!(repo.try_claim("1001", 1, "worker-b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken_over() {
        let repo = setup_test_repo().await;
        assert!(repo.try_claim("1001", 1, "worker-a", Duration::ZERO).await.unwrap());
        assert!(repo.try_claim("1001", 1, "worker-b", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn test_failure_round_trip_and_stuck_listing() {
        let repo = setup_test_repo().await;
        let failure = JobFailure {
            patient_id: "1001".into(),
            attempt: 1,
            consecutive_failures: 3,
            last_error: "bundle unavailable".into(),
            last_failed_at: Utc::now(),
            next_retry_at: None,
            stuck: true,
        };
        repo.save_failure(&failure).await.unwrap();

        let stored = repo.failure("1001", 1).await.unwrap().unwrap();
        assert_eq!(stored.consecutive_failures, 3);
        assert!(stored.stuck);
        assert_eq!(repo.list_stuck().await.unwrap().len(), 1);

        assert!(repo.clear_failures("1001", 1).await.unwrap());
        assert!(!repo.clear_failures("1001", 1).await.unwrap());
        assert!(repo.failure("1001", 1).await.unwrap().is_none());
    }
}
