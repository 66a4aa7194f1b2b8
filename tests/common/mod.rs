//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use speechscore::adapters::bundle::StoreBundleFetcher;
use speechscore::adapters::scorers::ScorerRegistry;
use speechscore::adapters::sqlite::{
    create_migrated_test_pool, SqliteAccessTokenRepository, SqliteJobLeaseRepository,
    SqliteRecordingRepository,
};
use speechscore::application::{ScoringWorker, WorkerOptions};
use speechscore::domain::models::{Recording, RecordingKey, RecordingMeta, RetryConfig, TaskType};
use speechscore::domain::ports::{BundleFetcher, RecordingRepository};
use speechscore::services::RetryPolicy;
use sqlx::SqlitePool;

pub const PATIENT: &str = "1001";
pub const ATTEMPT: i64 = 1;

/// Migrated in-memory store with its repositories.
pub struct TestStore {
    pub pool: SqlitePool,
    pub recordings: Arc<SqliteRecordingRepository>,
    pub leases: Arc<SqliteJobLeaseRepository>,
    pub tokens: Arc<SqliteAccessTokenRepository>,
}

impl TestStore {
    pub async fn new() -> Self {
        let pool = create_migrated_test_pool()
            .await
            .expect("Failed to create test database");
        Self {
            recordings: Arc::new(SqliteRecordingRepository::new(pool.clone())),
            leases: Arc::new(SqliteJobLeaseRepository::new(pool.clone())),
            tokens: Arc::new(SqliteAccessTokenRepository::new(pool.clone())),
            pool,
        }
    }

    /// Insert one recording per `(task_type, code, question_no, sub_attempt)`
    /// for the default patient and attempt.
    pub async fn seed(&self, rows: &[(TaskType, &str, i64, i64)]) {
        for &(task_type, code, qno, sub) in rows {
            self.recordings
                .insert(&recording(PATIENT, ATTEMPT, task_type, code, qno, sub))
                .await
                .expect("Failed to insert recording");
        }
    }

    /// Seed `count` first takes of `code`, question numbers `0..count`.
    pub async fn seed_family(&self, task_type: TaskType, code: &str, count: i64) {
        let rows: Vec<_> = (0..count).map(|qno| (task_type, code, qno, 0)).collect();
        self.seed(&rows).await;
    }

    pub fn worker(&self, scorers: ScorerRegistry, options: WorkerOptions) -> ScoringWorker {
        self.worker_with_retry(scorers, options, RetryConfig::default())
    }

    pub fn worker_with_retry(
        &self,
        scorers: ScorerRegistry,
        options: WorkerOptions,
        retry: RetryConfig,
    ) -> ScoringWorker {
        ScoringWorker::new(
            self.recordings.clone(),
            self.leases.clone(),
            self.store_fetcher(),
            Arc::new(scorers),
            RetryPolicy::new(retry),
            options,
        )
    }

    /// A worker over this store's leases with the given record store and
    /// bundle source.
    pub fn worker_using(
        &self,
        recordings: Arc<dyn RecordingRepository>,
        fetcher: Arc<dyn BundleFetcher>,
        scorers: ScorerRegistry,
        options: WorkerOptions,
    ) -> ScoringWorker {
        ScoringWorker::new(
            recordings,
            self.leases.clone(),
            fetcher,
            Arc::new(scorers),
            RetryPolicy::new(RetryConfig::default()),
            options,
        )
    }

    pub fn store_fetcher(&self) -> Arc<StoreBundleFetcher> {
        Arc::new(StoreBundleFetcher::new(self.recordings.clone()))
    }

    /// Keys of the default attempt's recordings that are still pending.
    pub async fn pending_keys(&self) -> Vec<RecordingKey> {
        self.recordings
            .list_for_attempt(PATIENT, ATTEMPT)
            .await
            .expect("Failed to list recordings")
            .into_iter()
            .filter(|r| r.pending)
            .map(|r| r.meta.key)
            .collect()
    }
}

/// Fast worker options for tests.
pub fn options() -> WorkerOptions {
    WorkerOptions {
        poll_interval: Duration::from_millis(50),
        fetch_timeout: Duration::from_secs(5),
        scorer_timeout: Duration::from_secs(5),
        lease_ttl: Some(Duration::from_secs(60)),
        worker_id: "test-worker".to_string(),
    }
}

/// A minimal RIFF/WAVE header followed by a marker unique to the key.
pub fn wav_bytes(marker: &str) -> Vec<u8> {
    let mut audio = Vec::from(*b"RIFF\x24\x00\x00\x00WAVEfmt ");
    audio.extend_from_slice(marker.as_bytes());
    audio
}

pub fn recording(
    patient_id: &str,
    attempt: i64,
    task_type: TaskType,
    code: &str,
    qno: i64,
    sub: i64,
) -> Recording {
    let key = RecordingKey::new(patient_id, attempt, task_type, code, qno, sub);
    let audio = wav_bytes(&key.to_string());
    Recording::captured(
        RecordingMeta {
            key,
            duration: 2.5,
            sample_rate: 16_000,
            created_at: None,
        },
        audio,
    )
}
