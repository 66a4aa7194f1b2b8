//! SQLite implementation of the RecordingRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use super::{parse_datetime, parse_optional_datetime};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    PendingJob, Recording, RecordingKey, RecordingMeta, ScoreRecord, StoredScore, TaskFamily,
    TaskType, WriteOutcome,
};
use crate::domain::ports::RecordingRepository;

const KEY_MATCH: &str = "patient_id = ? AND attempt = ? AND task_type = ? AND question_code = ? AND question_no = ? AND sub_attempt = ?";
/// Same question, earlier take.
const SUPERSEDED_MATCH: &str = "patient_id = ? AND attempt = ? AND task_type = ? AND question_code = ? AND question_no = ? AND sub_attempt < ?";
const JOINED_KEY_MATCH: &str = "r.patient_id = ? AND r.attempt = ? AND r.task_type = ? AND r.question_code = ? AND r.question_no = ? AND r.sub_attempt = ?";

/// SQLite-backed recording and score storage.
pub struct SqliteRecordingRepository {
    pool: SqlitePool,
}

impl SqliteRecordingRepository {
    /// Create a new repository on `pool`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordingRepository for SqliteRecordingRepository {
    async fn insert(&self, recording: &Recording) -> DomainResult<()> {
        let key = recording.key();
        sqlx::query(
            r#"INSERT INTO recordings (patient_id, attempt, task_type, question_code, question_no, sub_attempt,
                                      audio, duration, sample_rate, pending, created_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, NULL)
               ON CONFLICT(patient_id, attempt, task_type, question_code, question_no, sub_attempt) DO UPDATE SET
                   audio = excluded.audio,
                   duration = excluded.duration,
                   sample_rate = excluded.sample_rate,
                   pending = 1,
                   created_at = excluded.created_at,
                   completed_at = NULL"#
        )
        .bind(&key.patient_id)
        .bind(key.attempt)
        .bind(key.task_type.as_str())
        .bind(&key.question_code)
        .bind(key.question_no)
        .bind(key.sub_attempt)
        .bind(&recording.audio)
        .bind(recording.meta.duration)
        .bind(i64::from(recording.meta.sample_rate))
        .bind(recording.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, key: &RecordingKey) -> DomainResult<Option<Recording>> {
        let row: Option<RecordingRow> = sqlx::query_as(&format!(
            r#"SELECT r.*, s.score FROM recordings r
               LEFT JOIN scores s USING (patient_id, attempt, task_type, question_code, question_no, sub_attempt)
               WHERE {}"#,
            JOINED_KEY_MATCH
        ))
        .bind(&key.patient_id)
        .bind(key.attempt)
        .bind(key.task_type.as_str())
        .bind(&key.question_code)
        .bind(key.question_no)
        .bind(key.sub_attempt)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_into()).transpose()
    }

    async fn list_for_attempt(&self, patient_id: &str, attempt: i64) -> DomainResult<Vec<Recording>> {
        let rows: Vec<RecordingRow> = sqlx::query_as(
            r#"SELECT r.*, s.score FROM recordings r
               LEFT JOIN scores s USING (patient_id, attempt, task_type, question_code, question_no, sub_attempt)
               WHERE r.patient_id = ? AND r.attempt = ?
               ORDER BY r.task_type, r.question_code, r.question_no, r.sub_attempt"#
        )
        .bind(patient_id)
        .bind(attempt)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn list_pending_jobs(&self) -> DomainResult<Vec<PendingJob>> {
        let rows: Vec<(String, i64, Option<String>)> = sqlx::query_as(
            r#"SELECT DISTINCT r.patient_id, r.attempt, t.token
               FROM recordings r
               LEFT JOIN access_tokens t ON t.patient_id = r.patient_id
               WHERE r.pending = 1
                 AND NOT EXISTS (
                     SELECT 1 FROM recordings s
                     WHERE s.patient_id = r.patient_id
                       AND s.attempt = r.attempt
                       AND s.task_type = r.task_type
                       AND s.question_code = r.question_code
                       AND s.question_no = r.question_no
                       AND s.sub_attempt > r.sub_attempt
                 )
               ORDER BY r.patient_id, r.attempt"#
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(patient_id, attempt, token)| PendingJob {
                patient_id,
                attempt,
                access_token: token,
            })
            .collect())
    }

    async fn write_scores(
        &self,
        patient_id: &str,
        attempt: i64,
        scores: &[ScoreRecord],
    ) -> DomainResult<WriteOutcome> {
        if let Some(stray) = scores
            .iter()
            .find(|s| s.key.patient_id != patient_id || s.key.attempt != attempt)
        {
            return Err(DomainError::ValidationFailed(format!(
                "score for {} does not belong to {patient_id}/{attempt}",
                stray.key
            )));
        }

        let now = Utc::now().to_rfc3339();
        let mut outcome = WriteOutcome::default();
        let mut tx = self.pool.begin().await?;

        for record in scores {
            let key = &record.key;
            let family = record.family.map(|f| f.code());

            // Unchanged rows are left alone so a repeated write is a no-op.
            let upserted = sqlx::query(
                r#"INSERT INTO scores (patient_id, attempt, task_type, question_code, question_no, sub_attempt,
                                      family, score, created_at, updated_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                   ON CONFLICT(patient_id, attempt, task_type, question_code, question_no, sub_attempt) DO UPDATE SET
                       family = excluded.family,
                       score = excluded.score,
                       updated_at = excluded.updated_at
                   WHERE scores.score IS NOT excluded.score OR scores.family IS NOT excluded.family"#
            )
            .bind(&key.patient_id)
            .bind(key.attempt)
            .bind(key.task_type.as_str())
            .bind(&key.question_code)
            .bind(key.question_no)
            .bind(key.sub_attempt)
            .bind(family)
            .bind(record.score)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            outcome.upserted += upserted.rows_affected();

            // a question keeps one live score: the written take's
            sqlx::query(&format!("DELETE FROM scores WHERE {SUPERSEDED_MATCH}"))
                .bind(&key.patient_id)
                .bind(key.attempt)
                .bind(key.task_type.as_str())
                .bind(&key.question_code)
                .bind(key.question_no)
                .bind(key.sub_attempt)
                .execute(&mut *tx)
                .await?;

            let completed = sqlx::query(&format!(
                "UPDATE recordings SET pending = 0, completed_at = ? WHERE {KEY_MATCH} AND pending = 1"
            ))
            .bind(&now)
            .bind(&key.patient_id)
            .bind(key.attempt)
            .bind(key.task_type.as_str())
            .bind(&key.question_code)
            .bind(key.question_no)
            .bind(key.sub_attempt)
            .execute(&mut *tx)
            .await?;
            outcome.completed += completed.rows_affected();
        }

        tx.commit().await?;
        Ok(outcome)
    }

    async fn list_scores(&self, patient_id: &str, attempt: i64) -> DomainResult<Vec<StoredScore>> {
        let rows: Vec<ScoreRow> = sqlx::query_as(
            r#"SELECT patient_id, attempt, task_type, question_code, question_no, sub_attempt, family, score, updated_at
               FROM scores WHERE patient_id = ? AND attempt = ?
               ORDER BY task_type, question_code, question_no, sub_attempt"#
        )
        .bind(patient_id)
        .bind(attempt)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn delete_scores(&self, patient_id: &str, attempt: i64) -> DomainResult<u64> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM scores WHERE patient_id = ? AND attempt = ?")
            .bind(patient_id)
            .bind(attempt)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE recordings SET pending = 1, completed_at = NULL WHERE patient_id = ? AND attempt = ?")
            .bind(patient_id)
            .bind(attempt)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(deleted.rows_affected())
    }
}

fn parse_key(
    patient_id: String,
    attempt: i64,
    task_type: &str,
    question_code: String,
    question_no: i64,
    sub_attempt: i64,
) -> DomainResult<RecordingKey> {
    let task_type = TaskType::from_str(task_type)
        .ok_or_else(|| DomainError::UnknownTaskType(task_type.to_string()))?;
    Ok(RecordingKey::new(patient_id, attempt, task_type, question_code, question_no, sub_attempt))
}

#[derive(sqlx::FromRow)]
struct RecordingRow {
    patient_id: String,
    attempt: i64,
    task_type: String,
    question_code: String,
    question_no: i64,
    sub_attempt: i64,
    audio: Vec<u8>,
    duration: f64,
    sample_rate: i64,
    pending: bool,
    created_at: String,
    completed_at: Option<String>,
    score: Option<f64>,
}

impl TryFrom<RecordingRow> for Recording {
    type Error = DomainError;

    fn try_from(row: RecordingRow) -> Result<Self, Self::Error> {
        let key = parse_key(
            row.patient_id,
            row.attempt,
            &row.task_type,
            row.question_code,
            row.question_no,
            row.sub_attempt,
        )?;
        let sample_rate = u32::try_from(row.sample_rate)
            .map_err(|_| DomainError::SerializationError(format!("Invalid sample rate: {}", row.sample_rate)))?;
        let created_at = parse_datetime(&row.created_at)?;

        Ok(Recording {
            meta: RecordingMeta {
                key,
                duration: row.duration,
                sample_rate,
                created_at: Some(created_at),
            },
            audio: row.audio,
            score: row.score,
            pending: row.pending,
            created_at,
            completed_at: parse_optional_datetime(row.completed_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ScoreRow {
    patient_id: String,
    attempt: i64,
    task_type: String,
    question_code: String,
    question_no: i64,
    sub_attempt: i64,
    family: Option<String>,
    score: Option<f64>,
    updated_at: String,
}

impl TryFrom<ScoreRow> for StoredScore {
    type Error = DomainError;

    fn try_from(row: ScoreRow) -> Result<Self, Self::Error> {
        let family = row
            .family
            .map(|code| {
                TaskFamily::from_code(&code)
                    .ok_or_else(|| DomainError::SerializationError(format!("Invalid family: {code}")))
            })
            .transpose()?;

        Ok(StoredScore {
            key: parse_key(
                row.patient_id,
                row.attempt,
                &row.task_type,
                row.question_code,
                row.question_no,
                row.sub_attempt,
            )?,
            family,
            score: row.score,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{all_embedded_migrations, create_test_pool, Migrator};

    async fn setup_test_repo() -> SqliteRecordingRepository {
        let pool = create_test_pool().await.unwrap();
        let migrator = Migrator::new(pool.clone());
        migrator.run_embedded_migrations(all_embedded_migrations()).await.unwrap();
        SqliteRecordingRepository::new(pool)
    }

    fn recording(pid: &str, attempt: i64, code: &str, qno: i64, sub: i64) -> Recording {
        Recording::captured(
            RecordingMeta {
                key: RecordingKey::new(pid, attempt, TaskType::Language, code, qno, sub),
                duration: 2.5,
                sample_rate: 16_000,
                created_at: None,
            },
            vec![1, 2, 3],
        )
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = setup_test_repo().await;
        let rec = recording("1001", 1, "SAY_ANI", 0, 0);
        repo.insert(&rec).await.unwrap();

        let got = repo.get(rec.key()).await.unwrap().unwrap();
        assert_eq!(got.key(), rec.key());
        assert_eq!(got.audio, vec![1, 2, 3]);
        assert!(got.pending);
        assert_eq!(got.score, None);
        assert_eq!(got.meta.sample_rate, 16_000);
    }

    #[tokio::test]
    async fn test_pending_jobs_are_distinct_attempts() {
        let repo = setup_test_repo().await;
        repo.insert(&recording("1001", 1, "SAY_OBJ", 0, 0)).await.unwrap();
        repo.insert(&recording("1001", 1, "SAY_OBJ", 1, 0)).await.unwrap();
        repo.insert(&recording("1001", 2, "SAY_OBJ", 0, 0)).await.unwrap();
        repo.insert(&recording("2002", 1, "SAY_ANI", 0, 0)).await.unwrap();

        let jobs = repo.list_pending_jobs().await.unwrap();
        let ids: Vec<_> = jobs.iter().map(|j| (j.patient_id.as_str(), j.attempt)).collect();
        assert_eq!(ids, vec![("1001", 1), ("1001", 2), ("2002", 1)]);
        assert!(jobs.iter().all(|j| j.access_token.is_none()));
    }

    #[tokio::test]
    async fn test_superseded_pending_duplicate_is_not_a_job() {
        let repo = setup_test_repo().await;
        let old = recording("1001", 1, "SAY_ANI", 0, 0);
        let new = recording("1001", 1, "SAY_ANI", 0, 1);
        repo.insert(&old).await.unwrap();
        repo.insert(&new).await.unwrap();

        repo.write_scores(
            "1001",
            1,
            &[ScoreRecord::scored(new.key().clone(), TaskFamily::SayAnimal, 12.0)],
        )
        .await
        .unwrap();

        assert!(repo.list_pending_jobs().await.unwrap().is_empty());
        assert!(repo.get(old.key()).await.unwrap().unwrap().pending);
    }

    #[tokio::test]
    async fn test_retake_score_replaces_earlier_take() {
        let repo = setup_test_repo().await;
        let first = recording("1001", 1, "SAY_ANI", 0, 0);
        let retake = recording("1001", 1, "SAY_ANI", 0, 1);
        let other = recording("1001", 1, "SAY_ANI", 1, 0);
        for rec in [&first, &other] {
            repo.insert(rec).await.unwrap();
        }
        repo.write_scores(
            "1001",
            1,
            &[
                ScoreRecord::scored(first.key().clone(), TaskFamily::SayAnimal, 1.0),
                ScoreRecord::settled(other.key().clone(), Some(TaskFamily::SayAnimal)),
            ],
        )
        .await
        .unwrap();

        repo.insert(&retake).await.unwrap();
        repo.write_scores(
            "1001",
            1,
            &[ScoreRecord::scored(retake.key().clone(), TaskFamily::SayAnimal, 5.0)],
        )
        .await
        .unwrap();

        let stored = repo.list_scores("1001", 1).await.unwrap();
        let keys: Vec<_> = stored.iter().map(|s| (s.key.question_no, s.key.sub_attempt)).collect();
        assert_eq!(keys, vec![(0, 1), (1, 0)]);
        assert_eq!(stored[0].score, Some(5.0));
        assert_eq!(repo.get(first.key()).await.unwrap().unwrap().score, None);
    }

    #[tokio::test]
    async fn test_write_scores_is_idempotent() {
        let repo = setup_test_repo().await;
        let rec = recording("1001", 1, "SAY_ANI", 0, 0);
        repo.insert(&rec).await.unwrap();
        let scores = [ScoreRecord::scored(rec.key().clone(), TaskFamily::SayAnimal, 14.0)];

        let first = repo.write_scores("1001", 1, &scores).await.unwrap();
        assert_eq!(first, WriteOutcome { upserted: 1, completed: 1 });
        let stamp = repo.list_scores("1001", 1).await.unwrap()[0].updated_at;

        let second = repo.write_scores("1001", 1, &scores).await.unwrap();
        assert_eq!(second, WriteOutcome::default());

        let stored = repo.list_scores("1001", 1).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].score, Some(14.0));
        assert_eq!(stored[0].updated_at, stamp);

        let got = repo.get(rec.key()).await.unwrap().unwrap();
        assert!(!got.pending);
        assert_eq!(got.score, Some(14.0));
        assert!(got.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_changed_score_is_updated_but_not_recompleted() {
        let repo = setup_test_repo().await;
        let rec = recording("1001", 1, "SAY_ANI", 0, 0);
        repo.insert(&rec).await.unwrap();

        repo.write_scores("1001", 1, &[ScoreRecord::scored(rec.key().clone(), TaskFamily::SayAnimal, 1.0)])
            .await
            .unwrap();
        let outcome = repo
            .write_scores("1001", 1, &[ScoreRecord::scored(rec.key().clone(), TaskFamily::SayAnimal, 2.0)])
            .await
            .unwrap();

        assert_eq!(outcome, WriteOutcome { upserted: 1, completed: 0 });
        assert_eq!(repo.list_scores("1001", 1).await.unwrap()[0].score, Some(2.0));
    }

    #[tokio::test]
    async fn test_write_rejects_foreign_keys() {
        let repo = setup_test_repo().await;
        let rec = recording("1001", 2, "SAY_ANI", 0, 0);
        let err = repo
            .write_scores("1001", 1, &[ScoreRecord::settled(rec.key().clone(), None)])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_delete_scores_reopens_attempt() {
        let repo = setup_test_repo().await;
        let rec = recording("1001", 1, "SAY_ANI", 0, 0);
        repo.insert(&rec).await.unwrap();
        repo.write_scores("1001", 1, &[ScoreRecord::scored(rec.key().clone(), TaskFamily::SayAnimal, 3.0)])
            .await
            .unwrap();
        assert!(repo.list_pending_jobs().await.unwrap().is_empty());

        assert_eq!(repo.delete_scores("1001", 1).await.unwrap(), 1);
        assert!(repo.list_scores("1001", 1).await.unwrap().is_empty());
        assert_eq!(repo.list_pending_jobs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reinsert_reopens_recording() {
        let repo = setup_test_repo().await;
        let rec = recording("1001", 1, "AH_SOUND", 0, 0);
        repo.insert(&rec).await.unwrap();
        repo.write_scores("1001", 1, &[ScoreRecord::settled(rec.key().clone(), None)])
            .await
            .unwrap();

        repo.insert(&rec).await.unwrap();
        assert!(repo.get(rec.key()).await.unwrap().unwrap().pending);
    }
}
