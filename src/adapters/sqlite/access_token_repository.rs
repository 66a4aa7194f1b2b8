//! SQLite implementation of the AccessTokenRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use super::parse_datetime;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::AccessToken;
use crate::domain::ports::AccessTokenRepository;

/// SQLite-backed access token storage.
pub struct SqliteAccessTokenRepository {
    pool: SqlitePool,
}

impl SqliteAccessTokenRepository {
    /// Create a new repository on `pool`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessTokenRepository for SqliteAccessTokenRepository {
    async fn insert_if_absent(&self, token: &AccessToken) -> DomainResult<AccessToken> {
        sqlx::query(
            r#"INSERT INTO access_tokens (token, patient_id, created_at, last_used_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(patient_id) DO NOTHING"#
        )
        .bind(&token.token)
        .bind(&token.patient_id)
        .bind(token.created_at.to_rfc3339())
        .bind(token.last_used_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.find_by_patient(&token.patient_id)
            .await?
            .ok_or_else(|| DomainError::DatabaseError(format!("token for {} vanished after insert", token.patient_id)))
    }

    async fn touch(&self, token: &str) -> DomainResult<Option<AccessToken>> {
        let row: Option<AccessTokenRow> = sqlx::query_as(
            "UPDATE access_tokens SET last_used_at = ? WHERE token = ? RETURNING *"
        )
        .bind(Utc::now().to_rfc3339())
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_into()).transpose()
    }

    async fn find_by_patient(&self, patient_id: &str) -> DomainResult<Option<AccessToken>> {
        let row: Option<AccessTokenRow> = sqlx::query_as(
            "SELECT * FROM access_tokens WHERE patient_id = ?"
        )
        .bind(patient_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_into()).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct AccessTokenRow {
    token: String,
    patient_id: String,
    created_at: String,
    last_used_at: String,
}

impl TryFrom<AccessTokenRow> for AccessToken {
    type Error = DomainError;

    fn try_from(row: AccessTokenRow) -> Result<Self, Self::Error> {
        Ok(AccessToken {
            token: row.token,
            patient_id: row.patient_id,
            created_at: parse_datetime(&row.created_at)?,
            last_used_at: parse_datetime(&row.last_used_at)?,
        })
    }
}
