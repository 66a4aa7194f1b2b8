//! Job-level models: pending attempts, failure tracking and access tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One (patient, attempt) unit of pending scoring work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingJob {
    /// Patient ID
    pub patient_id: String,
    /// Attempt number
    pub attempt: i64,
    /// The patient's access token, if one has been issued
    pub access_token: Option<String>,
}

impl PendingJob {
    /// Create a new job without a token.
    pub fn new(patient_id: impl Into<String>, attempt: i64) -> Self {
        Self {
            patient_id: patient_id.into(),
            attempt,
            access_token: None,
        }
    }

    /// Attach the patient's access token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }
}

impl fmt::Display for PendingJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.patient_id, self.attempt)
    }
}

/// Consecutive-failure record for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobFailure {
    /// Patient ID
    pub patient_id: String,
    /// Attempt number
    pub attempt: i64,
    /// Failures since the last successful cycle
    pub consecutive_failures: u32,
    /// Message of the most recent failure
    pub last_error: String,
    /// When the most recent failure happened
    pub last_failed_at: DateTime<Utc>,
    /// Earliest time the job may be retried; `None` means next cycle
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Set once the failure limit is reached
    pub stuck: bool,
}

impl JobFailure {
    /// Whether the worker should leave this job alone at `now`.
    pub fn blocks_at(&self, now: DateTime<Utc>) -> bool {
        self.stuck || self.next_retry_at.is_some_and(|t| t > now)
    }
}

/// Opaque per-patient credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessToken {
    /// The token value
    pub token: String,
    /// Patient the token belongs to
    pub patient_id: String,
    /// When the token was issued
    pub created_at: DateTime<Utc>,
    /// When the token was last resolved
    pub last_used_at: DateTime<Utc>,
}

impl AccessToken {
    /// Mint a new random token for `patient_id`.
    pub fn issue(patient_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            token: uuid::Uuid::new_v4().simple().to_string(),
            patient_id: patient_id.into(),
            created_at: now,
            last_used_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_failure_blocks_until_retry_time() {
        let now = Utc::now();
        let mut failure = JobFailure {
            patient_id: "p".into(),
            attempt: 1,
            consecutive_failures: 2,
            last_error: "boom".into(),
            last_failed_at: now,
            next_retry_at: Some(now + Duration::minutes(5)),
            stuck: false,
        };
        assert!(failure.blocks_at(now));
        assert!(!failure.blocks_at(now + Duration::minutes(6)));

        failure.next_retry_at = None;
        assert!(!failure.blocks_at(now));

        failure.stuck = true;
        assert!(failure.blocks_at(now + Duration::days(30)));
    }

    #[test]
    fn test_issued_tokens_differ() {
        let a = AccessToken::issue("p1");
        let b = AccessToken::issue("p1");
        assert_ne!(a.token, b.token);
        assert_eq!(a.token.len(), 32);
    }
}
