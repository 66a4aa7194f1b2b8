//! Access token issuance and resolution.

use std::sync::Arc;
use tracing::info;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::AccessToken;
use crate::domain::ports::AccessTokenRepository;

/// Issues and resolves per-patient access tokens.
pub struct AccessTokenService {
    repo: Arc<dyn AccessTokenRepository>,
}

impl AccessTokenService {
    /// Create a new token service over `repo`.
    pub fn new(repo: Arc<dyn AccessTokenRepository>) -> Self {
        Self { repo }
    }

    /// Return the patient's token, minting one on first use.
    pub async fn issue_for(&self, patient_id: &str) -> DomainResult<AccessToken> {
        if patient_id.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "patient id cannot be empty".to_string(),
            ));
        }
        if let Some(existing) = self.repo.find_by_patient(patient_id).await? {
            return Ok(existing);
        }

        let token = self.repo.insert_if_absent(&AccessToken::issue(patient_id)).await?;
        info!(patient_id, "Issued access token");
        Ok(token)
    }

    /// Resolve a token to its patient id.
    pub async fn resolve(&self, token: &str) -> DomainResult<String> {
        self.repo
            .touch(token)
            .await?
            .map(|t| t.patient_id)
            .ok_or(DomainError::TokenNotFound)
    }
}
