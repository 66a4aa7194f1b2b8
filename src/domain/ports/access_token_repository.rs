//! Access token repository port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::AccessToken;

/// Persistence port for per-patient access tokens
#[async_trait]
pub trait AccessTokenRepository: Send + Sync {
    /// Store `token` unless the patient already has one; returns the
    /// patient's active token either way.
    async fn insert_if_absent(&self, token: &AccessToken) -> DomainResult<AccessToken>;

    /// Find the token row for a token string, refreshing its last-used time
    async fn touch(&self, token: &str) -> DomainResult<Option<AccessToken>>;

    /// Find a patient's token
    async fn find_by_patient(&self, patient_id: &str) -> DomainResult<Option<AccessToken>>;
}
