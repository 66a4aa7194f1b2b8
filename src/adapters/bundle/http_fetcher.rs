//! Bundle fetcher backed by the upload API.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::archive;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{BundleConfig, PendingJob, RecordingKey};
use crate::domain::ports::{BundleFetcher, FetchError, FetchedBundle};

const API_KEY_HEADER: &str = "X-API-KEY";

/// Fetches bundles from the upload API.
pub struct HttpBundleFetcher {
    client: Client,
    base_url: String,
    /// Fallback credential for requests not tied to a job
    api_key: Option<String>,
}

impl HttpBundleFetcher {
    /// Create a new fetcher for the configured API.
    pub fn new(config: &BundleConfig) -> DomainResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| DomainError::ValidationFailed(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: None,
        })
    }

    /// Send `key` when a job carries no access token.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn bundle_url(&self, job: &PendingJob) -> String {
        format!("{}/reports/{}/{}/bundle", self.base_url, job.patient_id, job.attempt)
    }

    fn recording_url(&self, key: &RecordingKey, normalize: bool) -> String {
        let mut url = format!(
            "{}/recordings/{}/{}/{}/{}/{}/{}",
            self.base_url,
            key.patient_id,
            key.attempt,
            key.task_type,
            key.question_code,
            key.question_no,
            key.sub_attempt
        );
        if normalize {
            url.push_str("?format=wav");
        }
        url
    }

    async fn get(&self, url: &str, token: Option<&str>) -> Result<Response, FetchError> {
        let mut request = self.client.get(url);
        if let Some(token) = token.or(self.api_key.as_deref()) {
            request = request.header(API_KEY_HEADER, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transient(format!("GET {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Transient(format!("GET {url} returned {status}: {body}")));
        }
        Ok(response)
    }
}

/// Stream a response body to `dest`, returning the bytes written.
async fn stream_to_file(response: Response, dest: &Path) -> Result<u64, FetchError> {
    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| FetchError::Transient(format!("download interrupted: {e}")))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

#[async_trait]
impl BundleFetcher for HttpBundleFetcher {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, job: &PendingJob) -> Result<FetchedBundle, FetchError> {
        let workspace = tempfile::Builder::new()
            .prefix(&format!("{}_{}_", job.patient_id, job.attempt))
            .tempdir()?;

        let url = self.bundle_url(job);
        let response = self.get(&url, job.access_token.as_deref()).await?;
        let archive_path = workspace.path().join("bundle.tar.gz");
        let size = stream_to_file(response, &archive_path).await?;
        debug!(patient_id = %job.patient_id, attempt = job.attempt, bytes = size, "Bundle downloaded");

        let root = workspace.path().join("audio");
        let patient_id = job.patient_id.clone();
        let attempt = job.attempt;
        let recordings = tokio::task::spawn_blocking(move || {
            archive::unpack(&archive_path, &root, Some((patient_id.as_str(), attempt)))
        })
        .await
        .map_err(|e| FetchError::Transient(format!("unpack task failed: {e}")))??;

        Ok(FetchedBundle::new(recordings, workspace))
    }

    async fn download_recording(
        &self,
        key: &RecordingKey,
        normalize: bool,
        dest: &Path,
    ) -> Result<u64, FetchError> {
        let url = self.recording_url(key, normalize);
        let response = self.get(&url, None).await?;
        stream_to_file(response, dest).await
    }
}
