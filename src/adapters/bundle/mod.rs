//! Bundle archive codec and fetchers.

pub mod archive;
pub mod http_fetcher;
pub mod store_fetcher;

pub use archive::{pack, unpack, ManifestEntry, MANIFEST_NAME};
pub use http_fetcher::HttpBundleFetcher;
pub use store_fetcher::StoreBundleFetcher;

use std::sync::Arc;

use crate::domain::errors::DomainResult;
use crate::domain::models::{BundleConfig, BundleSource};
use crate::domain::ports::{BundleFetcher, RecordingRepository};

/// Build the fetcher selected by `config.source`.
pub fn fetcher_from_config(
    config: &BundleConfig,
    store: Arc<dyn RecordingRepository>,
) -> DomainResult<Arc<dyn BundleFetcher>> {
    Ok(match config.source {
        BundleSource::Http => Arc::new(HttpBundleFetcher::new(config)?),
        BundleSource::Store => Arc::new(StoreBundleFetcher::new(store)),
    })
}
