//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that adapters must implement:
//! - RecordingRepository: the record store (recordings, scores, pending jobs)
//! - AccessTokenRepository: per-patient access tokens
//! - JobLeaseRepository: job leases and consecutive-failure tracking
//! - BundleFetcher: moving an attempt's audio to local files
//! - Scorer: external audio-to-score routines

pub mod access_token_repository;
pub mod bundle_fetcher;
pub mod job_lease_repository;
pub mod recording_repository;
pub mod scorer;

pub use access_token_repository::AccessTokenRepository;
pub use bundle_fetcher::{BundleFetcher, FetchError, FetchedBundle};
pub use job_lease_repository::JobLeaseRepository;
pub use recording_repository::RecordingRepository;
pub use scorer::{ScoreRequest, Scorer, ScorerError, ScorerOutput};
