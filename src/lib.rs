//! speechscore - background scoring worker for recorded speech-language
//! assessment batteries.
//!
//! The worker finds assessment attempts with unscored recordings, fetches
//! their audio, resolves repeated takes, routes recordings to per-task
//! scoring routines and writes the scores back.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and port traits
//! - **Service Layer** (`services`): dedup, routing, aggregation, discovery
//! - **Application Layer** (`application`): the scoring worker loop
//! - **Adapters** (`adapters`): SQLite store, bundle fetchers, scorers
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{CycleReport, JobOutcome, JobReport, ScoringWorker, WorkerOptions};
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Config, PendingJob, Recording, RecordingKey, RecordingMeta, ScoreRecord, TaskFamily, TaskType,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
