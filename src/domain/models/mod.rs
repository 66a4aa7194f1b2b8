//! Domain models.

pub mod config;
pub mod job;
pub mod recording;
pub mod task_family;

pub use config::{
    BundleConfig, BundleSource, Config, DatabaseConfig, LogFormat, LoggingConfig, RetryConfig,
    RotationPolicy, ScorerCommandConfig, ScorersConfig, WorkerConfig,
};
pub use job::{AccessToken, JobFailure, PendingJob};
pub use recording::{
    Keyed, LocalRecording, Recording, RecordingKey, RecordingMeta, ScoreRecord, StoredScore,
    TaskType, WriteOutcome,
};
pub use task_family::{FamilyRule, Precision, TaskFamily};
