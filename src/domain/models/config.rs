//! Configuration model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration structure for speechscore
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Worker loop configuration
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Failure retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Where audio bundles come from
    #[serde(default)]
    pub bundle: BundleConfig,

    /// External scorer commands
    #[serde(default)]
    pub scorers: ScorersConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".speechscore/speechscore.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Human-readable
    Pretty,
}

/// Log file rotation policy
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    /// New file each day
    #[default]
    Daily,
    /// New file each hour
    Hourly,
    /// Single file
    Never,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Directory for rolling log files (stdout only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Also log to the console (stderr) when writing files
    #[serde(default = "default_true")]
    pub enable_console: bool,

    /// Log file rotation
    #[serde(default)]
    pub rotation: RotationPolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

const fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            enable_console: true,
            rotation: RotationPolicy::default(),
        }
    }
}

/// Worker loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Seconds between polls in continuous mode
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Upper bound on one bundle fetch
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Upper bound on one scorer invocation
    #[serde(default = "default_scorer_timeout_secs")]
    pub scorer_timeout_secs: u64,

    /// Claim jobs with a lease before processing them
    #[serde(default = "default_true")]
    pub leasing_enabled: bool,

    /// Lease lifetime; an expired lease can be taken over by another worker
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,
}

const fn default_poll_interval_secs() -> u64 {
    300
}

const fn default_fetch_timeout_secs() -> u64 {
    300
}

const fn default_scorer_timeout_secs() -> u64 {
    600
}

const fn default_lease_ttl_secs() -> u64 {
    1800
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            scorer_timeout_secs: default_scorer_timeout_secs(),
            leasing_enabled: true,
            lease_ttl_secs: default_lease_ttl_secs(),
        }
    }
}

/// Retry policy configuration
///
/// With `backoff_enabled = false` a failed job is simply retried on the next
/// poll, forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Delay retries of failing jobs exponentially
    #[serde(default)]
    pub backoff_enabled: bool,

    /// Delay after the first failure
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,

    /// Delay cap
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Mark a job stuck after this many consecutive failures
    #[serde(default)]
    pub max_consecutive_failures: Option<u32>,
}

const fn default_initial_backoff_secs() -> u64 {
    300
}

const fn default_max_backoff_secs() -> u64 {
    21_600
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff_enabled: false,
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            max_consecutive_failures: None,
        }
    }
}

/// Bundle source selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BundleSource {
    /// Download bundles from the upload API
    #[default]
    Http,
    /// Materialize bundles from audio held in the local record store
    Store,
}

/// Bundle fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BundleConfig {
    /// Where bundles come from
    #[serde(default)]
    pub source: BundleSource,

    /// Base URL of the upload API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// HTTP request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_base_url() -> String {
    "http://localhost:8000/api/v1".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    300
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            source: BundleSource::default(),
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// External scorer command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ScorerCommandConfig {
    /// Program to execute
    pub program: String,

    /// Arguments placed before the generated ones
    #[serde(default)]
    pub args: Vec<String>,
}

/// Scorer commands keyed by question code (e.g. `SAY_OBJ`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScorersConfig {
    /// Command per question code
    #[serde(default)]
    pub families: BTreeMap<String, ScorerCommandConfig>,
}
