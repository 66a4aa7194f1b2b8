//! Layered configuration loading and validation.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::{BundleSource, Config, TaskFamily};

/// Project-local configuration directory
pub const CONFIG_DIR: &str = ".speechscore";

const ENV_PREFIX: &str = "SPEECHSCORE_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Log level is not a tracing level
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// `database.path` is empty
    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    /// Pool would have no connections
    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    /// A timeout or interval is zero
    #[error("Invalid {0}: must be greater than zero")]
    ZeroDuration(&'static str),

    #[error(
        "Invalid backoff configuration: initial_backoff_secs ({0}) must not exceed max_backoff_secs ({1})"
    )]
    /// Backoff bounds are inverted
    InvalidBackoff(u64, u64),

    /// Failure limit is zero
    #[error("Invalid max_consecutive_failures: must be at least 1")]
    InvalidMaxFailures,

    /// Upload API URL is not http(s)
    #[error("Invalid api_base_url: {0}. Must be an http(s) URL")]
    InvalidApiBaseUrl(String),

    /// Scorer keyed by a question code no family uses
    #[error("Unknown scorer family: {0}")]
    UnknownScorerFamily(String),

    /// Scorer command without a program
    #[error("Scorer for {0} has an empty program")]
    EmptyScorerProgram(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. .speechscore/config.yaml (created by `init`)
    /// 3. .speechscore/local.yaml (optional local overrides)
    /// 4. Environment variables (SPEECHSCORE_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        let dir = Path::new(CONFIG_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file instead of the project files.
    /// Environment overrides still apply.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.is_file() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(0));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let worker = &config.worker;
        for (name, value) in [
            ("poll_interval_secs", worker.poll_interval_secs),
            ("fetch_timeout_secs", worker.fetch_timeout_secs),
            ("scorer_timeout_secs", worker.scorer_timeout_secs),
            ("request_timeout_secs", config.bundle.request_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroDuration(name));
            }
        }
        if worker.leasing_enabled && worker.lease_ttl_secs == 0 {
            return Err(ConfigError::ZeroDuration("lease_ttl_secs"));
        }

        let retry = &config.retry;
        if retry.backoff_enabled {
            if retry.initial_backoff_secs == 0 {
                return Err(ConfigError::ZeroDuration("initial_backoff_secs"));
            }
            if retry.initial_backoff_secs > retry.max_backoff_secs {
                return Err(ConfigError::InvalidBackoff(
                    retry.initial_backoff_secs,
                    retry.max_backoff_secs,
                ));
            }
        }
        if retry.max_consecutive_failures == Some(0) {
            return Err(ConfigError::InvalidMaxFailures);
        }

        if config.bundle.source == BundleSource::Http {
            let url = &config.bundle.api_base_url;
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidApiBaseUrl(url.clone()));
            }
        }

        for (code, command) in &config.scorers.families {
            if TaskFamily::from_code(code).is_none() {
                return Err(ConfigError::UnknownScorerFamily(code.clone()));
            }
            if command.program.trim().is_empty() {
                return Err(ConfigError::EmptyScorerProgram(code.clone()));
            }
        }

        Ok(())
    }
}
