//! Configuration loading
//!
//! Hierarchical configuration using figment: defaults, project YAML files,
//! then `SPEECHSCORE_*` environment overrides, validated after merging.

pub mod loader;

pub use loader::{ConfigError, ConfigLoader, CONFIG_DIR};
