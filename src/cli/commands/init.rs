//! Implementation of the `speechscore init` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::adapters::sqlite::initialize_database;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::{ConfigLoader, CONFIG_DIR};

/// Arguments for `speechscore init`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config.yaml with defaults
    #[arg(long, short)]
    pub force: bool,
}

/// Result of `init`.
#[derive(Debug, serde::Serialize)]
pub struct InitOutput {
    /// Whether setup finished
    pub success: bool,
    /// Summary line
    pub message: String,
    /// Config file location
    pub config_path: PathBuf,
    /// Whether a default config was written
    pub config_written: bool,
    /// Database the config points at
    pub database_path: String,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        if self.config_written {
            lines.push(format!("\nWrote default config to {}", self.config_path.display()));
        }
        lines.push(format!("Database ready at {}", self.database_path));
        lines.join("\n")
    }
}

/// Create the config directory, default config and database.
pub async fn execute(args: InitArgs, json_mode: bool) -> Result<()> {
    let config_dir = Path::new(CONFIG_DIR);
    let config_path = config_dir.join("config.yaml");

    fs::create_dir_all(config_dir)
        .await
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;

    let config_written = args.force || !config_path.exists();
    if config_written {
        let yaml = serde_yaml::to_string(&Config::default()).context("Failed to render default config")?;
        fs::write(&config_path, yaml)
            .await
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
    }

    // Env overrides and local.yaml still apply to the database location
    let config = ConfigLoader::load()?;
    initialize_database(&config.database)
        .await
        .context("Failed to initialize database")?;

    let out = InitOutput {
        success: true,
        message: if config_written {
            "Project initialized.".to_string()
        } else {
            "Project already initialized; database migrated.".to_string()
        },
        config_path,
        config_written,
        database_path: config.database.path,
    };
    output(&out, json_mode);
    Ok(())
}
