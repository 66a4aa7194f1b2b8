//! Command-line interface.

pub mod commands;
pub mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};

use crate::adapters::sqlite::initialize_database;
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

use commands::{
    bundle::BundleArgs, init::InitArgs, jobs::JobsArgs, recording::RecordingArgs,
    scores::ScoresArgs, token::TokenArgs, worker::WorkerArgs,
};

/// Command line interface.
#[derive(Parser, Debug)]
#[command(name = "speechscore")]
#[command(about = "Background scoring worker for recorded speech assessments", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Load this config file instead of .speechscore/config.yaml
    #[arg(long, global = true, env = "SPEECHSCORE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the project config and database
    Init(InitArgs),
    /// Run the scoring worker
    Worker(WorkerArgs),
    /// Inspect and reset scoring jobs
    Jobs(JobsArgs),
    /// Issue and resolve patient access tokens
    Token(TokenArgs),
    /// Show or clear stored scores
    Scores(ScoresArgs),
    /// Import and export recording bundles
    Bundle(BundleArgs),
    /// Download single recordings
    Recording(RecordingArgs),
}

/// Load configuration from `path`, or from the project files when unset.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Open the configured record store, migrating it if needed.
pub async fn open_store(config: &Config) -> Result<SqlitePool> {
    initialize_database(&config.database)
        .await
        .with_context(|| {
            format!(
                "Failed to open database at {}. Run 'speechscore init' first.",
                config.database.path
            )
        })
}

/// Dispatch a parsed command line.
pub async fn run(cli: Cli, config: Config) -> Result<()> {
    let json = cli.json;
    match cli.command {
        Commands::Init(args) => commands::init::execute(args, json).await,
        Commands::Worker(args) => commands::worker::execute(args, &config, json).await,
        Commands::Jobs(args) => commands::jobs::execute(args, &config, json).await,
        Commands::Token(args) => commands::token::execute(args, &config, json).await,
        Commands::Scores(args) => commands::scores::execute(args, &config, json).await,
        Commands::Bundle(args) => commands::bundle::execute(args, &config, json).await,
        Commands::Recording(args) => commands::recording::execute(args, &config, json).await,
    }
}

/// Report a command failure and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let chain: Vec<String> = err.chain().map(ToString::to_string).collect();
        let body = serde_json::json!({ "success": false, "error": err.to_string(), "causes": chain });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}
