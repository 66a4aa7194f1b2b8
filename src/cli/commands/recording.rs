//! `speechscore recording` commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::bundle::{HttpBundleFetcher, StoreBundleFetcher};
use crate::adapters::sqlite::{SqliteAccessTokenRepository, SqliteRecordingRepository};
use crate::cli::open_store;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{BundleSource, Config, RecordingKey, TaskType};
use crate::domain::ports::{AccessTokenRepository, BundleFetcher};

/// Arguments for `speechscore recording`.
#[derive(Args, Debug)]
pub struct RecordingArgs {
    /// Recording action
    #[command(subcommand)]
    pub command: RecordingCommands,
}

/// Recording subcommands.
#[derive(Subcommand, Debug)]
pub enum RecordingCommands {
    /// Download one recording
    Download {
        /// Patient ID
        patient_id: String,
        /// Attempt number
        attempt: i64,
        /// Task type (CLAP-A or CLAP-D)
        #[arg(value_parser = parse_task_type)]
        task_type: TaskType,
        /// Question code, e.g. SAY_OBJ
        question_code: String,
        /// Question number
        question_no: i64,
        /// Sub-attempt number
        sub_attempt: i64,
        /// Destination file
        #[arg(long, short)]
        out: PathBuf,
        /// Convert to the canonical WAV encoding
        #[arg(long)]
        normalize: bool,
    },
}

fn parse_task_type(s: &str) -> Result<TaskType, String> {
    TaskType::from_str(s).ok_or_else(|| format!("unknown task type '{s}', expected CLAP-A or CLAP-D"))
}

/// Result of `recording download`.
#[derive(Debug, serde::Serialize)]
pub struct DownloadOutput {
    /// Whether the file was written
    pub success: bool,
    /// Recording key
    pub key: String,
    /// Written file
    pub path: PathBuf,
    /// Bytes written
    pub bytes: u64,
}

impl CommandOutput for DownloadOutput {
    fn to_human(&self) -> String {
        format!("Saved {} ({} bytes) to {}", self.key, self.bytes, self.path.display())
    }
}

/// Run a recording subcommand.
pub async fn execute(args: RecordingArgs, config: &Config, json_mode: bool) -> Result<()> {
    let RecordingCommands::Download {
        patient_id,
        attempt,
        task_type,
        question_code,
        question_no,
        sub_attempt,
        out,
        normalize,
    } = args.command;

    let pool = open_store(config).await?;
    let fetcher: Arc<dyn BundleFetcher> = match config.bundle.source {
        BundleSource::Http => {
            let mut fetcher = HttpBundleFetcher::new(&config.bundle)?;
            let tokens = SqliteAccessTokenRepository::new(pool);
            if let Some(token) = tokens.find_by_patient(&patient_id).await? {
                fetcher = fetcher.with_api_key(token.token);
            }
            Arc::new(fetcher)
        }
        BundleSource::Store => Arc::new(StoreBundleFetcher::new(Arc::new(
            SqliteRecordingRepository::new(pool),
        ))),
    };

    let key = RecordingKey::new(patient_id, attempt, task_type, question_code, question_no, sub_attempt);
    let bytes = fetcher
        .download_recording(&key, normalize, &out)
        .await
        .with_context(|| format!("Failed to download {key}"))?;

    output(
        &DownloadOutput { success: true, key: key.to_string(), path: out, bytes },
        json_mode,
    );
    Ok(())
}
