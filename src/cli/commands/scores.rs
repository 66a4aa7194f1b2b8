//! `speechscore scores` commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use comfy_table::Cell;

use crate::adapters::sqlite::SqliteRecordingRepository;
use crate::cli::open_store;
use crate::cli::output::{format_score, output, table, CommandOutput};
use crate::domain::models::{Config, StoredScore};
use crate::domain::ports::RecordingRepository;

/// Arguments for `speechscore scores`.
#[derive(Args, Debug)]
pub struct ScoresArgs {
    /// Scores action
    #[command(subcommand)]
    pub command: ScoresCommands,
}

/// Scores subcommands.
#[derive(Subcommand, Debug)]
pub enum ScoresCommands {
    /// Show the stored scores of an attempt
    Show {
        /// Patient ID
        patient_id: String,
        /// Attempt number
        attempt: i64,
    },
    /// Delete an attempt's scores and queue it for rescoring
    Clear {
        /// Patient ID
        patient_id: String,
        /// Attempt number
        attempt: i64,
    },
}

/// Result of `scores show`.
#[derive(Debug, serde::Serialize)]
pub struct ScoresOutput {
    /// Patient ID
    pub patient_id: String,
    /// Attempt number
    pub attempt: i64,
    /// Stored score rows
    pub scores: Vec<StoredScore>,
}

impl CommandOutput for ScoresOutput {
    fn to_human(&self) -> String {
        if self.scores.is_empty() {
            return format!("No scores stored for {}/{}.", self.patient_id, self.attempt);
        }

        let mut t = table(&["Task", "Question", "No", "Sub", "Family", "Score", "Updated"]);
        for s in &self.scores {
            t.add_row(vec![
                Cell::new(s.key.task_type),
                Cell::new(&s.key.question_code),
                Cell::new(s.key.question_no),
                Cell::new(s.key.sub_attempt),
                Cell::new(s.family.map(|f| f.to_string()).unwrap_or_default()),
                Cell::new(format_score(s.score)),
                Cell::new(s.updated_at.format("%Y-%m-%d %H:%M:%S UTC")),
            ]);
        }
        t.to_string()
    }
}

/// Result of `scores clear`.
#[derive(Debug, serde::Serialize)]
pub struct ClearOutput {
    /// Whether the clear ran
    pub success: bool,
    /// Patient ID
    pub patient_id: String,
    /// Attempt number
    pub attempt: i64,
    /// Score rows deleted
    pub removed: u64,
}

impl CommandOutput for ClearOutput {
    fn to_human(&self) -> String {
        format!(
            "Removed {} score(s); {}/{} is pending again",
            self.removed, self.patient_id, self.attempt
        )
    }
}

/// Run a scores subcommand.
pub async fn execute(args: ScoresArgs, config: &Config, json_mode: bool) -> Result<()> {
    let repo = SqliteRecordingRepository::new(open_store(config).await?);

    match args.command {
        ScoresCommands::Show { patient_id, attempt } => {
            let scores = repo
                .list_scores(&patient_id, attempt)
                .await
                .context("Failed to list scores")?;
            output(&ScoresOutput { patient_id, attempt, scores }, json_mode);
        }
        ScoresCommands::Clear { patient_id, attempt } => {
            let removed = repo
                .delete_scores(&patient_id, attempt)
                .await
                .context("Failed to clear scores")?;
            output(
                &ClearOutput { success: true, patient_id, attempt, removed },
                json_mode,
            );
        }
    }

    Ok(())
}
