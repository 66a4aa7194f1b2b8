//! `speechscore jobs` commands.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use comfy_table::Cell;
use std::sync::Arc;

use crate::adapters::sqlite::{SqliteJobLeaseRepository, SqliteRecordingRepository};
use crate::cli::open_store;
use crate::cli::output::{output, status_cell, table, CommandOutput};
use crate::domain::models::{Config, JobFailure};
use crate::domain::ports::JobLeaseRepository;
use crate::services::JobDiscovery;

/// Arguments for `speechscore jobs`.
#[derive(Args, Debug)]
pub struct JobsArgs {
    /// Jobs action
    #[command(subcommand)]
    pub command: JobsCommands,
}

/// Jobs subcommands.
#[derive(Subcommand, Debug)]
pub enum JobsCommands {
    /// List attempts with pending recordings
    Pending,
    /// List attempts that exceeded the failure limit
    Stuck,
    /// Clear an attempt's failure record so the worker retries it
    Reset {
        /// Patient ID
        patient_id: String,
        /// Attempt number
        attempt: i64,
    },
}

/// One row of `jobs pending`.
#[derive(Debug, serde::Serialize)]
pub struct PendingJobOutput {
    /// Patient ID
    pub patient_id: String,
    /// Attempt number
    pub attempt: i64,
    /// Whether the patient has an access token
    pub has_token: bool,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Backoff deadline, if any
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Whether the worker has given up
    pub stuck: bool,
}

/// Result of `jobs pending`.
#[derive(Debug, serde::Serialize)]
pub struct PendingListOutput {
    /// Pending attempts
    pub jobs: Vec<PendingJobOutput>,
    /// Number of pending attempts
    pub total: usize,
}

impl CommandOutput for PendingListOutput {
    fn to_human(&self) -> String {
        if self.jobs.is_empty() {
            return "No pending jobs.".to_string();
        }

        let mut t = table(&["Patient", "Attempt", "Token", "Failures", "Next retry", "State"]);
        for job in &self.jobs {
            let state = if job.stuck { "stuck" } else { "ready" };
            t.add_row(vec![
                Cell::new(&job.patient_id),
                Cell::new(job.attempt),
                Cell::new(if job.has_token { "yes" } else { "no" }),
                Cell::new(job.consecutive_failures),
                Cell::new(
                    job.next_retry_at
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                        .unwrap_or_default(),
                ),
                status_cell(state, !job.stuck),
            ]);
        }
        format!("{t}\nFound {} pending job(s)", self.total)
    }
}

/// Result of `jobs stuck`.
#[derive(Debug, serde::Serialize)]
pub struct StuckListOutput {
    /// Attempts over the failure limit
    pub jobs: Vec<JobFailure>,
}

impl CommandOutput for StuckListOutput {
    fn to_human(&self) -> String {
        if self.jobs.is_empty() {
            return "No stuck jobs.".to_string();
        }

        let mut t = table(&["Patient", "Attempt", "Failures", "Last failed", "Last error"]);
        for failure in &self.jobs {
            t.add_row(vec![
                Cell::new(&failure.patient_id),
                Cell::new(failure.attempt),
                Cell::new(failure.consecutive_failures),
                Cell::new(failure.last_failed_at.format("%Y-%m-%d %H:%M:%S UTC")),
                Cell::new(&failure.last_error),
            ]);
        }
        t.to_string()
    }
}

/// Result of `jobs reset`.
#[derive(Debug, serde::Serialize)]
pub struct ResetOutput {
    /// Whether the reset ran
    pub success: bool,
    /// Patient ID
    pub patient_id: String,
    /// Attempt number
    pub attempt: i64,
    /// Whether a failure record existed
    pub cleared: bool,
}

impl CommandOutput for ResetOutput {
    fn to_human(&self) -> String {
        if self.cleared {
            format!("Cleared failure record for {}/{}", self.patient_id, self.attempt)
        } else {
            format!("No failure record for {}/{}", self.patient_id, self.attempt)
        }
    }
}

/// Run a jobs subcommand.
pub async fn execute(args: JobsArgs, config: &Config, json_mode: bool) -> Result<()> {
    let pool = open_store(config).await?;
    let leases = Arc::new(SqliteJobLeaseRepository::new(pool.clone()));

    match args.command {
        JobsCommands::Pending => {
            let discovery = JobDiscovery::new(
                Arc::new(SqliteRecordingRepository::new(pool)),
                leases.clone(),
            );
            let pending = discovery.list_all().await.context("Failed to list pending jobs")?;

            let mut jobs = Vec::with_capacity(pending.len());
            for job in pending {
                let failure = leases.failure(&job.patient_id, job.attempt).await?;
                jobs.push(PendingJobOutput {
                    has_token: job.access_token.is_some(),
                    consecutive_failures: failure.as_ref().map_or(0, |f| f.consecutive_failures),
                    next_retry_at: failure.as_ref().and_then(|f| f.next_retry_at),
                    stuck: failure.as_ref().is_some_and(|f| f.stuck),
                    patient_id: job.patient_id,
                    attempt: job.attempt,
                });
            }

            output(&PendingListOutput { total: jobs.len(), jobs }, json_mode);
        }

        JobsCommands::Stuck => {
            let jobs = leases.list_stuck().await.context("Failed to list stuck jobs")?;
            output(&StuckListOutput { jobs }, json_mode);
        }

        JobsCommands::Reset { patient_id, attempt } => {
            let cleared = leases.clear_failures(&patient_id, attempt).await?;
            output(
                &ResetOutput { success: true, patient_id, attempt, cleared },
                json_mode,
            );
        }
    }

    Ok(())
}
