//! `speechscore worker` commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use comfy_table::Cell;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::adapters::bundle::fetcher_from_config;
use crate::adapters::scorers::ScorerRegistry;
use crate::adapters::sqlite::{SqliteJobLeaseRepository, SqliteRecordingRepository};
use crate::application::{CycleReport, JobOutcome, ScoringWorker, WorkerOptions};
use crate::cli::open_store;
use crate::cli::output::{output, status_cell, table, CommandOutput};
use crate::domain::models::Config;
use crate::domain::ports::{JobLeaseRepository, RecordingRepository};
use crate::services::RetryPolicy;

/// Arguments for `speechscore worker`.
#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Worker action
    #[command(subcommand)]
    pub command: WorkerCommands,
}

/// Worker subcommands.
#[derive(Subcommand, Debug)]
pub enum WorkerCommands {
    /// Score pending attempts, polling until interrupted
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
        /// Override worker.poll_interval_secs
        #[arg(long)]
        interval_secs: Option<u64>,
        /// Score with the built-in mock scorer instead of the configured commands
        #[arg(long)]
        dry_run: bool,
    },
}

/// Result of a single `worker run --once` cycle.
#[derive(Debug, serde::Serialize)]
pub struct CycleOutput {
    /// The cycle's report
    #[serde(flatten)]
    pub report: CycleReport,
}

impl CommandOutput for CycleOutput {
    fn to_human(&self) -> String {
        if let Some(err) = &self.report.discovery_error {
            return format!("Pending-job query failed: {err}");
        }
        if self.report.jobs.is_empty() {
            return "No pending scoring jobs.".to_string();
        }

        let mut t = table(&["Patient", "Attempt", "Outcome", "Families", "Completed", "Failures"]);
        for job in &self.report.jobs {
            let (label, ok) = match &job.outcome {
                JobOutcome::Completed => ("completed".to_string(), true),
                JobOutcome::Partial => ("partial".to_string(), false),
                JobOutcome::Leased => ("leased".to_string(), true),
                JobOutcome::Failed(reason) => (format!("failed: {reason}"), false),
            };
            let failures = job
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.family, f.reason))
                .collect::<Vec<_>>()
                .join("\n");
            t.add_row(vec![
                Cell::new(&job.patient_id),
                Cell::new(job.attempt),
                status_cell(&label, ok),
                Cell::new(job.scored.len()),
                Cell::new(job.written.completed),
                Cell::new(failures),
            ]);
        }

        format!(
            "{t}\n{} job(s): {} completed, {} failed",
            self.report.jobs.len(),
            self.report.completed(),
            self.report.failed()
        )
    }
}

/// Printed when a polling worker shuts down.
#[derive(Debug, serde::Serialize)]
pub struct StoppedOutput {
    /// Cycles completed
    pub cycles: u64,
}

impl CommandOutput for StoppedOutput {
    fn to_human(&self) -> String {
        format!("Worker stopped after {} cycle(s).", self.cycles)
    }
}

/// Run a worker subcommand.
pub async fn execute(args: WorkerArgs, config: &Config, json_mode: bool) -> Result<()> {
    let WorkerCommands::Run { once, interval_secs, dry_run } = args.command;

    let pool = open_store(config).await?;
    let recordings: Arc<dyn RecordingRepository> = Arc::new(SqliteRecordingRepository::new(pool.clone()));
    let leases: Arc<dyn JobLeaseRepository> = Arc::new(SqliteJobLeaseRepository::new(pool));
    let fetcher = fetcher_from_config(&config.bundle, recordings.clone())
        .context("Failed to set up bundle fetcher")?;

    let scorers = if dry_run {
        info!("Dry run: scoring with the mock scorer");
        ScorerRegistry::mock()
    } else {
        ScorerRegistry::from_config(&config.scorers).context("Failed to set up scorers")?
    };
    if scorers.families().is_empty() {
        warn!("No scorers configured; every family will fail until scorers.families is set");
    }

    let mut options = WorkerOptions::from_config(config);
    if let Some(secs) = interval_secs {
        anyhow::ensure!(secs > 0, "--interval-secs must be greater than zero");
        options.poll_interval = Duration::from_secs(secs);
    }

    let worker = ScoringWorker::new(
        recordings,
        leases,
        fetcher,
        Arc::new(scorers),
        RetryPolicy::new(config.retry.clone()),
        options,
    );

    if once {
        let report = worker.run_once().await;
        output(&CycleOutput { report }, json_mode);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received; finishing the current job");
            let _ = shutdown_tx.send(());
        }
    });

    let cycles = worker.run_continuous(shutdown_rx).await;
    output(&StoppedOutput { cycles }, json_mode);
    Ok(())
}
