//! `speechscore bundle` commands: the local upload path and its inverse.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::bundle::{pack, unpack, ManifestEntry};
use crate::adapters::sqlite::{SqliteAccessTokenRepository, SqliteRecordingRepository};
use crate::cli::open_store;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, Recording};
use crate::domain::ports::RecordingRepository;
use crate::services::AccessTokenService;

/// Arguments for `speechscore bundle`.
#[derive(Args, Debug)]
pub struct BundleArgs {
    /// Bundle action
    #[command(subcommand)]
    pub command: BundleCommands,
}

/// Bundle subcommands.
#[derive(Subcommand, Debug)]
pub enum BundleCommands {
    /// Store every recording in a bundle archive as pending
    Import {
        /// Path to a .tar.gz bundle
        archive: PathBuf,
    },
    /// Write an attempt's stored recordings as a bundle archive
    Export {
        /// Patient ID
        patient_id: String,
        /// Attempt number
        attempt: i64,
        /// Destination archive
        #[arg(long, short)]
        out: PathBuf,
    },
}

/// Result of `bundle import`.
#[derive(Debug, serde::Serialize)]
pub struct ImportOutput {
    /// Whether the import finished
    pub success: bool,
    /// Recordings stored
    pub recordings: usize,
    /// Patients the bundle covered
    pub patients: Vec<String>,
}

impl CommandOutput for ImportOutput {
    fn to_human(&self) -> String {
        format!(
            "Imported {} recording(s) for {} patient(s): {}",
            self.recordings,
            self.patients.len(),
            self.patients.join(", ")
        )
    }
}

/// Result of `bundle export`.
#[derive(Debug, serde::Serialize)]
pub struct ExportOutput {
    /// Whether the archive was written
    pub success: bool,
    /// Archive location
    pub path: PathBuf,
    /// Recordings packed
    pub recordings: usize,
}

impl CommandOutput for ExportOutput {
    fn to_human(&self) -> String {
        format!("Wrote {} recording(s) to {}", self.recordings, self.path.display())
    }
}

/// Run a bundle subcommand.
pub async fn execute(args: BundleArgs, config: &Config, json_mode: bool) -> Result<()> {
    let pool = open_store(config).await?;
    let repo = SqliteRecordingRepository::new(pool.clone());

    match args.command {
        BundleCommands::Import { archive } => {
            let workspace = tempfile::tempdir().context("Failed to create scratch directory")?;
            let dest = workspace.path().to_path_buf();
            let source = archive.clone();
            let recordings = tokio::task::spawn_blocking(move || unpack(&source, &dest, None))
                .await
                .context("Bundle unpack task panicked")?
                .with_context(|| format!("Failed to unpack {}", archive.display()))?;

            let tokens = AccessTokenService::new(Arc::new(SqliteAccessTokenRepository::new(pool)));
            let mut patients = BTreeSet::new();
            for local in &recordings {
                let audio = tokio::fs::read(&local.path)
                    .await
                    .with_context(|| format!("Failed to read {}", local.path.display()))?;
                repo.insert(&Recording::captured(local.meta.clone(), audio))
                    .await
                    .with_context(|| format!("Failed to store {}", local.key()))?;

                if patients.insert(local.key().patient_id.clone()) {
                    tokens.issue_for(&local.key().patient_id).await?;
                }
            }

            output(
                &ImportOutput {
                    success: true,
                    recordings: recordings.len(),
                    patients: patients.into_iter().collect(),
                },
                json_mode,
            );
        }

        BundleCommands::Export { patient_id, attempt, out } => {
            let recordings = repo.list_for_attempt(&patient_id, attempt).await?;
            anyhow::ensure!(
                !recordings.is_empty(),
                "No recordings stored for {patient_id}/{attempt}"
            );

            let entries: Vec<(ManifestEntry, Vec<u8>)> = recordings
                .into_iter()
                .map(|r| (ManifestEntry::for_meta(&r.meta), r.audio))
                .collect();
            let count = entries.len();

            let path = out.clone();
            tokio::task::spawn_blocking(move || -> std::io::Result<()> {
                let file = BufWriter::new(File::create(&path)?);
                pack(&entries, file)?.into_inner().map_err(|e| e.into_error())?.sync_all()
            })
            .await
            .context("Bundle pack task panicked")?
            .with_context(|| format!("Failed to write {}", out.display()))?;

            output(
                &ExportOutput { success: true, path: out, recordings: count },
                json_mode,
            );
        }
    }

    Ok(())
}
