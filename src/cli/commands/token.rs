//! `speechscore token` commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use std::sync::Arc;

use crate::adapters::sqlite::SqliteAccessTokenRepository;
use crate::cli::open_store;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::services::AccessTokenService;

/// Arguments for `speechscore token`.
#[derive(Args, Debug)]
pub struct TokenArgs {
    /// Token action
    #[command(subcommand)]
    pub command: TokenCommands,
}

/// Token subcommands.
#[derive(Subcommand, Debug)]
pub enum TokenCommands {
    /// Print the patient's access token, issuing one if needed
    Issue {
        /// Patient ID
        patient_id: String,
    },
    /// Print the patient a token belongs to
    Resolve {
        /// Access token
        token: String,
    },
}

/// Result of `token issue` and `token resolve`.
#[derive(Debug, serde::Serialize)]
pub struct TokenOutput {
    /// Patient ID
    pub patient_id: String,
    /// Issued token; absent when resolving
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl CommandOutput for TokenOutput {
    fn to_human(&self) -> String {
        match &self.token {
            Some(token) => format!("{}: {token}", self.patient_id),
            None => self.patient_id.clone(),
        }
    }
}

/// Run a token subcommand.
pub async fn execute(args: TokenArgs, config: &Config, json_mode: bool) -> Result<()> {
    let pool = open_store(config).await?;
    let service = AccessTokenService::new(Arc::new(SqliteAccessTokenRepository::new(pool)));

    let out = match args.command {
        TokenCommands::Issue { patient_id } => {
            let token = service.issue_for(&patient_id).await?;
            TokenOutput { patient_id: token.patient_id, token: Some(token.token) }
        }
        TokenCommands::Resolve { token } => TokenOutput {
            patient_id: service.resolve(&token).await?,
            token: None,
        },
    };

    output(&out, json_mode);
    Ok(())
}
