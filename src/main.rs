//! speechscore CLI entry point.

use clap::Parser;

use speechscore::cli::{self, Cli};
use speechscore::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    let config = match cli::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => cli::handle_error(err.context("Invalid configuration"), json),
    };

    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => cli::handle_error(err, json),
    };

    if let Err(err) = cli::run(cli, config).await {
        cli::handle_error(err, json);
    }
}
