//! Command-line front end for the batt self-updater.

use std::io::{self, IsTerminal};
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use batt_updater::{CURRENT_VERSION, UpdateError};

mod cli;
mod commands;
mod config;
mod logging;

use crate::cli::{Cli, Command, LogFormatArg};
use crate::commands::{run_check, run_config, run_install, run_watch};
use crate::config::load_config;
use crate::logging::{LogConfig, LogFormat, init_logging};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("{error:#}");
            eprintln!("error: {error:#}");
            if let Some(hint) = user_hint(&error) {
                eprintln!("{hint}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(feed_url) = cli.feed_url {
        config.feed_url = Some(feed_url);
    }
    let current_version = cli
        .current_version
        .unwrap_or_else(|| CURRENT_VERSION.to_string());

    match cli.command {
        Command::Check(args) => run_check(&config, &current_version, &args).await,
        Command::Install(args) => run_install(&config, &current_version, &args).await,
        Command::Watch(args) => run_watch(&config, &current_version, &args).await,
        Command::Config => run_config(&config),
    }
}

/// Build logging configuration from CLI flags.
fn log_config_from_cli(cli: &Cli) -> LogConfig {
    LogConfig {
        level_filter: cli.verbosity.tracing_level_filter(),
        use_env_filter: !cli.verbosity.is_present(),
        format: match cli.log_format {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        },
        log_file: cli.log_file.clone(),
        with_ansi: cli.log_file.is_none() && io::stderr().is_terminal(),
        ..LogConfig::default()
    }
}

/// Returns the updater's message for end users, if an update step failed.
fn user_hint(error: &anyhow::Error) -> Option<&'static str> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<UpdateError>())
        .map(UpdateError::user_message)
}
