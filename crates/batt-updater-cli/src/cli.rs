//! CLI argument definitions for the batt updater.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};

#[derive(Parser)]
#[command(
    name = "batt-update",
    version,
    about = "Check for and install batt updates",
    long_about = "Check GitHub releases for a newer batt, install it from its disk image,\n\
                  or keep checking in the background."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for warnings only).
    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,

    /// Updater config file (default: config.toml in the batt config directory).
    #[arg(long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Override the release feed URL.
    #[arg(long = "feed-url", value_name = "URL", global = true)]
    pub feed_url: Option<String>,

    /// Version to compare against (default: this build's version).
    #[arg(long = "current-version", value_name = "TAG", global = true)]
    pub current_version: Option<String>,

    /// Log output format (pretty for humans, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check once for a newer release.
    Check(CheckArgs),

    /// Download and install the latest release.
    Install(InstallArgs),

    /// Keep checking on the configured interval until interrupted.
    Watch(WatchArgs),

    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Print the update information as JSON.
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Args)]
pub struct InstallArgs {
    /// Install without asking for confirmation.
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,

    /// Do not launch the new version after installing.
    #[arg(long = "no-relaunch")]
    pub no_relaunch: bool,

    /// Directory for the temporary copy used when the in-place copy fails.
    #[arg(long = "staging-dir", value_name = "DIR")]
    pub staging_dir: Option<PathBuf>,
}

#[derive(Args)]
pub struct WatchArgs {
    /// Install updates as soon as they are found.
    #[arg(long = "install")]
    pub install: bool,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_install() {
        let cli = Cli::parse_from([
            "batt-update",
            "--feed-url",
            "http://127.0.0.1:9000/latest",
            "install",
            "-y",
            "--no-relaunch",
        ]);

        assert_eq!(cli.feed_url.as_deref(), Some("http://127.0.0.1:9000/latest"));
        match cli.command {
            Command::Install(args) => {
                assert!(args.yes);
                assert!(args.no_relaunch);
                assert!(args.staging_dir.is_none());
            }
            _ => panic!("expected install command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["batt-update", "check", "--json", "--log-format", "json"]);
        assert!(matches!(cli.log_format, LogFormatArg::Json));
        assert!(matches!(cli.command, Command::Check(CheckArgs { json: true })));
    }
}
