//! relayctl CLI
//!
//! Command-line front end for a client or server relay. `run` keeps the
//! relay connected, restarting it after failures, and takes start/stop
//! commands on stdin. `config` and `settings` manage the files the
//! controller reads.

use clap::{Parser, Subcommand};
use relayctl_core::{AppError, Role};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod admin;
mod session;

/// relayctl - keep a relay client or server running
#[derive(Parser, Debug)]
#[command(name = "relayctl")]
#[command(version, about, long_about = None)]
struct Args {
    /// Settings database location
    #[arg(long, global = true, env = "RELAYCTL_SETTINGS")]
    settings: Option<PathBuf>,

    /// Output format: text or json
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the relay and supervise it until quit
    Run(session::RunOptions),

    /// Create, check and describe relay configuration files
    #[command(subcommand)]
    Config(admin::ConfigCommand),

    /// Show or change persisted controller settings
    #[command(subcommand)]
    Settings(admin::SettingsCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging; stdout is reserved for events
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let json_output = matches!(args.format, OutputFormat::Json);

    let result = match args.command {
        Command::Run(options) => session::run(options, args.settings, json_output).await,
        Command::Config(command) => admin::config(command, args.settings, json_output),
        Command::Settings(command) => admin::settings(command, args.settings, json_output),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Parse a role argument
pub(crate) fn parse_role(value: &str) -> Result<Role, AppError> {
    value.parse()
}
