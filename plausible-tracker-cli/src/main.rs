//! Plausible Tracker CLI - Command-line interface
//!
//! Runs the tracker outside a browser: send events, check exclusion rules,
//! classify link clicks, and manage the native configuration file.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::check::CheckArgs;
use commands::classify::ClassifyArgs;
use commands::config::ConfigCommands;
use commands::send::SendArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "plausible-tracker", version, about)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Send an event for a page
    Send(SendArgs),

    /// Check whether a page view for a path would be excluded
    Check(CheckArgs),

    /// Show how a click on a link would be reported
    Classify(ClassifyArgs),

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config_file.as_deref();
    match cli.command {
        Commands::Send(args) => commands::send::run(args, config_path),
        Commands::Check(args) => commands::check::run(args, config_path),
        Commands::Classify(args) => commands::classify::run(args, config_path),
        Commands::Config(command) => commands::config::run(command, config_path),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    plausible_tracker::logging::init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
