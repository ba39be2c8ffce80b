//! Command-line interface definitions.
//!
//! Defines the CLI for the plutus engine using `clap`: running the engine,
//! reading its status file, verifying the audit log and checking config.

pub mod audit;
pub mod check;
pub mod output;
pub mod run;
pub mod status;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Structural arbitrage detection and execution engine
#[derive(Parser, Debug)]
#[command(name = "plutus")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the engine in the foreground until Ctrl-C
    Run(RunArgs),

    /// Show the status written by a running engine
    Status(StatusArgs),

    /// Inspect the ledger audit log
    #[command(subcommand)]
    Audit(AuditCommand),

    /// Run diagnostic checks
    #[command(subcommand)]
    Check(CheckCommand),
}

/// Subcommands for `plutus audit`.
#[derive(Subcommand, Debug)]
pub enum AuditCommand {
    /// Replay the stored audit log from genesis and check every entry
    Verify(AuditVerifyArgs),

    /// Release reservations left open by a previous run (stop the engine first)
    Release(AuditReleaseArgs),
}

/// Subcommands for `plutus check`.
#[derive(Subcommand, Debug)]
pub enum CheckCommand {
    /// Validate configuration file
    Config(ConfigPathArg),
}

/// Shared argument for commands that only need a config path.
#[derive(Parser, Debug)]
pub struct ConfigPathArg {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Detect and size opportunities but fill against the paper gateway
    #[arg(long)]
    pub dry_run: bool,

    /// Override log level (debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Use JSON log format instead of pretty
    #[arg(long)]
    pub json_logs: bool,

    /// Override the status file path
    #[arg(long)]
    pub status_file: Option<PathBuf>,

    /// Override the ledger database path
    #[arg(long)]
    pub database: Option<PathBuf>,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Status file written by `plutus run`
    #[arg(long, default_value = "plutus-status.json")]
    pub status_file: PathBuf,

    /// Print the raw JSON snapshot
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `audit verify` subcommand.
#[derive(Parser, Debug)]
pub struct AuditVerifyArgs {
    /// Ledger database to verify
    #[arg(long)]
    pub database: PathBuf,
}

/// Arguments for the `audit release` subcommand.
#[derive(Parser, Debug)]
pub struct AuditReleaseArgs {
    /// Ledger database holding the reservations
    #[arg(long)]
    pub database: PathBuf,

    /// Reservation number to release; repeat for several
    #[arg(long = "reservation", value_name = "ID", required_unless_present = "all")]
    pub reservations: Vec<u64>,

    /// Release every open reservation
    #[arg(long, conflicts_with = "reservations")]
    pub all: bool,
}
