use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "wsc",
    about = "Working status cache: incremental git status with change coalescing",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log cache decisions at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Cache configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Replay a scenario against an in-memory repository and print every
    /// published snapshot
    Replay(ReplayArgs),
    /// Print the effective cache configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct ReplayArgs {
    /// Scenario file (TOML)
    pub scenario: PathBuf,
    /// Only print the final snapshot and counters
    #[arg(long)]
    pub summary: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Check the configuration and exit without printing it
    #[arg(long)]
    pub check: bool,
}
