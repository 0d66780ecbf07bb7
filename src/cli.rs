//! Command-line surface of the `updater` binary.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Top-level CLI entry point for the updater.
#[derive(Parser, Debug)]
#[command(
    name = "updater",
    about = "Unattended application updater driven by pluggable update sources",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone)]
pub struct GlobalOpts {
    /// Configuration file (defaults to $UPDATER_CONFIG, then updater.toml
    /// beside the executable, then in the current directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Preview changes without applying
    #[arg(short = 'd', long, global = true)]
    pub dry_run: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Update every configured target
    Run(RunOpts),
    /// Report which targets have an update available, changing nothing
    Check(RunOpts),
    /// List registered update sources
    Sources,
    /// Write an example configuration file
    Init(InitOpts),
    /// Print version information
    Version,
}

impl Command {
    /// Name used for the log file of this command.
    #[must_use]
    pub const fn log_name(&self) -> &'static str {
        match self {
            Self::Run(_) => "run",
            Self::Check(_) => "check",
            Self::Sources => "sources",
            Self::Init(_) => "init",
            Self::Version => "version",
        }
    }
}

/// Options for the `run` and `check` subcommands.
#[derive(Parser, Debug, Clone, Default)]
pub struct RunOpts {
    /// Skip specific targets
    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Process only specific targets
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,
}

/// Options for the `init` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct InitOpts {
    /// Overwrite an existing configuration file
    #[arg(long)]
    pub force: bool,
}
