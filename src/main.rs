//! Command-line entry point for the updater.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;

use updater_cli::cli::{Cli, Command};
use updater_cli::commands;
use updater_cli::logging::{self, Logger};

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = Cli::parse();
    let name = args.command.log_name();
    logging::init_subscriber(args.verbose, name);
    let log = Arc::new(Logger::new(name));

    match args.command {
        Command::Run(opts) => commands::run::run(&args.global, &opts, &log),
        Command::Check(opts) => commands::check::run(&args.global, &opts, &log),
        Command::Sources => {
            commands::sources::run();
            Ok(())
        }
        Command::Init(opts) => commands::init::run(&args.global, &opts, &log),
        Command::Version => {
            commands::version::run();
            Ok(())
        }
    }
}
