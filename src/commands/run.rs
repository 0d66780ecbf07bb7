//! Command: update every configured target.
use anyhow::Result;
use std::sync::Arc;

use super::{CommandSetup, run_targets_to_completion, select_targets};
use crate::cli::{GlobalOpts, RunOpts};
use crate::logging::Logger;

/// Run the update command.
///
/// # Errors
///
/// Returns an error if configuration loading fails or any target fails.
pub fn run(global: &GlobalOpts, opts: &RunOpts, log: &Arc<Logger>) -> Result<()> {
    log.info(&format!("updater {}", super::version::current()));

    let setup = CommandSetup::init(global, log)?;
    let targets = select_targets(&setup.config.targets, opts);
    if targets.is_empty() {
        log.warn("no targets selected");
        return Ok(());
    }

    if global.dry_run {
        log.dry_run("dry run: nothing will be changed");
    }
    let ctx = setup.context(log, global.dry_run);
    run_targets_to_completion(&ctx, &targets, log)?;
    Ok(())
}
