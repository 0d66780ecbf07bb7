//! Command: report which targets have an update available.
use anyhow::Result;
use std::sync::Arc;

use super::{CommandSetup, run_targets_to_completion, select_targets};
use crate::cli::{GlobalOpts, RunOpts};
use crate::logging::Logger;

/// Run every selected target in dry-run mode.
///
/// Sources are configured and queried, and running processes are looked
/// up, but nothing on disk or in the process table is changed.
///
/// # Errors
///
/// Returns an error if configuration loading fails or any target fails its
/// check.
pub fn run(global: &GlobalOpts, opts: &RunOpts, log: &Arc<Logger>) -> Result<()> {
    let setup = CommandSetup::init(global, log)?;
    let targets = select_targets(&setup.config.targets, opts);
    if targets.is_empty() {
        log.warn("no targets selected");
        return Ok(());
    }

    let ctx = setup.context(log, true);
    let summary = run_targets_to_completion(&ctx, &targets, log)?;
    log.info(&format!(
        "{} update(s) available, {} target(s) current or blocked",
        summary.dry_runs, summary.skips
    ));
    Ok(())
}
