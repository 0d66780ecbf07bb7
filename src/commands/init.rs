//! Command: write an example configuration file.
use anyhow::Result;

use crate::cli::{GlobalOpts, InitOpts};
use crate::config::example;
use crate::logging::Logger;

/// Write the example configuration to the resolved config path.
///
/// # Errors
///
/// Returns an error if the file exists and `--force` was not given, or the
/// file cannot be written.
pub fn run(global: &GlobalOpts, opts: &InitOpts, log: &Logger) -> Result<()> {
    let path = super::resolve_config_path(global)?;
    if global.dry_run {
        log.dry_run(&format!("would write {}", path.display()));
        return Ok(());
    }
    example::write_example(&path, opts.force)?;
    log.info(&format!("wrote {}", path.display()));
    Ok(())
}
