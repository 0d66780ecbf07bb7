//! Commented example configuration written by `updater init`.
use anyhow::{Context as _, Result, bail};
use std::path::Path;

/// Example configuration covering every target setting.
pub const EXAMPLE_CONFIG: &str = r#"# Updater configuration.
#
# Each [[target]] table describes one installed application. Targets are
# processed in the order they appear; a failure in one never stops the rest.

[[target]]
# Name shown in logs and the summary. Defaults to the directory name.
name = "billing"
# Registered update source (see `updater sources`).
source = "github"
# Installation directory. Relative paths resolve against this file.
directory = "apps/billing"
# Process that must not be running while files are replaced.
process = "billing-service"
# Terminate the process instead of skipping the target when it is running.
kill_process = true
# Remove everything in the directory before updating, except these entries.
# The `versionhash` marker is always kept.
clean_all = true
cleanup_exceptions = ["appsettings.json", "logs"]

# Commands run before cleanup. A command marked `safe` only warns on failure.
[[target.pre_command]]
program = "systemctl"
arguments = "stop billing"
safe = true

# Commands run after the new version is recorded.
[[target.post_command]]
program = "systemctl"
arguments = "start billing"

# Options handed to the `github` source.
[target.options]
repository = "acme/billing"
# api_url = "https://api.github.com"
# token = "ghp_..."
# assets = ["billing-linux-x64.tar.gz"]
include_prereleases = false

[[target]]
name = "reports"
source = "directory"
directory = "apps/reports"
# Delete only these paths before updating.
cleanup_paths = ["cache", "tmp/report.lock"]

[target.options]
# Mounted share that receives new builds; must contain a VERSION file.
path = "/mnt/builds/reports"
# version_file = "VERSION"
"#;

/// Write [`EXAMPLE_CONFIG`] to `path`.
///
/// # Errors
///
/// Returns an error if `path` already exists and `force` is false, or if the
/// file cannot be written.
pub fn write_example(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, EXAMPLE_CONFIG).with_context(|| format!("writing {}", path.display()))
}
