//! Updater configuration: the ordered list of update targets.
//!
//! Configuration lives in a single TOML file containing one `[[target]]`
//! table per managed application:
//!
//! ```toml
//! [[target]]
//! name = "billing"
//! source = "github"
//! directory = "apps/billing"
//! process = "billing-service"
//! kill_process = true
//! clean_all = true
//! cleanup_exceptions = ["appsettings.json"]
//!
//! [[target.pre_command]]
//! program = "systemctl"
//! arguments = "stop billing"
//! safe = true
//!
//! [target.options]
//! repository = "acme/billing"
//! ```
pub mod example;
pub mod toml_loader;
pub mod validation;

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cleanup::CleanupPolicy;
use crate::error::ConfigError;

/// All configured update targets, in processing order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdaterConfig {
    /// Targets in the order they appear in the file.
    #[serde(default, rename = "target")]
    pub targets: Vec<TargetConfig>,
}

/// One independently configured update target.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    /// Display name; defaults to the final component of `directory`.
    #[serde(default)]
    pub name: Option<String>,
    /// Registered name of the update source.
    pub source: String,
    /// Directory holding the installed application.
    pub directory: PathBuf,
    /// Name of the process that must not be running during the update.
    #[serde(default)]
    pub process: Option<String>,
    /// Whether a running `process` may be terminated.
    #[serde(default)]
    pub kill_process: bool,
    /// Delete everything in `directory` except `cleanup_exceptions`.
    #[serde(default)]
    pub clean_all: bool,
    /// File names or paths preserved by `clean_all`.
    #[serde(default)]
    pub cleanup_exceptions: Vec<String>,
    /// Paths (relative to `directory` or absolute) deleted before updating.
    #[serde(default)]
    pub cleanup_paths: Vec<PathBuf>,
    /// Commands run, in order, before files are touched.
    #[serde(default, rename = "pre_command")]
    pub pre_commands: Vec<CommandSpec>,
    /// Commands run, in order, after the new fingerprint is persisted.
    #[serde(default, rename = "post_command")]
    pub post_commands: Vec<CommandSpec>,
    /// Source-specific options, passed through untouched.
    #[serde(default)]
    pub options: toml::Table,
}

/// An operator-supplied command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandSpec {
    /// Program to launch.
    pub program: String,
    /// Argument string, split with POSIX shell quoting rules.
    #[serde(default)]
    pub arguments: Option<String>,
    /// When `true`, a failure is logged as a warning and the phase continues.
    #[serde(default)]
    pub safe: bool,
}

impl TargetConfig {
    /// Name used in log output and the run summary.
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.directory.file_name().map_or_else(
            || self.directory.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        )
    }

    /// Cleanup policy derived from the `clean_all`, `cleanup_exceptions` and
    /// `cleanup_paths` settings.
    #[must_use]
    pub fn cleanup_policy(&self) -> CleanupPolicy {
        CleanupPolicy {
            clean_all: self.clean_all,
            exceptions: self.cleanup_exceptions.clone(),
            paths: self.cleanup_paths.clone(),
        }
    }

    /// Process name, treating an empty string as absent.
    #[must_use]
    pub fn process_name(&self) -> Option<&str> {
        self.process.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }
}

impl UpdaterConfig {
    /// Load the configuration file at `path`.
    ///
    /// Relative target directories are resolved against the directory that
    /// contains the configuration file, so scheduled runs do not depend on
    /// the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the file does not exist, or a
    /// read/parse error otherwise.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config: Self = toml_loader::load_toml(path)?;
        if let Some(base) = path.parent() {
            for target in &mut config.targets {
                if target.directory.is_relative() {
                    target.directory = base.join(&target.directory);
                }
            }
        }
        Ok(config)
    }
}
