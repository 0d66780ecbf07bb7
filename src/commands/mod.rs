//! Shared setup for subcommands: config resolution, target selection and
//! running a batch to completion.
pub mod check;
pub mod init;
pub mod run;
pub mod sources;
pub mod version;

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::{GlobalOpts, RunOpts};
use crate::config::{TargetConfig, UpdaterConfig, validation};
use crate::exec::SystemExecutor;
use crate::logging::{Log, Logger};
use crate::orchestrator::{self, RunSummary, UpdateContext};
use crate::process::SystemProcessControl;
use crate::sources::SourceRegistry;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "UPDATER_CONFIG";

/// File name looked up beside the executable and in the current directory.
pub const CONFIG_FILE_NAME: &str = "updater.toml";

/// Shared state produced by the common command setup sequence.
#[derive(Debug)]
pub struct CommandSetup {
    /// Configuration file that was loaded.
    pub config_path: PathBuf,
    /// Parsed configuration.
    pub config: UpdaterConfig,
    /// Sources available to targets.
    pub registry: Arc<SourceRegistry>,
}

impl CommandSetup {
    /// Resolve and load the configuration, then log validation warnings.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is missing or malformed.
    pub fn init(global: &GlobalOpts, log: &Logger) -> Result<Self> {
        let config_path = resolve_config_path(global)?;

        log.stage("Loading configuration");
        log.info(&format!("config: {}", config_path.display()));
        let config = UpdaterConfig::load(&config_path)?;
        let registry = Arc::new(SourceRegistry::with_builtin());

        for target in &config.targets {
            log.debug(&format!(
                "{}: source={} directory={}",
                target.display_name(),
                target.source,
                target.directory.display()
            ));
        }
        log.info(&format!("loaded {} target(s)", config.targets.len()));

        let warnings = validation::validate_all(&config, &registry.names());
        if !warnings.is_empty() {
            log.warn(&format!(
                "found {} configuration warning(s):",
                warnings.len()
            ));
            for warning in &warnings {
                log.warn(&format!("  {warning}"));
            }
        }

        Ok(Self {
            config_path,
            config,
            registry,
        })
    }

    /// Build the production context for a batch.
    #[must_use]
    pub fn context(&self, log: &Arc<Logger>, dry_run: bool) -> UpdateContext {
        let log = Arc::clone(log) as Arc<dyn Log>;
        UpdateContext::new(
            Arc::clone(&self.registry),
            Arc::new(SystemExecutor),
            Arc::new(SystemProcessControl::new()),
            log,
        )
        .with_dry_run(dry_run)
    }
}

/// Locate the configuration file.
///
/// Resolution order: `--config`, `$UPDATER_CONFIG`, `updater.toml` beside the
/// executable, then `updater.toml` in the current directory.  The last
/// candidate is returned even when it does not exist so that loading reports
/// the path that was expected.
///
/// # Errors
///
/// Returns an error if the current directory cannot be determined.
pub fn resolve_config_path(global: &GlobalOpts) -> Result<PathBuf> {
    let from_env = std::env::var_os(CONFIG_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    let cwd = std::env::current_dir()?;
    Ok(pick_config_path(
        global.config.as_deref(),
        from_env,
        exe_dir.as_deref(),
        &cwd,
    ))
}

fn pick_config_path(
    explicit: Option<&Path>,
    from_env: Option<PathBuf>,
    exe_dir: Option<&Path>,
    cwd: &Path,
) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(path) = from_env {
        return path;
    }
    if let Some(dir) = exe_dir {
        let beside = dir.join(CONFIG_FILE_NAME);
        if beside.is_file() {
            return beside;
        }
    }
    cwd.join(CONFIG_FILE_NAME)
}

/// Apply `--only` and `--skip` to the configured targets.
///
/// Matching is a case-insensitive substring test on the display name.
/// `--only` wins when both are given.
#[must_use]
pub fn select_targets(targets: &[TargetConfig], opts: &RunOpts) -> Vec<TargetConfig> {
    targets
        .iter()
        .filter(|t| {
            let name = t.display_name().to_lowercase();
            if !opts.only.is_empty() {
                return opts.only.iter().any(|o| name.contains(&o.to_lowercase()));
            }
            if !opts.skip.is_empty() {
                return !opts.skip.iter().any(|s| name.contains(&s.to_lowercase()));
            }
            true
        })
        .cloned()
        .collect()
}

/// Run the batch, print the summary, and bail if any target failed.
///
/// # Errors
///
/// Returns an error if one or more targets recorded a failure.
pub fn run_targets_to_completion(
    ctx: &UpdateContext,
    targets: &[TargetConfig],
    log: &Logger,
) -> Result<RunSummary> {
    let summary = orchestrator::run_batch(ctx, targets);

    log.print_summary();

    if !summary.is_success() {
        anyhow::bail!("{} target(s) failed", summary.errors);
    }
    Ok(summary)
}
