//! Per-target update state machine and the batch loop over all targets.
//!
//! Each target moves strictly forward through the [`Stage`]s:
//!
//! ```text
//! ResolveSource → LoadFingerprint → Configure → CheckUpdate
//!   ├─ up to date ──────────────────────────────────────────→ skip
//!   └─ stale → GuardProcess
//!                ├─ blocked ────────────────────────────────→ skip
//!                └─ cleared → PreCommands → Cleanup → PerformUpdate
//!                               ├─ no fingerprint ──────────→ error
//!                               └─ PersistFingerprint → PostCommands → done
//! ```
//!
//! Every error (and every panic raised by a source) is caught at the
//! per-target boundary, so one broken target never stops the batch.
mod context;

pub use context::UpdateContext;

use anyhow::{Result, anyhow};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use crate::cleanup;
use crate::config::TargetConfig;
use crate::error::UpdateError;
use crate::fingerprint::{self, VersionFingerprint};
use crate::logging::{TARGET_SPAN, TargetStatus};
use crate::process::{self, GuardDecision, ProcessInfo};
use crate::runner;

/// Steps of the per-target workflow, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Look the source name up in the registry.
    ResolveSource,
    /// Read the installed fingerprint.
    LoadFingerprint,
    /// Hand the target options to the source.
    Configure,
    /// Ask the source whether a newer version exists.
    CheckUpdate,
    /// Make sure the managed process is not running.
    GuardProcess,
    /// Run pre-update commands.
    PreCommands,
    /// Remove stale files.
    Cleanup,
    /// Let the source install the new version.
    PerformUpdate,
    /// Record the new fingerprint.
    PersistFingerprint,
    /// Run post-update commands.
    PostCommands,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ResolveSource => "resolve source",
            Self::LoadFingerprint => "load fingerprint",
            Self::Configure => "configure",
            Self::CheckUpdate => "check for update",
            Self::GuardProcess => "guard process",
            Self::PreCommands => "pre-update commands",
            Self::Cleanup => "cleanup",
            Self::PerformUpdate => "perform update",
            Self::PersistFingerprint => "persist fingerprint",
            Self::PostCommands => "post-update commands",
        })
    }
}

/// Terminal state of one target.
#[derive(Debug)]
pub enum TargetOutcome {
    /// A new version was installed and recorded.
    Updated {
        /// Fingerprint now stored in the marker file.
        fingerprint: VersionFingerprint,
    },
    /// The installed version is current.
    UpToDate,
    /// The managed process is running and may not be stopped.
    Blocked {
        /// Instances found.
        running: Vec<ProcessInfo>,
    },
    /// Dry run: an update is available but nothing was changed.
    DryRun,
    /// The target failed.
    Failed {
        /// Stage that was executing.
        stage: Stage,
        /// What went wrong.
        error: anyhow::Error,
    },
}

impl TargetOutcome {
    /// Summary status for this outcome.
    #[must_use]
    pub const fn status(&self) -> TargetStatus {
        match self {
            Self::Updated { .. } => TargetStatus::Updated,
            Self::UpToDate | Self::Blocked { .. } => TargetStatus::Skipped,
            Self::DryRun => TargetStatus::DryRun,
            Self::Failed { .. } => TargetStatus::Failed,
        }
    }
}

/// Aggregate counts for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Targets updated.
    pub successes: usize,
    /// Targets up to date or blocked by their process.
    pub skips: usize,
    /// Targets that failed.
    pub errors: usize,
    /// Targets with an update available during a dry run.
    pub dry_runs: usize,
}

impl RunSummary {
    /// Whether no target failed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.errors == 0
    }

    fn count(&mut self, status: TargetStatus) {
        match status {
            TargetStatus::Updated => self.successes += 1,
            TargetStatus::Skipped => self.skips += 1,
            TargetStatus::DryRun => self.dry_runs += 1,
            TargetStatus::Failed => self.errors += 1,
        }
    }
}

/// Process every target in order and return the aggregate counts.
///
/// Each target's outcome is also logged and recorded through
/// [`Log::record_target`](crate::logging::Log::record_target).
pub fn run_batch(ctx: &UpdateContext, targets: &[TargetConfig]) -> RunSummary {
    let mut summary = RunSummary::default();
    for target in targets {
        let name = target.display_name();
        ctx.log.stage(&name);
        let _span = tracing::info_span!(TARGET_SPAN, name = %name).entered();
        let outcome = process_target(ctx, target);
        report(ctx, &name, target, &outcome);
        summary.count(outcome.status());
    }
    summary
}

fn report(ctx: &UpdateContext, name: &str, target: &TargetConfig, outcome: &TargetOutcome) {
    let log = &ctx.log;
    match outcome {
        TargetOutcome::Updated { fingerprint } => {
            log.info(&format!("updated to {}", fingerprint.short_hex()));
            log.record_target(name, TargetStatus::Updated, None);
        }
        TargetOutcome::UpToDate => {
            log.info("up to date");
            log.record_target(name, TargetStatus::Skipped, Some("up to date"));
        }
        TargetOutcome::Blocked { running } => {
            let reason = format!(
                "'{}' is running ({} instance(s)) and kill_process is off",
                target.process_name().unwrap_or_default(),
                running.len()
            );
            log.warn(&format!("skipped: {reason}"));
            log.record_target(name, TargetStatus::Skipped, Some(&reason));
        }
        TargetOutcome::DryRun => {
            log.record_target(name, TargetStatus::DryRun, Some("update available"));
        }
        TargetOutcome::Failed { stage, error } => {
            let message = format!("{stage}: {error:#}");
            log.error(&format!("{name}: {message}"));
            log.record_target(name, TargetStatus::Failed, Some(&message));
        }
    }
}

/// Run the full workflow for one target.
///
/// Never fails: errors and panics become [`TargetOutcome::Failed`] annotated
/// with the stage that was executing.
pub fn process_target(ctx: &UpdateContext, target: &TargetConfig) -> TargetOutcome {
    let mut stage = Stage::ResolveSource;
    let result = panic::catch_unwind(AssertUnwindSafe(|| run_stages(ctx, target, &mut stage)));
    match result {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(error)) => TargetOutcome::Failed { stage, error },
        Err(payload) => TargetOutcome::Failed {
            stage,
            error: anyhow!("panicked: {}", panic_message(payload.as_ref())),
        },
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Directory commands run in, when it exists.
fn command_dir(dir: &Path) -> Option<&Path> {
    dir.is_dir().then_some(dir)
}

fn run_stages(
    ctx: &UpdateContext,
    target: &TargetConfig,
    stage: &mut Stage,
) -> Result<TargetOutcome> {
    let log = ctx.log.as_ref();
    let dir = target.directory.as_path();

    *stage = Stage::ResolveSource;
    let mut source = ctx.registry.create(&target.source)?;

    *stage = Stage::LoadFingerprint;
    let installed = fingerprint::load_installed(dir);
    match &installed {
        Some(fp) => log.debug(&format!("installed fingerprint {}", fp.short_hex())),
        None => log.debug("installed version unknown"),
    }

    *stage = Stage::Configure;
    source.configure(&target.options)?;

    *stage = Stage::CheckUpdate;
    if !source.check_for_update(installed.as_ref())? {
        return Ok(TargetOutcome::UpToDate);
    }
    log.info("update available");

    *stage = Stage::GuardProcess;
    if let Some(blocked) = guard_process(ctx, target)? {
        return Ok(blocked);
    }

    if ctx.dry_run {
        preview(ctx, target);
        return Ok(TargetOutcome::DryRun);
    }

    *stage = Stage::PreCommands;
    runner::run_phase(
        ctx.executor.as_ref(),
        "pre-update",
        &target.pre_commands,
        command_dir(dir),
        log,
    )?;

    *stage = Stage::Cleanup;
    if !dir.is_dir() {
        std::fs::create_dir_all(dir).map_err(|e| {
            log.debug(&format!("create {}: {e}", dir.display()));
            UpdateError::TargetUnavailable(dir.to_path_buf())
        })?;
    }
    let policy = target.cleanup_policy();
    if !policy.is_empty() {
        cleanup::apply(dir, &policy, log)?;
    }

    *stage = Stage::PerformUpdate;
    let fingerprint = source
        .perform_update(log, dir)?
        .ok_or_else(|| UpdateError::UpdateFailed {
            source_name: target.source.clone(),
        })?;

    *stage = Stage::PersistFingerprint;
    fingerprint::persist(dir, &fingerprint)?;

    *stage = Stage::PostCommands;
    runner::run_phase(
        ctx.executor.as_ref(),
        "post-update",
        &target.post_commands,
        command_dir(dir),
        log,
    )?;

    Ok(TargetOutcome::Updated { fingerprint })
}

/// Stop the managed process, returning the skip outcome when it is running
/// and may not be stopped.  A dry run only looks.
fn guard_process(ctx: &UpdateContext, target: &TargetConfig) -> Result<Option<TargetOutcome>> {
    let Some(name) = target.process_name() else {
        return Ok(None);
    };

    if ctx.dry_run {
        let running = ctx.processes.find(name);
        if running.is_empty() {
            return Ok(None);
        }
        if !target.kill_process {
            return Ok(Some(TargetOutcome::Blocked { running }));
        }
        ctx.log.dry_run(&format!(
            "would stop {} instance(s) of '{name}'",
            running.len()
        ));
        return Ok(None);
    }

    let decision = process::ensure_stopped(
        ctx.processes.as_ref(),
        name,
        target.kill_process,
        ctx.log.as_ref(),
    )?;
    Ok(match decision {
        GuardDecision::Blocked { running } => Some(TargetOutcome::Blocked { running }),
        GuardDecision::Proceed { .. } => None,
    })
}

/// Describe what a real run would do after the guard.
fn preview(ctx: &UpdateContext, target: &TargetConfig) {
    let log = ctx.log.as_ref();
    for command in &target.pre_commands {
        log.dry_run(&format!("would run pre-update command '{}'", command.program));
    }
    let policy = target.cleanup_policy();
    if policy.clean_all {
        log.dry_run(&format!(
            "would clean {} (keeping {} exception(s))",
            target.directory.display(),
            policy.exceptions.len()
        ));
    }
    for path in &policy.paths {
        log.dry_run(&format!("would remove {}", path.display()));
    }
    log.dry_run(&format!(
        "would install via '{}' into {}",
        target.source,
        target.directory.display()
    ));
    for command in &target.post_commands {
        log.dry_run(&format!("would run post-update command '{}'", command.program));
    }
}
