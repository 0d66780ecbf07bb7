//! Collaborators shared by every target in a batch.
use std::sync::Arc;

use crate::exec::Executor;
use crate::logging::Log;
use crate::process::ProcessControl;
use crate::sources::SourceRegistry;

/// Collaborators shared by every target of a run.
///
/// Built once at startup and passed explicitly; nothing in the orchestrator
/// reaches for process-wide state.
pub struct UpdateContext {
    /// Registered update sources.
    pub registry: Arc<SourceRegistry>,
    /// Launches pre- and post-update commands.
    pub executor: Arc<dyn Executor>,
    /// Finds and stops managed processes.
    pub processes: Arc<dyn ProcessControl>,
    /// Logger for output and target recording.
    pub log: Arc<dyn Log>,
    /// Check every target but change nothing.
    pub dry_run: bool,
}

impl std::fmt::Debug for UpdateContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateContext")
            .field("registry", &self.registry)
            .field("executor", &self.executor)
            .field("processes", &"<dyn ProcessControl>")
            .field("log", &"<dyn Log>")
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl UpdateContext {
    /// Create a context for a real (non dry-run) pass.
    #[must_use]
    pub fn new(
        registry: Arc<SourceRegistry>,
        executor: Arc<dyn Executor>,
        processes: Arc<dyn ProcessControl>,
        log: Arc<dyn Log>,
    ) -> Self {
        Self {
            registry,
            executor,
            processes,
            log,
            dry_run: false,
        }
    }

    /// Return this context with dry-run mode set to `dry_run`.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}
