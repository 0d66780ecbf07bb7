//! Core logging types: target entries, status, and the [`Log`] trait.

/// Per-target outcome for summary reporting.
#[derive(Debug, Clone)]
pub struct TargetEntry {
    /// Human-readable target name.
    pub name: String,
    /// Final status of the target.
    pub status: TargetStatus,
    /// Optional detail message (e.g., skip reason or error description).
    pub message: Option<String>,
}

/// Status of a processed target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    /// A new version was installed.
    Updated,
    /// Nothing was changed (already current, or the process blocked the update).
    Skipped,
    /// The target was evaluated in dry-run mode; nothing was changed.
    DryRun,
    /// The target failed at some stage of the update.
    Failed,
}

/// Abstraction over logging backends.
///
/// The orchestrator and every [`UpdateSource`](crate::sources::UpdateSource)
/// log through this trait so that tests can capture output without a global
/// subscriber.
pub trait Log: Send + Sync {
    /// Log a stage header (major section).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (may be suppressed on console).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Log a dry-run action message.
    fn dry_run(&self, msg: &str);
    /// Record a target result for the summary.
    fn record_target(&self, name: &str, status: TargetStatus, message: Option<&str>);
}
