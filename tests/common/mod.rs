// Shared helpers for integration tests.
//
// Provides a temporary-directory-backed workspace holding an `updater.toml`
// and the target directories it names, plus fakes for the update source,
// command executor and process table so batches run without touching the
// network or the host's processes.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use serde::Deserialize;

use updater_cli::config::UpdaterConfig;
use updater_cli::error::SourceError;
use updater_cli::exec::{ExecResult, Executor};
use updater_cli::fingerprint::{self, VersionFingerprint};
use updater_cli::logging::{Log, Logger};
use updater_cli::orchestrator::UpdateContext;
use updater_cli::process::{ProcessControl, ProcessInfo};
use updater_cli::sources::{SourceRegistry, UpdateSource, parse_options};

/// Name the fake source is registered under.
pub const FAKE_SOURCE: &str = "fake";

/// Shared, ordered record of what fakes were asked to do.
pub type Journal = Arc<Mutex<Vec<String>>>;

/// Options accepted by [`FakeSource`] through `[target.options]`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FakeOptions {
    /// Tag of the "remote" release.
    tag: String,
    /// File written into the target on update.
    #[serde(default = "default_file")]
    file: String,
    /// When set, `perform_update` fails with this message.
    #[serde(default)]
    fail: Option<String>,
}

fn default_file() -> String {
    "app.bin".to_string()
}

/// Update source driven entirely by its option table.
#[derive(Debug)]
pub struct FakeSource {
    options: Option<FakeOptions>,
    journal: Journal,
}

impl FakeSource {
    fn options(&self) -> Result<&FakeOptions, SourceError> {
        self.options
            .as_ref()
            .ok_or_else(|| SourceError::NotConfigured(FAKE_SOURCE.to_string()))
    }

    fn note(&self, entry: String) {
        self.journal.lock().expect("journal lock").push(entry);
    }
}

impl UpdateSource for FakeSource {
    fn configure(&mut self, options: &toml::Table) -> Result<()> {
        self.options = Some(parse_options(FAKE_SOURCE, options)?);
        Ok(())
    }

    fn check_for_update(&mut self, current: Option<&VersionFingerprint>) -> Result<bool> {
        let tag = self.options()?.tag.clone();
        self.note(format!("check {tag}"));
        Ok(fingerprint::is_stale(
            current,
            &VersionFingerprint::from_tag(&tag),
        ))
    }

    fn perform_update(
        &mut self,
        log: &dyn Log,
        target_dir: &Path,
    ) -> Result<Option<VersionFingerprint>> {
        let options = self.options()?;
        let (tag, file, fail) = (
            options.tag.clone(),
            options.file.clone(),
            options.fail.clone(),
        );
        self.note(format!("update {tag}"));
        if let Some(message) = fail {
            anyhow::bail!(message);
        }
        log.debug(&format!("fake install of {tag}"));
        std::fs::write(target_dir.join(file), &tag)?;
        Ok(Some(VersionFingerprint::from_tag(&tag)))
    }
}

/// Built-in sources plus [`FakeSource`] recording into the returned journal.
pub fn fake_registry() -> (SourceRegistry, Journal) {
    let journal = Journal::default();
    let mut registry = SourceRegistry::with_builtin();
    let shared = Arc::clone(&journal);
    registry.register(FAKE_SOURCE, move || {
        Box::new(FakeSource {
            options: None,
            journal: Arc::clone(&shared),
        })
    });
    (registry, journal)
}

/// Executor that records commands instead of running them.
///
/// A program named `fail` exits with code 1.
#[derive(Debug)]
pub struct RecordingExecutor {
    journal: Journal,
}

impl RecordingExecutor {
    pub fn new(journal: Journal) -> Self {
        Self { journal }
    }

    fn record(&self, program: &str, args: &[&str]) -> ExecResult {
        let line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        self.journal
            .lock()
            .expect("journal lock")
            .push(format!("exec {line}"));
        let success = program != "fail";
        ExecResult {
            stdout: String::new(),
            stderr: if success { String::new() } else { "failed".to_string() },
            success,
            code: Some(i32::from(!success)),
        }
    }
}

impl Executor for RecordingExecutor {
    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        Ok(self.record(program, args))
    }

    fn run_unchecked_in(&self, _dir: &Path, program: &str, args: &[&str]) -> Result<ExecResult> {
        Ok(self.record(program, args))
    }
}

/// In-memory process table.  Terminated processes disappear.
#[derive(Debug, Default)]
pub struct FakeProcesses {
    running: Mutex<Vec<ProcessInfo>>,
}

impl FakeProcesses {
    pub fn with_running(names: &[&str]) -> Self {
        let running = names
            .iter()
            .zip(100u32..)
            .map(|(name, pid)| ProcessInfo {
                pid,
                name: (*name).to_string(),
            })
            .collect();
        Self {
            running: Mutex::new(running),
        }
    }

    pub fn running(&self) -> Vec<ProcessInfo> {
        self.running.lock().expect("process lock").clone()
    }

    fn remove(&self, pid: u32) -> bool {
        let mut running = self.running.lock().expect("process lock");
        let before = running.len();
        running.retain(|p| p.pid != pid);
        running.len() != before
    }
}

impl ProcessControl for FakeProcesses {
    fn find(&self, name: &str) -> Vec<ProcessInfo> {
        self.running()
            .into_iter()
            .filter(|p| updater_cli::process::name_matches(&p.name, name))
            .collect()
    }

    fn terminate(&self, pid: u32) -> Option<bool> {
        Some(self.remove(pid))
    }

    fn kill(&self, pid: u32) -> bool {
        self.remove(pid)
    }
}

/// An isolated workspace backed by a [`tempfile::TempDir`].
///
/// Holds `updater.toml` at its root; relative target directories in the
/// configuration therefore resolve inside the workspace.
pub struct IntegrationTestContext {
    /// Temporary directory containing the configuration and targets.
    pub root: tempfile::TempDir,
    /// Everything the fakes were asked to do, in order.
    pub journal: Journal,
    /// Process table seen by the batch.
    pub processes: Arc<FakeProcesses>,
    registry: Arc<SourceRegistry>,
}

impl IntegrationTestContext {
    /// Create an empty workspace with no processes running.
    pub fn new() -> Self {
        let (registry, journal) = fake_registry();
        Self {
            root: tempfile::tempdir().expect("create temp dir"),
            journal,
            processes: Arc::new(FakeProcesses::default()),
            registry: Arc::new(registry),
        }
    }

    /// Path to the workspace root.
    pub fn root_path(&self) -> &Path {
        self.root.path()
    }

    /// Path to `updater.toml`.
    pub fn config_path(&self) -> PathBuf {
        self.root.path().join("updater.toml")
    }

    /// Directory of a target named relative to the workspace.
    pub fn target_dir(&self, relative: &str) -> PathBuf {
        self.root.path().join(relative)
    }

    /// Load the workspace configuration.
    pub fn load_config(&self) -> UpdaterConfig {
        UpdaterConfig::load(&self.config_path()).expect("load config")
    }

    /// Context wired to the workspace fakes.
    pub fn update_context(&self, log: Arc<Logger>, dry_run: bool) -> UpdateContext {
        UpdateContext::new(
            Arc::clone(&self.registry),
            Arc::new(RecordingExecutor::new(Arc::clone(&self.journal))),
            Arc::clone(&self.processes) as Arc<dyn ProcessControl>,
            log,
        )
        .with_dry_run(dry_run)
    }

    /// Snapshot of the journal.
    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().expect("journal lock").clone()
    }

    /// Installed fingerprint of a target, if any.
    pub fn installed(&self, relative: &str) -> Option<VersionFingerprint> {
        fingerprint::load_installed(&self.target_dir(relative))
    }
}

/// Fluent builder for [`IntegrationTestContext`].
pub struct TestContextBuilder {
    ctx: IntegrationTestContext,
}

impl TestContextBuilder {
    /// Begin building an empty workspace.
    pub fn new() -> Self {
        Self {
            ctx: IntegrationTestContext::new(),
        }
    }

    /// Write `content` as the workspace `updater.toml`.
    pub fn with_config(self, content: &str) -> Self {
        std::fs::write(self.ctx.config_path(), content).expect("write updater.toml");
        self
    }

    /// Create a file (and its parents) inside the workspace.
    pub fn with_file(self, relative: &str, content: &str) -> Self {
        let path = self.ctx.root.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dir");
        }
        std::fs::write(&path, content).expect("write file");
        self
    }

    /// Record `tag` as the installed version of a target.
    pub fn with_installed(self, relative: &str, tag: &str) -> Self {
        let dir = self.ctx.target_dir(relative);
        std::fs::create_dir_all(&dir).expect("create target dir");
        fingerprint::persist(&dir, &VersionFingerprint::from_tag(tag)).expect("persist marker");
        self
    }

    /// Pretend processes with these names are running.
    pub fn with_running(mut self, names: &[&str]) -> Self {
        self.ctx.processes = Arc::new(FakeProcesses::with_running(names));
        self
    }

    /// Finish building and return the configured context.
    pub fn build(self) -> IntegrationTestContext {
        self.ctx
    }
}
