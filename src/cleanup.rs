//! Removal of stale files from a target directory before an update.
//!
//! Two policies exist and both may apply to one target: *clean-all* removes
//! everything except an exception list, the *explicit list* removes only the
//! named paths.  Under every policy the fingerprint marker survives.
//!
//! Traversal is iterative and bounded by two invariants:
//!
//! - a directory is entered only when its canonical path lies inside the
//!   canonical target directory, compared component-wise;
//! - every canonical directory is entered at most once per [`Cleaner`].
//!
//! Symbolic links are removed as links and never followed, so a link pointing
//! outside the target directory can never cause deletions there.
use anyhow::{Context as _, Result};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

use crate::fingerprint;
use crate::logging::Log;

/// How a target directory is cleaned before an update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupPolicy {
    /// Remove everything except `exceptions` and the marker.
    pub clean_all: bool,
    /// Bare file names or paths kept by `clean_all`.
    pub exceptions: Vec<String>,
    /// Paths removed regardless of `clean_all`.
    pub paths: Vec<PathBuf>,
}

impl CleanupPolicy {
    /// Whether the policy removes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !self.clean_all && self.paths.is_empty()
    }
}

/// An entry that could not be removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    /// Path that was left behind.
    pub path: PathBuf,
    /// Why removal failed.
    pub reason: String,
}

/// Outcome of a cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Files, links and directories removed.
    pub removed: usize,
    /// Entries kept because of the marker rule or an exception.
    pub kept: usize,
    /// Distinct canonical directories entered.
    pub directories_scanned: usize,
    /// Listed or linked paths refused because they resolve outside the target.
    pub escaped: Vec<PathBuf>,
    /// Entries that could not be removed.
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    fn fail(&mut self, path: &Path, err: &io::Error) {
        self.failures.push(CleanupFailure {
            path: path.to_path_buf(),
            reason: err.to_string(),
        });
    }
}

/// Exception list resolved against the target directory.
#[derive(Debug, Default)]
struct Exceptions {
    names: HashSet<String>,
    paths: HashSet<PathBuf>,
}

impl Exceptions {
    fn resolve(base: &Path, raw: &[String]) -> Self {
        let mut exceptions = Self::default();
        for entry in raw {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            exceptions.names.insert(entry.to_string());
            let path = base.join(entry);
            exceptions
                .paths
                .insert(dunce::canonicalize(&path).unwrap_or(path));
        }
        exceptions
    }

    fn matches(&self, path: &Path, name: &OsStr) -> bool {
        self.names.contains(&*name.to_string_lossy()) || self.paths.contains(path)
    }
}

enum Work {
    Scan(PathBuf),
    RemoveDir(PathBuf),
}

/// Cleanup engine bound to one target directory.
#[derive(Debug)]
pub struct Cleaner {
    base: PathBuf,
    visited: HashSet<PathBuf>,
}

impl Cleaner {
    /// Bind a cleaner to `base`, which must exist.
    ///
    /// # Errors
    ///
    /// Returns an error if `base` cannot be canonicalized.
    pub fn new(base: &Path) -> Result<Self> {
        let base = dunce::canonicalize(base)
            .with_context(|| format!("resolving target directory {}", base.display()))?;
        Ok(Self {
            base,
            visited: HashSet::new(),
        })
    }

    /// Canonical target directory.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Remove every entry of the target directory except the marker and
    /// `exceptions`.
    pub fn clean_all(&mut self, exceptions: &[String]) -> CleanupReport {
        let exceptions = Exceptions::resolve(&self.base, exceptions);
        let mut report = CleanupReport::default();
        self.visited.clear();
        let root = self.base.clone();
        self.clean_tree(&root, &exceptions, false, &mut report);
        report
    }

    /// Remove the listed paths, directories recursively.
    ///
    /// Relative paths resolve against the target directory.  Paths that
    /// resolve outside it are refused and reported in
    /// [`CleanupReport::escaped`].
    pub fn remove_listed(&mut self, paths: &[PathBuf]) -> CleanupReport {
        let mut report = CleanupReport::default();
        let none = Exceptions::default();
        // Directories entered by an earlier clean-all pass still need removing.
        self.visited.clear();

        for listed in paths {
            let path = if listed.is_absolute() {
                listed.clone()
            } else {
                self.base.join(listed)
            };

            if path
                .file_name()
                .is_some_and(|n| fingerprint::is_marker_name(&n.to_string_lossy()))
            {
                report.kept += 1;
                continue;
            }

            let Ok(meta) = std::fs::symlink_metadata(&path) else {
                continue;
            };

            if meta.file_type().is_symlink() {
                // Judge the link by where it lives, not where it points.
                let parent_inside = path
                    .parent()
                    .and_then(|p| dunce::canonicalize(p).ok())
                    .is_some_and(|p| p.starts_with(&self.base));
                if parent_inside {
                    remove_link(&path, &mut report);
                } else {
                    report.escaped.push(listed.clone());
                }
                continue;
            }

            let canonical = match dunce::canonicalize(&path) {
                Ok(canonical) => canonical,
                Err(e) => {
                    report.fail(&path, &e);
                    continue;
                }
            };
            if canonical == self.base || !canonical.starts_with(&self.base) {
                report.escaped.push(listed.clone());
                continue;
            }

            if meta.is_dir() {
                self.clean_tree(&canonical, &none, true, &mut report);
            } else {
                match std::fs::remove_file(&canonical) {
                    Ok(()) => report.removed += 1,
                    Err(e) => report.fail(&canonical, &e),
                }
            }
        }
        report
    }

    /// Iterative post-order removal below `root`.
    fn clean_tree(
        &mut self,
        root: &Path,
        exceptions: &Exceptions,
        remove_root: bool,
        report: &mut CleanupReport,
    ) {
        let mut stack = vec![Work::Scan(root.to_path_buf())];

        while let Some(work) = stack.pop() {
            match work {
                Work::Scan(dir) => {
                    let canonical = match dunce::canonicalize(&dir) {
                        Ok(canonical) => canonical,
                        Err(e) => {
                            report.fail(&dir, &e);
                            continue;
                        }
                    };
                    if !canonical.starts_with(&self.base) {
                        report.escaped.push(dir);
                        continue;
                    }
                    if !self.visited.insert(canonical.clone()) {
                        continue;
                    }
                    report.directories_scanned += 1;

                    if remove_root || canonical != root {
                        stack.push(Work::RemoveDir(canonical.clone()));
                    }
                    Self::scan_dir(&canonical, exceptions, &mut stack, report);
                }
                Work::RemoveDir(dir) => match std::fs::remove_dir(&dir) {
                    Ok(()) => report.removed += 1,
                    // Something inside was kept on purpose.
                    Err(e) if e.kind() == io::ErrorKind::DirectoryNotEmpty => {}
                    Err(e) => report.fail(&dir, &e),
                },
            }
        }
    }

    fn scan_dir(
        dir: &Path,
        exceptions: &Exceptions,
        stack: &mut Vec<Work>,
        report: &mut CleanupReport,
    ) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                report.fail(dir, &e);
                return;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    report.fail(dir, &e);
                    continue;
                }
            };
            let name = entry.file_name();
            let path = dir.join(&name);

            if fingerprint::is_marker_name(&name.to_string_lossy())
                || exceptions.matches(&path, &name)
            {
                report.kept += 1;
                continue;
            }

            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) => {
                    report.fail(&path, &e);
                    continue;
                }
            };

            if file_type.is_symlink() {
                remove_link(&path, report);
            } else if file_type.is_dir() {
                stack.push(Work::Scan(path));
            } else {
                match std::fs::remove_file(&path) {
                    Ok(()) => report.removed += 1,
                    Err(e) => report.fail(&path, &e),
                }
            }
        }
    }
}

/// Remove a symbolic link without touching its target.
///
/// Directory links on Windows are removed with `remove_dir`.
fn remove_link(path: &Path, report: &mut CleanupReport) {
    let result = std::fs::remove_file(path).or_else(|e| {
        if cfg!(windows) {
            std::fs::remove_dir(path)
        } else {
            Err(e)
        }
    });
    match result {
        Ok(()) => report.removed += 1,
        Err(e) => report.fail(path, &e),
    }
}

/// Apply `policy` to `dir`: clean-all first, then the explicit list.
///
/// Individual entries that cannot be removed are logged as warnings and
/// returned in the report; the pass itself only fails when `dir` cannot be
/// resolved.
///
/// # Errors
///
/// Returns an error if `dir` cannot be canonicalized.
pub fn apply(dir: &Path, policy: &CleanupPolicy, log: &dyn Log) -> Result<CleanupReport> {
    let mut cleaner = Cleaner::new(dir)?;
    let mut report = CleanupReport::default();

    if policy.clean_all {
        merge(&mut report, cleaner.clean_all(&policy.exceptions));
    }
    if !policy.paths.is_empty() {
        merge(&mut report, cleaner.remove_listed(&policy.paths));
    }

    for path in &report.escaped {
        log.warn(&format!(
            "cleanup: ignoring {} (outside {})",
            path.display(),
            cleaner.base().display()
        ));
    }
    for failure in &report.failures {
        log.warn(&format!(
            "cleanup: could not remove {}: {}",
            failure.path.display(),
            failure.reason
        ));
    }
    log.debug(&format!(
        "cleanup: removed {}, kept {}, scanned {} dir(s)",
        report.removed, report.kept, report.directories_scanned
    ));
    Ok(report)
}

fn merge(into: &mut CleanupReport, from: CleanupReport) {
    into.removed += from.removed;
    into.kept += from.kept;
    into.directories_scanned += from.directories_scanned;
    into.escaped.extend(from.escaped);
    into.failures.extend(from.failures);
}
