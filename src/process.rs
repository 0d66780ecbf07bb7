//! Guard that keeps a managed process from running while its files change.
use anyhow::{Result, bail};
use std::sync::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, Signal, System};

use crate::logging::Log;

/// A running process matched by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    /// Operating-system process id.
    pub pid: u32,
    /// Executable name as reported by the OS.
    pub name: String,
}

/// Operating-system process table.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessControl {
    /// Running processes whose name matches `name`.
    ///
    /// Matching ignores ASCII case and a trailing `.exe`.  The calling
    /// process is never reported.
    fn find(&self, name: &str) -> Vec<ProcessInfo>;

    /// Ask `pid` to shut down gracefully.
    ///
    /// `None` means the platform has no graceful signal; `Some(false)` means
    /// the request could not be delivered.
    fn terminate(&self, pid: u32) -> Option<bool>;

    /// Force-terminate `pid`, returning whether the request was delivered.
    fn kill(&self, pid: u32) -> bool;
}

/// Outcome of [`ensure_stopped`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// No instance is running (any that were have been asked to stop).
    Proceed {
        /// Processes that were signalled.
        stopped: Vec<ProcessInfo>,
    },
    /// Instances are running and stopping them is not permitted.
    Blocked {
        /// Processes that are running.
        running: Vec<ProcessInfo>,
    },
}

/// Make sure no process called `name` is running.
///
/// When instances run and `permitted` is false the target is
/// [`Blocked`](GuardDecision::Blocked).  Otherwise each instance gets a
/// graceful request, followed by a forced kill when the graceful request is
/// unsupported or rejected.  The guard does not wait for processes to exit.
///
/// # Errors
///
/// Returns an error if a process refused both requests and is still
/// listed afterwards.
pub fn ensure_stopped(
    control: &dyn ProcessControl,
    name: &str,
    permitted: bool,
    log: &dyn Log,
) -> Result<GuardDecision> {
    let running = control.find(name);
    if running.is_empty() {
        log.debug(&format!("process '{name}' is not running"));
        return Ok(GuardDecision::Proceed {
            stopped: Vec::new(),
        });
    }
    if !permitted {
        return Ok(GuardDecision::Blocked { running });
    }

    let mut stubborn = Vec::new();
    for process in &running {
        match control.terminate(process.pid) {
            Some(true) => {
                log.info(&format!(
                    "asked {} (pid {}) to stop",
                    process.name, process.pid
                ));
                continue;
            }
            Some(false) => log.debug(&format!(
                "graceful stop rejected by pid {}, forcing",
                process.pid
            )),
            None => log.debug(&format!(
                "graceful stop unsupported for pid {}, forcing",
                process.pid
            )),
        }
        if control.kill(process.pid) {
            log.info(&format!("killed {} (pid {})", process.name, process.pid));
        } else {
            stubborn.push(process.pid);
        }
    }

    if !stubborn.is_empty() {
        let still_running: Vec<u32> = control
            .find(name)
            .into_iter()
            .map(|p| p.pid)
            .filter(|pid| stubborn.contains(pid))
            .collect();
        if !still_running.is_empty() {
            bail!("could not stop '{name}' (pid {still_running:?})");
        }
    }

    Ok(GuardDecision::Proceed { stopped: running })
}

/// Normalize a process name for comparison.
fn normalize(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    lower.strip_suffix(".exe").unwrap_or(&lower).to_string()
}

/// Whether the OS-reported `candidate` names the configured process `wanted`.
#[must_use]
pub fn name_matches(candidate: &str, wanted: &str) -> bool {
    let wanted = normalize(wanted);
    !wanted.is_empty() && normalize(candidate) == wanted
}

/// [`ProcessControl`] backed by `sysinfo`.
#[derive(Debug)]
pub struct SystemProcessControl {
    system: Mutex<System>,
}

impl Default for SystemProcessControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProcessControl {
    /// Create a process table with nothing loaded yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn with_process<T>(&self, pid: u32, f: impl FnOnce(&sysinfo::Process) -> T) -> Option<T> {
        let mut system = self
            .system
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let pid = Pid::from_u32(pid);
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).map(f)
    }
}

impl ProcessControl for SystemProcessControl {
    fn find(&self, name: &str) -> Vec<ProcessInfo> {
        let mut system = self
            .system
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        system.refresh_processes(ProcessesToUpdate::All, true);
        let own = std::process::id();

        let mut found: Vec<ProcessInfo> = system
            .processes()
            .iter()
            .filter(|(pid, _)| pid.as_u32() != own)
            .filter_map(|(pid, process)| {
                let candidate = process.name().to_string_lossy();
                name_matches(&candidate, name).then(|| ProcessInfo {
                    pid: pid.as_u32(),
                    name: candidate.into_owned(),
                })
            })
            .collect();
        found.sort_by_key(|p| p.pid);
        found
    }

    fn terminate(&self, pid: u32) -> Option<bool> {
        self.with_process(pid, |p| p.kill_with(Signal::Term))
            .flatten()
    }

    fn kill(&self, pid: u32) -> bool {
        // Already gone counts as delivered.
        self.with_process(pid, sysinfo::Process::kill)
            .unwrap_or(true)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    fn info(pid: u32) -> ProcessInfo {
        ProcessInfo {
            pid,
            name: "billing.exe".to_string(),
        }
    }

    #[test]
    fn name_matching_ignores_case_and_exe_suffix() {
        assert!(name_matches("Billing.EXE", "billing"));
        assert!(name_matches("billing", "billing.exe"));
        assert!(name_matches("billing", "BILLING"));
        assert!(!name_matches("billing-helper", "billing"));
        assert!(!name_matches("billing", ""));
    }

    #[test]
    fn proceeds_when_not_running() {
        let (log, _tmp, _guard) = crate::logging::isolated_logger();
        let mut control = MockProcessControl::new();
        control.expect_find().returning(|_| Vec::new());
        control.expect_terminate().never();
        control.expect_kill().never();

        let decision = ensure_stopped(&control, "billing", false, &log).unwrap();
        assert_eq!(decision, GuardDecision::Proceed { stopped: vec![] });
    }

    #[test]
    fn blocked_when_running_and_not_permitted() {
        let (log, _tmp, _guard) = crate::logging::isolated_logger();
        let mut control = MockProcessControl::new();
        control
            .expect_find()
            .with(eq("billing"))
            .returning(|_| vec![info(42)]);
        control.expect_terminate().never();
        control.expect_kill().never();

        let decision = ensure_stopped(&control, "billing", false, &log).unwrap();
        assert_eq!(
            decision,
            GuardDecision::Blocked {
                running: vec![info(42)]
            }
        );
    }

    #[test]
    fn graceful_stop_skips_force_kill() {
        let (log, _tmp, _guard) = crate::logging::isolated_logger();
        let mut control = MockProcessControl::new();
        control.expect_find().times(1).returning(|_| vec![info(7)]);
        control
            .expect_terminate()
            .with(eq(7))
            .times(1)
            .returning(|_| Some(true));
        control.expect_kill().never();

        let decision = ensure_stopped(&control, "billing", true, &log).unwrap();
        assert_eq!(
            decision,
            GuardDecision::Proceed {
                stopped: vec![info(7)]
            }
        );
    }

    #[test]
    fn force_kill_when_graceful_unsupported_or_rejected() {
        let (log, _tmp, _guard) = crate::logging::isolated_logger();
        let mut control = MockProcessControl::new();
        control
            .expect_find()
            .times(1)
            .returning(|_| vec![info(1), info(2)]);
        control
            .expect_terminate()
            .with(eq(1))
            .returning(|_| None);
        control
            .expect_terminate()
            .with(eq(2))
            .returning(|_| Some(false));
        control.expect_kill().times(2).returning(|_| true);

        let decision = ensure_stopped(&control, "billing", true, &log).unwrap();
        assert!(matches!(decision, GuardDecision::Proceed { stopped } if stopped.len() == 2));
    }

    #[test]
    fn error_when_process_survives_kill() {
        let (log, _tmp, _guard) = crate::logging::isolated_logger();
        let mut control = MockProcessControl::new();
        control.expect_find().times(2).returning(|_| vec![info(9)]);
        control.expect_terminate().returning(|_| Some(false));
        control.expect_kill().returning(|_| false);

        let err = ensure_stopped(&control, "billing", true, &log).unwrap_err();
        assert!(err.to_string().contains("could not stop"));
    }

    #[test]
    fn failed_kill_of_exited_process_is_fine() {
        let (log, _tmp, _guard) = crate::logging::isolated_logger();
        let mut control = MockProcessControl::new();
        let mut calls = 0;
        control.expect_find().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 { vec![info(9)] } else { Vec::new() }
        });
        control.expect_terminate().returning(|_| None);
        control.expect_kill().returning(|_| false);

        assert!(ensure_stopped(&control, "billing", true, &log).is_ok());
    }

    #[test]
    fn system_table_never_reports_own_process() {
        let control = SystemProcessControl::new();
        let own = std::process::id();
        let exe = std::env::current_exe().unwrap();
        let name = exe.file_name().unwrap().to_string_lossy();
        assert!(control.find(&name).iter().all(|p| p.pid != own));
    }

    #[test]
    fn system_table_ignores_unknown_name() {
        let control = SystemProcessControl::new();
        assert!(control.find("no-such-process-7f3a9c").is_empty());
    }
}
