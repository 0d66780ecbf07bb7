//! Utility functions for path resolution, ANSI stripping, and time formatting.
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Strip ANSI escape sequences from a string.
///
/// Handles SGR sequences (ending in `m`) and other CSI sequences (ending
/// in any letter in the `@`..`~` range), so cursor movement, erase, etc.
/// are also stripped without consuming unrelated text.
pub(super) fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if let Some(next) = chars.next()
                && next == '['
            {
                for inner in chars.by_ref() {
                    if ('@'..='~').contains(&inner) {
                        break;
                    }
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Return the `$XDG_CACHE_HOME/updater/` directory, creating it if needed.
///
/// Falls back to `LOCALAPPDATA` on Windows hosts where neither
/// `XDG_CACHE_HOME` nor `HOME` is set (e.g. a scheduled task running as a
/// service account).
pub(super) fn updater_cache_dir() -> Option<PathBuf> {
    let cache_dir = std::env::var("XDG_CACHE_HOME").map_or_else(
        |_| {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".cache"))
                .or_else(|_| std::env::var("LOCALAPPDATA").map(PathBuf::from))
                .or_else(|_| {
                    std::env::var("USERPROFILE").map(|p| PathBuf::from(p).join(".cache"))
                })
                .unwrap_or_else(|_| PathBuf::from(".cache"))
        },
        PathBuf::from,
    );
    let dir = cache_dir.join("updater");
    fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// Return the log file path under the updater cache directory.
pub(super) fn log_file_path(command: &str) -> Option<PathBuf> {
    Some(updater_cache_dir()?.join(format!("{command}.log")))
}

/// Path an oversized log file is moved to: `<file>.1`.
pub(super) fn rotated_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".1");
    path.with_file_name(name)
}

/// Format the current UTC time as `YYYY-MM-DD HH:MM:SS`.
pub(super) fn format_utc_datetime() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Format the current UTC time as `HH:MM:SS`.
pub(super) fn format_utc_time() -> String {
    chrono::Utc::now().format("%H:%M:%S").to_string()
}
