//! Update source that installs from a local or mounted directory.
//!
//! The source directory carries a version file (`VERSION` by default).  Its
//! content is read as up to four dot-separated integers
//! (`major.minor.revision.build`); anything else is treated as an opaque tag.
use anyhow::{Context as _, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::{UpdateSource, parse_options};
use crate::error::SourceError;
use crate::fingerprint::{self, VersionFingerprint};
use crate::logging::Log;

/// Registered name of this source.
pub const SOURCE_NAME: &str = "directory";

const DEFAULT_VERSION_FILE: &str = "VERSION";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct DirectoryOptions {
    path: PathBuf,
    #[serde(default = "default_version_file")]
    version_file: String,
}

fn default_version_file() -> String {
    DEFAULT_VERSION_FILE.to_string()
}

/// Directory-backed source.
#[derive(Debug, Default)]
pub struct DirectorySource {
    options: Option<DirectoryOptions>,
}

impl DirectorySource {
    fn options(&self) -> Result<&DirectoryOptions, SourceError> {
        self.options
            .as_ref()
            .ok_or_else(|| SourceError::NotConfigured(SOURCE_NAME.to_string()))
    }

    fn read_version(dir: &Path, version_file: &str) -> Result<VersionFingerprint> {
        let path = dir.join(version_file);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            SourceError::RemoteUnavailable(format!("{}: {e}", path.display()))
        })?;
        let content = content.trim();
        if content.is_empty() {
            return Err(SourceError::InvalidResponse {
                origin: path.display().to_string(),
                reason: "version file is empty".to_string(),
            }
            .into());
        }
        Ok(fingerprint_for(content))
    }
}

/// Fingerprint a version string: numeric versions hash their components,
/// everything else hashes the text.
fn fingerprint_for(version: &str) -> VersionFingerprint {
    parse_numeric_version(version).map_or_else(
        || VersionFingerprint::from_tag(version),
        |[major, minor, revision, build]| {
            VersionFingerprint::from_version(major, minor, revision, build)
        },
    )
}

/// Parse `1`, `1.2`, `1.2.3` or `1.2.3.4`; missing components are zero.
fn parse_numeric_version(version: &str) -> Option<[i32; 4]> {
    let mut parts = [0i32; 4];
    let mut count = 0;
    for piece in version.split('.') {
        let slot = parts.get_mut(count)?;
        *slot = piece.parse().ok()?;
        count += 1;
    }
    Some(parts)
}

/// Paths one copy attempt created, so a failed attempt can take them back.
#[derive(Debug, Default)]
struct CopyRecord {
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
}

impl CopyRecord {
    /// Remove recorded files, then recorded directories deepest first.
    fn roll_back(&self, log: &dyn Log) {
        for path in &self.files {
            if let Err(e) = std::fs::remove_file(path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                log.warn(&format!("could not remove {}: {e}", path.display()));
            }
        }
        for dir in self.dirs.iter().rev() {
            if let Err(e) = std::fs::remove_dir(dir)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                log.warn(&format!("could not remove {}: {e}", dir.display()));
            }
        }
    }
}

/// Recursively copy `src` into `dst`, never overwriting the fingerprint
/// marker. Everything written is noted in `record`.
fn copy_dir_recursive(
    src: &Path,
    dst: &Path,
    record: &mut CopyRecord,
    log: &dyn Log,
) -> Result<usize> {
    if !dst.exists() {
        std::fs::create_dir_all(dst)
            .with_context(|| format!("creating directory {}", dst.display()))?;
        record.dirs.push(dst.to_path_buf());
    }
    let mut copied = 0;
    for entry in
        std::fs::read_dir(src).with_context(|| format!("reading directory {}", src.display()))?
    {
        let entry = entry.with_context(|| format!("reading entry in {}", src.display()))?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if fingerprint::is_marker_name(&entry.file_name().to_string_lossy()) {
            log.debug(&format!("not copying marker {}", src_path.display()));
            continue;
        }
        if src_path.is_dir() {
            copied += copy_dir_recursive(&src_path, &dst_path, record, log)?;
        } else {
            let existed = dst_path.symlink_metadata().is_ok();
            let result = std::fs::copy(&src_path, &dst_path);
            // A failed copy may still leave a partial file behind.
            if result.is_ok() || !existed {
                record.files.push(dst_path.clone());
            }
            result.with_context(|| {
                format!("copying {} to {}", src_path.display(), dst_path.display())
            })?;
            copied += 1;
        }
    }
    Ok(copied)
}

impl UpdateSource for DirectorySource {
    fn configure(&mut self, options: &toml::Table) -> Result<()> {
        let opts: DirectoryOptions = parse_options(SOURCE_NAME, options)?;
        if opts.version_file.trim().is_empty() {
            return Err(SourceError::InvalidConfiguration {
                source_name: SOURCE_NAME.to_string(),
                reason: "version_file must not be empty".to_string(),
            }
            .into());
        }
        self.options = Some(opts);
        Ok(())
    }

    fn check_for_update(&mut self, current: Option<&VersionFingerprint>) -> Result<bool> {
        let opts = self.options()?;
        let remote = Self::read_version(&opts.path, &opts.version_file)?;
        Ok(fingerprint::is_stale(current, &remote))
    }

    fn perform_update(
        &mut self,
        log: &dyn Log,
        target_dir: &Path,
    ) -> Result<Option<VersionFingerprint>> {
        let opts = self.options()?;
        if !opts.path.is_dir() {
            log.error(&format!(
                "source directory {} is not available",
                opts.path.display()
            ));
            return Ok(None);
        }

        let mut record = CopyRecord::default();
        let copied = match copy_dir_recursive(&opts.path, target_dir, &mut record, log) {
            Ok(copied) => copied,
            Err(e) => {
                log.error(&format!("copy from {} failed: {e:#}", opts.path.display()));
                record.roll_back(log);
                return Ok(None);
            }
        };
        log.info(&format!(
            "copied {copied} file(s) from {}",
            opts.path.display()
        ));

        // Fingerprint what actually landed, not what the source holds now.
        match Self::read_version(target_dir, &opts.version_file) {
            Ok(fp) => Ok(Some(fp)),
            Err(e) => {
                log.error(&format!("installed version unreadable: {e:#}"));
                record.roll_back(log);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs;

    fn configured(path: &Path) -> DirectorySource {
        let mut options = toml::Table::new();
        options.insert(
            "path".to_string(),
            toml::Value::String(path.display().to_string()),
        );
        let mut source = DirectorySource::default();
        source.configure(&options).unwrap();
        source
    }

    #[test]
    fn parse_numeric_versions() {
        assert_eq!(parse_numeric_version("1"), Some([1, 0, 0, 0]));
        assert_eq!(parse_numeric_version("1.2.3"), Some([1, 2, 3, 0]));
        assert_eq!(parse_numeric_version("1.2.3.4"), Some([1, 2, 3, 4]));
        assert_eq!(parse_numeric_version("1.2.3.4.5"), None);
        assert_eq!(parse_numeric_version("v1.2"), None);
        assert_eq!(parse_numeric_version("1..2"), None);
    }

    #[test]
    fn numeric_and_tag_fingerprints() {
        assert_eq!(
            fingerprint_for("2.1"),
            VersionFingerprint::from_version(2, 1, 0, 0)
        );
        assert_eq!(
            fingerprint_for("release-7"),
            VersionFingerprint::from_tag("release-7")
        );
    }

    #[test]
    fn configure_requires_path() {
        let mut source = DirectorySource::default();
        let err = source.configure(&toml::Table::new()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SourceError>(),
            Some(SourceError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn check_reports_stale_for_unknown_install() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("VERSION"), "1.0.0\n").unwrap();
        let mut source = configured(src.path());
        assert!(source.check_for_update(None).unwrap());
    }

    #[test]
    fn check_reports_current_when_fingerprint_matches() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("VERSION"), "1.0.0\n").unwrap();
        let mut source = configured(src.path());
        let current = VersionFingerprint::from_version(1, 0, 0, 0);
        assert!(!source.check_for_update(Some(&current)).unwrap());
    }

    #[test]
    fn check_without_version_file_is_remote_unavailable() {
        let src = tempfile::tempdir().unwrap();
        let mut source = configured(src.path());
        let err = source.check_for_update(None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SourceError>(),
            Some(SourceError::RemoteUnavailable(_))
        ));
    }

    #[test]
    fn update_copies_tree_and_returns_fingerprint() {
        let (log, _tmp, _guard) = crate::logging::isolated_logger();
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("VERSION"), "3.4").unwrap();
        fs::write(src.path().join("app.bin"), b"bin").unwrap();
        fs::create_dir(src.path().join("lib")).unwrap();
        fs::write(src.path().join("lib/core.so"), b"so").unwrap();

        let mut source = configured(src.path());
        let fp = source.perform_update(&log, dst.path()).unwrap();

        assert_eq!(fp, Some(VersionFingerprint::from_version(3, 4, 0, 0)));
        assert_eq!(fs::read(dst.path().join("app.bin")).unwrap(), b"bin");
        assert_eq!(fs::read(dst.path().join("lib/core.so")).unwrap(), b"so");
    }

    #[test]
    fn update_never_copies_marker() {
        let (log, _tmp, _guard) = crate::logging::isolated_logger();
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("VERSION"), "1").unwrap();
        fs::write(src.path().join("VersionHash"), b"junk").unwrap();

        let mut source = configured(src.path());
        source.perform_update(&log, dst.path()).unwrap();
        assert!(!dst.path().join("VersionHash").exists());
    }

    #[test]
    fn update_from_missing_directory_returns_none() {
        let (log, _tmp, _guard) = crate::logging::isolated_logger();
        let root = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let mut source = configured(&root.path().join("gone"));
        assert!(source.perform_update(&log, dst.path()).unwrap().is_none());
    }

    fn names_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn failed_copy_removes_what_it_wrote() {
        let (log, _tmp, _guard) = crate::logging::isolated_logger();
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("VERSION"), "2.0").unwrap();
        for i in 0..10 {
            fs::write(src.path().join(format!("part{i}.bin")), b"new").unwrap();
        }
        fs::create_dir(src.path().join("lib")).unwrap();
        fs::write(src.path().join("lib/core.so"), b"so").unwrap();
        fs::write(src.path().join("blocked.dat"), b"new").unwrap();
        // A directory where a file must land makes that copy fail.
        fs::create_dir(dst.path().join("blocked.dat")).unwrap();
        fs::write(dst.path().join("settings.ini"), b"keep").unwrap();

        let mut source = configured(src.path());
        let fp = source.perform_update(&log, dst.path()).unwrap();

        assert!(fp.is_none());
        assert_eq!(names_in(dst.path()), vec!["blocked.dat", "settings.ini"]);
        assert_eq!(fs::read(dst.path().join("settings.ini")).unwrap(), b"keep");
    }

    #[test]
    fn unreadable_installed_version_removes_copied_files() {
        let (log, _tmp, _guard) = crate::logging::isolated_logger();
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("VERSION"), "   \n").unwrap();
        fs::write(src.path().join("app.bin"), b"bin").unwrap();
        fs::create_dir(src.path().join("lib")).unwrap();
        fs::write(src.path().join("lib/core.so"), b"so").unwrap();

        let mut source = configured(src.path());
        assert!(source.perform_update(&log, dst.path()).unwrap().is_none());
        assert!(names_in(dst.path()).is_empty());
    }
}
