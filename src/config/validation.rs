//! Non-fatal checks run over a loaded configuration.
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path};

use super::{TargetConfig, UpdaterConfig};

/// A validation warning detected during configuration loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// Display name of the target that triggered the warning.
    pub target: String,
    /// Human-readable warning message.
    pub message: String,
}

impl ValidationWarning {
    /// Warning about `target`.
    #[must_use]
    pub fn new(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.target, self.message)
    }
}

/// Trait for configuration validators.
///
/// Validators never fail: everything they report is advisory and the run
/// proceeds regardless.
pub trait ConfigValidator {
    /// Validate the configuration and return any warnings found.
    fn validate(&self, config: &UpdaterConfig) -> Vec<ValidationWarning>;

    /// Return a human-readable name for this validator (e.g., "sources").
    #[allow(dead_code)] // Part of trait contract; implementors define it
    fn name(&self) -> &'static str;
}

/// Flags targets whose `source` is not a registered source name.
#[derive(Debug)]
pub struct SourceNameValidator<'a> {
    known: &'a [String],
}

impl<'a> SourceNameValidator<'a> {
    /// Validator accepting the given registered source names.
    #[must_use]
    pub const fn new(known: &'a [String]) -> Self {
        Self { known }
    }
}

impl ConfigValidator for SourceNameValidator<'_> {
    fn validate(&self, config: &UpdaterConfig) -> Vec<ValidationWarning> {
        config
            .targets
            .iter()
            .filter(|t| !self.known.iter().any(|k| k.eq_ignore_ascii_case(&t.source)))
            .map(|t| {
                ValidationWarning::new(
                    t.display_name(),
                    format!("unknown source '{}'", t.source),
                )
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "sources"
    }
}

/// Flags target names that appear more than once.
#[derive(Debug, Default)]
pub struct DuplicateNameValidator;

impl ConfigValidator for DuplicateNameValidator {
    fn validate(&self, config: &UpdaterConfig) -> Vec<ValidationWarning> {
        let mut seen: HashMap<String, usize> = HashMap::new();
        for target in &config.targets {
            *seen.entry(target.display_name().to_lowercase()).or_default() += 1;
        }

        let mut warnings = Vec::new();
        let mut reported = std::collections::HashSet::new();
        for target in &config.targets {
            let name = target.display_name();
            let key = name.to_lowercase();
            if seen.get(&key).copied().unwrap_or(0) > 1 && reported.insert(key) {
                warnings.push(ValidationWarning::new(
                    name,
                    "target name is used more than once; summary lines will be ambiguous",
                ));
            }
        }
        warnings
    }

    fn name(&self) -> &'static str {
        "duplicates"
    }
}

/// Per-target consistency checks: process settings, cleanup settings and
/// the target directory.
#[derive(Debug, Default)]
pub struct TargetValidator;

impl TargetValidator {
    fn check(target: &TargetConfig, warnings: &mut Vec<ValidationWarning>) {
        let name = target.display_name();

        if target.kill_process && target.process_name().is_none() {
            warnings.push(ValidationWarning::new(
                &name,
                "kill_process is set but no process name is configured",
            ));
        }

        if !target.clean_all && !target.cleanup_exceptions.is_empty() {
            warnings.push(ValidationWarning::new(
                &name,
                "cleanup_exceptions has no effect without clean_all",
            ));
        }

        if !target.directory.exists() {
            warnings.push(ValidationWarning::new(
                &name,
                format!(
                    "target directory does not exist yet: {}",
                    target.directory.display()
                ),
            ));
        }

        for path in &target.cleanup_paths {
            if escapes_directory(&target.directory, path) {
                warnings.push(ValidationWarning::new(
                    &name,
                    format!(
                        "cleanup path escapes the target directory and will be ignored: {}",
                        path.display()
                    ),
                ));
            }
        }

        for (phase, commands) in [("pre", &target.pre_commands), ("post", &target.post_commands)] {
            for command in commands {
                if command.program.trim().is_empty() {
                    warnings.push(ValidationWarning::new(
                        &name,
                        format!("{phase}-update command has an empty program"),
                    ));
                }
            }
        }
    }
}

impl ConfigValidator for TargetValidator {
    fn validate(&self, config: &UpdaterConfig) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        for target in &config.targets {
            Self::check(target, &mut warnings);
        }
        warnings
    }

    fn name(&self) -> &'static str {
        "targets"
    }
}

/// Lexical containment check used before any file exists on disk.
///
/// The cleanup engine repeats the check on canonical paths at run time.
fn escapes_directory(directory: &Path, path: &Path) -> bool {
    if path.is_absolute() {
        return !path.starts_with(directory);
    }
    let mut depth: usize = 0;
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if depth == 0 {
                    return true;
                }
                depth -= 1;
            }
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return true,
        }
    }
    false
}

/// Validate all configuration and return collected warnings.
#[must_use]
pub fn validate_all(config: &UpdaterConfig, known_sources: &[String]) -> Vec<ValidationWarning> {
    let validators: Vec<Box<dyn ConfigValidator + '_>> = vec![
        Box::new(SourceNameValidator::new(known_sources)),
        Box::new(DuplicateNameValidator),
        Box::new(TargetValidator),
    ];

    let mut all_warnings = Vec::new();
    for validator in validators {
        all_warnings.extend(validator.validate(config));
    }
    all_warnings
}
