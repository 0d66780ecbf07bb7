//! Domain-specific error types for the updater.
//!
//! Internal modules return typed errors (e.g., [`SourceError`],
//! [`CommandError`]) while the orchestrator and command handlers carry them
//! as [`anyhow::Error`] via the standard `?` operator.  Tests recover the
//! typed variant with `downcast_ref`.
//!
//! # Error hierarchy
//!
//! ```text
//! UpdaterError
//! ├── Config(ConfigError)          : configuration file loading
//! ├── Source(SourceError)          : registry lookups and backend failures
//! ├── Fingerprint(FingerprintError): malformed version markers
//! ├── Command(CommandError)        : pre/post update commands
//! └── Update(UpdateError)          : per-target update workflow
//! ```

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the updater.
#[derive(Error, Debug)]
pub enum UpdaterError {
    /// Configuration-related error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Update source error.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Version fingerprint error.
    #[error("Fingerprint error: {0}")]
    Fingerprint(#[from] FingerprintError),

    /// Pre- or post-update command error.
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// Update workflow error.
    #[error("Update error: {0}")]
    Update(#[from] UpdateError),
}

/// Errors that arise from loading the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No configuration file exists at the resolved location.
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// An I/O error occurred while reading the configuration file.
    #[error("IO error reading config file {}: {source}", .path.display())]
    Io {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML or does not match the schema.
    #[error("Invalid configuration in {}: {message}", .path.display())]
    InvalidSyntax {
        /// Path to the offending file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
}

/// Errors raised by the source registry and by update source backends.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The target names a source that is not registered.
    #[error("unknown update source '{0}'")]
    UnknownSource(String),

    /// Source options are missing or malformed.
    #[error("invalid configuration for source '{source_name}': {reason}")]
    InvalidConfiguration {
        /// Registered name of the source.
        source_name: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The remote system could not be reached or refused the request.
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// The remote system answered with something that could not be understood.
    #[error("invalid response from {origin}: {reason}")]
    InvalidResponse {
        /// URL or path that produced the response.
        origin: String,
        /// Human-readable reason.
        reason: String,
    },

    /// An operation was invoked before [`configure`](crate::sources::UpdateSource::configure).
    #[error("source '{0}' used before it was configured")]
    NotConfigured(String),
}

/// Errors that arise from reading a persisted fingerprint.
#[derive(Error, Debug)]
pub enum FingerprintError {
    /// Fewer bytes were available than a fingerprint occupies.
    #[error("truncated fingerprint: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Number of bytes a fingerprint occupies.
        expected: usize,
        /// Number of bytes actually available.
        actual: usize,
    },

    /// The underlying reader failed for a reason other than end-of-data.
    #[error("failed to read fingerprint: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that arise from operator-supplied commands.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The program could not be started.
    #[error("failed to launch '{program}': {reason}")]
    Launch {
        /// Program that was launched.
        program: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The program ran but exited unsuccessfully.
    #[error("'{program}' failed: {reason}")]
    Failed {
        /// Program that was launched.
        program: String,
        /// Exit status and captured stderr.
        reason: String,
    },

    /// The argument string could not be split into arguments.
    #[error("cannot parse arguments for '{program}': {arguments}")]
    InvalidArguments {
        /// Program the arguments belong to.
        program: String,
        /// The raw argument string.
        arguments: String,
    },
}

/// Errors that arise from the per-target update workflow.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// The source could not install the new version.
    #[error("source '{source_name}' did not complete the update")]
    UpdateFailed {
        /// Registered name of the source.
        source_name: String,
    },

    /// The target directory does not exist and could not be created.
    #[error("target directory {} is unavailable", .0.display())]
    TargetUnavailable(PathBuf),
}
