//! Pluggable update sources.
//!
//! A source knows how to find out which version is available remotely and
//! how to materialize it inside a target directory.  The orchestrator never
//! inspects which backend it holds; it only drives the [`UpdateSource`]
//! contract:
//!
//! 1. [`configure`](UpdateSource::configure) exactly once with the target's
//!    opaque `[target.options]` table,
//! 2. [`check_for_update`](UpdateSource::check_for_update) at most once,
//! 3. [`perform_update`](UpdateSource::perform_update) at most once, only when
//!    the check reported a newer version.
//!
//! Instances are produced fresh for every target by the [`SourceRegistry`].
pub mod directory;
pub mod github;
pub mod registry;

use anyhow::Result;
use serde::de::DeserializeOwned;
use std::path::Path;

use crate::error::SourceError;
use crate::fingerprint::VersionFingerprint;
use crate::logging::Log;

pub use registry::SourceRegistry;

/// Contract every fetch backend satisfies.
pub trait UpdateSource {
    /// Parse backend-specific options.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidConfiguration`] when required options are
    /// missing or malformed.
    fn configure(&mut self, options: &toml::Table) -> Result<()>;

    /// Return whether the newest remote version differs from `current`.
    ///
    /// `None` means the installed version is unknown and always compares as
    /// stale.  Implementations must not touch the local filesystem.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote system cannot be queried.
    fn check_for_update(&mut self, current: Option<&VersionFingerprint>) -> Result<bool>;

    /// Install the newest version into `target_dir` and return its fingerprint.
    ///
    /// Returns `Ok(None)` when the update could not complete; in that case
    /// files written by this attempt should have been removed again.
    ///
    /// # Errors
    ///
    /// Returns an error for failures the backend does not handle itself.
    fn perform_update(
        &mut self,
        log: &dyn Log,
        target_dir: &Path,
    ) -> Result<Option<VersionFingerprint>>;
}

/// Deserialize a source's opaque option table into its typed options.
///
/// # Errors
///
/// Returns [`SourceError::InvalidConfiguration`] naming `source_name` when the
/// table does not match `T`.
pub fn parse_options<T: DeserializeOwned>(
    source_name: &str,
    options: &toml::Table,
) -> Result<T, SourceError> {
    toml::Value::Table(options.clone())
        .try_into::<T>()
        .map_err(|e| SourceError::InvalidConfiguration {
            source_name: source_name.to_string(),
            reason: e.message().to_string(),
        })
}
