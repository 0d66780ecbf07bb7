//! TOML configuration file parsing.
use serde::de::DeserializeOwned;
use std::path::Path;

use crate::error::ConfigError;

/// Read and deserialize the TOML file at `path`.
///
/// Unlike optional configuration fragments, the updater configuration is
/// mandatory: a missing file is reported as [`ConfigError::NotFound`] rather
/// than silently treated as empty.
///
/// # Errors
///
/// Returns an error if the file is missing, cannot be read, or cannot be
/// parsed into `T`.
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&content).map_err(|e| ConfigError::InvalidSyntax {
        path: path.to_path_buf(),
        message: e.message().to_string(),
    })
}
