//! Name-to-factory mapping for update sources.
use std::collections::BTreeMap;
use std::fmt;

use super::UpdateSource;
use crate::error::SourceError;

/// Zero-argument constructor producing a fresh, unconfigured source.
pub type SourceFactory = Box<dyn Fn() -> Box<dyn UpdateSource> + Send + Sync>;

/// Registered update sources, keyed by case-insensitive name.
///
/// Built once at startup through explicit [`register`](Self::register) calls;
/// afterwards it is only read.
#[derive(Default)]
pub struct SourceRegistry {
    factories: BTreeMap<String, SourceFactory>,
}

impl fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.names())
            .finish()
    }
}

impl SourceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every source compiled into this binary.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(super::github::SOURCE_NAME, || {
            Box::new(super::github::GithubSource::default())
        });
        registry.register(super::directory::SOURCE_NAME, || {
            Box::new(super::directory::DirectorySource::default())
        });
        registry
    }

    /// Register `factory` under `name`, replacing any previous registration.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn UpdateSource> + Send + Sync + 'static,
    {
        self.factories
            .insert(name.to_ascii_lowercase(), Box::new(factory));
    }

    /// Construct a fresh instance of the source registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::UnknownSource`] if no source has that name.
    pub fn create(&self, name: &str) -> Result<Box<dyn UpdateSource>, SourceError> {
        self.factories
            .get(&name.to_ascii_lowercase())
            .map(|factory| factory())
            .ok_or_else(|| SourceError::UnknownSource(name.to_string()))
    }

    /// Whether a source is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_ascii_lowercase())
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}
