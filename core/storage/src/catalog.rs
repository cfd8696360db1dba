//! Catalog of provider kinds for building providers from configuration.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::local::{LocalOptions, LocalProvider};
use crate::memory::MemoryProvider;
use crate::provider::SyncProvider;
use crate::settings::SettingsDescriptor;
use worldsync_common::{Error, Result};

/// Factory function type for creating providers.
///
/// Receives the registration name and the provider-specific options.
pub type ProviderFactory =
    Box<dyn Fn(&str, Value) -> Result<Arc<dyn SyncProvider>> + Send + Sync>;

struct Kind {
    options: SettingsDescriptor,
    factory: ProviderFactory,
}

/// Catalog of provider factories, keyed by provider kind.
///
/// A kind ("local", "memory", ...) may back any number of named providers.
/// Each kind describes the options it accepts; `create` checks them before
/// the factory runs.
pub struct ProviderCatalog {
    kinds: HashMap<String, Kind>,
}

impl ProviderCatalog {
    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }

    /// Create a catalog with the built-in provider kinds.
    pub fn with_builtin() -> Self {
        let mut catalog = Self::new();
        catalog.insert_builtin(
            "memory",
            SettingsDescriptor::empty("memory").with_title("In-memory"),
            Box::new(|name, _options| Ok(Arc::new(MemoryProvider::new(name)))),
        );
        catalog.insert_builtin(
            "local",
            LocalProvider::options_descriptor(),
            Box::new(|name, options| {
                let LocalOptions { root } = serde_json::from_value(options)?;
                Ok(Arc::new(LocalProvider::new(name, root)?))
            }),
        );
        catalog
    }

    fn insert_builtin(&mut self, kind: &str, options: SettingsDescriptor, factory: ProviderFactory) {
        self.kinds.insert(kind.to_string(), Kind { options, factory });
    }

    /// Register a provider factory along with the options it accepts.
    ///
    /// # Errors
    /// - Returns error if kind is already registered
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        options: SettingsDescriptor,
        factory: ProviderFactory,
    ) -> Result<()> {
        let kind = kind.into();
        if self.kinds.contains_key(&kind) {
            return Err(Error::AlreadyRegistered(format!(
                "Provider kind '{}' is already registered",
                kind
            )));
        }
        self.kinds.insert(kind, Kind { options, factory });
        Ok(())
    }

    /// Options accepted by `kind`.
    pub fn options(&self, kind: &str) -> Option<&SettingsDescriptor> {
        self.kinds.get(kind).map(|k| &k.options)
    }

    /// Construct a provider of `kind` named `name`.
    ///
    /// # Errors
    /// - Kind not found
    /// - Options invalid for the kind
    pub fn create(&self, kind: &str, name: &str, options: Value) -> Result<Arc<dyn SyncProvider>> {
        let entry = self
            .kinds
            .get(kind)
            .ok_or_else(|| Error::NotFound(format!("Provider kind '{}' is not registered", kind)))?;

        let invalid = entry.options.invalid_keys(&options);
        if !invalid.is_empty() {
            return Err(Error::Config(format!(
                "Provider '{}' ({}): missing or invalid options: {}",
                name,
                kind,
                invalid.join(", ")
            )));
        }

        let provider = (entry.factory)(name, options)?;
        if provider.name() != name {
            return Err(Error::Config(format!(
                "Provider kind '{}' built '{}' when asked for '{}'",
                kind,
                provider.name(),
                name
            )));
        }
        Ok(provider)
    }

    /// Get list of registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.kinds.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Check if a kind is registered.
    pub fn has_kind(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }
}

impl Default for ProviderCatalog {
    fn default() -> Self {
        Self::with_builtin()
    }
}
