//! Provider registry for name-based dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::provider::SyncProvider;
use worldsync_common::{Error, Result};

/// Registry of live backup providers, keyed by provider name.
///
/// Built during startup through `&mut self`, then shared behind an `Arc`
/// for lookups. Entries are never removed or replaced.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn SyncProvider>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a provider under its own name.
    ///
    /// # Preconditions
    /// - `provider.name()` must be unique within the registry
    ///
    /// # Postconditions
    /// - Provider can be resolved by name
    ///
    /// # Errors
    /// - `AlreadyRegistered` if the name is taken; the earlier provider is kept
    pub fn register(&mut self, provider: Arc<dyn SyncProvider>) -> Result<()> {
        let name = provider.name().to_string();
        if self.providers.contains_key(&name) {
            error!("Rejected duplicate provider registration: {}", name);
            return Err(Error::AlreadyRegistered(format!(
                "A sync provider named '{}' has already been registered",
                name
            )));
        }
        info!("Registered sync provider: {}", name);
        self.providers.insert(name, provider);
        Ok(())
    }

    /// Get a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn SyncProvider>> {
        self.providers.get(name).cloned()
    }

    /// Resolve a provider by name.
    ///
    /// # Errors
    /// - `NotFound` if no provider has that name
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn SyncProvider>> {
        self.get(name)
            .ok_or_else(|| Error::NotFound(format!("Sync provider '{}' is not registered", name)))
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Iterate over registered providers in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SyncProvider>> {
        self.providers.values()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryProvider;

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MemoryProvider::new("a"))).unwrap();
        registry.register(Arc::new(MemoryProvider::new("b"))).unwrap();
        registry.register(Arc::new(MemoryProvider::new("c"))).unwrap();

        for name in ["a", "b", "c"] {
            assert_eq!(registry.resolve(name).unwrap().name(), name);
        }
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let mut registry = ProviderRegistry::new();
        let first: Arc<dyn SyncProvider> = Arc::new(MemoryProvider::new("dropbox"));
        registry.register(first.clone()).unwrap();

        let result = registry.register(Arc::new(MemoryProvider::new("dropbox")));
        assert!(matches!(result, Err(Error::AlreadyRegistered(_))));

        let resolved = registry.resolve("dropbox").unwrap();
        assert!(Arc::ptr_eq(&resolved, &first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let registry = ProviderRegistry::new();
        assert!(matches!(registry.resolve("unknown"), Err(Error::NotFound(_))));
        assert!(registry.get("unknown").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_names_sorted() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MemoryProvider::new("zeta"))).unwrap();
        registry.register(Arc::new(MemoryProvider::new("alpha"))).unwrap();

        assert_eq!(registry.names(), vec!["alpha".to_string(), "zeta".to_string()]);
        assert!(registry.contains("zeta"));
        assert_eq!(registry.iter().count(), 2);
    }
}
