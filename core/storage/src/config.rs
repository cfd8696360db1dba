//! Provider configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::catalog::ProviderCatalog;
use crate::registry::ProviderRegistry;
use worldsync_common::{Error, Result};

/// Configuration for one named provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Registration name; must be unique across the file.
    pub name: String,
    /// Provider kind as known to the [`ProviderCatalog`] (e.g., "local").
    pub kind: String,
    /// Provider-specific options.
    #[serde(default)]
    pub options: serde_json::Value,
}

impl ProviderConfig {
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        options: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            options,
        }
    }
}

/// The set of providers a host should construct at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl ProvidersConfig {
    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Load configuration from a file.
    ///
    /// # Errors
    /// - `NotFound` if the file does not exist
    /// - `Serialization` if it is not valid configuration
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        debug!("Loaded provider config from {}", path.display());
        Self::from_json(&contents)
    }

    /// Write configuration to a file, creating parent directories.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.to_json()?).await?;
        Ok(())
    }

    /// Construct every configured provider and register it.
    ///
    /// # Errors
    /// - `AlreadyRegistered` if two entries share a name
    /// - Any construction error from the catalog
    pub fn build_registry(&self, catalog: &ProviderCatalog) -> Result<ProviderRegistry> {
        let mut registry = ProviderRegistry::new();
        for entry in &self.providers {
            let provider = catalog.create(&entry.kind, &entry.name, entry.options.clone())?;
            registry.register(provider)?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_config_json() {
        let json = r#"{
            "providers": [
                { "name": "local-sync", "kind": "local", "options": { "root": "/backups" } },
                { "name": "scratch", "kind": "memory" }
            ]
        }"#;

        let config = ProvidersConfig::from_json(json).unwrap();
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].options["root"], "/backups");
        assert!(config.providers[1].options.is_null());
    }

    #[test]
    fn test_malformed_config() {
        assert!(matches!(
            ProvidersConfig::from_json("{\"providers\": 3}"),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_build_registry() {
        let temp = TempDir::new().unwrap();
        let config = ProvidersConfig {
            providers: vec![
                ProviderConfig::new("local-sync", "local", json!({ "root": temp.path() })),
                ProviderConfig::new("scratch", "memory", json!(null)),
            ],
        };

        let registry = config.build_registry(&ProviderCatalog::with_builtin()).unwrap();
        assert_eq!(registry.names(), vec!["local-sync".to_string(), "scratch".to_string()]);
    }

    #[test]
    fn test_build_registry_duplicate_name() {
        let config = ProvidersConfig {
            providers: vec![
                ProviderConfig::new("dropbox", "memory", json!(null)),
                ProviderConfig::new("dropbox", "memory", json!(null)),
            ],
        };

        let result = config.build_registry(&ProviderCatalog::with_builtin());
        assert!(matches!(result, Err(Error::AlreadyRegistered(_))));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("providers.json");
        let config = ProvidersConfig {
            providers: vec![ProviderConfig::new("scratch", "memory", json!(null))],
        };

        config.save(&path).await.unwrap();
        let loaded = ProvidersConfig::load(&path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_load_missing() {
        let temp = TempDir::new().unwrap();
        let result = ProvidersConfig::load(temp.path().join("absent.json")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
