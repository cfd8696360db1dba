//! CLI configuration loading.

use anyhow::{Context, Result};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::debug;

use worldsync_common::Error;
use worldsync_storage::{ProviderConfig, ProvidersConfig};

/// Name of the provider used when no configuration file exists.
pub const DEFAULT_PROVIDER: &str = "local";

/// Default location of the providers file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("worldsync")
        .join("providers.json")
}

/// Default folder for the built-in local provider.
pub fn default_backup_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("worldsync")
        .join("backups")
}

/// Configuration with a single local provider rooted at `root`.
pub fn default_config(root: &Path) -> ProvidersConfig {
    ProvidersConfig {
        providers: vec![ProviderConfig::new(
            DEFAULT_PROVIDER,
            "local",
            json!({ "root": root.to_string_lossy() }),
        )],
    }
}

/// Load the providers file.
///
/// An explicitly given path must exist. A missing file at the default
/// location falls back to [`default_config`].
pub async fn load(explicit: Option<&Path>) -> Result<ProvidersConfig> {
    let path = match explicit {
        Some(path) => {
            return ProvidersConfig::load(path)
                .await
                .with_context(|| format!("Failed to load config {}", path.display()));
        }
        None => default_config_path(),
    };

    match ProvidersConfig::load(&path).await {
        Ok(config) => Ok(config),
        Err(Error::NotFound(_)) => {
            debug!("No config at {}, using defaults", path.display());
            Ok(default_config(&default_backup_root()))
        }
        Err(e) => Err(e).with_context(|| format!("Failed to load config {}", path.display())),
    }
}
