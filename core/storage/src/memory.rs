//! In-memory backup provider for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::fsutil::{self, Snapshot};
use crate::provider::SyncProvider;
use crate::settings::SettingsDescriptor;
use worldsync_common::{BackupName, Error, Instance, InstanceName, Result};

/// A world folder captured in memory.
#[derive(Debug, Clone)]
struct StoredWorld {
    world: String,
    files: Arc<Snapshot>,
}

/// In-memory backup provider.
///
/// Useful for testing and development. All backups are held in memory
/// and lost on drop. Each operation observes the store atomically: a
/// backup becomes visible only once fully read, and a restore works from
/// the snapshot it saw when it started even if the backup is deleted
/// meanwhile.
pub struct MemoryProvider {
    name: String,
    storage: RwLock<HashMap<InstanceName, HashMap<BackupName, StoredWorld>>>,
}

impl MemoryProvider {
    /// Create a new empty memory provider.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storage: RwLock::new(HashMap::new()),
        }
    }

    /// Number of files held for a backup, if it exists.
    pub async fn file_count(&self, backup: &BackupName, instance: &InstanceName) -> Option<usize> {
        let storage = self.storage.read().await;
        storage
            .get(instance)
            .and_then(|backups| backups.get(backup))
            .map(|stored| stored.files.len())
    }

    fn not_found(backup: &BackupName, instance: &InstanceName) -> Error {
        Error::NotFound(format!(
            "Backup '{}' not found for instance '{}'",
            backup, instance
        ))
    }
}

#[async_trait]
impl SyncProvider for MemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn backup_world(
        &self,
        backup: &BackupName,
        world_data: &Path,
        instance: &InstanceName,
    ) -> Result<()> {
        let world = fsutil::folder_name(world_data)?;
        let src = world_data.to_path_buf();
        let files = fsutil::blocking(move || {
            fsutil::require_dir(&src)?;
            fsutil::read_snapshot(&src)
        })
        .await?;

        let mut storage = self.storage.write().await;
        let backups = storage.entry(instance.clone()).or_default();
        if backups.contains_key(backup) {
            return Err(Error::AlreadyExists(format!(
                "Backup '{}' already exists for instance '{}'",
                backup, instance
            )));
        }

        let count = files.len();
        backups.insert(
            backup.clone(),
            StoredWorld {
                world,
                files: Arc::new(files),
            },
        );
        info!("[{}] Stored {}/{} ({} files)", self.name, instance, backup, count);
        Ok(())
    }

    async fn backups_for_instance(&self, instance: &InstanceName) -> Result<Vec<BackupName>> {
        let storage = self.storage.read().await;
        let mut names: Vec<BackupName> = storage
            .get(instance)
            .map(|backups| backups.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }

    async fn restore_backup(&self, backup: &BackupName, instance: &Instance) -> Result<()> {
        let stored = {
            let storage = self.storage.read().await;
            storage
                .get(instance.name())
                .and_then(|backups| backups.get(backup))
                .cloned()
                .ok_or_else(|| Self::not_found(backup, instance.name()))?
        };

        let saves = instance.saves_dir();
        fsutil::blocking(move || {
            std::fs::create_dir_all(&saves)?;
            fsutil::sweep_staging(&saves)?;
            let staging = fsutil::StagingDir::new(&saves, &stored.world);
            let staged = staging.path();
            let result = fsutil::write_snapshot(&stored.files, staged)
                .and_then(|_| fsutil::replace_dir(staged, &saves.join(&stored.world)));
            if result.is_err() {
                fsutil::discard(staged);
            }
            result
        })
        .await?;

        info!("[{}] Restored {}/{}", self.name, instance.name(), backup);
        Ok(())
    }

    async fn delete_backup(&self, backup: &BackupName, instance: &Instance) -> Result<()> {
        let mut storage = self.storage.write().await;
        let backups = storage
            .get_mut(instance.name())
            .ok_or_else(|| Self::not_found(backup, instance.name()))?;
        backups
            .remove(backup)
            .ok_or_else(|| Self::not_found(backup, instance.name()))?;
        if backups.is_empty() {
            storage.remove(instance.name());
        }
        info!("[{}] Deleted {}/{}", self.name, instance.name(), backup);
        Ok(())
    }

    fn settings(&self) -> SettingsDescriptor {
        SettingsDescriptor::empty(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn world(temp: &TempDir) -> PathBuf {
        let world = temp.path().join("worlds").join("survival");
        std::fs::create_dir_all(&world).unwrap();
        std::fs::write(world.join("level.dat"), b"level").unwrap();
        world
    }

    #[tokio::test]
    async fn test_local_sync_scenario() {
        let temp = TempDir::new().unwrap();
        let provider = MemoryProvider::new("local-sync");
        let instance = Instance::new(
            InstanceName::new("SurvivalInstance").unwrap(),
            temp.path().join("SurvivalInstance"),
        );
        let save1 = BackupName::new("save1").unwrap();

        provider
            .backup_world(&save1, &world(&temp), instance.name())
            .await
            .unwrap();
        assert_eq!(
            provider.backups_for_instance(instance.name()).await.unwrap(),
            vec![save1.clone()]
        );

        provider.delete_backup(&save1, &instance).await.unwrap();
        assert!(provider
            .backups_for_instance(instance.name())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_restore_writes_saves() {
        let temp = TempDir::new().unwrap();
        let provider = MemoryProvider::new("memory");
        let instance = Instance::new(InstanceName::new("Survival").unwrap(), temp.path().join("inst"));
        let save1 = BackupName::new("save1").unwrap();

        provider
            .backup_world(&save1, &world(&temp), instance.name())
            .await
            .unwrap();
        assert_eq!(provider.file_count(&save1, instance.name()).await, Some(1));

        provider.restore_backup(&save1, &instance).await.unwrap();
        let level = instance.saves_dir().join("survival").join("level.dat");
        assert_eq!(std::fs::read(level).unwrap(), b"level");
    }

    #[tokio::test]
    async fn test_restore_sweeps_stale_staging() {
        let temp = TempDir::new().unwrap();
        let provider = MemoryProvider::new("memory");
        let instance = Instance::new(InstanceName::new("Survival").unwrap(), temp.path().join("inst"));
        let save1 = BackupName::new("save1").unwrap();
        provider
            .backup_world(&save1, &world(&temp), instance.name())
            .await
            .unwrap();

        let stale = instance.saves_dir().join(".survival.partial-0000");
        std::fs::create_dir_all(&stale).unwrap();

        provider.restore_backup(&save1, &instance).await.unwrap();
        assert!(!stale.exists());
        assert!(instance.saves_dir().join("survival").join("level.dat").exists());
    }

    #[tokio::test]
    async fn test_missing_backup_errors() {
        let temp = TempDir::new().unwrap();
        let provider = MemoryProvider::new("memory");
        let instance = Instance::new(InstanceName::new("Survival").unwrap(), temp.path());
        let ghost = BackupName::new("ghost").unwrap();

        assert!(matches!(
            provider.restore_backup(&ghost, &instance).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            provider.delete_backup(&ghost, &instance).await,
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_settings_empty() {
        assert!(MemoryProvider::new("memory").settings().is_empty());
    }
}
