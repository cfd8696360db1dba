//! Local filesystem backup provider.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::fsutil;
use crate::provider::SyncProvider;
use crate::settings::{SettingField, SettingKind, SettingsDescriptor};
use worldsync_common::{BackupName, Error, Instance, InstanceName, Result};

/// Manifest file name inside each backup directory.
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Directory inside each backup that holds the copied world folder.
pub const WORLD_DIR: &str = "world";

/// Options a `local` provider is built from.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LocalOptions {
    pub root: PathBuf,
}

fn root_field() -> SettingField {
    SettingField::new("root", "Backup folder", SettingKind::Path)
        .with_description("Directory that holds one folder per instance")
        .required()
}

/// Clear leftovers of interrupted operations from `dir`. Failures are
/// logged and otherwise ignored.
fn sweep_quietly(dir: &Path) {
    if let Err(e) = fsutil::sweep_staging(dir) {
        warn!("Could not sweep staging entries in {}: {}", dir.display(), e);
    }
}

/// Record stored alongside each local backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupManifest {
    /// Layout version.
    pub version: u32,
    pub backup: BackupName,
    pub instance: InstanceName,
    /// Folder name of the captured world; restores recreate it under `saves/`.
    pub world: String,
    pub created_at: DateTime<Utc>,
    pub files: u64,
    pub bytes: u64,
}

impl BackupManifest {
    /// Current layout version.
    pub const CURRENT_VERSION: u32 = 1;
}

/// Per-backup async locks.
#[derive(Default)]
struct BackupLocks {
    locks: Mutex<HashMap<(InstanceName, BackupName), Arc<tokio::sync::Mutex<()>>>>,
}

impl BackupLocks {
    async fn acquire(&self, instance: &InstanceName, backup: &BackupName) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody is holding or waiting on.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry((instance.clone(), backup.clone()))
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Local filesystem backup provider.
///
/// Stores each backup as `<root>/<instance>/<backup>/` holding a
/// [`BackupManifest`] and a copy of the world folder.
///
/// # Consistency
/// - Operations on the same `(instance, backup)` pair are serialized;
///   a delete racing a restore waits for the restore to finish.
/// - Backups are staged in a hidden directory and renamed into place, so a
///   failed backup is never listed.
/// - Restores are staged inside the instance's saves folder and replace the
///   existing world folder of the same name only once fully copied.
pub struct LocalProvider {
    name: String,
    root: PathBuf,
    locks: BackupLocks,
}

impl LocalProvider {
    /// Create a new local provider with the given root directory.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    /// - Staging directories left by interrupted backups are removed
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        // Create root if it doesn't exist (sync for constructor)
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                sweep_quietly(&entry.path());
            }
        }

        Ok(Self {
            name: name.into(),
            root,
            locks: BackupLocks::default(),
        })
    }

    /// Options accepted when building a local provider from configuration.
    pub fn options_descriptor() -> SettingsDescriptor {
        SettingsDescriptor::empty("local")
            .with_title("Local folder")
            .with_field(root_field())
    }

    /// Root directory holding all backups.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn instance_dir(&self, instance: &InstanceName) -> PathBuf {
        self.root.join(instance.as_str())
    }

    fn backup_dir(&self, instance: &InstanceName, backup: &BackupName) -> PathBuf {
        self.instance_dir(instance).join(backup.as_str())
    }

    /// Read the manifest of a backup.
    ///
    /// # Errors
    /// - Backup not found
    /// - Manifest unreadable
    pub async fn manifest(
        &self,
        backup: &BackupName,
        instance: &InstanceName,
    ) -> Result<BackupManifest> {
        let path = self.backup_dir(instance, backup).join(MANIFEST_FILENAME);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "Backup '{}' not found for instance '{}'",
                    backup, instance
                )));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[async_trait]
impl SyncProvider for LocalProvider {
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
        let _guard = self.locks.acquire(instance, backup).await;

        let target = self.backup_dir(instance, backup);
        if fs::try_exists(&target).await? {
            return Err(Error::AlreadyExists(format!(
                "Backup '{}' already exists for instance '{}'",
                backup, instance
            )));
        }

        let instance_dir = self.instance_dir(instance);
        fs::create_dir_all(&instance_dir).await?;
        let staging = fsutil::StagingDir::new(&instance_dir, backup.as_str());
        debug!("Staging backup {}/{} in {}", instance, backup, staging.path().display());

        let src = world_data.to_path_buf();
        let (backup_name, instance_name) = (backup.clone(), instance.clone());
        let stats = fsutil::blocking(move || {
            sweep_quietly(&instance_dir);
            let staged = staging.path();
            let result = (|| -> Result<fsutil::CopyStats> {
                fsutil::require_dir(&src)?;
                let stats = fsutil::copy_dir_recursive(&src, &staged.join(WORLD_DIR).join(&world))?;
                let manifest = BackupManifest {
                    version: BackupManifest::CURRENT_VERSION,
                    backup: backup_name,
                    instance: instance_name,
                    world,
                    created_at: Utc::now(),
                    files: stats.files,
                    bytes: stats.bytes,
                };
                std::fs::write(staged.join(MANIFEST_FILENAME), serde_json::to_vec_pretty(&manifest)?)?;
                std::fs::rename(staged, &target)?;
                Ok(stats)
            })();
            if result.is_err() {
                fsutil::discard(staged);
            }
            result
        })
        .await?;

        info!(
            "[{}] Backed up {} as {}/{} ({} files, {} bytes)",
            self.name,
            world_data.display(),
            instance,
            backup,
            stats.files,
            stats.bytes
        );
        Ok(())
    }

    async fn backups_for_instance(&self, instance: &InstanceName) -> Result<Vec<BackupName>> {
        let dir = self.instance_dir(instance);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut results = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            // Staging directories and foreign names fail validation.
            let Ok(backup) = BackupName::new(name) else {
                continue;
            };
            if fs::try_exists(entry.path().join(MANIFEST_FILENAME)).await? {
                results.push(backup);
            }
        }

        results.sort();
        Ok(results)
    }

    async fn restore_backup(&self, backup: &BackupName, instance: &Instance) -> Result<()> {
        let _guard = self.locks.acquire(instance.name(), backup).await;
        let manifest = self.manifest(backup, instance.name()).await?;

        let src = self
            .backup_dir(instance.name(), backup)
            .join(WORLD_DIR)
            .join(&manifest.world);
        let saves = instance.saves_dir();
        fs::create_dir_all(&saves).await?;
        let target = saves.join(&manifest.world);
        let staging = fsutil::StagingDir::new(&saves, &manifest.world);

        let target_display = target.display().to_string();
        fsutil::blocking(move || {
            sweep_quietly(&saves);
            let staged = staging.path();
            let result = fsutil::copy_dir_recursive(&src, staged)
                .and_then(|_| fsutil::replace_dir(staged, &target));
            if result.is_err() {
                fsutil::discard(staged);
            }
            result
        })
        .await?;

        info!(
            "[{}] Restored {}/{} into {}",
            self.name,
            instance.name(),
            backup,
            target_display
        );
        Ok(())
    }

    async fn delete_backup(&self, backup: &BackupName, instance: &Instance) -> Result<()> {
        let _guard = self.locks.acquire(instance.name(), backup).await;
        let target = self.backup_dir(instance.name(), backup);

        if !fs::try_exists(&target).await? {
            return Err(Error::NotFound(format!(
                "Backup '{}' not found for instance '{}'",
                backup,
                instance.name()
            )));
        }

        fs::remove_dir_all(&target).await?;
        info!("[{}] Deleted backup {}/{}", self.name, instance.name(), backup);
        Ok(())
    }

    fn settings(&self) -> SettingsDescriptor {
        SettingsDescriptor::empty(&self.name)
            .with_title("Local folder")
            .with_field(root_field().with_default(serde_json::Value::String(
                self.root.to_string_lossy().into_owned(),
            )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        provider: LocalProvider,
        world: PathBuf,
        instance: Instance,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let provider = LocalProvider::new("local-sync", temp.path().join("backups")).unwrap();

        let world = temp.path().join("worlds").join("survival");
        std::fs::create_dir_all(world.join("region")).unwrap();
        std::fs::write(world.join("level.dat"), b"level-v1").unwrap();
        std::fs::write(world.join("region").join("r.0.0.mca"), b"chunks").unwrap();

        let instance = Instance::new(
            InstanceName::new("SurvivalInstance").unwrap(),
            temp.path().join("instances").join("SurvivalInstance"),
        );

        Fixture {
            _temp: temp,
            provider,
            world,
            instance,
        }
    }

    fn name(s: &str) -> BackupName {
        BackupName::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_backup_list_delete() {
        let f = fixture();
        let save1 = name("save1");

        f.provider
            .backup_world(&save1, &f.world, f.instance.name())
            .await
            .unwrap();
        assert_eq!(
            f.provider.backups_for_instance(f.instance.name()).await.unwrap(),
            vec![save1.clone()]
        );

        f.provider.delete_backup(&save1, &f.instance).await.unwrap();
        assert!(f
            .provider
            .backups_for_instance(f.instance.name())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_list_unknown_instance_is_empty() {
        let f = fixture();
        let other = InstanceName::new("Creative").unwrap();
        assert!(f.provider.backups_for_instance(&other).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manifest_written() {
        let f = fixture();
        f.provider
            .backup_world(&name("save1"), &f.world, f.instance.name())
            .await
            .unwrap();

        let manifest = f.provider.manifest(&name("save1"), f.instance.name()).await.unwrap();
        assert_eq!(manifest.world, "survival");
        assert_eq!(manifest.files, 2);
        assert_eq!(manifest.bytes, 14);
        assert_eq!(manifest.version, BackupManifest::CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_duplicate_backup_fails() {
        let f = fixture();
        f.provider
            .backup_world(&name("save1"), &f.world, f.instance.name())
            .await
            .unwrap();
        let result = f
            .provider
            .backup_world(&name("save1"), &f.world, f.instance.name())
            .await;
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_backup_missing_world_leaves_nothing() {
        let f = fixture();
        let missing = f.world.with_file_name("missing");
        let result = f
            .provider
            .backup_world(&name("save1"), &missing, f.instance.name())
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));

        let leftovers = std::fs::read_dir(f.provider.instance_dir(f.instance.name()))
            .unwrap()
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_restore_replaces_world() {
        let f = fixture();
        f.provider
            .backup_world(&name("save1"), &f.world, f.instance.name())
            .await
            .unwrap();

        let restored = f.instance.saves_dir().join("survival");
        std::fs::create_dir_all(&restored).unwrap();
        std::fs::write(restored.join("level.dat"), b"level-v2").unwrap();
        std::fs::write(restored.join("stray.txt"), b"stray").unwrap();

        f.provider.restore_backup(&name("save1"), &f.instance).await.unwrap();

        assert_eq!(std::fs::read(restored.join("level.dat")).unwrap(), b"level-v1");
        assert_eq!(
            std::fs::read(restored.join("region").join("r.0.0.mca")).unwrap(),
            b"chunks"
        );
        assert!(!restored.join("stray.txt").exists());
    }

    #[tokio::test]
    async fn test_restore_missing_backup() {
        let f = fixture();
        let result = f.provider.restore_backup(&name("nope"), &f.instance).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_missing_backup() {
        let f = fixture();
        let result = f.provider.delete_backup(&name("nope"), &f.instance).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_restore_and_delete() {
        let f = fixture();
        f.provider
            .backup_world(&name("save1"), &f.world, f.instance.name())
            .await
            .unwrap();

        let backup = name("save1");
        let (restore, delete) = futures::join!(
            f.provider.restore_backup(&backup, &f.instance),
            f.provider.delete_backup(&backup, &f.instance)
        );

        // Serialized: the delete always succeeds, the restore either ran
        // first or found nothing.
        delete.unwrap();
        match restore {
            Ok(()) => assert!(f.instance.saves_dir().join("survival").join("level.dat").exists()),
            Err(e) => assert!(matches!(e, Error::NotFound(_))),
        }
    }

    #[tokio::test]
    async fn test_stale_staging_swept() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("backups");
        let stale_backup = root.join("SurvivalInstance").join(".save1.partial-deadbeef");
        std::fs::create_dir_all(stale_backup.join(WORLD_DIR)).unwrap();

        let provider = LocalProvider::new("local-sync", &root).unwrap();
        assert!(!stale_backup.exists());

        let world = temp.path().join("worlds").join("survival");
        std::fs::create_dir_all(&world).unwrap();
        std::fs::write(world.join("level.dat"), b"level").unwrap();
        let instance = Instance::new(
            InstanceName::new("SurvivalInstance").unwrap(),
            temp.path().join("SurvivalInstance"),
        );
        provider
            .backup_world(&name("save1"), &world, instance.name())
            .await
            .unwrap();

        let stale_restore = instance.saves_dir().join(".survival.partial-deadbeef");
        std::fs::create_dir_all(&stale_restore).unwrap();
        std::fs::write(stale_restore.join("level.dat"), b"half").unwrap();

        provider.restore_backup(&name("save1"), &instance).await.unwrap();
        assert!(!stale_restore.exists());
        let saves: Vec<_> = std::fs::read_dir(instance.saves_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(saves, vec![std::ffi::OsString::from("survival")]);
    }

    #[test]
    fn test_settings_descriptor() {
        let temp = TempDir::new().unwrap();
        let provider = LocalProvider::new("local-sync", temp.path()).unwrap();
        let settings = provider.settings();
        assert_eq!(settings.provider, "local-sync");
        assert!(settings.field("root").unwrap().required);
    }
}
