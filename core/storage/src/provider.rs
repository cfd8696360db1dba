//! Backup provider trait definition.

use async_trait::async_trait;
use std::path::Path;

use crate::settings::SettingsDescriptor;
use worldsync_common::{BackupName, Instance, InstanceName, Result};

/// Capability contract for world backup/sync backends.
///
/// A provider is registered once under [`SyncProvider::name`] and is then
/// looked up by that name for every operation. Providers track their own
/// backups; nothing outside the provider knows where the bytes live.
///
/// # Concurrency
/// Every operation may be invoked from a worker task, concurrently with
/// other operations on the same provider and with unrelated host activity.
/// Restore in particular must never be assumed to run on the caller's task.
/// The contract gives no ordering guarantees between concurrent calls;
/// implementations must document their own consistency rules (for example,
/// what happens when a delete races a restore of the same backup).
///
/// # Failure semantics
/// Atomicity, retry and partial-failure recovery are provider-defined.
/// Transient backend failures should be reported as
/// `Error::Unavailable` so callers can retry them.
#[async_trait]
pub trait SyncProvider: Send + Sync {
    /// Get the provider name this provider registers under (e.g., "local-sync").
    ///
    /// Must not change after construction.
    fn name(&self) -> &str;

    /// Capture the world folder at `world_data` as backup `backup` of `instance`.
    ///
    /// # Postconditions
    /// - On success, `backups_for_instance(instance)` includes `backup`
    async fn backup_world(
        &self,
        backup: &BackupName,
        world_data: &Path,
        instance: &InstanceName,
    ) -> Result<()>;

    /// List the names of backups this provider holds for `instance`.
    ///
    /// Order is unspecified. An instance with no backups yields an empty
    /// list, never an error.
    async fn backups_for_instance(&self, instance: &InstanceName) -> Result<Vec<BackupName>>;

    /// Restore `backup` into the save location of `instance`.
    ///
    /// May block on I/O for a long time; callers should run it off any
    /// interactive task.
    async fn restore_backup(&self, backup: &BackupName, instance: &Instance) -> Result<()>;

    /// Delete `backup` of `instance`.
    ///
    /// # Postconditions
    /// - On success, `backups_for_instance` no longer includes `backup`
    async fn delete_backup(&self, backup: &BackupName, instance: &Instance) -> Result<()>;

    /// Describe this provider's configurable options.
    ///
    /// Providers without options return [`SettingsDescriptor::empty`].
    fn settings(&self) -> SettingsDescriptor;
}
