//! Dispatchable provider operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use worldsync_common::{BackupName, Instance, InstanceName, Result};
use worldsync_storage::SyncProvider;

/// Identifier assigned to each submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh job ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operation kind of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    Backup,
    Restore,
    Delete,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobKind::Backup => "backup",
            JobKind::Restore => "restore",
            JobKind::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// A mutating provider operation to run in the background.
#[derive(Debug, Clone)]
pub enum JobRequest {
    /// Capture `world_data` as `backup` of `instance`.
    Backup {
        provider: String,
        backup: BackupName,
        world_data: PathBuf,
        instance: InstanceName,
    },
    /// Restore `backup` into the saves folder of `instance`.
    Restore {
        provider: String,
        backup: BackupName,
        instance: Instance,
    },
    /// Delete `backup` of `instance`.
    Delete {
        provider: String,
        backup: BackupName,
        instance: Instance,
    },
}

impl JobRequest {
    /// Name of the provider that runs this job.
    pub fn provider(&self) -> &str {
        match self {
            JobRequest::Backup { provider, .. }
            | JobRequest::Restore { provider, .. }
            | JobRequest::Delete { provider, .. } => provider,
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            JobRequest::Backup { .. } => JobKind::Backup,
            JobRequest::Restore { .. } => JobKind::Restore,
            JobRequest::Delete { .. } => JobKind::Delete,
        }
    }

    pub fn backup(&self) -> &BackupName {
        match self {
            JobRequest::Backup { backup, .. }
            | JobRequest::Restore { backup, .. }
            | JobRequest::Delete { backup, .. } => backup,
        }
    }

    pub fn instance_name(&self) -> &InstanceName {
        match self {
            JobRequest::Backup { instance, .. } => instance,
            JobRequest::Restore { instance, .. } | JobRequest::Delete { instance, .. } => {
                instance.name()
            }
        }
    }

    /// Run the operation against `provider` once.
    pub async fn execute(&self, provider: &dyn SyncProvider) -> Result<()> {
        match self {
            JobRequest::Backup {
                backup,
                world_data,
                instance,
                ..
            } => provider.backup_world(backup, world_data, instance).await,
            JobRequest::Restore {
                backup, instance, ..
            } => provider.restore_backup(backup, instance).await,
            JobRequest::Delete {
                backup, instance, ..
            } => provider.delete_backup(backup, instance).await,
        }
    }
}
