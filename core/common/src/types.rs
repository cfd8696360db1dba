//! Common types used throughout worldsync.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Name of the folder inside an instance that holds its worlds.
pub const SAVES_DIR: &str = "saves";

/// Check that `value` can be used as a single path component.
///
/// Names starting with '.' are reserved for provider bookkeeping
/// (staging directories and the like).
fn validate_component(kind: &str, value: &str) -> crate::Result<()> {
    if value.is_empty() {
        return Err(crate::Error::InvalidInput(format!("{} cannot be empty", kind)));
    }
    if value.contains('/') || value.contains('\\') || value.contains('\0') {
        return Err(crate::Error::InvalidInput(format!(
            "{} cannot contain separators: {:?}",
            kind, value
        )));
    }
    if value.starts_with('.') {
        return Err(crate::Error::InvalidInput(format!(
            "{} cannot start with '.': {:?}",
            kind, value
        )));
    }
    Ok(())
}

/// Name of a game instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceName(String);

impl InstanceName {
    /// Create a new instance name.
    ///
    /// # Errors
    /// - Empty, contains a path separator, or starts with '.'
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        validate_component("Instance name", &name)?;
        Ok(Self(name))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for InstanceName {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::new(value)
    }
}

impl From<InstanceName> for String {
    fn from(name: InstanceName) -> Self {
        name.0
    }
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a backup, unique within one instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BackupName(String);

impl BackupName {
    /// Create a new backup name.
    ///
    /// Same rules as [`InstanceName::new`].
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        validate_component("Backup name", &name)?;
        Ok(Self(name))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BackupName {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::new(value)
    }
}

impl From<BackupName> for String {
    fn from(name: BackupName) -> Self {
        name.0
    }
}

impl fmt::Display for BackupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A game instance that owns zero or more world backups.
///
/// Path resolution is the host's job; this only records where the
/// instance lives on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    name: InstanceName,
    root: PathBuf,
}

impl Instance {
    /// Create an instance rooted at `root`.
    pub fn new(name: InstanceName, root: impl Into<PathBuf>) -> Self {
        Self {
            name,
            root: root.into(),
        }
    }

    /// Instance name.
    pub fn name(&self) -> &InstanceName {
        &self.name
    }

    /// Instance root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory worlds are restored into.
    pub fn saves_dir(&self) -> PathBuf {
        self.root.join(SAVES_DIR)
    }
}
