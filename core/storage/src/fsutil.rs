//! Blocking filesystem helpers shared by the built-in providers.
//!
//! Everything here blocks; async callers go through `spawn_blocking`.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use worldsync_common::{Error, Result};

/// Totals for a copied tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CopyStats {
    pub files: u64,
    pub bytes: u64,
}

/// Files of a world folder keyed by path relative to the folder.
pub(crate) type Snapshot = BTreeMap<PathBuf, Vec<u8>>;

/// Run a blocking closure on the blocking pool.
pub(crate) async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Provider(format!("Blocking task failed: {}", e)))?
}

/// Ensure `path` is an existing directory.
pub(crate) fn require_dir(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::InvalidInput(format!(
            "Not a directory: {}",
            path.display()
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::NotFound(format!(
            "Directory not found: {}",
            path.display()
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Final component of `path` as a string, used as the world folder name.
pub(crate) fn folder_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(String::from)
        .ok_or_else(|| {
            Error::InvalidInput(format!("World path has no folder name: {}", path.display()))
        })
}

const STAGING_MARKER: &str = ".partial-";

/// Staging directories of operations still running in this process.
fn live_staging() -> &'static Mutex<HashSet<PathBuf>> {
    static LIVE: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    LIVE.get_or_init(Default::default)
}

/// Hidden staging directory next to the final location of a write.
///
/// The path is marked live for as long as the value exists, so
/// [`sweep_staging`] never removes it from under a running operation.
/// The directory itself is not created or removed here.
#[derive(Debug)]
pub(crate) struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    pub fn new(parent: &Path, label: &str) -> Self {
        let path = parent.join(format!(
            ".{}{}{}",
            label,
            STAGING_MARKER,
            Uuid::new_v4().simple()
        ));
        live_staging()
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.clone());
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        live_staging()
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.path);
    }
}

fn is_staging_name(name: &str) -> bool {
    name.starts_with('.') && name.contains(STAGING_MARKER)
}

/// Remove staging directories left in `dir` by operations that never
/// finished, e.g. because the process died mid-copy. Returns how many were
/// removed. A missing `dir` is not an error.
pub(crate) fn sweep_staging(dir: &Path) -> Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let is_stale = entry.file_name().to_str().is_some_and(is_staging_name);
        if !is_stale {
            continue;
        }
        let path = entry.path();
        let live = live_staging()
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&path);
        if live {
            continue;
        }

        let result = if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove stale staging {}: {}", path.display(), e),
        }
    }

    if removed > 0 {
        info!("Removed {} stale staging entries from {}", removed, dir.display());
    }
    Ok(removed)
}

/// Copy the tree at `src` into `dst`, creating `dst`.
///
/// Symlinks are skipped.
pub(crate) fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<CopyStats> {
    let mut stats = CopyStats::default();
    fs::create_dir_all(dst)?;
    for entry in WalkDir::new(src).follow_links(false).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::Provider(e.to_string()))?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            stats.bytes += fs::copy(entry.path(), &target)?;
            stats.files += 1;
        }
    }
    Ok(stats)
}

/// Read every regular file under `src` into memory.
pub(crate) fn read_snapshot(src: &Path) -> Result<Snapshot> {
    let mut files = Snapshot::new();
    for entry in WalkDir::new(src).follow_links(false).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::Provider(e.to_string()))?
            .to_path_buf();
        files.insert(rel, fs::read(entry.path())?);
    }
    Ok(files)
}

/// Write `files` under `dst`, creating directories as needed.
pub(crate) fn write_snapshot(files: &Snapshot, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for (rel, data) in files {
        let target = dst.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, data)?;
    }
    Ok(())
}

/// Swap `staged` into place at `target`, removing whatever was there.
pub(crate) fn replace_dir(staged: &Path, target: &Path) -> Result<()> {
    if target.exists() {
        fs::remove_dir_all(target)?;
    }
    fs::rename(staged, target)?;
    Ok(())
}

/// Best-effort removal of a staging directory after a failure.
pub(crate) fn discard(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_dir_all(path) {
            warn!("Failed to remove staging dir {}: {}", path.display(), e);
        }
    }
}
