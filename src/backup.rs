use crate::filter::BACKUP_DIR;
use anyhow::{Context, Result};
use chrono::Local;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Keeps the last `max_backups` copies of every changed file under
/// `<root>/.auto_versions/<relative path>.history/`.
#[derive(Debug, Clone)]
pub struct BackupRotator {
    root: PathBuf,
    max_backups: usize,
}

impl BackupRotator {
    pub fn new(root: &Path, max_backups: usize) -> Self {
        Self {
            root: root.to_path_buf(),
            max_backups,
        }
    }

    pub fn backup_root(&self) -> PathBuf {
        self.root.join(BACKUP_DIR)
    }

    /// History directory for `path`, or `None` if it is outside the root.
    pub fn history_dir(&self, path: &Path) -> Option<PathBuf> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let mut name: OsString = rel.file_name()?.to_os_string();
        name.push(".history");
        Some(self.backup_root().join(rel.with_file_name(name)))
    }

    /// Snapshot `path` and evict the oldest copies beyond the cap.
    ///
    /// Returns the new snapshot, or `None` when the file is outside the root
    /// or no longer exists.
    pub fn rotate(&self, path: &Path) -> Result<Option<PathBuf>> {
        if !path.is_file() {
            return Ok(None);
        }
        let Some(dir) = self.history_dir(path) else {
            return Ok(None);
        };
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

        let dest = snapshot_name(&dir, path);
        fs::copy(path, &dest)
            .with_context(|| format!("Failed to snapshot {}", path.display()))?;
        debug!(snapshot = %dest.display(), "backup written");

        self.evict(&dir);
        Ok(Some(dest))
    }

    /// Snapshots for `path`, oldest first.
    pub fn history(&self, path: &Path) -> Vec<PathBuf> {
        self.history_dir(path)
            .map(|dir| list_snapshots(&dir))
            .unwrap_or_default()
    }

    fn evict(&self, dir: &Path) {
        let snapshots = list_snapshots(dir);
        let excess = snapshots.len().saturating_sub(self.max_backups);
        for old in snapshots.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&old) {
                warn!(snapshot = %old.display(), error = %e, "failed to evict backup");
            }
        }
    }
}

fn snapshot_name(dir: &Path, source: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M%S%.6f").to_string();
    let ext = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let mut dest = dir.join(format!("{stamp}{ext}"));
    // '_' sorts after '.', so a collision still lands after the plain name.
    let mut n = 1;
    while dest.exists() {
        dest = dir.join(format!("{stamp}_{n:03}{ext}"));
        n += 1;
    }
    dest
}

fn list_snapshots(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    files
}
