mod checkpoint;

pub use checkpoint::{GitCheckpoint, VersionControl};

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CleanupConfig;
use crate::error::{CleanupError, Result};
use crate::source::write_atomic;

const MANIFEST_VERSION: u32 = 1;
const MANIFEST_FILE: &str = "manifest.json";
const FILES_DIR: &str = "files";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub original: PathBuf,
    pub backup: PathBuf,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    created_at: DateTime<Utc>,
    root: PathBuf,
    entries: Vec<BackupEntry>,
    /// Files that did not exist before the run.
    created: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub restored: usize,
    pub removed: usize,
}

fn backup_error(path: &Path, err: impl ToString) -> CleanupError {
    CleanupError::Backup {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Session directories live under `<root>/<backup_dir>/`, one per run.
#[derive(Debug, Clone)]
pub struct BackupManager {
    root: PathBuf,
    dir: PathBuf,
    retention: usize,
}

impl BackupManager {
    pub fn new(root: impl Into<PathBuf>, backup_dir: impl AsRef<Path>, retention: usize) -> Self {
        let root = root.into();
        let dir = root.join(backup_dir);
        Self { root, dir, retention }
    }

    pub fn from_config(root: &Path, config: &CleanupConfig) -> Self {
        Self::new(root, &config.backup_dir, config.backup_retention)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn start_session(&self) -> Result<BackupSession> {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S%.3f").to_string();
        let mut dir = self.dir.join(&stamp);
        let mut n = 1;
        while dir.exists() {
            dir = self.dir.join(format!("{}-{}", stamp, n));
            n += 1;
        }
        fs::create_dir_all(&dir).map_err(|e| backup_error(&dir, e))?;

        let session = BackupSession {
            dir,
            root: self.root.clone(),
            manifest: Mutex::new(Manifest {
                version: MANIFEST_VERSION,
                created_at: Utc::now(),
                root: self.root.clone(),
                entries: Vec::new(),
                created: Vec::new(),
            }),
        };
        session.save()?;
        tracing::info!(dir = %session.dir.display(), "backup session started");
        Ok(session)
    }

    /// Session directories, oldest first.
    pub fn sessions(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut sessions: Vec<PathBuf> = fs::read_dir(&self.dir)
            .map_err(|e| CleanupError::io(&self.dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.join(MANIFEST_FILE).is_file())
            .collect();
        sessions.sort();
        Ok(sessions)
    }

    /// Removes all but the newest `retention` sessions.
    pub fn prune(&self) -> Result<usize> {
        let sessions = self.sessions()?;
        let excess = sessions.len().saturating_sub(self.retention.max(1));
        for dir in sessions.iter().take(excess) {
            fs::remove_dir_all(dir).map_err(|e| CleanupError::io(dir, e))?;
            tracing::debug!(dir = %dir.display(), "pruned backup session");
        }
        Ok(excess)
    }
}

/// Backups taken during one run. Shared across the executor's workers.
#[derive(Debug)]
pub struct BackupSession {
    dir: PathBuf,
    root: PathBuf,
    manifest: Mutex<Manifest>,
}

impl BackupSession {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn backup_path_for(&self, path: &Path) -> PathBuf {
        let relative: PathBuf = match path.strip_prefix(&self.root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => path
                .components()
                .filter(|c| matches!(c, Component::Normal(_)))
                .collect(),
        };
        self.dir.join(FILES_DIR).join(relative)
    }

    fn save(&self) -> Result<()> {
        let manifest = self
            .manifest
            .lock()
            .map_err(|_| backup_error(&self.dir, "manifest lock poisoned"))?;
        let json = serde_json::to_vec_pretty(&*manifest)?;
        write_atomic(&self.dir.join(MANIFEST_FILE), &json)
    }

    /// Byte-identical copy of `path`, flushed to disk before returning. A
    /// second call for the same file keeps the first copy.
    pub fn create_file_backup(&self, path: &Path) -> Result<PathBuf> {
        {
            let manifest = self
                .manifest
                .lock()
                .map_err(|_| backup_error(path, "manifest lock poisoned"))?;
            if let Some(entry) = manifest.entries.iter().find(|e| e.original == path) {
                return Ok(entry.backup.clone());
            }
        }

        let backup = self.backup_path_for(path);
        if let Some(parent) = backup.parent() {
            fs::create_dir_all(parent).map_err(|e| backup_error(parent, e))?;
        }
        let size_bytes = fs::copy(path, &backup).map_err(|e| backup_error(path, e))?;
        fs::File::open(&backup)
            .and_then(|f| f.sync_all())
            .map_err(|e| backup_error(&backup, e))?;

        self.manifest
            .lock()
            .map_err(|_| backup_error(path, "manifest lock poisoned"))?
            .entries
            .push(BackupEntry {
                original: path.to_path_buf(),
                backup: backup.clone(),
                size_bytes,
            });
        self.save()?;
        tracing::debug!(path = %path.display(), backup = %backup.display(), "backup created");
        Ok(backup)
    }

    /// Marks a file created by the run so rollback deletes it.
    pub fn record_created(&self, path: &Path) -> Result<()> {
        self.manifest
            .lock()
            .map_err(|_| backup_error(path, "manifest lock poisoned"))?
            .created
            .push(path.to_path_buf());
        self.save()
    }

    pub fn entries(&self) -> Vec<BackupEntry> {
        self.manifest
            .lock()
            .map(|m| m.entries.clone())
            .unwrap_or_default()
    }

    /// Puts every backed-up file back and removes files the run created.
    pub fn restore_all(&self) -> Result<RestoreSummary> {
        let (entries, created) = {
            let manifest = self
                .manifest
                .lock()
                .map_err(|_| backup_error(&self.dir, "manifest lock poisoned"))?;
            (manifest.entries.clone(), manifest.created.clone())
        };

        let mut summary = RestoreSummary::default();
        for entry in &entries {
            if restore_from_backup(&entry.original, &entry.backup)? {
                summary.restored += 1;
            }
        }
        for path in &created {
            if path.exists() {
                fs::remove_file(path).map_err(|e| CleanupError::io(path, e))?;
                summary.removed += 1;
            }
        }
        tracing::info!(
            restored = summary.restored,
            removed = summary.removed,
            "backup session restored"
        );
        Ok(summary)
    }
}

/// Writes the backup over `path` through a temp file and rename, so the
/// target is either fully restored or untouched.
pub fn restore_from_backup(path: &Path, backup: &Path) -> Result<bool> {
    if !backup.is_file() {
        return Ok(false);
    }
    let bytes = fs::read(backup).map_err(|e| backup_error(backup, e))?;
    write_atomic(path, &bytes)?;
    Ok(true)
}
