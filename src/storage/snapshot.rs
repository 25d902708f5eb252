//! Base and backup snapshots.
//!
//! The base subtree mirrors every tracked file's ancestor and is the common
//! ancestor for three-way merges. A base is captured once and only replaced
//! after a successful merge of that file. The origin subtree keeps the
//! content a file had when its base was first captured and never changes;
//! skill versions of a file are written against it.
//!
//! A backup covers one operation. [`SnapshotManager::capture_backup`] copies
//! the files an operation is about to touch and returns a [`BackupGuard`];
//! unless the guard is explicitly discarded, dropping it restores every
//! covered file, deleting the ones that did not exist beforehand.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::Result;
use crate::project::Project;
use crate::utils::fs::{atomic_write, copy_permissions, read_optional, remove_file_pruning};

const BACKUP_MANIFEST: &str = "manifest.json";
const BACKUP_FILES: &str = "files";

#[derive(Debug, Clone)]
pub struct SnapshotManager {
    root: PathBuf,
    base_dir: PathBuf,
    origin_dir: PathBuf,
    preimage_dir: PathBuf,
    backup_dir: PathBuf,
}

impl SnapshotManager {
    pub fn new(project: &Project) -> Self {
        Self {
            root: project.root().to_path_buf(),
            base_dir: project.base_dir(),
            origin_dir: project.origin_dir(),
            preimage_dir: project.preimage_dir(),
            backup_dir: project.backup_dir(),
        }
    }

    pub fn base_path(&self, relative: &Path) -> PathBuf {
        self.base_dir.join(relative)
    }

    pub fn origin_path(&self, relative: &Path) -> PathBuf {
        self.origin_dir.join(relative)
    }

    pub fn preimage_path(&self, skill: &str, relative: &Path) -> PathBuf {
        self.preimage_dir.join(skill).join(relative)
    }

    /// Project-relative location of the base for `relative`, for backups.
    pub fn base_relative(&self, relative: &Path) -> PathBuf {
        self.relative(&self.base_path(relative))
    }

    pub fn origin_relative(&self, relative: &Path) -> PathBuf {
        self.relative(&self.origin_path(relative))
    }

    pub fn preimage_relative(&self, skill: &str, relative: &Path) -> PathBuf {
        self.relative(&self.preimage_path(skill, relative))
    }

    /// `path` relative to the project root, for backup coverage.
    pub fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map_or_else(|_| path.to_path_buf(), Path::to_path_buf)
    }

    pub fn read_base(&self, relative: &Path) -> Result<Option<String>> {
        read_optional(self.base_path(relative))
    }

    pub fn has_base(&self, relative: &Path) -> bool {
        self.base_path(relative).is_file()
    }

    /// Record the working copy of `relative` as its ancestor unless a base
    /// already exists. Returns true when a base was written.
    pub fn capture_base(&self, relative: &Path) -> Result<bool> {
        if self.has_base(relative) {
            return Ok(false);
        }
        let bytes = match fs::read(self.root.join(relative)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err.into()),
        };
        // Only text participates in merges.
        if std::str::from_utf8(&bytes).is_err() {
            debug!(file = %relative.display(), "binary file, no base");
            return Ok(false);
        }
        atomic_write(self.base_path(relative), &bytes)?;
        if !self.origin_path(relative).is_file() {
            atomic_write(self.origin_path(relative), &bytes)?;
        }
        debug!(file = %relative.display(), "base captured");
        Ok(true)
    }

    pub fn read_origin(&self, relative: &Path) -> Result<Option<String>> {
        read_optional(self.origin_path(relative))
    }

    /// Record `content` as the origin of `relative` unless one exists.
    pub fn capture_origin(&self, relative: &Path, content: &str) -> Result<bool> {
        if self.origin_path(relative).is_file() {
            return Ok(false);
        }
        atomic_write(self.origin_path(relative), content)?;
        Ok(true)
    }

    /// Replace the ancestor after a successful merge.
    pub fn update_base(&self, relative: &Path, content: &str) -> Result<()> {
        atomic_write(self.base_path(relative), content)
    }

    /// Forget a file entirely: its base and its origin.
    pub fn remove_base(&self, relative: &Path) -> Result<()> {
        remove_file_pruning(&self.base_path(relative), &self.base_dir)?;
        remove_file_pruning(&self.origin_path(relative), &self.origin_dir)?;
        Ok(())
    }

    /// Drop every base and pre-image; used when replay rebuilds from a new
    /// template. Origins survive: recorded skills were written against them.
    pub fn clear_bases(&self) -> Result<()> {
        remove_dir_if_exists(&self.base_dir)?;
        remove_dir_if_exists(&self.preimage_dir)
    }

    /// Every base, origin and pre-image file, project-relative.
    pub fn snapshot_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for dir in [&self.base_dir, &self.origin_dir, &self.preimage_dir] {
            if !dir.is_dir() {
                continue;
            }
            for entry in WalkDir::new(dir).sort_by_file_name() {
                let entry = entry.map_err(|err| {
                    std::io::Error::other(format!("walk {}: {err}", dir.display()))
                })?;
                if entry.file_type().is_file() {
                    files.push(self.relative(entry.path()));
                }
            }
        }
        Ok(files)
    }

    /// Keep the ancestor a skill merged against so uninstall can return to it.
    pub fn stash_preimage(&self, skill: &str, relative: &Path, content: &str) -> Result<()> {
        atomic_write(self.preimage_path(skill, relative), content)
    }

    pub fn read_preimage(&self, skill: &str, relative: &Path) -> Result<Option<String>> {
        read_optional(self.preimage_path(skill, relative))
    }

    pub fn drop_preimages(&self, skill: &str) -> Result<()> {
        remove_dir_if_exists(&self.preimage_dir.join(skill))
    }

    /// Copy every listed project-relative path aside before an operation.
    pub fn capture_backup<I, P>(&self, operation: &str, paths: I) -> Result<BackupGuard>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        // A leftover backup means a previous run died mid-operation.
        self.recover_stale_backup()?;

        let manifest = BackupManifest {
            id: Uuid::new_v4().to_string(),
            operation: operation.to_string(),
            created_at: Utc::now(),
            entries: Vec::new(),
        };
        let mut guard = BackupGuard {
            root: self.root.clone(),
            backup_dir: self.backup_dir.clone(),
            manifest,
            covered: BTreeSet::new(),
            finished: false,
        };
        for path in paths {
            guard.cover(path.as_ref())?;
        }
        guard.write_manifest()?;
        debug!(
            operation,
            files = guard.manifest.entries.len(),
            "backup captured"
        );
        Ok(guard)
    }

    /// Restore a backup left behind by a crashed operation.
    pub fn recover_stale_backup(&self) -> Result<bool> {
        let manifest_path = self.backup_dir.join(BACKUP_MANIFEST);
        let Some(raw) = read_optional(&manifest_path)? else {
            remove_dir_if_exists(&self.backup_dir)?;
            return Ok(false);
        };

        let manifest: BackupManifest = serde_json::from_str(&raw)?;
        warn!(
            operation = %manifest.operation,
            backup = %manifest.id,
            "restoring backup left by an interrupted operation"
        );
        restore_entries(&self.root, &self.backup_dir, &manifest.entries)?;
        remove_dir_if_exists(&self.backup_dir)?;
        Ok(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BackupManifest {
    id: String,
    operation: String,
    created_at: DateTime<Utc>,
    entries: Vec<BackupEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BackupEntry {
    path: PathBuf,
    existed: bool,
}

/// Pre-operation copy of the files an operation touches.
///
/// Dropping the guard without calling [`BackupGuard::discard`] restores
/// everything it covers.
#[derive(Debug)]
pub struct BackupGuard {
    root: PathBuf,
    backup_dir: PathBuf,
    manifest: BackupManifest,
    covered: BTreeSet<PathBuf>,
    finished: bool,
}

impl BackupGuard {
    /// Add one more path after the backup was taken. Covering a path twice
    /// keeps the first copy.
    pub fn cover(&mut self, relative: &Path) -> Result<()> {
        if !self.covered.insert(relative.to_path_buf()) {
            return Ok(());
        }
        let source = self.root.join(relative);
        let existed = source.is_file();
        if existed {
            let bytes = fs::read(&source)?;
            let copy = self.backup_dir.join(BACKUP_FILES).join(relative);
            atomic_write(&copy, bytes)?;
            copy_permissions(&source, &copy)?;
        }
        self.manifest.entries.push(BackupEntry {
            path: relative.to_path_buf(),
            existed,
        });
        if self.backup_dir.join(BACKUP_MANIFEST).exists() {
            self.write_manifest()?;
        }
        Ok(())
    }

    pub fn covers(&self, relative: &Path) -> bool {
        self.covered.contains(relative)
    }

    fn write_manifest(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.manifest)?;
        atomic_write(self.backup_dir.join(BACKUP_MANIFEST), json)
    }

    /// Put every covered file back the way it was and drop the backup.
    pub fn restore(mut self) -> Result<()> {
        self.finished = true;
        self.restore_inner()
    }

    fn restore_inner(&self) -> Result<()> {
        restore_entries(&self.root, &self.backup_dir, &self.manifest.entries)?;
        remove_dir_if_exists(&self.backup_dir)?;
        info!(
            operation = %self.manifest.operation,
            files = self.manifest.entries.len(),
            "rolled back"
        );
        Ok(())
    }

    /// The operation succeeded; forget the copies.
    pub fn discard(mut self) -> Result<()> {
        self.finished = true;
        remove_dir_if_exists(&self.backup_dir)
    }
}

impl Drop for BackupGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.restore_inner() {
            error!(
                operation = %self.manifest.operation,
                backup = %self.backup_dir.display(),
                "rollback failed, backup left in place for recovery: {err}"
            );
        }
    }
}

fn restore_entries(root: &Path, backup_dir: &Path, entries: &[BackupEntry]) -> Result<()> {
    for entry in entries.iter().rev() {
        let target = root.join(&entry.path);
        if entry.existed {
            let copy = backup_dir.join(BACKUP_FILES).join(&entry.path);
            atomic_write(&target, fs::read(&copy)?)?;
            copy_permissions(&copy, &target)?;
        } else {
            remove_file_pruning(&target, root)?;
        }
    }
    Ok(())
}

fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
