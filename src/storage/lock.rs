//! Project-wide operation lock.
//!
//! The lock is a file at `.graft/lock` holding JSON about its holder, plus an
//! exclusive OS advisory lock on that file. The file's presence marks an
//! operation in progress; the advisory lock tells a live holder apart from
//! one that crashed. A file whose advisory lock can be taken was left by a
//! dead process and is reported as stale so the caller can recover.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{GraftError, Result};

/// Information about the lock holder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
    pub hostname: String,
    /// Operation the holder is running (apply, replay, ...).
    pub operation: String,
}

impl LockInfo {
    fn current(operation: &str) -> Self {
        Self {
            pid: std::process::id(),
            acquired_at: Utc::now(),
            hostname: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string()),
            operation: operation.to_string(),
        }
    }

    fn describe(&self) -> String {
        format!(
            "{} by pid {} on {} since {}",
            self.operation,
            self.pid,
            self.hostname,
            self.acquired_at.to_rfc3339()
        )
    }
}

/// Held for the duration of one apply, replay, or uninstall.
#[derive(Debug)]
pub struct ProjectLock {
    file: File,
    path: PathBuf,
    recovered_stale: bool,
}

impl ProjectLock {
    /// Try once; `LockContention` if a live holder exists.
    pub fn try_acquire(path: &Path, operation: &str) -> Result<Self> {
        Self::try_acquire_inner(path, operation)?.ok_or_else(|| contention(path))
    }

    /// Poll until `timeout` elapses. A zero timeout tries exactly once.
    pub fn acquire_timeout(
        path: &Path,
        operation: &str,
        timeout: Duration,
        poll: Duration,
    ) -> Result<Self> {
        let start = Instant::now();
        loop {
            if let Some(lock) = Self::try_acquire_inner(path, operation)? {
                return Ok(lock);
            }
            if start.elapsed() >= timeout {
                return Err(contention(path));
            }
            std::thread::sleep(poll);
        }
    }

    fn try_acquire_inner(path: &Path, operation: &str) -> Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let existed = path.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(err) if is_contended(&err) => return Ok(None),
            Err(err) => return Err(err.into()),
        }

        // The previous holder may have removed the marker between our open
        // and our lock; retry against whatever is at the path now.
        if !same_file(&file, path) {
            return Ok(None);
        }

        // An existing marker we could lock belongs to a dead holder.
        let recovered_stale = existed && read_info(path).is_some();
        if recovered_stale {
            warn!(lock = %path.display(), "recovering stale lock left by a dead process");
        }

        write_info(&file, &LockInfo::current(operation))?;
        debug!(lock = %path.display(), operation, "lock acquired");

        Ok(Some(Self {
            file,
            path: path.to_path_buf(),
            recovered_stale,
        }))
    }

    /// True when this acquisition replaced a crashed holder's marker.
    pub const fn recovered_stale(&self) -> bool {
        self.recovered_stale
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Holder info of whoever has the lock at `path`, if anyone wrote one.
    pub fn holder(path: &Path) -> Option<LockInfo> {
        read_info(path)
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        // Remove the marker before unlocking so a waiter never sees a
        // locked-then-vanished file as stale.
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), "failed to remove lock marker: {err}");
        }
        let _ = FileExt::unlock(&self.file);
    }
}

fn contention(path: &Path) -> GraftError {
    let holder = read_info(path).map_or_else(|| "unknown holder".to_string(), |info| info.describe());
    GraftError::LockContention { holder }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(unix)]
fn same_file(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_file(_file: &File, path: &Path) -> bool {
    path.exists()
}

fn read_info(path: &Path) -> Option<LockInfo> {
    let content = fs::read_to_string(path).ok()?;
    if content.trim().is_empty() {
        return None;
    }
    serde_json::from_str(&content).ok()
}

fn write_info(file: &File, info: &LockInfo) -> Result<()> {
    let mut file = file;
    file.set_len(0)?;
    let json = serde_json::to_string_pretty(info)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    Ok(())
}
