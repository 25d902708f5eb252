use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::Result;
use crate::project::Project;
use crate::storage::{ProjectLock, ProjectState, SnapshotManager, StateStore};
use crate::utils::fs::ensure_dir;

/// Exclusive access to one project for the length of an operation.
///
/// Opening a session takes the project lock and restores any backup an
/// interrupted operation left behind. Dropping it releases the lock.
#[derive(Debug)]
pub struct Session<'p> {
    project: &'p Project,
    store: StateStore,
    snapshots: SnapshotManager,
    operation: String,
    _lock: ProjectLock,
}

impl<'p> Session<'p> {
    pub fn open(project: &'p Project, operation: &str) -> Result<Self> {
        ensure_dir(project.graft_dir())?;
        let lock = ProjectLock::acquire_timeout(
            &project.lock_path(),
            operation,
            project.config.lock.wait(),
            project.config.lock.poll(),
        )?;

        let snapshots = SnapshotManager::new(project);
        if snapshots.recover_stale_backup()? {
            warn!(
                operation,
                stale_lock = lock.recovered_stale(),
                "project restored from an interrupted operation's backup"
            );
        }
        debug!(operation, root = %project.root().display(), "session opened");

        Ok(Self {
            project,
            store: StateStore::new(project.state_path()),
            snapshots,
            operation: operation.to_string(),
            _lock: lock,
        })
    }

    pub const fn project(&self) -> &'p Project {
        self.project
    }

    pub const fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    pub const fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn load_state(&self) -> Result<ProjectState> {
        self.store.load()
    }

    /// The state file relative to the project root, for backup coverage.
    pub fn state_relative(&self) -> PathBuf {
        self.snapshots.relative(self.store.path())
    }
}
