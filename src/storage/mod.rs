//! On-disk engine state under `.graft/`.
//!
//! - `state`: the applied-skill record (`state.toml`)
//! - `snapshot`: merge bases, pre-images and per-operation backups
//! - `lock`: the single-writer project lock

pub mod lock;
pub mod snapshot;
pub mod state;

pub use lock::{LockInfo, ProjectLock};
pub use snapshot::{BackupGuard, SnapshotManager};
pub use state::{AppliedSkill, FileKind, FileRecord, ProjectState, StateStore, TemplateInfo};
