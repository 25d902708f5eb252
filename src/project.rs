//! Project layout: where the engine keeps state, snapshots and its lock.
//!
//! ```text
//! <root>/
//!   .graft/
//!     state.toml       applied-skill record (plus foreign metadata)
//!     config.toml      optional project config
//!     lock             present while an operation runs
//!     base/<path>      ancestors used for three-way merges
//!     origin/<path>    content when the engine first saw the file
//!     preimage/<skill>/<path>  ancestor before that skill merged
//!     backup/          transient pre-operation copies
//! ```

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::Result;

pub const GRAFT_DIR: &str = ".graft";

#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    pub config: Config,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Open a project with config loaded from its `.graft/` directory.
    pub fn open(root: impl Into<PathBuf>, explicit_config: Option<&Path>) -> Result<Self> {
        let root = root.into();
        let config = Config::load(explicit_config, &root.join(GRAFT_DIR))?;
        Ok(Self::new(root, config))
    }

    /// `--root`, else `GRAFT_ROOT`, else the nearest ancestor holding
    /// `.graft/`, else the current directory.
    pub fn discover_root(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(root) = explicit {
            return Ok(root.to_path_buf());
        }
        if let Ok(root) = std::env::var("GRAFT_ROOT") {
            return Ok(PathBuf::from(root));
        }
        let cwd = std::env::current_dir()?;
        Ok(find_upwards(&cwd, GRAFT_DIR).unwrap_or(cwd))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn graft_dir(&self) -> PathBuf {
        self.root.join(GRAFT_DIR)
    }

    pub fn state_path(&self) -> PathBuf {
        self.graft_dir().join("state.toml")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.graft_dir().join("lock")
    }

    pub fn base_dir(&self) -> PathBuf {
        self.graft_dir().join("base")
    }

    pub fn origin_dir(&self) -> PathBuf {
        self.graft_dir().join("origin")
    }

    pub fn preimage_dir(&self) -> PathBuf {
        self.graft_dir().join("preimage")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.graft_dir().join("backup")
    }

    pub fn skills_dir(&self) -> PathBuf {
        self.root.join(&self.config.paths.skills_dir)
    }

    pub fn migrations_dir(&self) -> PathBuf {
        self.root.join(&self.config.paths.migrations_dir)
    }

    /// Absolute location of a project-relative path.
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }
}

fn find_upwards(start: &Path, name: &str) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir.join(name).is_dir() {
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }
    None
}
