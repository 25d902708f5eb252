//! Error types for graft.
//!
//! Validation failures are raised before anything on disk changes. Merge
//! conflicts, shared-file conflicts and lock contention abort the running
//! operation; the pipelines roll back before surfacing them.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraftError>;

#[derive(Debug, Error)]
pub enum GraftError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("merge conflict: {0}")]
    Conflict(#[from] MergeConflict),

    #[error(
        "cannot uninstall {skill}: {} is also touched by {}; resolve manually",
        file.display(),
        others.join(", ")
    )]
    SharedFile {
        skill: String,
        file: PathBuf,
        others: Vec<String>,
    },

    #[error("another operation is in progress ({holder}); retry later")]
    LockContention { holder: String },

    #[error("skill not found: {0}")]
    SkillNotFound(String),

    #[error("subprocess failed: {0}")]
    Subprocess(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML document error: {0}")]
    TomlEdit(#[from] toml_edit::TomlError),
}

impl GraftError {
    /// Stable machine-readable code for robot output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::Conflict(MergeConflict::Text { .. }) => "merge_conflict",
            Self::Conflict(MergeConflict::Dependency { .. }) => "dependency_conflict",
            Self::Conflict(MergeConflict::PortCollision { .. }) => "port_collision",
            Self::SharedFile { .. } => "shared_file_conflict",
            Self::LockContention { .. } => "lock_contention",
            Self::SkillNotFound(_) => "skill_not_found",
            Self::Subprocess(_) => "subprocess_failed",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Malformed(_)
            | Self::Json(_)
            | Self::Yaml(_)
            | Self::Toml(_)
            | Self::TomlEdit(_) => "parse_error",
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Problems with the input detected before any mutation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("skill {skill} requires {requirement}")]
    MissingPrerequisite { skill: String, requirement: String },

    #[error("skill {0} is already applied (pass --reapply to apply it again)")]
    AlreadyApplied(String),

    #[error("invalid version {input:?}: {reason}")]
    InvalidVersion { input: String, reason: String },

    #[error("no structured merger for {kind} directive targeting {}", file.display())]
    UnknownMergeTarget { kind: String, file: PathBuf },

    #[error("{} is already tracked by skill {owner}", file.display())]
    TrackedByOtherSkill { file: PathBuf, owner: String },

    #[error("skill {skill} depends on {dependency}, which is not applied")]
    MissingDependency { skill: String, dependency: String },

    #[error("skill {skill} cannot be applied alongside {other}")]
    IncompatibleSkill { skill: String, other: String },

    #[error("skill {skill} requires engine {requirement}, running {running}")]
    UnsupportedEngine {
        skill: String,
        requirement: String,
        running: String,
    },

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("unsafe path {path:?}: {reason}")]
    UnsafePath { path: String, reason: String },

    #[error("skill {0} is not applied")]
    SkillNotApplied(String),
}

/// A point of divergence the engine refuses to resolve.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeConflict {
    #[error("{} has {} conflicting hunk(s)", file.display(), hunks.len())]
    Text {
        file: PathBuf,
        hunks: Vec<ConflictHunk>,
    },

    #[error(
        "{}: package {package} wants {incoming} but {existing} is already declared",
        file.display()
    )]
    Dependency {
        file: PathBuf,
        package: String,
        existing: String,
        incoming: String,
    },

    #[error(
        "{}: service {service} claims host port {port} already used by {existing_service}",
        file.display()
    )]
    PortCollision {
        file: PathBuf,
        port: u16,
        service: String,
        existing_service: String,
    },
}

impl MergeConflict {
    /// Attach the target file to a conflict raised by a pure merger.
    #[must_use]
    pub fn in_file(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match self {
            Self::Text { hunks, .. } => Self::Text { file: path, hunks },
            Self::Dependency {
                package,
                existing,
                incoming,
                ..
            } => Self::Dependency {
                file: path,
                package,
                existing,
                incoming,
            },
            Self::PortCollision {
                port,
                service,
                existing_service,
                ..
            } => Self::PortCollision {
                file: path,
                port,
                service,
                existing_service,
            },
        }
    }
}

/// One conflicting region of a text merge, both sides verbatim.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ConflictHunk {
    /// 1-based line in the base where the region starts.
    pub base_line: usize,
    pub current: String,
    pub incoming: String,
}

impl fmt::Display for ConflictHunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "at base line {}:\n--- current\n{}--- incoming\n{}",
            self.base_line, self.current, self.incoming
        )
    }
}
