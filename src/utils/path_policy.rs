//! Validation for project-relative paths named by skill manifests.
//!
//! Manifests are authored externally, so every path they name must stay
//! inside the project root and must not reach into the engine's own
//! `.graft/` directory.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::error::{GraftError, ValidationError};
use crate::project::GRAFT_DIR;

/// Reasons a manifest path is refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPolicyViolation {
    Empty,
    TraversalAttempt,
    Absolute,
    NullByte,
    Reserved,
    SymlinkEscape { symlink: PathBuf, target: PathBuf },
}

impl fmt::Display for PathPolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty path"),
            Self::TraversalAttempt => write!(f, "path contains traversal sequences"),
            Self::Absolute => write!(f, "must be a relative path"),
            Self::NullByte => write!(f, "contains null byte"),
            Self::Reserved => write!(f, "{GRAFT_DIR}/ is reserved for engine state"),
            Self::SymlinkEscape { symlink, target } => {
                write!(f, "symlink {symlink:?} points outside the project ({target:?})")
            }
        }
    }
}

impl PathPolicyViolation {
    fn into_error(self, path: &str) -> GraftError {
        ValidationError::UnsafePath {
            path: path.to_string(),
            reason: self.to_string(),
        }
        .into()
    }
}

/// Normalize a manifest path into a clean relative `PathBuf`.
///
/// `./a//b` becomes `a/b`; `..`, absolute paths, and anything under
/// `.graft/` are rejected.
pub fn normalize_relative(relative: &str) -> crate::Result<PathBuf> {
    if relative.trim().is_empty() {
        return Err(PathPolicyViolation::Empty.into_error(relative));
    }
    if relative.contains('\0') {
        return Err(PathPolicyViolation::NullByte.into_error(relative));
    }

    let mut normalized = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::ParentDir => {
                return Err(PathPolicyViolation::TraversalAttempt.into_error(relative));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathPolicyViolation::Absolute.into_error(relative));
            }
            Component::CurDir => {}
            Component::Normal(name) => normalized.push(name),
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(PathPolicyViolation::Empty.into_error(relative));
    }
    if normalized.starts_with(GRAFT_DIR) {
        return Err(PathPolicyViolation::Reserved.into_error(relative));
    }

    Ok(normalized)
}

/// Refuse to follow a symlink inside the project that resolves outside it.
pub fn deny_symlink_escape(root: &Path, relative: &Path) -> crate::Result<()> {
    let Ok(canonical_root) = root.canonicalize() else {
        return Ok(());
    };

    let mut current = root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        if !current.is_symlink() {
            continue;
        }
        if let Ok(resolved) = current.canonicalize() {
            if !resolved.starts_with(&canonical_root) {
                return Err(PathPolicyViolation::SymlinkEscape {
                    symlink: current.clone(),
                    target: resolved,
                }
                .into_error(&relative.to_string_lossy()));
            }
        }
    }
    Ok(())
}

/// Forward-slash rendering used in state records and reports.
pub fn display_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
