//! Format-aware merges for machine-readable project files.
//!
//! Every merger here is a pure function from the existing document text and
//! a directive's additions to new document text, or a typed conflict. The
//! apply pipeline does the reading and writing.

pub mod compose;
pub mod deps;
pub mod env;
pub mod registry;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GraftError, Result, ValidationError};

use self::deps::ManifestKind;
use self::registry::RegistryFormat;

/// One structured edit requested by a skill manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuredDirective {
    /// Package name to version range, merged into a dependency manifest.
    Dependencies {
        file: String,
        /// `package.json` section; `dependencies` when unset.
        #[serde(default)]
        section: Option<String>,
        entries: BTreeMap<String, String>,
    },
    /// `KEY` or `KEY=default` lines appended to an env file.
    Env { file: String, keys: Vec<String> },
    /// Service definitions added to a compose document.
    Services {
        file: String,
        services: serde_yaml::Mapping,
    },
    /// Name to implementation path pairs added to a registry.
    Endpoints {
        file: String,
        /// Dotted path to the mapping holding the registry.
        #[serde(default)]
        section: Option<String>,
        entries: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveKind {
    Dependencies,
    Env,
    Services,
    Endpoints,
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Dependencies => "dependencies",
            Self::Env => "env",
            Self::Services => "services",
            Self::Endpoints => "endpoints",
        };
        f.write_str(name)
    }
}

/// What a structured merge changed, recorded with the applied skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredOutcome {
    pub file: String,
    pub kind: DirectiveKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<String>,
    /// Dependencies whose range was raised within a compatible range.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updated: Vec<String>,
    /// Names already present and left alone.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

/// New document text plus a summary of the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredEdit {
    pub content: String,
    pub outcome: StructuredOutcome,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub skipped: Vec<String>,
}

impl Summary {
    pub fn changed(&self) -> bool {
        !self.added.is_empty() || !self.updated.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Dependencies(ManifestKind),
    Env,
    Services,
    Endpoints(RegistryFormat),
}

impl StructuredDirective {
    pub fn file(&self) -> &str {
        match self {
            Self::Dependencies { file, .. }
            | Self::Env { file, .. }
            | Self::Services { file, .. }
            | Self::Endpoints { file, .. } => file,
        }
    }

    pub const fn kind(&self) -> DirectiveKind {
        match self {
            Self::Dependencies { .. } => DirectiveKind::Dependencies,
            Self::Env { .. } => DirectiveKind::Env,
            Self::Services { .. } => DirectiveKind::Services,
            Self::Endpoints { .. } => DirectiveKind::Endpoints,
        }
    }

    /// Fail unless a merger exists for this directive's kind and file type.
    pub fn check_target(&self) -> std::result::Result<(), ValidationError> {
        self.target().map(|_| ())
    }

    fn target(&self) -> std::result::Result<Target, ValidationError> {
        let path = Path::new(self.file());
        let target = match self {
            Self::Dependencies { .. } => ManifestKind::detect(path).map(Target::Dependencies),
            Self::Env { .. } => env::is_env_file(path).then_some(Target::Env),
            Self::Services { .. } => compose::is_compose_file(path).then_some(Target::Services),
            Self::Endpoints { .. } => RegistryFormat::detect(path).map(Target::Endpoints),
        };
        target.ok_or_else(|| ValidationError::UnknownMergeTarget {
            kind: self.kind().to_string(),
            file: PathBuf::from(self.file()),
        })
    }

    /// Merge this directive into `existing` (`None` when the file is absent).
    pub fn apply(&self, existing: Option<&str>, skill: &str) -> Result<StructuredEdit> {
        let target = self.target()?;
        let existing = existing.unwrap_or("");

        let merged = match (self, target) {
            (
                Self::Dependencies {
                    section, entries, ..
                },
                Target::Dependencies(kind),
            ) => deps::merge_dependencies(kind, existing, section.as_deref(), entries),
            (Self::Env { keys, .. }, Target::Env) => Ok(env::merge_env(existing, keys, skill)),
            (Self::Services { services, .. }, Target::Services) => {
                compose::merge_services(existing, services)
            }
            (
                Self::Endpoints {
                    section, entries, ..
                },
                Target::Endpoints(format),
            ) => registry::merge_endpoints(existing, format, section.as_deref(), entries),
            _ => Err(ValidationError::UnknownMergeTarget {
                kind: self.kind().to_string(),
                file: PathBuf::from(self.file()),
            }
            .into()),
        };

        let (content, summary) = merged.map_err(|err| match err {
            GraftError::Conflict(conflict) => GraftError::Conflict(conflict.in_file(self.file())),
            other => other,
        })?;

        Ok(StructuredEdit {
            content,
            outcome: StructuredOutcome {
                file: self.file().to_string(),
                kind: self.kind(),
                added: summary.added,
                updated: summary.updated,
                skipped: summary.skipped,
            },
        })
    }
}

fn malformed(what: impl Into<String>) -> GraftError {
    GraftError::Malformed(what.into())
}
