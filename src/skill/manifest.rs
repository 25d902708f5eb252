use std::collections::BTreeSet;
use std::path::PathBuf;

use semver::VersionReq;
use serde::{Deserialize, Serialize};

use crate::error::{GraftError, Result, ValidationError};
use crate::structured::StructuredDirective;
use crate::utils::path_policy::normalize_relative;
use crate::version::Version;

pub const MANIFEST_FILE: &str = "manifest.yaml";

/// Engine version skills can require with `requires.engine`.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillManifest {
    pub skill: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub requires: Requirements,
    /// Skills that must already be applied.
    #[serde(default)]
    pub depends: Vec<String>,
    /// Skills that must not be applied.
    #[serde(default)]
    pub conflicts: Vec<String>,
    /// New files; contents under `add/` in the bundle.
    #[serde(default)]
    pub adds: Vec<String>,
    /// Existing files to three-way merge; contents under `modify/`.
    #[serde(default)]
    pub modifies: Vec<String>,
    #[serde(default)]
    pub structured: Vec<StructuredDirective>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Requirements {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub fields: Vec<FieldRequirement>,
    /// Semver requirement on the engine itself, e.g. `>=0.1`.
    #[serde(default)]
    pub engine: Option<String>,
}

/// A dotted key that must resolve inside a JSON, YAML or TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldRequirement {
    pub file: String,
    pub key: String,
}

impl SkillManifest {
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        serde_yaml::from_str(input).map_err(|err| invalid(format!("YAML parse error: {err}")))
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        validate_name("skill", &self.skill)?;
        Version::parse(&self.version)?;
        if let Some(engine) = self.requires.engine.as_ref() {
            VersionReq::parse(engine).map_err(|err| {
                invalid(format!("requires.engine must be a semver range: {err}"))
            })?;
        }
        for name in self.depends.iter().chain(&self.conflicts) {
            validate_name("depends/conflicts", name)?;
        }
        if let Some(name) = self.depends.iter().find(|name| self.conflicts.contains(name)) {
            return Err(invalid(format!("{name} is listed in both depends and conflicts")));
        }

        let mut seen = BTreeSet::new();
        for path in self.adds.iter().chain(&self.modifies) {
            let normalized = normalize_relative(path)?;
            if !seen.insert(normalized) {
                return Err(invalid(format!("{path} is listed more than once")));
            }
        }
        for directive in &self.structured {
            let normalized = normalize_relative(directive.file())?;
            if seen.contains(&normalized) {
                return Err(invalid(format!(
                    "{} is both a structured target and an added/modified file",
                    directive.file()
                )));
            }
        }
        for path in &self.requires.files {
            normalize_relative(path)?;
        }
        for field in &self.requires.fields {
            normalize_relative(&field.file)?;
            if field.key.trim().is_empty() {
                return Err(invalid(format!("empty field key for {}", field.file)));
            }
        }
        Ok(())
    }

    /// Fail when `requires.engine` excludes this engine.
    pub fn check_engine(&self) -> Result<()> {
        let Some(requirement) = self.requires.engine.as_ref() else {
            return Ok(());
        };
        let req = VersionReq::parse(requirement)
            .map_err(|err| invalid(format!("requires.engine: {err}")))?;
        let running = semver::Version::parse(ENGINE_VERSION)
            .map_err(|err| GraftError::Config(format!("engine version: {err}")))?;
        if req.matches(&running) {
            Ok(())
        } else {
            Err(ValidationError::UnsupportedEngine {
                skill: self.skill.clone(),
                requirement: requirement.clone(),
                running: ENGINE_VERSION.to_string(),
            }
            .into())
        }
    }

    /// Every project path the skill writes, normalized.
    pub fn touched_paths(&self) -> Result<BTreeSet<PathBuf>> {
        self.adds
            .iter()
            .chain(&self.modifies)
            .map(String::as_str)
            .chain(self.structured.iter().map(StructuredDirective::file))
            .map(normalize_relative)
            .collect()
    }
}

fn invalid(message: String) -> GraftError {
    ValidationError::InvalidManifest(message).into()
}

fn validate_name(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{field} must be non-empty")));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(invalid(format!(
            "{field} exceeds {MAX_NAME_LEN} characters: {value}"
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(invalid(format!(
            "{field} may contain only letters, digits, '-' and '_': {value}"
        )));
    }
    Ok(())
}
