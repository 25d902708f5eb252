use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use super::manifest::{MANIFEST_FILE, SkillManifest};
use crate::error::{GraftError, Result, ValidationError};
use crate::utils::fs::read_optional;
use crate::utils::path_policy::normalize_relative;

/// Directory inside a bundle holding the contents of added files.
pub const ADD_DIR: &str = "add";
/// Directory inside a bundle holding the skill's version of modified files.
pub const MODIFY_DIR: &str = "modify";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
});

/// A skill directory: `manifest.yaml` plus `add/` and `modify/` trees.
#[derive(Debug, Clone)]
pub struct SkillBundle {
    root: PathBuf,
    pub manifest: SkillManifest,
}

impl SkillBundle {
    /// Load and validate the bundle at `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let Some(raw) = read_optional(&manifest_path)? else {
            return Err(GraftError::SkillNotFound(format!(
                "no {MANIFEST_FILE} in {}",
                dir.display()
            )));
        };
        let manifest = SkillManifest::from_yaml_str(&raw)?;
        manifest.validate()?;
        debug!(skill = %manifest.skill, bundle = %dir.display(), "bundle loaded");
        Ok(Self {
            root: dir.to_path_buf(),
            manifest,
        })
    }

    /// Find `name` under the skills directory, or load `explicit` instead.
    pub fn locate(skills_dir: &Path, name: &str, explicit: Option<&Path>) -> Result<Self> {
        let dir = explicit.map_or_else(|| skills_dir.join(name), Path::to_path_buf);
        if !dir.is_dir() {
            return Err(GraftError::SkillNotFound(format!(
                "{name} (looked in {})",
                dir.display()
            )));
        }
        let bundle = Self::load(&dir)?;
        if bundle.manifest.skill != name {
            return Err(ValidationError::InvalidManifest(format!(
                "bundle at {} declares skill {}, expected {name}",
                dir.display(),
                bundle.manifest.skill
            ))
            .into());
        }
        Ok(bundle)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn name(&self) -> &str {
        &self.manifest.skill
    }

    pub fn version(&self) -> &str {
        &self.manifest.version
    }

    /// Content of an added file with parameters substituted.
    pub fn added_content(&self, relative: &str, params: &BTreeMap<String, String>) -> Result<String> {
        self.content(ADD_DIR, relative, params)
    }

    /// The skill's version of a modified file with parameters substituted.
    pub fn modified_content(
        &self,
        relative: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<String> {
        self.content(MODIFY_DIR, relative, params)
    }

    /// Location of an added file's source inside the bundle.
    pub fn added_path(&self, relative: &str) -> Result<PathBuf> {
        Ok(self.root.join(ADD_DIR).join(normalize_relative(relative)?))
    }

    fn content(&self, dir: &str, relative: &str, params: &BTreeMap<String, String>) -> Result<String> {
        let path = self.root.join(dir).join(normalize_relative(relative)?);
        let raw = read_optional(&path)?.ok_or_else(|| {
            ValidationError::InvalidManifest(format!(
                "{} lists {relative} but {} is missing",
                self.manifest.skill,
                path.display()
            ))
        })?;
        Ok(substitute_params(&raw, params))
    }
}

/// Replace `{{KEY}}` with the matching parameter; unknown keys stay as-is.
pub fn substitute_params(text: &str, params: &BTreeMap<String, String>) -> String {
    if params.is_empty() {
        return text.to_string();
    }
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| {
            params
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Parse `KEY=VALUE` pairs from the command line.
pub fn parse_params<I, S>(pairs: I) -> Result<BTreeMap<String, String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut params = BTreeMap::new();
    for pair in pairs {
        let pair = pair.as_ref();
        let Some((key, value)) = pair.split_once('=') else {
            return Err(ValidationError::InvalidManifest(format!(
                "parameter {pair:?} must look like KEY=VALUE"
            ))
            .into());
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ValidationError::InvalidManifest(format!(
                "parameter {pair:?} has an empty key"
            ))
            .into());
        }
        params.insert(key.to_string(), value.to_string());
    }
    Ok(params)
}
