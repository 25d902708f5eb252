//! Checks run before an apply touches anything.

use std::path::Path;

use tracing::debug;

use super::apply::ApplyOptions;
use crate::error::{Result, ValidationError};
use crate::project::Project;
use crate::skill::{FieldRequirement, SkillBundle};
use crate::storage::ProjectState;
use crate::utils::fs::read_optional;
use crate::utils::path_policy::{deny_symlink_escape, display_path, normalize_relative};

/// Owner reported when a skill tries to add over a template file.
pub const TEMPLATE_OWNER: &str = "template";

/// Everything that must hold for `bundle` to apply to this project.
pub fn validate(
    project: &Project,
    state: &ProjectState,
    bundle: &SkillBundle,
    options: &ApplyOptions,
) -> Result<()> {
    let manifest = &bundle.manifest;
    let skill = manifest.skill.as_str();

    manifest.validate()?;
    manifest.check_engine()?;

    if state.is_applied(skill) && !options.reapply {
        return Err(ValidationError::AlreadyApplied(skill.to_string()).into());
    }

    for dependency in &manifest.depends {
        if !state.is_applied(dependency) {
            return Err(ValidationError::MissingDependency {
                skill: skill.to_string(),
                dependency: dependency.clone(),
            }
            .into());
        }
    }
    if let Some(other) = manifest.conflicts.iter().find(|other| state.is_applied(other)) {
        return Err(ValidationError::IncompatibleSkill {
            skill: skill.to_string(),
            other: other.clone(),
        }
        .into());
    }

    for file in &manifest.requires.files {
        let relative = normalize_relative(file)?;
        if !project.resolve(&relative).is_file() {
            return Err(missing(skill, format!("file {file}")));
        }
    }
    for field in &manifest.requires.fields {
        check_field(project, skill, field)?;
    }

    for directive in &manifest.structured {
        directive.check_target()?;
    }

    for path in manifest.touched_paths()? {
        deny_symlink_escape(project.root(), &path)?;
    }

    for add in &manifest.adds {
        let relative = display_path(&normalize_relative(add)?);
        if let Some(owner) = state
            .applied_skills
            .iter()
            .find(|entry| entry.name != skill && entry.touches(&relative))
        {
            return Err(ValidationError::TrackedByOtherSkill {
                file: relative.into(),
                owner: owner.name.clone(),
            }
            .into());
        }
        if state.is_template_file(&relative) {
            return Err(ValidationError::TrackedByOtherSkill {
                file: relative.into(),
                owner: TEMPLATE_OWNER.to_string(),
            }
            .into());
        }
    }

    debug!(skill, "validation passed");
    Ok(())
}

fn missing(skill: &str, requirement: String) -> crate::error::GraftError {
    ValidationError::MissingPrerequisite {
        skill: skill.to_string(),
        requirement,
    }
    .into()
}

fn check_field(project: &Project, skill: &str, field: &FieldRequirement) -> Result<()> {
    let relative = normalize_relative(&field.file)?;
    let requirement = format!("field {} in {}", field.key, field.file);
    let Some(content) = read_optional(project.resolve(&relative))? else {
        return Err(missing(skill, requirement));
    };
    match field_present(&relative, &content, &field.key) {
        Ok(true) => Ok(()),
        Ok(false) => Err(missing(skill, requirement)),
        Err(reason) => Err(missing(skill, format!("{requirement} ({reason})"))),
    }
}

/// Resolve a dotted key in a JSON, YAML or TOML document.
fn field_present(file: &Path, content: &str, key: &str) -> std::result::Result<bool, String> {
    let parts: Vec<&str> = key.split('.').filter(|part| !part.is_empty()).collect();
    match file.extension().and_then(|ext| ext.to_str()) {
        Some("json") => {
            let doc: serde_json::Value =
                serde_json::from_str(content).map_err(|err| err.to_string())?;
            Ok(parts.iter().try_fold(&doc, |node, part| node.get(*part)).is_some())
        }
        Some("yaml" | "yml") => {
            let doc: serde_yaml::Value =
                serde_yaml::from_str(content).map_err(|err| err.to_string())?;
            Ok(parts.iter().try_fold(&doc, |node, part| node.get(*part)).is_some())
        }
        Some("toml") => {
            let doc = toml::Value::Table(
                toml::from_str::<toml::Table>(content).map_err(|err| err.to_string())?,
            );
            Ok(parts.iter().try_fold(&doc, |node, part| node.get(*part)).is_some())
        }
        _ => Err("fields can only be checked in JSON, YAML or TOML files".to_string()),
    }
}
