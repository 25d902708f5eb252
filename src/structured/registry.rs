//! Endpoint registry merging.
//!
//! A registry maps endpoint names to implementation paths. New names are
//! added; an existing name keeps whatever value it already has.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Map, Value as JsonValue};
use serde_yaml::{Mapping, Value as YamlValue};

use super::{Summary, malformed};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryFormat {
    Json,
    Yaml,
}

impl RegistryFormat {
    pub fn detect(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

pub fn merge_endpoints(
    existing: &str,
    format: RegistryFormat,
    section: Option<&str>,
    entries: &BTreeMap<String, String>,
) -> Result<(String, Summary)> {
    let path: Vec<&str> = section
        .into_iter()
        .flat_map(|section| section.split('.'))
        .filter(|part| !part.is_empty())
        .collect();

    let (out, summary) = match format {
        RegistryFormat::Json => merge_json(existing, &path, entries)?,
        RegistryFormat::Yaml => merge_yaml(existing, &path, entries)?,
    };
    if !summary.changed() {
        return Ok((existing.to_string(), summary));
    }
    Ok((out, summary))
}

fn merge_json(
    existing: &str,
    path: &[&str],
    entries: &BTreeMap<String, String>,
) -> Result<(String, Summary)> {
    let mut doc: JsonValue = if existing.trim().is_empty() {
        JsonValue::Object(Map::new())
    } else {
        serde_json::from_str(existing)?
    };

    let mut node = &mut doc;
    for part in path {
        node = node
            .as_object_mut()
            .ok_or_else(|| malformed(format!("registry section {part} has a non-object parent")))?
            .entry((*part).to_string())
            .or_insert_with(|| JsonValue::Object(Map::new()));
    }
    let registry = node
        .as_object_mut()
        .ok_or_else(|| malformed("registry section is not an object"))?;

    let mut summary = Summary::default();
    for (name, target) in entries {
        if registry.contains_key(name) {
            summary.skipped.push(name.clone());
        } else {
            registry.insert(name.clone(), JsonValue::String(target.clone()));
            summary.added.push(name.clone());
        }
    }

    let mut out = serde_json::to_string_pretty(&doc)?;
    out.push('\n');
    Ok((out, summary))
}

fn merge_yaml(
    existing: &str,
    path: &[&str],
    entries: &BTreeMap<String, String>,
) -> Result<(String, Summary)> {
    let mut doc: YamlValue = if existing.trim().is_empty() {
        YamlValue::Mapping(Mapping::new())
    } else {
        serde_yaml::from_str(existing)?
    };
    if doc.is_null() {
        doc = YamlValue::Mapping(Mapping::new());
    }

    let mut node = &mut doc;
    for part in path {
        let mapping = node
            .as_mapping_mut()
            .ok_or_else(|| malformed(format!("registry section {part} has a non-mapping parent")))?;
        let key = YamlValue::from(*part);
        if !mapping.get(&key).is_some_and(YamlValue::is_mapping) {
            mapping.insert(key.clone(), YamlValue::Mapping(Mapping::new()));
        }
        node = mapping
            .get_mut(&key)
            .ok_or_else(|| malformed(format!("registry section {part} missing")))?;
    }
    let registry = node
        .as_mapping_mut()
        .ok_or_else(|| malformed("registry section is not a mapping"))?;

    let mut summary = Summary::default();
    for (name, target) in entries {
        let key = YamlValue::from(name.as_str());
        if registry.contains_key(&key) {
            summary.skipped.push(name.clone());
        } else {
            registry.insert(key, YamlValue::from(target.as_str()));
            summary.added.push(name.clone());
        }
    }

    Ok((serde_yaml::to_string(&doc)?, summary))
}
