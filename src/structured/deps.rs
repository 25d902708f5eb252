//! Dependency manifest merging.
//!
//! A package both sides declare keeps its range only if the two ranges are
//! compatible: carets sharing a major, or tildes sharing major.minor, keep
//! the higher version. Every other mismatch is a [`MergeConflict::Dependency`].

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value as JsonValue};
use toml_edit::{Array, DocumentMut, Item, Table, TableLike, Value};

use super::{Summary, malformed};
use crate::error::{MergeConflict, Result};
use crate::version::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    PackageJson,
    Pyproject,
    Requirements,
}

impl ManifestKind {
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        match name {
            "package.json" => Some(Self::PackageJson),
            "pyproject.toml" => Some(Self::Pyproject),
            _ if name.starts_with("requirements") && name.ends_with(".txt") => {
                Some(Self::Requirements)
            }
            _ => None,
        }
    }
}

pub fn merge_dependencies(
    kind: ManifestKind,
    existing: &str,
    section: Option<&str>,
    entries: &BTreeMap<String, String>,
) -> Result<(String, Summary)> {
    match kind {
        ManifestKind::PackageJson => {
            merge_package_json(existing, section.unwrap_or("dependencies"), entries)
        }
        ManifestKind::Pyproject => merge_pyproject(existing, entries),
        ManifestKind::Requirements => merge_requirements(existing, entries),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeStyle {
    Caret(Version),
    Tilde(Version),
    Exact(Version),
    Other,
}

fn classify(range: &str) -> RangeStyle {
    let range = range.trim();
    let parse = |text: &str| Version::parse(text).ok();

    // PEP 440 compatible release: ~=X.Y.Z pins the minor, ~=X.Y the major.
    if let Some(rest) = range.strip_prefix("~=") {
        let components = rest.trim().split('.').count();
        return match parse(rest) {
            Some(version) if components >= 3 => RangeStyle::Tilde(version),
            Some(version) => RangeStyle::Caret(version),
            None => RangeStyle::Other,
        };
    }
    if let Some(rest) = range.strip_prefix('^') {
        return parse(rest).map_or(RangeStyle::Other, RangeStyle::Caret);
    }
    if let Some(rest) = range.strip_prefix('~') {
        return parse(rest).map_or(RangeStyle::Other, RangeStyle::Tilde);
    }
    let exact = range
        .strip_prefix("==")
        .or_else(|| range.strip_prefix('='))
        .unwrap_or(range);
    parse(exact).map_or(RangeStyle::Other, RangeStyle::Exact)
}

fn squash(range: &str) -> String {
    range.chars().filter(|c| !c.is_whitespace()).collect()
}

/// The range to keep when both sides declare `package`.
pub fn reconcile_range(
    package: &str,
    existing: &str,
    incoming: &str,
) -> std::result::Result<String, MergeConflict> {
    if squash(existing) == squash(incoming) {
        return Ok(existing.to_string());
    }

    let order = match (classify(existing), classify(incoming)) {
        (RangeStyle::Caret(a), RangeStyle::Caret(b)) if a.major == b.major => Some(a.cmp(&b)),
        (RangeStyle::Tilde(a), RangeStyle::Tilde(b))
            if a.major == b.major && a.minor == b.minor =>
        {
            Some(a.cmp(&b))
        }
        _ => None,
    };

    match order {
        Some(Ordering::Less) => Ok(incoming.to_string()),
        Some(_) => Ok(existing.to_string()),
        None => Err(MergeConflict::Dependency {
            file: PathBuf::new(),
            package: package.to_string(),
            existing: existing.to_string(),
            incoming: incoming.to_string(),
        }),
    }
}

/// Fold one incoming range into `summary`; returns the value to store when
/// it differs from `current`.
fn fold(
    summary: &mut Summary,
    name: &str,
    current: Option<&str>,
    incoming: &str,
) -> std::result::Result<Option<String>, MergeConflict> {
    let Some(current) = current else {
        summary.added.push(name.to_string());
        return Ok(Some(incoming.to_string()));
    };
    let keep = reconcile_range(name, current, incoming)?;
    if keep == current {
        summary.skipped.push(name.to_string());
        Ok(None)
    } else {
        summary.updated.push(name.to_string());
        Ok(Some(keep))
    }
}

fn merge_package_json(
    existing: &str,
    section: &str,
    entries: &BTreeMap<String, String>,
) -> Result<(String, Summary)> {
    let mut doc: JsonValue = if existing.trim().is_empty() {
        JsonValue::Object(Map::new())
    } else {
        serde_json::from_str(existing)?
    };
    let root = doc
        .as_object_mut()
        .ok_or_else(|| malformed("package.json root is not an object"))?;
    let deps = root
        .entry(section.to_string())
        .or_insert_with(|| JsonValue::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| malformed(format!("package.json {section} is not an object")))?;

    let mut summary = Summary::default();
    for (name, range) in entries {
        let current = match deps.get(name) {
            None => None,
            Some(JsonValue::String(current)) => Some(current.clone()),
            Some(other) => Some(other.to_string()),
        };
        if let Some(value) = fold(&mut summary, name, current.as_deref(), range)? {
            deps.insert(name.clone(), JsonValue::String(value));
        }
    }

    let mut sorted: Vec<(String, JsonValue)> = std::mem::take(deps).into_iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    deps.extend(sorted);

    let mut out = serde_json::to_string_pretty(&doc)?;
    out.push('\n');
    Ok((out, summary))
}

fn merge_pyproject(
    existing: &str,
    entries: &BTreeMap<String, String>,
) -> Result<(String, Summary)> {
    let mut doc: DocumentMut = existing.parse()?;
    let mut summary = Summary::default();

    if let Some(table) = poetry_dependencies(&mut doc) {
        merge_poetry_table(table, entries, &mut summary)?;
    } else {
        let project = doc
            .entry("project")
            .or_insert(Item::Table(Table::new()))
            .as_table_like_mut()
            .ok_or_else(|| malformed("pyproject.toml [project] is not a table"))?;
        if !project.contains_key("dependencies") {
            project.insert("dependencies", toml_edit::value(Array::new()));
        }
        let array = project
            .get_mut("dependencies")
            .and_then(Item::as_array_mut)
            .ok_or_else(|| malformed("pyproject.toml project.dependencies is not an array"))?;

        let existing: Vec<String> = array
            .iter()
            .filter_map(|value| value.as_str().map(str::to_string))
            .collect();
        let merged = merge_requirement_list(existing, entries, &mut summary)?;

        let mut rebuilt = Array::new();
        for requirement in merged {
            let mut value = Value::from(requirement);
            value.decor_mut().set_prefix("\n    ");
            rebuilt.push_formatted(value);
        }
        rebuilt.set_trailing_comma(true);
        rebuilt.set_trailing("\n");
        *array = rebuilt;
    }

    Ok((doc.to_string(), summary))
}

fn poetry_dependencies(doc: &mut DocumentMut) -> Option<&mut dyn TableLike> {
    doc.get_mut("tool")?
        .get_mut("poetry")?
        .get_mut("dependencies")?
        .as_table_like_mut()
}

fn merge_poetry_table(
    table: &mut dyn TableLike,
    entries: &BTreeMap<String, String>,
    summary: &mut Summary,
) -> Result<()> {
    for (name, range) in entries {
        let current = table.get(name).map(|item| {
            item.as_str()
                .or_else(|| item.get("version").and_then(Item::as_str))
                .map_or_else(|| item.to_string().trim().to_string(), str::to_string)
        });
        let Some(value) = fold(summary, name, current.as_deref(), range)? else {
            continue;
        };
        match table.get_mut(name) {
            Some(item) if item.is_inline_table() || item.is_table() => {
                item["version"] = toml_edit::value(value);
            }
            _ => {
                table.insert(name, toml_edit::value(value));
            }
        }
    }
    table.sort_values();
    Ok(())
}

fn merge_requirements(
    existing: &str,
    entries: &BTreeMap<String, String>,
) -> Result<(String, Summary)> {
    let mut header = Vec::new();
    let mut requirements = Vec::new();
    for line in existing.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('#') || trimmed.starts_with('-') || requirement_name(trimmed).is_none()
        {
            header.push(line);
        } else {
            requirements.push(trimmed.to_string());
        }
    }
    while header.last().is_some_and(|line| line.trim().is_empty()) {
        header.pop();
    }

    let mut summary = Summary::default();
    let merged = merge_requirement_list(requirements, entries, &mut summary)?;

    let mut out = String::new();
    for line in header {
        out.push_str(line);
        out.push('\n');
    }
    for requirement in merged {
        out.push_str(&requirement);
        out.push('\n');
    }
    Ok((out, summary))
}

/// Merge PEP 508 requirement strings; result sorted by normalized name.
fn merge_requirement_list(
    existing: Vec<String>,
    entries: &BTreeMap<String, String>,
    summary: &mut Summary,
) -> std::result::Result<Vec<String>, MergeConflict> {
    let mut by_name: BTreeMap<String, String> = BTreeMap::new();
    for requirement in existing {
        let key = requirement_name(&requirement)
            .map_or_else(|| requirement.clone(), |name| normalize_name(&name));
        by_name.insert(key, requirement);
    }

    for (name, range) in entries {
        let key = normalize_name(name);
        let current = by_name.get(&key).map(|line| requirement_spec(line));
        if let Some(spec) = fold(summary, name, current.as_deref(), range)? {
            let line = match by_name.get(&key) {
                Some(line) => respec_requirement(line, &spec),
                None => format_requirement(name, &spec),
            };
            by_name.insert(key, line);
        }
    }

    Ok(by_name.into_values().collect())
}

fn requirement_name(line: &str) -> Option<String> {
    let name: String = line
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    (!name.is_empty() && name.starts_with(|c: char| c.is_ascii_alphanumeric())).then_some(name)
}

/// Version specifier of a requirement line, without extras or markers.
fn requirement_spec(line: &str) -> String {
    let without_marker = line.split(';').next().unwrap_or(line);
    let name_len = requirement_name(without_marker).map_or(0, |name| name.len());
    let mut rest = without_marker[name_len..].trim_start();
    if rest.starts_with('[') {
        rest = rest.find(']').map_or("", |end| &rest[end + 1..]);
    }
    squash(rest)
}

/// Swap the version specifier of a requirement line, keeping its name,
/// extras and environment marker.
fn respec_requirement(line: &str, spec: &str) -> String {
    let (body, marker) = line
        .split_once(';')
        .map_or((line, None), |(body, marker)| (body, Some(marker.trim())));
    let name_len = requirement_name(body).map_or(0, |name| name.len());
    let (name, rest) = body.split_at(name_len);
    let rest = rest.trim_start();
    let extras = if rest.starts_with('[') {
        rest.find(']').map_or("", |end| &rest[..=end])
    } else {
        ""
    };

    let mut out = format_requirement(&format!("{name}{extras}"), spec);
    if let Some(marker) = marker.filter(|marker| !marker.is_empty()) {
        out.push_str("; ");
        out.push_str(marker);
    }
    out
}

fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase().replace(['_', '.'], "-")
}

fn format_requirement(name: &str, spec: &str) -> String {
    let spec = spec.trim();
    if spec.is_empty() || spec == "*" {
        name.to_string()
    } else {
        format!("{name}{spec}")
    }
}
