//! Persisted record of what has been applied to a project.
//!
//! The record lives in `.graft/state.toml`. Other tools keep their own
//! sections in the same document (a graph topology, for instance), so saving
//! edits only the keys this module owns and leaves every other table exactly
//! as it was on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use toml_edit::{Array, ArrayOfTables, DocumentMut, InlineTable, Item, Table, Value};
use tracing::debug;

use crate::error::{GraftError, Result};
use crate::structured::StructuredOutcome;
use crate::utils::fs::{atomic_write, read_optional};

pub const STATE_SCHEMA_VERSION: u32 = 1;

/// Top-level keys written by the engine; everything else is foreign.
const OWNED_KEYS: [&str; 3] = ["schema_version", "template", "applied_skills"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// Created by the skill.
    Added,
    /// Three-way merged from the skill's version.
    Modified,
    /// Edited by a structured merger.
    Structured,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub kind: FileKind,
    /// SHA-256 of the content the engine wrote.
    pub sha256: String,
    /// SHA-256 of the working copy before the skill merged into it, kept
    /// only when that copy already differed from the base.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_sha256: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedSkill {
    pub name: String,
    pub version: String,
    pub applied_at: DateTime<Utc>,
    /// Bundle directory given at apply time; unset for the skills dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub files: Vec<FileRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub structured: Vec<StructuredOutcome>,
}

impl AppliedSkill {
    pub fn file(&self, path: &str) -> Option<&FileRecord> {
        self.files.iter().find(|record| record.path == path)
    }

    pub fn touches(&self, path: &str) -> bool {
        self.file(path).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateInfo {
    /// Template source used by `replay`; unset when captured in place.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectState {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateInfo>,
    /// Replay order. Entries are appended or removed, never reordered.
    #[serde(default)]
    pub applied_skills: Vec<AppliedSkill>,
}

impl Default for ProjectState {
    fn default() -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            template: None,
            applied_skills: Vec::new(),
        }
    }
}

impl ProjectState {
    pub fn find(&self, name: &str) -> Option<&AppliedSkill> {
        self.applied_skills.iter().find(|entry| entry.name == name)
    }

    pub fn is_applied(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Append a new entry, or replace an existing one with the same name at
    /// its current position. Returns the entry's index.
    pub fn record_skill_application(&mut self, entry: AppliedSkill) -> usize {
        if let Some(index) = self
            .applied_skills
            .iter()
            .position(|existing| existing.name == entry.name)
        {
            self.applied_skills[index] = entry;
            return index;
        }
        self.applied_skills.push(entry);
        self.applied_skills.len() - 1
    }

    /// Remove the named entry, keeping the relative order of the rest.
    pub fn record_uninstall(&mut self, name: &str) -> Option<AppliedSkill> {
        let index = self
            .applied_skills
            .iter()
            .position(|entry| entry.name == name)?;
        Some(self.applied_skills.remove(index))
    }

    /// Applied skills other than `except` that touched `path`.
    pub fn skills_touching<'a>(&'a self, path: &str, except: &str) -> Vec<&'a str> {
        self.applied_skills
            .iter()
            .filter(|entry| entry.name != except && entry.touches(path))
            .map(|entry| entry.name.as_str())
            .collect()
    }

    /// The skill that created `path`, if a skill did.
    pub fn creator_of(&self, path: &str) -> Option<&AppliedSkill> {
        self.applied_skills.iter().find(|entry| {
            entry
                .file(path)
                .is_some_and(|record| record.kind == FileKind::Added)
        })
    }

    pub fn is_template_file(&self, path: &str) -> bool {
        self.template
            .as_ref()
            .is_some_and(|template| template.files.iter().any(|file| file == path))
    }
}

/// Loads and saves [`ProjectState`] for one project.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record, or a fresh default when none exists yet.
    pub fn load(&self) -> Result<ProjectState> {
        let Some(raw) = read_optional(&self.path)? else {
            return Ok(ProjectState::default());
        };
        if raw.trim().is_empty() {
            return Ok(ProjectState::default());
        }

        let mut state: ProjectState = toml::from_str(&raw)?;
        if state.schema_version > STATE_SCHEMA_VERSION {
            return Err(GraftError::Config(format!(
                "{} uses state schema {} but this engine understands up to {}",
                self.path.display(),
                state.schema_version,
                STATE_SCHEMA_VERSION
            )));
        }
        state.schema_version = STATE_SCHEMA_VERSION;
        Ok(state)
    }

    /// Merge the engine's keys into the existing document and replace the
    /// file atomically.
    pub fn save(&self, state: &ProjectState) -> Result<()> {
        let mut doc = match read_optional(&self.path)? {
            Some(raw) => raw.parse::<DocumentMut>()?,
            None => DocumentMut::new(),
        };

        let ours = toml::Value::try_from(state)
            .map_err(|err| GraftError::Config(format!("serialize state: {err}")))?;
        let toml::Value::Table(ours) = ours else {
            return Err(GraftError::Config("state did not serialize to a table".into()));
        };

        for key in OWNED_KEYS {
            match (key, ours.get(key)) {
                (_, None) => {
                    doc.remove(key);
                }
                ("applied_skills", Some(toml::Value::Array(entries))) => {
                    doc.insert(key, applied_skills_item(entries));
                }
                (_, Some(toml::Value::Table(table))) => {
                    doc.insert(key, Item::Table(table_of(table)));
                }
                (_, Some(value)) => {
                    doc.insert(key, Item::Value(to_edit_value(value)));
                }
            }
        }

        atomic_write(&self.path, doc.to_string())?;
        debug!(
            state = %self.path.display(),
            skills = state.applied_skills.len(),
            "state saved"
        );
        Ok(())
    }
}

fn applied_skills_item(entries: &[toml::Value]) -> Item {
    if entries.is_empty() {
        return Item::Value(Value::Array(Array::new()));
    }
    let mut array = ArrayOfTables::new();
    for entry in entries {
        if let toml::Value::Table(table) = entry {
            array.push(table_of(table));
        }
    }
    Item::ArrayOfTables(array)
}

fn table_of(source: &toml::Table) -> Table {
    let mut table = Table::new();
    for (key, value) in source {
        let mut value = to_edit_value(value);
        if let Value::Array(array) = &mut value {
            spread_tables(array);
        }
        table.insert(key, Item::Value(value));
    }
    table
}

/// One inline table per line keeps file lists reviewable in diffs.
fn spread_tables(array: &mut Array) {
    if !array.iter().any(Value::is_inline_table) {
        return;
    }
    for value in array.iter_mut() {
        value.decor_mut().set_prefix("\n    ");
        value.decor_mut().set_suffix("");
    }
    array.set_trailing_comma(true);
    array.set_trailing("\n");
}

fn to_edit_value(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::from(s.as_str()),
        toml::Value::Integer(i) => Value::from(*i),
        toml::Value::Float(f) => Value::from(*f),
        toml::Value::Boolean(b) => Value::from(*b),
        toml::Value::Datetime(dt) => Value::from(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.iter().map(to_edit_value).collect()),
        toml::Value::Table(table) => Value::InlineTable(
            table
                .iter()
                .map(|(k, v)| (k.as_str(), to_edit_value(v)))
                .collect::<InlineTable>(),
        ),
    }
}
