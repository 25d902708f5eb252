//! Apply pipeline.
//!
//! `Validating -> BackingUp -> Copying -> Merging -> Committing -> Done`.
//! Every stage after `BackingUp` runs under a [`BackupGuard`]; a failure
//! anywhere restores the files, snapshots and state the skill could touch,
//! so the project ends exactly as it started (`RolledBack`).
//!
//! Copying and merging only stage new contents in memory. Nothing in the
//! working tree changes until every file has merged cleanly.
//!
//! [`BackupGuard`]: crate::storage::BackupGuard

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::session::Session;
use super::validate::validate;
use crate::error::Result;
use crate::merge::{self, MergeOptions, MergeResult};
use crate::project::Project;
use crate::skill::SkillBundle;
use crate::storage::{AppliedSkill, FileKind, FileRecord, ProjectState, StateStore};
use crate::structured::StructuredOutcome;
use crate::utils::fs::{atomic_write, copy_permissions, read_optional, sha256_hex};
use crate::utils::path_policy::{display_path, normalize_relative};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStage {
    Validating,
    BackingUp,
    Copying,
    Merging,
    Committing,
    Done,
    RolledBack,
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Values for `{{KEY}}` placeholders in the bundle's files.
    pub params: BTreeMap<String, String>,
    /// Allow applying a skill that is already recorded.
    pub reapply: bool,
    /// Timestamp to record instead of now; replay keeps the original.
    pub applied_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub skill: String,
    pub version: String,
    pub stage: ApplyStage,
    pub reapplied: bool,
    pub files: Vec<FileRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub structured: Vec<StructuredOutcome>,
}

/// New content for one file, held until commit.
#[derive(Debug, Clone)]
struct Staged {
    content: String,
    kind: FileKind,
    /// Ancestor before this skill's merge; `None` for files it creates.
    preimage: Option<String>,
    /// Bundle file whose mode a newly created file takes.
    mode_source: Option<PathBuf>,
    /// Hash of a working copy that carried edits the base does not have.
    local_sha256: Option<String>,
}

/// Apply one skill in its own session.
pub fn apply_skill(
    project: &Project,
    bundle: &SkillBundle,
    options: &ApplyOptions,
) -> Result<ApplyReport> {
    let session = Session::open(project, "apply")?;
    let mut state = session.load_state()?;
    apply_in_session(&session, &mut state, bundle, options)
}

/// Run only the validation stage. Takes no lock and writes nothing.
pub fn check_skill(project: &Project, bundle: &SkillBundle, options: &ApplyOptions) -> Result<()> {
    let state = StateStore::new(project.state_path()).load()?;
    validate(project, &state, bundle, options)
}

/// Apply within an open session. On success `state` holds the saved record;
/// on failure it is left untouched.
pub fn apply_in_session(
    session: &Session<'_>,
    state: &mut ProjectState,
    bundle: &SkillBundle,
    options: &ApplyOptions,
) -> Result<ApplyReport> {
    let skill = bundle.name();
    let mut stage = ApplyStage::Validating;
    trace_stage(skill, stage);
    validate(session.project(), state, bundle, options)?;

    stage = ApplyStage::BackingUp;
    trace_stage(skill, stage);
    let snapshots = session.snapshots();
    let mut coverage = vec![session.state_relative()];
    for path in bundle.manifest.touched_paths()? {
        coverage.push(snapshots.base_relative(&path));
        coverage.push(snapshots.origin_relative(&path));
        coverage.push(snapshots.preimage_relative(skill, &path));
        coverage.push(path);
    }
    let guard = snapshots.capture_backup(session.operation(), &coverage)?;

    match run_stages(session, state, bundle, options, &mut stage) {
        Ok((next, report)) => {
            guard.discard()?;
            *state = next;
            trace_stage(skill, ApplyStage::Done);
            info!(
                skill,
                version = %report.version,
                files = report.files.len(),
                reapplied = report.reapplied,
                "skill applied"
            );
            Ok(report)
        }
        Err(err) => {
            warn!(skill, stage = ?stage, code = err.code(), "apply failed, rolling back: {err}");
            if let Err(restore_err) = guard.restore() {
                error!(skill, "rollback incomplete, backup kept for recovery: {restore_err}");
            }
            trace_stage(skill, ApplyStage::RolledBack);
            Err(err)
        }
    }
}

fn trace_stage(skill: &str, stage: ApplyStage) {
    debug!(skill, stage = ?stage, "apply stage");
}

fn run_stages(
    session: &Session<'_>,
    state: &ProjectState,
    bundle: &SkillBundle,
    options: &ApplyOptions,
    stage: &mut ApplyStage,
) -> Result<(ProjectState, ApplyReport)> {
    let project = session.project();
    let snapshots = session.snapshots();
    let manifest = &bundle.manifest;
    let skill = bundle.name();
    let previous = state.find(skill);
    let merge_options = MergeOptions::for_skill(&project.config.merge, skill);
    let mut staged: BTreeMap<PathBuf, Staged> = BTreeMap::new();

    *stage = ApplyStage::Copying;
    trace_stage(skill, *stage);
    for add in &manifest.adds {
        let relative = normalize_relative(add)?;
        let incoming = bundle.added_content(add, &options.params)?;
        let (content, mode_source) = match read_optional(project.resolve(&relative))? {
            None => (incoming, Some(bundle.added_path(add)?)),
            Some(current) => {
                let base = snapshots.read_base(&relative)?;
                let merged = merge::merge(base.as_deref(), Some(&current), &incoming, &merge_options)
                    .into_clean(&relative)?;
                (merged, None)
            }
        };
        staged.insert(
            relative,
            Staged {
                content,
                kind: FileKind::Added,
                preimage: None,
                mode_source,
                local_sha256: None,
            },
        );
    }

    *stage = ApplyStage::Merging;
    trace_stage(skill, *stage);
    for modify in &manifest.modifies {
        let relative = normalize_relative(modify)?;
        let incoming = bundle.modified_content(modify, &options.params)?;
        let current = read_optional(project.resolve(&relative))?;
        // A file never seen before takes its working copy as ancestor.
        let base = match snapshots.read_base(&relative)? {
            Some(base) => Some(base),
            None => current.clone(),
        };
        let origin = snapshots.read_origin(&relative)?;
        let incoming = carry_onto_base(origin, base.as_deref(), incoming, &merge_options)
            .into_clean(&relative)?;
        let content = merge::merge(base.as_deref(), current.as_deref(), &incoming, &merge_options)
            .into_clean(&relative)?;
        let kind = record_kind(previous, &relative, current.is_some(), FileKind::Modified);
        let local_sha256 = local_edit(previous, &relative, current.as_deref(), base.as_deref());
        staged.insert(
            relative,
            Staged {
                content,
                kind,
                preimage: base,
                mode_source: None,
                local_sha256,
            },
        );
    }

    let mut outcomes = Vec::with_capacity(manifest.structured.len());
    for directive in &manifest.structured {
        let relative = normalize_relative(directive.file())?;
        let (existing, mut item) = if let Some(earlier) = staged.get(&relative) {
            (Some(earlier.content.clone()), earlier.clone())
        } else {
            let current = read_optional(project.resolve(&relative))?;
            let base = match snapshots.read_base(&relative)? {
                Some(base) => Some(base),
                None => current.clone(),
            };
            let item = Staged {
                content: String::new(),
                kind: record_kind(previous, &relative, current.is_some(), FileKind::Structured),
                local_sha256: local_edit(previous, &relative, current.as_deref(), base.as_deref()),
                preimage: base,
                mode_source: None,
            };
            (current, item)
        };

        let edit = directive.apply(existing.as_deref(), skill)?;
        debug!(
            skill,
            file = %relative.display(),
            added = edit.outcome.added.len(),
            skipped = edit.outcome.skipped.len(),
            "structured merge"
        );
        outcomes.push(edit.outcome);
        item.content = edit.content;
        staged.insert(relative, item);
    }

    *stage = ApplyStage::Committing;
    trace_stage(skill, *stage);
    let mut records = Vec::with_capacity(staged.len());
    for (relative, item) in &staged {
        let target = project.resolve(relative);
        atomic_write(&target, &item.content)?;
        if let Some(source) = &item.mode_source {
            copy_permissions(source, &target)?;
        }
        snapshots.update_base(relative, &item.content)?;
        snapshots.capture_origin(relative, item.preimage.as_deref().unwrap_or(&item.content))?;
        // A reapply keeps the ancestor from the first application.
        if let Some(preimage) = &item.preimage {
            if snapshots.read_preimage(skill, relative)?.is_none() {
                snapshots.stash_preimage(skill, relative, preimage)?;
            }
        }
        records.push(FileRecord {
            path: display_path(relative),
            kind: item.kind,
            sha256: sha256_hex(&item.content),
            local_sha256: item.local_sha256.clone(),
        });
    }

    let entry = AppliedSkill {
        name: skill.to_string(),
        version: bundle.version().to_string(),
        applied_at: options.applied_at.unwrap_or_else(Utc::now),
        bundle: bundle_source(project, bundle)?,
        params: options.params.clone(),
        files: records.clone(),
        structured: outcomes.clone(),
    };
    let mut next = state.clone();
    next.record_skill_application(entry);
    session.store().save(&next)?;

    let report = ApplyReport {
        skill: skill.to_string(),
        version: bundle.version().to_string(),
        stage: ApplyStage::Done,
        reapplied: previous.is_some(),
        files: records,
        structured: outcomes,
    };
    Ok((next, report))
}

/// Where replay should look for the bundle: nothing for the skills dir,
/// otherwise the bundle's absolute path.
fn bundle_source(project: &Project, bundle: &SkillBundle) -> Result<Option<PathBuf>> {
    if bundle.root() == project.skills_dir().join(bundle.name()) {
        return Ok(None);
    }
    Ok(Some(std::path::absolute(bundle.root())?))
}

/// A skill's version of a file is written against the file's origin, while
/// the base may already carry earlier skills' changes. Replay the skill's
/// change onto the base so the following merge only sees user edits as the
/// other side.
fn carry_onto_base(
    origin: Option<String>,
    base: Option<&str>,
    incoming: String,
    options: &MergeOptions,
) -> MergeResult {
    match (origin.as_deref(), base) {
        (Some(origin), Some(base)) if origin != base => {
            merge::merge(Some(origin), Some(base), &incoming, options)
        }
        _ => MergeResult::Clean(incoming),
    }
}

/// Files the skill brought into existence stay `Added` across reapplies.
/// Hash of `current` when it holds edits `base` lacks. A reapply keeps what
/// the first application saw, since its base already includes those edits.
fn local_edit(
    previous: Option<&AppliedSkill>,
    relative: &std::path::Path,
    current: Option<&str>,
    base: Option<&str>,
) -> Option<String> {
    if let Some(record) = previous.and_then(|entry| entry.file(&display_path(relative))) {
        return record.local_sha256.clone();
    }
    match (current, base) {
        (Some(current), Some(base)) if current != base => Some(sha256_hex(current)),
        _ => None,
    }
}

fn record_kind(
    previous: Option<&AppliedSkill>,
    relative: &std::path::Path,
    existed: bool,
    otherwise: FileKind,
) -> FileKind {
    let created_before = previous
        .and_then(|entry| entry.file(&display_path(relative)))
        .is_some_and(|record| record.kind == FileKind::Added);
    if created_before || !existed {
        FileKind::Added
    } else {
        otherwise
    }
}
