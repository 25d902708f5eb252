//! Replay: rebuild the project from a template and re-apply every recorded
//! skill in its original order.
//!
//! The reset runs under one backup and either completes or leaves the tree
//! untouched. Each skill then applies through the normal pipeline, so a
//! failure stops the replay with every earlier skill applied and nothing of
//! the failing one.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use super::apply::{ApplyOptions, apply_in_session};
use super::init::{absolute_template, collect_files, template_source};
use super::session::Session;
use crate::error::{GraftError, Result};
use crate::project::Project;
use crate::skill::SkillBundle;
use crate::storage::{FileKind, ProjectState, TemplateInfo};
use crate::utils::fs::{atomic_write, copy_permissions, remove_file_pruning};

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub template: PathBuf,
    pub applied: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<ReplayFailure>,
    /// Recorded skills after the failing one, not attempted.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

impl ReplayReport {
    pub const fn succeeded(&self) -> bool {
        self.failed.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayFailure {
    pub skill: String,
    pub code: &'static str,
    pub message: String,
}

pub fn replay(project: &Project, template: Option<&Path>) -> Result<ReplayReport> {
    let session = Session::open(project, "replay")?;
    let mut state = session.load_state()?;
    let template = resolve_template(project, &state, template)?;
    let recorded = state.applied_skills.clone();

    // Every bundle must still be reachable before the reset touches anything.
    let bundles = recorded
        .iter()
        .map(|entry| {
            SkillBundle::locate(&project.skills_dir(), &entry.name, entry.bundle.as_deref())
        })
        .collect::<Result<Vec<_>>>()?;

    reset(&session, &mut state, &template)?;
    info!(
        template = %template.display(),
        skills = recorded.len(),
        "project reset to template"
    );

    let mut report = ReplayReport {
        template,
        applied: Vec::new(),
        failed: None,
        skipped: Vec::new(),
    };
    for (index, (entry, bundle)) in recorded.iter().zip(&bundles).enumerate() {
        let options = ApplyOptions {
            params: entry.params.clone(),
            reapply: false,
            applied_at: Some(entry.applied_at),
        };
        match apply_in_session(&session, &mut state, bundle, &options) {
            Ok(_) => report.applied.push(entry.name.clone()),
            Err(err) => {
                warn!(skill = %entry.name, code = err.code(), "replay stopped: {err}");
                report.failed = Some(ReplayFailure {
                    skill: entry.name.clone(),
                    code: err.code(),
                    message: err.to_string(),
                });
                report.skipped = recorded[index + 1..]
                    .iter()
                    .map(|later| later.name.clone())
                    .collect();
                break;
            }
        }
    }

    Ok(report)
}

/// Explicit path, then the recorded template, then `paths.template_dir`.
fn resolve_template(
    project: &Project,
    state: &ProjectState,
    explicit: Option<&Path>,
) -> Result<PathBuf> {
    let recorded = state.template.as_ref().and_then(|info| info.path.clone());
    let template = explicit
        .map(Path::to_path_buf)
        .or(recorded)
        .or_else(|| template_source(project, None))
        .ok_or_else(|| {
            GraftError::Config(
                "no template to replay from; pass --template or set paths.template_dir"
                    .to_string(),
            )
        })?;
    absolute_template(&template)
}

fn reset(session: &Session<'_>, state: &mut ProjectState, template: &Path) -> Result<()> {
    let project = session.project();
    let snapshots = session.snapshots();
    let template_files = collect_files(template, project)?;

    let mut coverage = BTreeSet::new();
    for file in &template_files {
        let relative = Path::new(file);
        coverage.insert(relative.to_path_buf());
        coverage.insert(snapshots.base_relative(relative));
        coverage.insert(snapshots.origin_relative(relative));
    }
    if let Some(info) = &state.template {
        coverage.extend(info.files.iter().map(PathBuf::from));
    }
    for entry in &state.applied_skills {
        coverage.extend(entry.files.iter().map(|record| PathBuf::from(&record.path)));
    }
    coverage.extend(snapshots.snapshot_files()?);
    coverage.insert(session.state_relative());
    let guard = snapshots.capture_backup(session.operation(), &coverage)?;

    match lay_down_template(session, state, template, &template_files) {
        Ok(next) => {
            guard.discard()?;
            *state = next;
            Ok(())
        }
        Err(err) => {
            warn!(code = err.code(), "reset failed, rolling back: {err}");
            if let Err(restore_err) = guard.restore() {
                error!("rollback incomplete, backup kept for recovery: {restore_err}");
            }
            Err(err)
        }
    }
}

fn lay_down_template(
    session: &Session<'_>,
    state: &ProjectState,
    template: &Path,
    template_files: &[String],
) -> Result<ProjectState> {
    let project = session.project();
    let snapshots = session.snapshots();

    // Undo recorded skills newest first so each pre-image lands on the
    // state it was taken from.
    for entry in state.applied_skills.iter().rev() {
        for record in &entry.files {
            let relative = PathBuf::from(&record.path);
            if record.kind == FileKind::Added {
                remove_file_pruning(&project.resolve(&relative), project.root())?;
            } else if let Some(preimage) = snapshots.read_preimage(&entry.name, &relative)? {
                atomic_write(project.resolve(&relative), preimage)?;
            }
        }
    }

    // Files the previous template had and the new one dropped.
    let incoming: BTreeSet<&str> = template_files.iter().map(String::as_str).collect();
    if let Some(info) = &state.template {
        for file in info.files.iter().filter(|file| !incoming.contains(file.as_str())) {
            remove_file_pruning(&project.resolve(Path::new(file)), project.root())?;
            snapshots.remove_base(Path::new(file))?;
        }
    }

    snapshots.clear_bases()?;
    for file in template_files {
        let relative = Path::new(file);
        let source = template.join(relative);
        let target = project.resolve(relative);
        atomic_write(&target, fs::read(&source)?)?;
        copy_permissions(&source, &target)?;
        snapshots.capture_base(relative)?;
    }

    let mut next = state.clone();
    next.applied_skills.clear();
    next.template = Some(TemplateInfo {
        path: Some(template.to_path_buf()),
        captured_at: Utc::now(),
        files: template_files.to_vec(),
    });
    session.store().save(&next)?;
    Ok(next)
}
