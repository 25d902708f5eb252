//! Uninstall pipeline.
//!
//! Removing a skill deletes the files it created and restores the files it
//! modified to the pre-image stashed when it was applied. A file another
//! recorded skill also touches is never reverted automatically.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{error, info, warn};

use super::session::Session;
use crate::error::{GraftError, Result, ValidationError};
use crate::project::Project;
use crate::storage::{AppliedSkill, FileKind, ProjectState};
use crate::utils::fs::{atomic_write, read_optional, remove_file_pruning, sha256_hex};

#[derive(Debug, Clone, Default, Serialize)]
pub struct UninstallReport {
    pub skill: String,
    pub deleted: Vec<String>,
    pub restored: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

pub fn uninstall_skill(project: &Project, name: &str) -> Result<UninstallReport> {
    let session = Session::open(project, "uninstall")?;
    let mut state = session.load_state()?;
    uninstall_in_session(&session, &mut state, name)
}

pub fn uninstall_in_session(
    session: &Session<'_>,
    state: &mut ProjectState,
    name: &str,
) -> Result<UninstallReport> {
    let entry = state
        .find(name)
        .cloned()
        .ok_or_else(|| ValidationError::SkillNotApplied(name.to_string()))?;

    for record in &entry.files {
        let others = state.skills_touching(&record.path, name);
        if !others.is_empty() {
            return Err(GraftError::SharedFile {
                skill: name.to_string(),
                file: PathBuf::from(&record.path),
                others: others.into_iter().map(String::from).collect(),
            });
        }
    }

    let snapshots = session.snapshots();
    let mut coverage = vec![session.state_relative()];
    for record in &entry.files {
        let relative = PathBuf::from(&record.path);
        coverage.push(snapshots.base_relative(&relative));
        coverage.push(snapshots.origin_relative(&relative));
        coverage.push(snapshots.preimage_relative(name, &relative));
        coverage.push(relative);
    }
    let guard = snapshots.capture_backup(session.operation(), &coverage)?;

    match revert(session, state, &entry) {
        Ok((next, report)) => {
            guard.discard()?;
            *state = next;
            info!(
                skill = name,
                deleted = report.deleted.len(),
                restored = report.restored.len(),
                "skill uninstalled"
            );
            Ok(report)
        }
        Err(err) => {
            warn!(skill = name, code = err.code(), "uninstall failed, rolling back: {err}");
            if let Err(restore_err) = guard.restore() {
                error!(skill = name, "rollback incomplete, backup kept for recovery: {restore_err}");
            }
            Err(err)
        }
    }
}

fn revert(
    session: &Session<'_>,
    state: &ProjectState,
    entry: &AppliedSkill,
) -> Result<(ProjectState, UninstallReport)> {
    let project = session.project();
    let snapshots = session.snapshots();
    let name = entry.name.as_str();
    let mut report = UninstallReport {
        skill: name.to_string(),
        ..UninstallReport::default()
    };

    for record in &entry.files {
        let relative = PathBuf::from(&record.path);
        let target = project.resolve(&relative);
        let edited = read_optional(&target)?
            .is_some_and(|current| sha256_hex(current) != record.sha256);

        match record.kind {
            FileKind::Added => {
                if edited {
                    note(&mut report, format!(
                        "{} changed after {name} created it; deleted anyway",
                        record.path
                    ));
                }
                remove_file_pruning(&target, project.root())?;
                snapshots.remove_base(&relative)?;
                report.deleted.push(record.path.clone());
            }
            FileKind::Modified | FileKind::Structured => {
                let Some(preimage) = snapshots.read_preimage(name, &relative)? else {
                    note(&mut report, format!(
                        "no pre-image recorded for {}; left as is",
                        record.path
                    ));
                    continue;
                };
                if edited {
                    note(&mut report, format!(
                        "{} changed after {name} was applied; those edits are discarded",
                        record.path
                    ));
                }
                if let Some(local) = &record.local_sha256 {
                    note(&mut report, format!(
                        "{} carried local edits (sha256 {}) when {name} was applied; \
                         restored to the base without them",
                        record.path,
                        &local[..local.len().min(12)]
                    ));
                }
                atomic_write(&target, &preimage)?;
                snapshots.update_base(&relative, &preimage)?;
                report.restored.push(record.path.clone());
            }
        }
    }

    snapshots.drop_preimages(name)?;
    let mut next = state.clone();
    next.record_uninstall(name);
    session.store().save(&next)?;
    Ok((next, report))
}

fn note(report: &mut UninstallReport, message: String) {
    warn!(skill = %report.skill, "{message}");
    report.warnings.push(message);
}
