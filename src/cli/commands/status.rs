//! graft status - applied skills and lock holder

use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_robot, robot_ok};
use crate::error::Result;
use crate::storage::{LockInfo, ProjectLock, StateStore};

#[derive(Args, Debug)]
pub struct StatusArgs {}

#[derive(Serialize)]
struct StatusReport {
    root: String,
    initialized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    template: Option<String>,
    skills: Vec<SkillLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lock: Option<LockInfo>,
}

#[derive(Serialize)]
struct SkillLine {
    name: String,
    version: String,
    applied_at: DateTime<Utc>,
    files: usize,
}

pub fn run(ctx: &AppContext, _args: &StatusArgs) -> Result<bool> {
    let project = &ctx.project;
    let state = StateStore::new(project.state_path()).load()?;
    let report = StatusReport {
        root: project.root().display().to_string(),
        initialized: state.template.is_some(),
        template: state
            .template
            .as_ref()
            .and_then(|info| info.path.as_ref())
            .map(|path| path.display().to_string()),
        skills: state
            .applied_skills
            .iter()
            .map(|entry| SkillLine {
                name: entry.name.clone(),
                version: entry.version.clone(),
                applied_at: entry.applied_at,
                files: entry.files.len(),
            })
            .collect(),
        lock: ProjectLock::holder(&project.lock_path()),
    };

    if ctx.robot() {
        emit_robot(&robot_ok(&report))?;
        return Ok(true);
    }

    let mut layout = HumanLayout::new();
    layout.title("Project status");
    layout.kv("Root", &report.root);
    layout.kv(
        "Template",
        report.template.as_deref().unwrap_or(if report.initialized {
            "captured in place"
        } else {
            "not initialized"
        }),
    );
    if let Some(lock) = &report.lock {
        layout.kv(
            "Locked by",
            &format!("{} (pid {} on {})", lock.operation, lock.pid, lock.hostname),
        );
    }
    layout.blank();
    layout.section("Applied skills");
    if report.skills.is_empty() {
        layout.bullet("none");
    }
    for skill in &report.skills {
        layout.bullet(&format!(
            "{} {} ({} files, {})",
            skill.name,
            skill.version,
            skill.files,
            skill.applied_at.format("%Y-%m-%d %H:%M")
        ));
    }
    emit_human(layout);
    Ok(true)
}
