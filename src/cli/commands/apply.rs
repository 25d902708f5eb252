//! graft apply - apply a skill bundle

use std::path::PathBuf;

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_robot, robot_ok};
use crate::engine::{ApplyOptions, apply_skill};
use crate::error::Result;
use crate::skill::{SkillBundle, parse_params};
use crate::storage::FileKind;

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Skill name (a directory under the skills dir)
    pub skill: String,

    /// Parameter substituted for {{KEY}} in the skill's files
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Apply again even if already recorded
    #[arg(long)]
    pub reapply: bool,

    /// Bundle directory, instead of looking under the skills dir
    #[arg(long)]
    pub bundle: Option<PathBuf>,
}

pub fn run(ctx: &AppContext, args: &ApplyArgs) -> Result<bool> {
    let bundle = SkillBundle::locate(
        &ctx.project.skills_dir(),
        &args.skill,
        args.bundle.as_deref(),
    )?;
    let options = ApplyOptions {
        params: parse_params(&args.set)?,
        reapply: args.reapply,
        applied_at: None,
    };
    let report = apply_skill(&ctx.project, &bundle, &options)?;

    if ctx.robot() {
        emit_robot(&robot_ok(&report))?;
        return Ok(true);
    }

    let mut layout = HumanLayout::new();
    let verb = if report.reapplied { "Reapplied" } else { "Applied" };
    layout.title(&format!("{verb} {} {}", report.skill, report.version));
    for record in &report.files {
        let tag = match record.kind {
            FileKind::Added => "add",
            FileKind::Modified => "merge",
            FileKind::Structured => "struct",
        };
        layout.bullet(&format!("{tag:<6} {}", record.path));
    }
    for outcome in &report.structured {
        if !outcome.skipped.is_empty() {
            layout.bullet(&format!(
                "{}: already present {}",
                outcome.file,
                outcome.skipped.join(", ")
            ));
        }
    }
    emit_human(layout);
    Ok(true)
}
