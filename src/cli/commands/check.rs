//! graft check - validate a skill without applying it

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_robot, robot_ok};
use crate::engine::{ApplyOptions, check_skill};
use crate::error::Result;
use crate::skill::{SkillBundle, parse_params};

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Skill name (a directory under the skills dir)
    pub skill: String,

    /// Parameter substituted for {{KEY}} in the skill's files
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Check as a re-application
    #[arg(long)]
    pub reapply: bool,

    /// Bundle directory, instead of looking under the skills dir
    #[arg(long)]
    pub bundle: Option<PathBuf>,
}

#[derive(Serialize)]
struct CheckReport<'a> {
    skill: &'a str,
    version: &'a str,
    valid: bool,
}

pub fn run(ctx: &AppContext, args: &CheckArgs) -> Result<bool> {
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
    check_skill(&ctx.project, &bundle, &options)?;

    if ctx.robot() {
        emit_robot(&robot_ok(CheckReport {
            skill: bundle.name(),
            version: bundle.version(),
            valid: true,
        }))?;
    } else {
        let mut layout = HumanLayout::new();
        layout.title(&format!("{} {} can be applied", bundle.name(), bundle.version()));
        emit_human(layout);
    }
    Ok(true)
}
