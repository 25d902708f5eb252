//! graft uninstall - remove a skill

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_robot, robot_ok};
use crate::engine::uninstall_skill;
use crate::error::Result;

#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// Skill to remove
    pub skill: String,
}

pub fn run(ctx: &AppContext, args: &UninstallArgs) -> Result<bool> {
    let report = uninstall_skill(&ctx.project, &args.skill)?;

    if ctx.robot() {
        let warnings = report.warnings.clone();
        emit_robot(&robot_ok(&report).with_warnings(warnings))?;
        return Ok(true);
    }

    let mut layout = HumanLayout::new();
    layout.title(&format!("Uninstalled {}", report.skill));
    for path in &report.deleted {
        layout.bullet(&format!("deleted  {path}"));
    }
    for path in &report.restored {
        layout.bullet(&format!("restored {path}"));
    }
    for warning in &report.warnings {
        layout.warning(warning);
    }
    emit_human(layout);
    Ok(true)
}
