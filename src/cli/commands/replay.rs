//! graft replay - rebuild from the template and re-apply recorded skills

use std::path::PathBuf;

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_robot, robot_ok, robot_partial};
use crate::engine::replay;
use crate::error::Result;

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Template to rebuild from (defaults to the recorded one)
    #[arg(long)]
    pub template: Option<PathBuf>,
}

pub fn run(ctx: &AppContext, args: &ReplayArgs) -> Result<bool> {
    let report = replay(&ctx.project, args.template.as_deref())?;
    let succeeded = report.succeeded();

    if ctx.robot() {
        if succeeded {
            emit_robot(&robot_ok(&report))?;
        } else {
            let completed = report.applied.len();
            emit_robot(&robot_partial(&report, completed, 1))?;
        }
        return Ok(succeeded);
    }

    let mut layout = HumanLayout::new();
    layout.title(if succeeded { "Replay complete" } else { "Replay stopped" });
    layout.kv("Template", &report.template.display().to_string());
    for skill in &report.applied {
        layout.bullet(&format!("applied {skill}"));
    }
    if let Some(failure) = &report.failed {
        layout.blank();
        layout.warning(&format!("{} failed: {}", failure.skill, failure.message));
        if !report.skipped.is_empty() {
            layout.kv("Not attempted", &report.skipped.join(", "));
        }
    }
    emit_human(layout);
    Ok(succeeded)
}
