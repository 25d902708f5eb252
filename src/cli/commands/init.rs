//! graft init - record the project baseline

use std::path::PathBuf;

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_robot, robot_ok};
use crate::engine::init_project;
use crate::error::Result;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Template directory the project was generated from
    #[arg(long)]
    pub template: Option<PathBuf>,
}

pub fn run(ctx: &AppContext, args: &InitArgs) -> Result<bool> {
    let report = init_project(&ctx.project, args.template.as_deref())?;

    if ctx.robot() {
        emit_robot(&robot_ok(&report))?;
        return Ok(true);
    }

    let mut layout = HumanLayout::new();
    if report.already_initialized {
        layout.title("Already initialized");
    } else {
        layout.title("Project initialized");
    }
    layout.kv("Root", &report.root.display().to_string());
    if let Some(template) = &report.template {
        layout.kv("Template", &template.display().to_string());
    }
    layout.kv("Files", &report.files.to_string());
    if !report.already_initialized {
        layout.kv("Bases", &report.bases.to_string());
    }
    emit_human(layout);
    Ok(true)
}
