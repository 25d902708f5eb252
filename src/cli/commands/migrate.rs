//! graft migrate - run migration scripts between two versions

use std::path::PathBuf;

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_robot, robot_ok, robot_partial};
use crate::error::Result;
use crate::migrations::run_migrations;

#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Version the project is upgrading from (exclusive)
    #[arg(long)]
    pub from: String,

    /// Version the project is upgrading to (inclusive)
    #[arg(long)]
    pub to: String,

    /// Checkout of the new release, passed to each script
    #[arg(long)]
    pub new_source: PathBuf,
}

pub fn run(ctx: &AppContext, args: &MigrateArgs) -> Result<bool> {
    let report = run_migrations(&ctx.project, &args.from, &args.to, &args.new_source)?;
    let succeeded = report.success();

    if ctx.robot() {
        if succeeded {
            emit_robot(&robot_ok(&report))?;
        } else {
            let completed = report.completed();
            emit_robot(&robot_partial(&report, completed, report.results.len() - completed))?;
        }
        return Ok(succeeded);
    }

    let mut layout = HumanLayout::new();
    layout.title(&format!("Migrations {} -> {}", args.from, args.to));
    if report.results.is_empty() {
        layout.bullet("nothing to run");
    }
    for result in &report.results {
        match &result.error {
            None => layout.bullet(&format!("{} ok", result.version)),
            Some(error) => layout.warning(&format!("{} failed: {error}", result.version)),
        };
    }
    for version in &report.skipped {
        layout.bullet(&format!("{version} not run"));
    }
    emit_human(layout);
    Ok(succeeded)
}
