//! CLI command implementations
//!
//! Each subcommand has its own module with:
//! - Args struct for command-line arguments
//! - run() function returning whether every step succeeded

use clap::Subcommand;

pub mod apply;
pub mod check;
pub mod init;
pub mod migrate;
pub mod replay;
pub mod status;
pub mod uninstall;

use crate::app::AppContext;
use crate::error::Result;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record the current tree (or a template) as the project baseline
    Init(init::InitArgs),

    /// Apply a skill bundle
    Apply(apply::ApplyArgs),

    /// Validate a skill against the project without changing anything
    Check(check::CheckArgs),

    /// Rebuild from the template and re-apply every recorded skill
    Replay(replay::ReplayArgs),

    /// Remove a skill's files and restore what it modified
    Uninstall(uninstall::UninstallArgs),

    /// Run version-gated migration scripts
    Migrate(migrate::MigrateArgs),

    /// Show applied skills and any running operation
    Status(status::StatusArgs),
}

/// Run one command. `Ok(false)` means it ran but some step failed.
pub fn run(ctx: &AppContext, command: &Commands) -> Result<bool> {
    match command {
        Commands::Init(args) => init::run(ctx, args),
        Commands::Apply(args) => apply::run(ctx, args),
        Commands::Check(args) => check::run(ctx, args),
        Commands::Replay(args) => replay::run(ctx, args),
        Commands::Uninstall(args) => uninstall::run(ctx, args),
        Commands::Migrate(args) => migrate::run(ctx, args),
        Commands::Status(args) => status::run(ctx, args),
    }
}
