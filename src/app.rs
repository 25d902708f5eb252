use crate::cli::Cli;
use crate::cli::output::OutputMode;
use crate::error::Result;
use crate::project::Project;

/// Everything a command needs: the resolved project and how to report.
pub struct AppContext {
    pub project: Project,
    pub output_mode: OutputMode,
    pub verbosity: u8,
}

impl AppContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let root = Project::discover_root(cli.root.as_deref())?;
        let project = Project::open(root, cli.config.as_deref())?;
        Ok(Self {
            project,
            output_mode: if cli.robot {
                OutputMode::Robot
            } else {
                OutputMode::Human
            },
            verbosity: cli.verbose,
        })
    }

    pub const fn robot(&self) -> bool {
        matches!(self.output_mode, OutputMode::Robot)
    }
}
