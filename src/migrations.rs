//! Version-gated migration scripts.
//!
//! The migrations directory holds one subdirectory per release, named by
//! its version, each with a single script. An upgrade from `from` to `to`
//! runs every script with `from < version <= to` in ascending order, as an
//! isolated subprocess with a bounded timeout. The first failure stops the
//! run; migrations that already succeeded stay applied.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{GraftError, Result};
use crate::project::Project;
use crate::utils::format::{tail_lines, truncate_string};
use crate::version::{Version, in_upgrade_window};

/// Lines of captured output kept in a failure message.
const OUTPUT_TAIL_LINES: usize = 20;
const MAX_ERROR_LEN: usize = 4000;
const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: Version,
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    pub version: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    /// Migrations selected for the window, whether or not they ran.
    pub count: usize,
    pub results: Vec<MigrationResult>,
    /// Versions left unattempted after a failure.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

impl MigrationReport {
    pub fn success(&self) -> bool {
        self.skipped.is_empty() && self.results.iter().all(|result| result.success)
    }

    pub fn completed(&self) -> usize {
        self.results.iter().filter(|result| result.success).count()
    }
}

/// Migrations under `dir` inside the upgrade window, oldest first.
///
/// Every subdirectory must be named by a version; loose files are ignored.
pub fn discover(dir: &Path, from: &Version, to: &Version) -> Result<Vec<Migration>> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "no migrations directory");
        return Ok(Vec::new());
    }

    let mut migrations = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let version = Version::parse(&name)?;
        if in_upgrade_window(&version, from, to) {
            migrations.push(Migration {
                version,
                dir: entry.path(),
            });
        }
    }
    migrations.sort_by(|a, b| a.version.cmp(&b.version));
    Ok(migrations)
}

/// Run the migrations between two versions against the project.
pub fn run_migrations(
    project: &Project,
    from: &str,
    to: &str,
    new_source: &Path,
) -> Result<MigrationReport> {
    let from = Version::parse(from)?;
    let to = Version::parse(to)?;
    let runner = ScriptRunner {
        root: project.root().to_path_buf(),
        new_source: new_source.to_path_buf(),
        timeout: project.config.migrations.timeout,
    };

    let migrations = discover(&project.migrations_dir(), &from, &to)?;
    info!(%from, %to, pending = migrations.len(), "running migrations");

    let mut results = Vec::with_capacity(migrations.len());
    for migration in &migrations {
        let version = migration.version.to_string();
        match runner.run(migration) {
            Ok(()) => {
                info!(version = %version, "migration succeeded");
                results.push(MigrationResult {
                    version,
                    success: true,
                    error: None,
                });
            }
            Err(err) => {
                let message = truncate_string(&err.to_string(), MAX_ERROR_LEN);
                warn!(version = %version, "migration failed: {message}");
                results.push(MigrationResult {
                    version,
                    success: false,
                    error: Some(message),
                });
                break;
            }
        }
    }

    let skipped = migrations[results.len()..]
        .iter()
        .map(|migration| migration.version.to_string())
        .collect();
    Ok(MigrationReport {
        count: migrations.len(),
        results,
        skipped,
    })
}

struct ScriptRunner {
    root: PathBuf,
    new_source: PathBuf,
    timeout: Duration,
}

impl ScriptRunner {
    fn run(&self, migration: &Migration) -> Result<()> {
        let script = find_script(&migration.dir)?;
        let mut command = command_for(&script)?;
        let mut stdout = tempfile::tempfile()?;
        let mut stderr = tempfile::tempfile()?;
        command
            .arg(&self.new_source)
            .current_dir(&self.root)
            .env("GRAFT_PROJECT_ROOT", &self.root)
            .env("GRAFT_NEW_SOURCE", &self.new_source)
            .env("GRAFT_MIGRATION_VERSION", migration.version.to_string())
            .stdin(Stdio::null())
            .stdout(stdout.try_clone()?)
            .stderr(stderr.try_clone()?);

        debug!(script = %script.display(), "spawning migration");
        let child = command.spawn().map_err(|err| {
            GraftError::Subprocess(format!("failed to start {}: {err}", script.display()))
        })?;

        let status = wait_with_timeout(child, self.timeout)?;
        if let Some(status) = status.filter(ExitStatus::success) {
            debug!(code = ?status.code(), "migration exited");
            return Ok(());
        }

        let mut message = match status {
            None => format!("{} timed out after {:?}", script.display(), self.timeout),
            Some(status) => format!("{} exited with {status}", script.display()),
        };
        for (label, file) in [("stderr", &mut stderr), ("stdout", &mut stdout)] {
            let tail = tail_lines(&read_captured(file)?, OUTPUT_TAIL_LINES);
            if !tail.is_empty() {
                message.push_str(&format!("\n--- {label}\n{tail}"));
            }
        }
        Err(GraftError::Subprocess(message))
    }
}

/// The one script in a migration directory.
fn find_script(dir: &Path) -> Result<PathBuf> {
    let mut scripts = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            scripts.push(entry.path());
        }
    }
    scripts.sort();
    match scripts.len() {
        1 => Ok(scripts.remove(0)),
        0 => Err(GraftError::Subprocess(format!(
            "no script in {}",
            dir.display()
        ))),
        n => Err(GraftError::Subprocess(format!(
            "{} holds {n} files; expected exactly one script",
            dir.display()
        ))),
    }
}

fn command_for(script: &Path) -> Result<Command> {
    let interpreter = match script.extension().and_then(|ext| ext.to_str()) {
        Some("sh") => Some("sh"),
        Some("py") => Some("python3"),
        Some("js" | "mjs") => Some("node"),
        _ => None,
    };
    let Some(interpreter) = interpreter else {
        return Ok(Command::new(script));
    };
    let binary = which::which(interpreter).map_err(|err| {
        GraftError::Subprocess(format!(
            "{interpreter} is needed to run {}: {err}",
            script.display()
        ))
    })?;
    let mut command = Command::new(binary);
    command.arg(script);
    Ok(command)
}

/// `None` when the child outlived `timeout` and was killed.
fn wait_with_timeout(mut child: Child, timeout: Duration) -> Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            // kill fails if the child exited in between; reap either way
            let _ = child.kill();
            child.wait()?;
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn read_captured(file: &mut File) -> Result<String> {
    let mut bytes = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
