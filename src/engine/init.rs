//! Initialize a project: record the template files and capture their bases.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::session::Session;
use crate::error::{GraftError, Result};
use crate::project::{GRAFT_DIR, Project};
use crate::storage::TemplateInfo;
use crate::utils::path_policy::display_path;

#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub root: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,
    pub files: usize,
    pub bases: usize,
    pub already_initialized: bool,
}

/// Record the current tree as the template snapshot.
///
/// With `template` (or `paths.template_dir`) only the files present in that
/// directory are tracked; otherwise every non-ignored file under the root.
/// Running it again on an initialized project changes nothing.
pub fn init_project(project: &Project, template: Option<&Path>) -> Result<InitReport> {
    let session = Session::open(project, "init")?;
    let mut state = session.load_state()?;

    if state.template.is_some() || !state.applied_skills.is_empty() {
        debug!("project already initialized");
        return Ok(InitReport {
            root: project.root().to_path_buf(),
            template: state.template.as_ref().and_then(|info| info.path.clone()),
            files: state.template.as_ref().map_or(0, |info| info.files.len()),
            bases: 0,
            already_initialized: true,
        });
    }

    let template = template_source(project, template)
        .map(|dir| absolute_template(&dir))
        .transpose()?;
    let files = match &template {
        Some(dir) => {
            collect_files(dir, project)?
                .into_iter()
                .filter(|file| project.resolve(Path::new(file)).is_file())
                .collect()
        }
        None => collect_files(project.root(), project)?,
    };

    let snapshots = session.snapshots();
    let mut bases = 0;
    for file in &files {
        if snapshots.capture_base(Path::new(file))? {
            bases += 1;
        }
    }

    state.template = Some(TemplateInfo {
        path: template.clone(),
        captured_at: Utc::now(),
        files: files.clone(),
    });
    session.store().save(&state)?;
    info!(files = files.len(), bases, "project initialized");

    Ok(InitReport {
        root: project.root().to_path_buf(),
        template,
        files: files.len(),
        bases,
        already_initialized: false,
    })
}

/// Explicit directory first, then the configured one (relative to the root).
pub(crate) fn template_source(project: &Project, explicit: Option<&Path>) -> Option<PathBuf> {
    explicit.map(Path::to_path_buf).or_else(|| {
        project
            .config
            .paths
            .template_dir
            .as_deref()
            .map(|dir| project.resolve(dir))
    })
}

/// Check that a template directory exists and make its path absolute, so a
/// recorded template still resolves when a later command runs from another
/// directory.
pub(crate) fn absolute_template(dir: &Path) -> Result<PathBuf> {
    if !dir.is_dir() {
        return Err(GraftError::Config(format!(
            "template directory {} does not exist",
            dir.display()
        )));
    }
    Ok(std::path::absolute(dir)?)
}

/// Every file under `dir`, relative to it, skipping engine directories and
/// the configured ignore list. Sorted, `/`-separated.
pub(crate) fn collect_files(dir: &Path, project: &Project) -> Result<Vec<String>> {
    let paths = &project.config.paths;
    let excluded = [
        PathBuf::from(GRAFT_DIR),
        paths.skills_dir.clone(),
        paths.migrations_dir.clone(),
    ];
    let ignore = &project.config.init;

    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
            relative.as_os_str().is_empty()
                || !(ignore.is_ignored(relative)
                    || excluded.iter().any(|prefix| relative.starts_with(prefix)))
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry
            .map_err(|err| std::io::Error::other(format!("walk {}: {err}", dir.display())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(dir) {
            files.push(display_path(relative));
        }
    }
    Ok(files)
}
