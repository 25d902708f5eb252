//! A throwaway project generated from a small template, plus helpers to
//! write skill bundles into its skills directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use graft::config::Config;
use graft::engine::{ApplyOptions, ApplyReport, InitReport, apply_skill, init_project};
use graft::project::Project;
use graft::skill::SkillBundle;
use graft::storage::{ProjectState, StateStore};
use tempfile::TempDir;
use walkdir::WalkDir;

pub const APP_PY: &str = "import os

def main():
    print(\"hello\")

if __name__ == \"__main__\":
    main()
";

pub const PACKAGE_JSON: &str = r#"{
  "name": "demo",
  "version": "1.0.0",
  "dependencies": {
    "express": "^4.18.0"
  }
}
"#;

pub const COMPOSE: &str = "services:
  web:
    image: demo/web
    ports:
      - \"8000:8000\"
";

pub const ENV: &str = "PORT=8000\n";

pub struct TestFixture {
    _dir: TempDir,
    template: PathBuf,
    pub project: Project,
}

impl TestFixture {
    /// Template with a Python entry point, a package manifest, a compose
    /// file and an env file, copied into a fresh project root.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let template = dir.path().join("template");
        let root = dir.path().join("project");
        for (path, content) in [
            ("app.py", APP_PY),
            ("package.json", PACKAGE_JSON),
            ("docker-compose.yml", COMPOSE),
            (".env", ENV),
        ] {
            write_file(&template.join(path), content);
            write_file(&root.join(path), content);
        }
        let project = Project::new(&root, Config::default());
        Self {
            _dir: dir,
            template,
            project,
        }
    }

    pub fn init(&self) -> InitReport {
        init_project(&self.project, Some(&self.template)).expect("init")
    }

    pub fn root(&self) -> &Path {
        self.project.root()
    }

    pub fn template_dir(&self) -> &Path {
        &self.template
    }

    pub fn write(&self, relative: &str, content: &str) {
        write_file(&self.root().join(relative), content);
    }

    pub fn write_template(&self, relative: &str, content: &str) {
        write_file(&self.template.join(relative), content);
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.root().join(relative))
            .unwrap_or_else(|err| panic!("read {relative}: {err}"))
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.root().join(relative).exists()
    }

    /// Write a bundle: `manifest` is the YAML manifest, `files` are paths
    /// inside the bundle (`add/...`, `modify/...`).
    pub fn add_skill(&self, name: &str, manifest: &str, files: &[(&str, &str)]) {
        let dir = self.project.skills_dir().join(name);
        write_file(&dir.join("manifest.yaml"), manifest);
        for (path, content) in files {
            write_file(&dir.join(path), content);
        }
    }

    pub fn bundle(&self, name: &str) -> SkillBundle {
        SkillBundle::locate(&self.project.skills_dir(), name, None).expect("bundle")
    }

    pub fn apply(&self, name: &str) -> graft::Result<ApplyReport> {
        self.apply_with(name, ApplyOptions::default())
    }

    pub fn apply_with(&self, name: &str, options: ApplyOptions) -> graft::Result<ApplyReport> {
        apply_skill(&self.project, &self.bundle(name), &options)
    }

    pub fn state(&self) -> ProjectState {
        StateStore::new(self.project.state_path())
            .load()
            .expect("load state")
    }

    pub fn applied_names(&self) -> Vec<String> {
        self.state()
            .applied_skills
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Every project file outside `.graft/` and the skills dir, with content.
    pub fn tree(&self) -> BTreeMap<String, String> {
        let root = self.root();
        let skills = self.project.skills_dir();
        WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.file_name() != ".graft" && entry.path() != skills.as_path()
            })
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| {
                let relative = entry
                    .path()
                    .strip_prefix(root)
                    .expect("under root")
                    .to_string_lossy()
                    .replace('\\', "/");
                let content = std::fs::read_to_string(entry.path()).expect("read");
                (relative, content)
            })
            .collect()
    }
}

pub fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent");
    }
    std::fs::write(path, content).expect("write file");
}

/// The template's `app.py` with one line replaced.
pub fn app_with(from: &str, to: &str) -> String {
    assert!(APP_PY.contains(from), "{from:?} not in app.py");
    APP_PY.replacen(from, to, 1)
}

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).expect("chmod");
}

#[cfg(unix)]
pub fn mode(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).expect("stat").permissions().mode() & 0o777
}
