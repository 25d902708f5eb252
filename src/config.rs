use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GraftError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub migrations: MigrationsConfig,
    #[serde(default)]
    pub init: InitConfig,
}

impl Config {
    /// Load defaults, then the global and project files (or one explicit
    /// file instead of both), then `GRAFT_*` environment overrides.
    pub fn load(explicit_path: Option<&Path>, graft_dir: &Path) -> Result<Self> {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var("GRAFT_CONFIG").ok().map(PathBuf::from));

        if let Some(path) = explicit {
            if let Some(patch) = Self::load_patch(&path)? {
                config.merge_patch(patch);
            }
        } else {
            if let Some(global) = Self::load_global()? {
                config.merge_patch(global);
            }
            if let Some(project) = Self::load_patch(&graft_dir.join("config.toml"))? {
                config.merge_patch(project);
            }
        }

        config.apply_env_overrides()?;

        Ok(config)
    }

    fn load_global() -> Result<Option<ConfigPatch>> {
        let Some(dir) = dirs::config_dir() else {
            return Ok(None);
        };
        Self::load_patch(&dir.join("graft/config.toml"))
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| GraftError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| GraftError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.paths {
            self.paths.merge(patch);
        }
        if let Some(patch) = patch.lock {
            self.lock.merge(patch);
        }
        if let Some(patch) = patch.merge {
            self.merge.merge(patch);
        }
        if let Some(patch) = patch.migrations {
            self.migrations.merge(patch);
        }
        if let Some(patch) = patch.init {
            self.init.merge(patch);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(value) = env_string("GRAFT_SKILLS_DIR") {
            self.paths.skills_dir = PathBuf::from(value);
        }
        if let Some(value) = env_string("GRAFT_MIGRATIONS_DIR") {
            self.paths.migrations_dir = PathBuf::from(value);
        }
        if let Some(value) = env_string("GRAFT_TEMPLATE_DIR") {
            self.paths.template_dir = Some(PathBuf::from(value));
        }

        if let Some(value) = env_u64("GRAFT_LOCK_WAIT_MS")? {
            self.lock.wait_ms = value;
        }

        if let Some(value) = env_bool("GRAFT_MERGE_SHOW_BASE") {
            self.merge.show_base = value;
        }

        if let Some(value) = env_u64("GRAFT_MIGRATION_TIMEOUT_SECS")? {
            self.migrations.timeout = Duration::from_secs(value);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Where skill bundles live, relative to the project root.
    pub skills_dir: PathBuf,
    pub migrations_dir: PathBuf,
    /// Template baseline used by `replay` when none is recorded or given.
    #[serde(default)]
    pub template_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            skills_dir: PathBuf::from("skills"),
            migrations_dir: PathBuf::from("migrations"),
            template_dir: None,
        }
    }
}

impl PathsConfig {
    fn merge(&mut self, patch: PathsPatch) {
        if let Some(value) = patch.skills_dir {
            self.skills_dir = value;
        }
        if let Some(value) = patch.migrations_dir {
            self.migrations_dir = value;
        }
        if let Some(value) = patch.template_dir {
            self.template_dir = Some(value);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// How long to wait for a busy lock; 0 fails immediately.
    pub wait_ms: u64,
    pub poll_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            wait_ms: 0,
            poll_ms: 50,
        }
    }
}

impl LockConfig {
    fn merge(&mut self, patch: LockPatch) {
        if let Some(value) = patch.wait_ms {
            self.wait_ms = value;
        }
        if let Some(value) = patch.poll_ms {
            self.poll_ms = value.max(1);
        }
    }

    pub const fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    pub const fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    pub current_label: String,
    /// Label for the incoming side; the skill name when unset.
    #[serde(default)]
    pub incoming_label: Option<String>,
    /// Emit a `|||||||` base section inside conflict regions.
    pub show_base: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            current_label: "current".to_string(),
            incoming_label: None,
            show_base: false,
        }
    }
}

impl MergeConfig {
    fn merge(&mut self, patch: MergePatch) {
        if let Some(value) = patch.current_label {
            self.current_label = value;
        }
        if let Some(value) = patch.incoming_label {
            self.incoming_label = Some(value);
        }
        if let Some(value) = patch.show_base {
            self.show_base = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationsConfig {
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
        }
    }
}

impl MigrationsConfig {
    fn merge(&mut self, patch: MigrationsPatch) {
        if let Some(value) = patch.timeout {
            self.timeout = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitConfig {
    /// Path prefixes never captured as template files.
    pub ignore: Vec<String>,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            ignore: vec![
                ".git".to_string(),
                "node_modules".to_string(),
                ".venv".to_string(),
                "__pycache__".to_string(),
                "target".to_string(),
            ],
        }
    }
}

impl InitConfig {
    fn merge(&mut self, patch: InitPatch) {
        if let Some(values) = patch.ignore {
            for value in values {
                if !self.ignore.contains(&value) {
                    self.ignore.push(value);
                }
            }
        }
    }

    pub fn is_ignored(&self, relative: &Path) -> bool {
        self.ignore.iter().any(|entry| {
            relative.starts_with(entry)
                || relative
                    .components()
                    .any(|part| part.as_os_str() == std::ffi::OsStr::new(entry))
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigPatch {
    pub paths: Option<PathsPatch>,
    pub lock: Option<LockPatch>,
    pub merge: Option<MergePatch>,
    pub migrations: Option<MigrationsPatch>,
    pub init: Option<InitPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PathsPatch {
    pub skills_dir: Option<PathBuf>,
    pub migrations_dir: Option<PathBuf>,
    pub template_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LockPatch {
    pub wait_ms: Option<u64>,
    pub poll_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MergePatch {
    pub current_label: Option<String>,
    pub incoming_label: Option<String>,
    pub show_base: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MigrationsPatch {
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct InitPatch {
    pub ignore: Option<Vec<String>>,
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|value| {
        matches!(
            value.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(value) => value.parse::<u64>().map(Some).map_err(|err| {
            GraftError::Config(format!("invalid {key} value {value}: {err}"))
        }),
        Err(_) => Ok(None),
    }
}
