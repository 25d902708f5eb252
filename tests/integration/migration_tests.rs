#![cfg(unix)]

use std::path::Path;
use std::time::Duration;

use graft::config::Config;
use graft::migrations::run_migrations;
use graft::project::Project;

use super::fixture::write_file;

const RECORD: &str = "echo \"$GRAFT_MIGRATION_VERSION $1\" >> \"$GRAFT_PROJECT_ROOT/migrated.log\"\n";

fn project_with(scripts: &[(&str, &str)], config: Config) -> (tempfile::TempDir, Project) {
    let dir = tempfile::tempdir().unwrap();
    let project = Project::new(dir.path(), config);
    for (version, body) in scripts {
        write_file(
            &project.migrations_dir().join(version).join("migrate.sh"),
            body,
        );
    }
    (dir, project)
}

fn log(root: &Path) -> Option<String> {
    std::fs::read_to_string(root.join("migrated.log")).ok()
}

#[test]
fn test_runs_window_in_version_order() {
    let (_dir, project) = project_with(
        &[
            ("1.0.0", RECORD),
            ("1.10.0", RECORD),
            ("1.2.0", RECORD),
            ("2.0.0", RECORD),
        ],
        Config::default(),
    );

    let report = run_migrations(&project, "1.0.0", "1.10.0", Path::new("/srv/new")).unwrap();

    assert!(report.success());
    assert_eq!(report.count, 2);
    let versions: Vec<&str> = report.results.iter().map(|r| r.version.as_str()).collect();
    assert_eq!(versions, vec!["1.2.0", "1.10.0"]);
    assert_eq!(
        log(project.root()).as_deref(),
        Some("1.2.0 /srv/new\n1.10.0 /srv/new\n")
    );
}

#[test]
fn test_first_failure_stops_the_run() {
    let (_dir, project) = project_with(
        &[
            ("1.1.0", RECORD),
            ("1.2.0", "echo 'cannot rewrite config' >&2\nexit 3\n"),
            ("1.3.0", RECORD),
        ],
        Config::default(),
    );

    let report = run_migrations(&project, "1.0.0", "2.0.0", Path::new("/srv/new")).unwrap();

    assert!(!report.success());
    assert_eq!(report.count, 3);
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.completed(), 1);
    assert_eq!(report.skipped, vec!["1.3.0"]);
    assert!(report.results[0].success);
    let failed = &report.results[1];
    assert_eq!(failed.version, "1.2.0");
    assert!(!failed.success);
    assert!(failed.error.as_deref().unwrap().contains("cannot rewrite config"));
    assert_eq!(log(project.root()).as_deref(), Some("1.1.0 /srv/new\n"));
}

#[test]
fn test_slow_migration_times_out() {
    let mut config = Config::default();
    config.migrations.timeout = Duration::from_millis(200);
    let (_dir, project) = project_with(&[("1.1.0", "sleep 10\n")], config);

    let started = std::time::Instant::now();
    let report = run_migrations(&project, "1.0.0", "1.1.0", Path::new("/srv/new")).unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!report.success());
    assert!(report.results[0].error.as_deref().unwrap().contains("timed out"));
}

#[test]
fn test_nothing_to_run_without_migrations_dir() {
    let (_dir, project) = project_with(&[], Config::default());

    let report = run_migrations(&project, "1.0.0", "2.0.0", Path::new("/srv/new")).unwrap();

    assert!(report.success());
    assert_eq!(report.count, 0);
}

#[test]
fn test_invalid_version_argument() {
    let (_dir, project) = project_with(&[], Config::default());

    let err = run_migrations(&project, "latest", "2.0.0", Path::new("/srv/new")).unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("latest"));
}
