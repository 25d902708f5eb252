use std::path::PathBuf;

use graft::config::Config;
use graft::engine::{ApplyOptions, apply_skill, init_project, replay};
use graft::project::Project;
use graft::skill::SkillBundle;

use super::fixture::{APP_PY, PACKAGE_JSON, TestFixture, app_with, write_file};

fn add_greeter(fixture: &TestFixture) {
    fixture.add_skill(
        "greeter",
        "skill: greeter\nversion: 1.0.0\nadds: [greeter.py]\nmodifies: [app.py]\n",
        &[
            ("add/greeter.py", "def hi():\n    return \"hi\"\n"),
            ("modify/app.py", app_with("import os\n", "import os\nimport greeter\n").as_str()),
        ],
    );
}

fn add_redis(fixture: &TestFixture) {
    fixture.add_skill(
        "redis",
        r#"skill: redis
version: 0.3.0
structured:
  - kind: dependencies
    file: package.json
    entries:
      redis: ^4.6.0
"#,
        &[],
    );
}

const APP_V2_WITH_GREETER: &str = "import os
import greeter

def main():
    print(\"hello v2\")

if __name__ == \"__main__\":
    main()
";

#[test]
fn test_replay_carries_skills_onto_new_template() {
    let fixture = TestFixture::new();
    fixture.init();
    add_greeter(&fixture);
    add_redis(&fixture);
    fixture.apply("greeter").unwrap();
    fixture.apply("redis").unwrap();
    let recorded_at = fixture.state().find("greeter").unwrap().applied_at;

    fixture.write_template(
        "app.py",
        &app_with("print(\"hello\")", "print(\"hello v2\")"),
    );
    let report = replay(&fixture.project, None).unwrap();

    assert!(report.succeeded());
    assert_eq!(report.applied, vec!["greeter", "redis"]);
    assert_eq!(report.template, fixture.template_dir());
    assert_eq!(fixture.read("app.py"), APP_V2_WITH_GREETER);
    assert!(fixture.exists("greeter.py"));

    let package: serde_json::Value = serde_json::from_str(&fixture.read("package.json")).unwrap();
    assert_eq!(package["dependencies"]["redis"], "^4.6.0");
    assert_eq!(package["dependencies"]["express"], "^4.18.0");

    let state = fixture.state();
    assert_eq!(fixture.applied_names(), vec!["greeter", "redis"]);
    assert_eq!(state.find("greeter").unwrap().applied_at, recorded_at);
    assert!(state.find("greeter").unwrap().bundle.is_none());
    assert!(!fixture.project.backup_dir().exists());
}

#[test]
fn test_replay_twice_gives_the_same_tree() {
    let fixture = TestFixture::new();
    fixture.init();
    add_greeter(&fixture);
    add_redis(&fixture);
    fixture.apply("greeter").unwrap();
    fixture.apply("redis").unwrap();

    replay(&fixture.project, None).unwrap();
    let first = fixture.tree();
    replay(&fixture.project, None).unwrap();

    assert_eq!(fixture.tree(), first);
}

#[test]
fn test_replay_discards_user_edits_outside_skills() {
    let fixture = TestFixture::new();
    fixture.init();
    add_greeter(&fixture);
    fixture.apply("greeter").unwrap();
    fixture.write("package.json", "{}\n");

    replay(&fixture.project, None).unwrap();

    assert_eq!(fixture.read("package.json"), PACKAGE_JSON);
    assert_eq!(fixture.read("app.py"), app_with("import os\n", "import os\nimport greeter\n"));
}

#[test]
fn test_replay_stops_at_first_conflicting_skill() {
    let fixture = TestFixture::new();
    fixture.init();
    add_greeter(&fixture);
    add_redis(&fixture);
    fixture.add_skill(
        "shouter",
        "skill: shouter\nversion: 1.0.0\nadds: [shout.py]\nmodifies: [app.py]\n",
        &[
            ("add/shout.py", "LOUD = True\n"),
            ("modify/app.py", app_with("print(\"hello\")", "print(\"HELLO\")").as_str()),
        ],
    );
    fixture.apply("greeter").unwrap();
    fixture.apply("shouter").unwrap();
    fixture.apply("redis").unwrap();

    fixture.write_template(
        "app.py",
        &app_with("print(\"hello\")", "print(\"hello v2\")"),
    );
    let report = replay(&fixture.project, None).unwrap();

    assert!(!report.succeeded());
    assert_eq!(report.applied, vec!["greeter"]);
    let failed = report.failed.as_ref().unwrap();
    assert_eq!(failed.skill, "shouter");
    assert_eq!(failed.code, "merge_conflict");
    assert_eq!(report.skipped, vec!["redis"]);

    assert_eq!(fixture.applied_names(), vec!["greeter"]);
    assert_eq!(fixture.read("app.py"), APP_V2_WITH_GREETER);
    assert!(!fixture.exists("shout.py"));
    assert_eq!(fixture.read("package.json"), PACKAGE_JSON);
    assert!(!fixture.project.lock_path().exists());
}

#[test]
fn test_replay_drops_files_removed_from_template() {
    let fixture = TestFixture::new();
    fixture.write_template("legacy.cfg", "old = true\n");
    fixture.write("legacy.cfg", "old = true\n");
    fixture.init();
    assert!(fixture.state().template.unwrap().files.contains(&"legacy.cfg".to_string()));

    std::fs::remove_file(fixture.template_dir().join("legacy.cfg")).unwrap();
    replay(&fixture.project, None).unwrap();

    assert!(!fixture.exists("legacy.cfg"));
    assert!(!fixture.project.base_dir().join("legacy.cfg").exists());
    assert_eq!(fixture.read("app.py"), APP_PY);
}

#[test]
fn test_replay_without_template_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("app.py"), APP_PY);
    let project = Project::new(dir.path(), Config::default());
    init_project(&project, None).unwrap();

    let err = replay(&project, None).unwrap_err();
    assert_eq!(err.code(), "config_error");
    assert_eq!(std::fs::read_to_string(dir.path().join("app.py")).unwrap(), APP_PY);
}

/// A bundle kept outside the project's skills dir.
fn external_bundle(fixture: &TestFixture) -> PathBuf {
    let dir = fixture.template_dir().parent().unwrap().join("vendor/ext");
    write_file(
        &dir.join("manifest.yaml"),
        "skill: ext\nversion: 1.0.0\nadds: [ext.txt]\n",
    );
    write_file(&dir.join("add/ext.txt"), "external\n");
    dir
}

fn apply_external(fixture: &TestFixture, dir: &std::path::Path) {
    let bundle = SkillBundle::locate(&fixture.project.skills_dir(), "ext", Some(dir)).unwrap();
    apply_skill(&fixture.project, &bundle, &ApplyOptions::default()).unwrap();
}

#[test]
fn test_replay_reuses_bundle_given_at_apply() {
    let fixture = TestFixture::new();
    fixture.init();
    let dir = external_bundle(&fixture);
    apply_external(&fixture, &dir);
    assert_eq!(
        fixture.state().find("ext").unwrap().bundle.as_deref(),
        Some(dir.as_path())
    );

    let report = replay(&fixture.project, None).unwrap();

    assert!(report.succeeded());
    assert_eq!(report.applied, vec!["ext"]);
    assert_eq!(fixture.read("ext.txt"), "external\n");
}

#[test]
fn test_replay_with_missing_bundle_changes_nothing() {
    let fixture = TestFixture::new();
    fixture.init();
    add_greeter(&fixture);
    fixture.apply("greeter").unwrap();
    let dir = external_bundle(&fixture);
    apply_external(&fixture, &dir);
    std::fs::remove_dir_all(&dir).unwrap();
    fixture.write_template("app.py", &app_with("print(\"hello\")", "print(\"hello v2\")"));
    let before = fixture.tree();

    let err = replay(&fixture.project, None).unwrap_err();

    assert_eq!(err.code(), "skill_not_found");
    assert_eq!(fixture.tree(), before);
    assert_eq!(fixture.applied_names(), vec!["greeter", "ext"]);
    assert!(!fixture.project.lock_path().exists());
}

#[cfg(unix)]
#[test]
fn test_replay_takes_file_modes_from_template() {
    use super::fixture::{mode, set_mode};

    let fixture = TestFixture::new();
    fixture.write_template("run.sh", "#!/bin/sh\n");
    fixture.write("run.sh", "#!/bin/sh\n");
    fixture.init();
    set_mode(&fixture.root().join("run.sh"), 0o644);
    set_mode(&fixture.template_dir().join("run.sh"), 0o755);

    replay(&fixture.project, None).unwrap();

    assert_eq!(mode(&fixture.root().join("run.sh")), 0o755);
}
