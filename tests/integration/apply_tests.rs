use std::collections::BTreeMap;
use std::path::PathBuf;

use graft::GraftError;
use graft::engine::ApplyOptions;
use graft::error::{MergeConflict, ValidationError};
use graft::storage::{FileKind, ProjectLock};
use serde_json::Value;

use super::fixture::{APP_PY, COMPOSE, PACKAGE_JSON, TestFixture, app_with};

const GREETER: &str = "skill: greeter
version: 1.0.0
description: Adds a greeting helper
adds:
  - greeter.py
modifies:
  - app.py
";

fn add_greeter(fixture: &TestFixture) {
    fixture.add_skill(
        "greeter",
        GREETER,
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
  - kind: services
    file: docker-compose.yml
    services:
      redis:
        image: redis:7
        ports:
          - "6379:6379"
  - kind: env
    file: .env
    keys:
      - REDIS_URL=redis://localhost:6379
"#,
        &[],
    );
}

#[test]
fn test_apply_merges_user_edits_with_skill_changes() {
    let fixture = TestFixture::new();
    fixture.init();
    add_greeter(&fixture);
    fixture.write("app.py", &app_with("print(\"hello\")", "print(\"hello, world\")"));

    let report = fixture.apply("greeter").unwrap();

    let expected = "import os
import greeter

def main():
    print(\"hello, world\")

if __name__ == \"__main__\":
    main()
";
    assert_eq!(fixture.read("app.py"), expected);
    assert_eq!(fixture.read("greeter.py"), "def hi():\n    return \"hi\"\n");
    assert!(!report.reapplied);

    let kinds: Vec<(String, FileKind)> = report
        .files
        .iter()
        .map(|record| (record.path.clone(), record.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("app.py".to_string(), FileKind::Modified),
            ("greeter.py".to_string(), FileKind::Added),
        ]
    );

    let base = std::fs::read_to_string(fixture.project.base_dir().join("app.py")).unwrap();
    assert_eq!(base, expected);

    let state = fixture.state();
    let entry = state.find("greeter").unwrap();
    assert_eq!(entry.version, "1.0.0");
    assert_eq!(entry.files.len(), 2);
}

#[test]
fn test_second_apply_rejected_without_reapply() {
    let fixture = TestFixture::new();
    fixture.init();
    add_greeter(&fixture);
    fixture.apply("greeter").unwrap();
    let before = fixture.tree();

    let err = fixture.apply("greeter").unwrap_err();
    assert!(err.is_validation());
    assert!(matches!(
        err,
        GraftError::Validation(ValidationError::AlreadyApplied(ref name)) if name == "greeter"
    ));
    assert_eq!(fixture.tree(), before);
    assert_eq!(fixture.applied_names(), vec!["greeter"]);
}

#[test]
fn test_text_conflict_rolls_back_everything() {
    let fixture = TestFixture::new();
    fixture.init();
    fixture.add_skill(
        "shouter",
        "skill: shouter\nversion: 1.0.0\nadds: [shout.py]\nmodifies: [app.py]\n",
        &[
            ("add/shout.py", "LOUD = True\n"),
            ("modify/app.py", app_with("print(\"hello\")", "print(\"HELLO\")").as_str()),
        ],
    );
    fixture.write("app.py", &app_with("print(\"hello\")", "print(\"hi\")"));
    let before = fixture.tree();

    let err = fixture.apply("shouter").unwrap_err();
    assert_eq!(err.code(), "merge_conflict");
    match err {
        GraftError::Conflict(MergeConflict::Text { file, hunks }) => {
            assert_eq!(file, PathBuf::from("app.py"));
            assert_eq!(hunks.len(), 1);
            assert!(hunks[0].current.contains("print(\"hi\")"));
            assert!(hunks[0].incoming.contains("print(\"HELLO\")"));
        }
        other => panic!("unexpected error {other:?}"),
    }

    assert_eq!(fixture.tree(), before);
    assert!(!fixture.exists("shout.py"));
    assert!(fixture.applied_names().is_empty());
    assert!(!fixture.project.backup_dir().exists());
    assert!(!fixture.project.lock_path().exists());
    let base = std::fs::read_to_string(fixture.project.base_dir().join("app.py")).unwrap();
    assert_eq!(base, APP_PY);
}

#[test]
fn test_structured_merges_manifest_services_and_env() {
    let fixture = TestFixture::new();
    fixture.init();
    add_redis(&fixture);

    let report = fixture.apply("redis").unwrap();
    assert_eq!(report.structured.len(), 3);
    assert!(report.files.iter().all(|record| record.kind == FileKind::Structured));

    let package: Value = serde_json::from_str(&fixture.read("package.json")).unwrap();
    assert_eq!(package["dependencies"]["redis"], "^4.6.0");
    assert_eq!(package["dependencies"]["express"], "^4.18.0");
    assert_eq!(package["name"], "demo");

    let compose: serde_yaml::Value = serde_yaml::from_str(&fixture.read("docker-compose.yml")).unwrap();
    assert!(compose["services"]["web"].is_mapping());
    assert_eq!(compose["services"]["redis"]["image"], "redis:7");

    let env = fixture.read(".env");
    assert!(env.starts_with("PORT=8000\n"));
    assert!(env.contains("REDIS_URL=redis://localhost:6379\n"));
}

#[test]
fn test_port_collision_aborts_apply() {
    let fixture = TestFixture::new();
    fixture.init();
    fixture.add_skill(
        "api",
        r#"skill: api
version: 1.0.0
adds:
  - api/main.py
structured:
  - kind: services
    file: docker-compose.yml
    services:
      api:
        image: demo/api
        ports:
          - "8000:80"
"#,
        &[("add/api/main.py", "app = None\n")],
    );

    let err = fixture.apply("api").unwrap_err();
    assert_eq!(err.code(), "port_collision");
    match err {
        GraftError::Conflict(MergeConflict::PortCollision {
            file,
            port,
            service,
            existing_service,
        }) => {
            assert_eq!(file, PathBuf::from("docker-compose.yml"));
            assert_eq!(port, 8000);
            assert_eq!(service, "api");
            assert_eq!(existing_service, "web");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(fixture.read("docker-compose.yml"), COMPOSE);
    assert!(!fixture.exists("api/main.py"));
    assert!(!fixture.exists("api"));
}

#[test]
fn test_incompatible_dependency_range_aborts_apply() {
    let fixture = TestFixture::new();
    fixture.init();
    fixture.add_skill(
        "express5",
        "skill: express5
version: 1.0.0
structured:
  - kind: dependencies
    file: package.json
    entries:
      express: ^5.0.0
",
        &[],
    );

    let err = fixture.apply("express5").unwrap_err();
    assert_eq!(err.code(), "dependency_conflict");
    assert_eq!(fixture.read("package.json"), PACKAGE_JSON);
}

#[test]
fn test_dependencies_must_be_applied_first() {
    let fixture = TestFixture::new();
    fixture.init();
    add_redis(&fixture);
    fixture.add_skill(
        "worker",
        "skill: worker\nversion: 1.0.0\ndepends: [redis]\nadds: [worker.py]\n",
        &[("add/worker.py", "QUEUE = \"jobs\"\n")],
    );

    let err = fixture.apply("worker").unwrap_err();
    assert!(matches!(
        err,
        GraftError::Validation(ValidationError::MissingDependency { ref dependency, .. })
            if dependency == "redis"
    ));
    assert!(!fixture.exists("worker.py"));

    fixture.apply("redis").unwrap();
    fixture.apply("worker").unwrap();
    assert_eq!(fixture.applied_names(), vec!["redis", "worker"]);
}

#[test]
fn test_params_substituted_and_recorded() {
    let fixture = TestFixture::new();
    fixture.init();
    fixture.add_skill(
        "bot",
        "skill: bot\nversion: 2.1.0\nadds: [bot/config.py]\n",
        &[(
            "add/bot/config.py",
            "NAME = \"{{BOT_NAME}}\"\nTOKEN = \"{{ TOKEN }}\"\n",
        )],
    );

    let options = ApplyOptions {
        params: BTreeMap::from([("BOT_NAME".to_string(), "ada".to_string())]),
        ..ApplyOptions::default()
    };
    fixture.apply_with("bot", options).unwrap();

    assert_eq!(
        fixture.read("bot/config.py"),
        "NAME = \"ada\"\nTOKEN = \"{{ TOKEN }}\"\n"
    );
    let state = fixture.state();
    assert_eq!(
        state.find("bot").unwrap().params.get("BOT_NAME").map(String::as_str),
        Some("ada")
    );
}

#[test]
fn test_reapply_updates_entry_in_place() {
    let fixture = TestFixture::new();
    fixture.init();
    add_greeter(&fixture);
    add_redis(&fixture);
    fixture.apply("greeter").unwrap();
    fixture.apply("redis").unwrap();
    let before = fixture.tree();

    let options = ApplyOptions {
        reapply: true,
        ..ApplyOptions::default()
    };
    let report = fixture.apply_with("greeter", options).unwrap();

    assert!(report.reapplied);
    assert_eq!(fixture.applied_names(), vec!["greeter", "redis"]);
    assert_eq!(fixture.tree(), before);
}

#[test]
fn test_two_skills_modifying_one_file_both_land() {
    let fixture = TestFixture::new();
    fixture.init();
    add_greeter(&fixture);
    fixture.add_skill(
        "farewell",
        "skill: farewell\nversion: 1.0.0\nmodifies: [app.py]\n",
        &[(
            "modify/app.py",
            app_with("    main()\n", "    main()\n    print(\"bye\")\n").as_str(),
        )],
    );

    fixture.apply("greeter").unwrap();
    fixture.apply("farewell").unwrap();

    let expected = "import os
import greeter

def main():
    print(\"hello\")

if __name__ == \"__main__\":
    main()
    print(\"bye\")
";
    assert_eq!(fixture.read("app.py"), expected);
}

#[test]
fn test_adding_a_template_file_is_rejected() {
    let fixture = TestFixture::new();
    fixture.init();
    fixture.add_skill(
        "clobber",
        "skill: clobber\nversion: 1.0.0\nadds: [app.py]\n",
        &[("add/app.py", "print('mine')\n")],
    );

    let err = fixture.apply("clobber").unwrap_err();
    assert!(matches!(
        err,
        GraftError::Validation(ValidationError::TrackedByOtherSkill { ref owner, .. })
            if owner == "template"
    ));
    assert_eq!(fixture.read("app.py"), APP_PY);
}

#[test]
fn test_unknown_structured_target_is_validation_error() {
    let fixture = TestFixture::new();
    fixture.init();
    fixture.add_skill(
        "gems",
        "skill: gems
version: 1.0.0
structured:
  - kind: dependencies
    file: Gemfile
    entries:
      rails: ~7.1.0
",
        &[],
    );

    let err = fixture.apply("gems").unwrap_err();
    assert!(matches!(
        err,
        GraftError::Validation(ValidationError::UnknownMergeTarget { .. })
    ));
    assert!(!fixture.exists("Gemfile"));
}

#[test]
fn test_apply_fails_fast_while_locked() {
    let fixture = TestFixture::new();
    fixture.init();
    add_greeter(&fixture);

    let held = ProjectLock::try_acquire(&fixture.project.lock_path(), "replay").unwrap();
    let err = fixture.apply("greeter").unwrap_err();
    assert_eq!(err.code(), "lock_contention");
    assert!(err.to_string().contains("replay"));
    drop(held);

    fixture.apply("greeter").unwrap();
}

#[cfg(unix)]
#[test]
fn test_file_modes_survive_apply_and_uninstall() {
    use super::fixture::{mode, set_mode};

    let fixture = TestFixture::new();
    let script = "#!/bin/sh\necho run\n";
    fixture.write_template("run.sh", script);
    fixture.write("run.sh", script);
    set_mode(&fixture.root().join("run.sh"), 0o755);
    fixture.init();
    fixture.add_skill(
        "tools",
        "skill: tools\nversion: 1.0.0\nadds: [tool.sh]\nmodifies: [run.sh]\n",
        &[
            ("add/tool.sh", "#!/bin/sh\necho tool\n"),
            ("modify/run.sh", "#!/bin/sh\necho run\n./tool.sh\n"),
        ],
    );
    set_mode(&fixture.project.skills_dir().join("tools/add/tool.sh"), 0o755);

    fixture.apply("tools").unwrap();
    assert_eq!(fixture.read("run.sh"), "#!/bin/sh\necho run\n./tool.sh\n");
    assert_eq!(mode(&fixture.root().join("run.sh")), 0o755);
    assert_eq!(mode(&fixture.root().join("tool.sh")), 0o755);

    graft::engine::uninstall_skill(&fixture.project, "tools").unwrap();
    assert_eq!(fixture.read("run.sh"), script);
    assert_eq!(mode(&fixture.root().join("run.sh")), 0o755);
}

#[cfg(unix)]
#[test]
fn test_failed_apply_leaves_file_mode() {
    use super::fixture::{mode, set_mode};

    let fixture = TestFixture::new();
    fixture.init();
    set_mode(&fixture.root().join("app.py"), 0o750);
    fixture.add_skill(
        "broken",
        "skill: broken\nversion: 1.0.0\nmodifies: [app.py]\nstructured:\n  - kind: dependencies\n    file: package.json\n    entries:\n      express: ^5.0.0\n",
        &[(
            "modify/app.py",
            app_with("import os\n", "import os\nimport sys\n").as_str(),
        )],
    );

    let err = fixture.apply("broken").unwrap_err();
    assert_eq!(err.code(), "dependency_conflict");
    assert_eq!(fixture.read("app.py"), APP_PY);
    assert_eq!(mode(&fixture.root().join("app.py")), 0o750);
}
