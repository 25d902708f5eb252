use graft::GraftError;
use graft::engine::uninstall_skill;
use graft::error::ValidationError;

use super::fixture::{APP_PY, COMPOSE, ENV, PACKAGE_JSON, TestFixture, app_with};

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

#[test]
fn test_uninstall_deletes_created_and_restores_modified() {
    let fixture = TestFixture::new();
    fixture.init();
    add_greeter(&fixture);
    fixture.apply("greeter").unwrap();

    let report = uninstall_skill(&fixture.project, "greeter").unwrap();

    assert_eq!(report.deleted, vec!["greeter.py"]);
    assert_eq!(report.restored, vec!["app.py"]);
    assert!(report.warnings.is_empty());
    assert!(!fixture.exists("greeter.py"));
    assert_eq!(fixture.read("app.py"), APP_PY);
    assert!(fixture.applied_names().is_empty());
    assert!(!fixture.project.preimage_dir().join("greeter").exists());

    let base = std::fs::read_to_string(fixture.project.base_dir().join("app.py")).unwrap();
    assert_eq!(base, APP_PY);
}

#[test]
fn test_uninstall_restores_structured_files() {
    let fixture = TestFixture::new();
    fixture.init();
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
  - kind: env
    file: .env
    keys: [REDIS_URL]
"#,
        &[],
    );
    fixture.apply("redis").unwrap();
    assert_ne!(fixture.read("package.json"), PACKAGE_JSON);

    uninstall_skill(&fixture.project, "redis").unwrap();

    assert_eq!(fixture.read("package.json"), PACKAGE_JSON);
    assert_eq!(fixture.read("docker-compose.yml"), COMPOSE);
    assert_eq!(fixture.read(".env"), ENV);
}

#[test]
fn test_shared_file_blocks_uninstall() {
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
    let before = fixture.tree();

    let err = uninstall_skill(&fixture.project, "greeter").unwrap_err();
    assert_eq!(err.code(), "shared_file_conflict");
    match err {
        GraftError::SharedFile { skill, file, others } => {
            assert_eq!(skill, "greeter");
            assert_eq!(file, std::path::PathBuf::from("app.py"));
            assert_eq!(others, vec!["farewell"]);
        }
        other => panic!("unexpected error {other:?}"),
    }

    assert_eq!(fixture.tree(), before);
    assert!(fixture.exists("greeter.py"));
    assert_eq!(fixture.applied_names(), vec!["greeter", "farewell"]);
}

#[test]
fn test_uninstall_warns_when_created_file_was_edited() {
    let fixture = TestFixture::new();
    fixture.init();
    fixture.add_skill(
        "notes",
        "skill: notes\nversion: 1.0.0\nadds: [docs/notes.md]\n",
        &[("add/docs/notes.md", "# Notes\n")],
    );
    fixture.apply("notes").unwrap();
    fixture.write("docs/notes.md", "# Notes\n\nlocal edits\n");

    let report = uninstall_skill(&fixture.project, "notes").unwrap();

    assert_eq!(report.deleted, vec!["docs/notes.md"]);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("docs/notes.md"));
    assert!(!fixture.exists("docs/notes.md"));
    assert!(!fixture.exists("docs"));
}

#[test]
fn test_uninstall_unknown_skill() {
    let fixture = TestFixture::new();
    fixture.init();

    let err = uninstall_skill(&fixture.project, "ghost").unwrap_err();
    assert!(matches!(
        err,
        GraftError::Validation(ValidationError::SkillNotApplied(ref name)) if name == "ghost"
    ));
}

#[test]
fn test_uninstall_warns_about_edits_made_before_apply() {
    let fixture = TestFixture::new();
    fixture.init();
    add_greeter(&fixture);
    fixture.write("app.py", &format!("{APP_PY}# mine\n"));
    fixture.apply("greeter").unwrap();
    assert!(fixture.read("app.py").ends_with("# mine\n"));
    let record = fixture.state().find("greeter").unwrap().file("app.py").cloned().unwrap();
    assert!(record.local_sha256.is_some());

    let report = uninstall_skill(&fixture.project, "greeter").unwrap();

    assert_eq!(report.restored, vec!["app.py"]);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("app.py"));
    assert!(report.warnings[0].contains("local edits"));
    assert_eq!(fixture.read("app.py"), APP_PY);
}
