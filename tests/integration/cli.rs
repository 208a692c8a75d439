use assert_cmd::Command;
use predicates::prelude::*;
use yakka_cli::test_utils::TestWorkspace;

fn yakka(workspace: &TestWorkspace) -> Command {
    let mut cmd = Command::cargo_bin("yakka").unwrap();
    cmd.arg("-C").arg(workspace.path()).arg("--no-progress");
    cmd
}

#[test]
fn test_list_shows_components() {
    let workspace = TestWorkspace::new();
    workspace.write_component("gcc", "provides:\n  features: [c]\n");
    workspace.write_component("lwip", "requires:\n  components: [gcc]\n");

    yakka(&workspace)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("gcc").and(predicate::str::contains("lwip")));
}

#[test]
fn test_list_json() {
    let workspace = TestWorkspace::new();
    workspace.write_component("gcc", "{}\n");

    let output = yakka(&workspace).args(["list", "--json"]).output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(value["components"]["gcc"].as_str().unwrap().ends_with("gcc.yakka"));
}

#[test]
fn test_build_without_targets_writes_summary() {
    let workspace = TestWorkspace::new();
    workspace.write_component("app", "requires:\n  features: [debug]\n");

    yakka(&workspace)
        .args(["build", "app", "+debug", "--no-fetch"])
        .assert()
        .success()
        .stdout(predicate::str::contains("app-debug"));

    let summary: serde_json::Value =
        serde_json::from_str(&workspace.read_file("output/app-debug/yakka_summary.json")).unwrap();
    assert_eq!(summary["project_name"], "app-debug");
    assert!(summary["components"].get("app").is_some());
}

#[test]
fn test_unknown_component_fails() {
    let workspace = TestWorkspace::new();

    yakka(&workspace)
        .args(["build", "nowhere", "--no-fetch"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("nowhere"));
}
