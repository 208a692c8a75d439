use anyhow::Result;
use yakka_cli::project::{BuildRequest, Project};
use yakka_cli::test_utils::TestWorkspace;

const HELLO: &str = r#"
message: Hello
blueprints:
  "{{project_output}}/greeting.txt":
    depends:
      - "{{curdir()}}/name.txt"
      - data: ":/hello/message"
    process:
      - cat: "{{curdir()}}/name.txt"
      - inja: "{{components.hello.message}} {{captured_output}}"
      - save:
  "{{project_output}}/shout.txt":
    depends:
      - "{{project_output}}/greeting.txt"
    process:
      - cat: "{{project_output}}/greeting.txt"
      - regex:
          search: "[a-z]+$"
          replace: "WORLD"
      - save:
"#;

fn setup() -> (TestWorkspace, Project) {
    let workspace = TestWorkspace::new();
    workspace.write_component("hello", HELLO);
    workspace.write_file("components/hello/name.txt", "world");
    let project = Project::with_config(workspace.config()).unwrap();
    (workspace, project)
}

fn request(project: &Project, targets: &[&str]) -> BuildRequest {
    let output = project.project_output("hello");
    BuildRequest {
        components: vec!["hello".to_string()],
        targets: targets.iter().map(|t| output.join(t).display().to_string()).collect(),
        max_jobs: Some(2),
        ..BuildRequest::default()
    }
}

#[tokio::test]
async fn test_first_build_then_nothing_to_do() -> Result<()> {
    let (workspace, mut project) = setup();
    let request = request(&project, &["shout.txt"]);

    let first = project.build(&request).await?;
    assert_eq!(first.project_name, "hello");
    assert_eq!(first.report.executed.len(), 2);
    assert!(first.report.executed[0].ends_with("greeting.txt"));
    assert!(first.report.executed[1].ends_with("shout.txt"));
    assert_eq!(workspace.read_file("output/hello/greeting.txt"), "Hello world");
    assert_eq!(workspace.read_file("output/hello/shout.txt"), "Hello WORLD");
    assert!(first.summary_path.exists());

    let second = project.build(&request).await?;
    assert!(second.report.executed.is_empty(), "{:?}", second.report.executed);
    assert_eq!(second.report.up_to_date.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_touched_source_rebuilds_transitively() -> Result<()> {
    let (workspace, mut project) = setup();
    let request = request(&project, &["shout.txt"]);
    project.build(&request).await?;

    workspace.write_file("components/hello/name.txt", "there");
    workspace.touch_future("components/hello/name.txt", 5);

    let rebuilt = project.build(&request).await?;
    assert_eq!(rebuilt.report.executed.len(), 2);
    assert_eq!(workspace.read_file("output/hello/shout.txt"), "Hello WORLD");
    assert_eq!(workspace.read_file("output/hello/greeting.txt"), "Hello there");
    Ok(())
}

#[tokio::test]
async fn test_changed_data_rebuilds_despite_fresh_files() -> Result<()> {
    let (workspace, mut project) = setup();
    let request = request(&project, &["greeting.txt"]);
    project.build(&request).await?;

    workspace.write_component("hello", &HELLO.replace("message: Hello", "message: Howdy"));
    workspace.touch_future("components/hello/hello.yakka", 5);

    let rebuilt = project.build(&request).await?;
    assert_eq!(rebuilt.report.executed.len(), 1);
    assert_eq!(workspace.read_file("output/hello/greeting.txt"), "Howdy world");

    let again = project.build(&request).await?;
    assert!(again.report.executed.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_build_keeps_previous_summary() -> Result<()> {
    let workspace = TestWorkspace::new();
    workspace.write_component(
        "broken",
        "blueprints:\n  out.txt:\n    process:\n      - cat: \"{{curdir()}}/missing.txt\"\n",
    );
    let mut project = Project::with_config(workspace.config())?;
    let request = BuildRequest {
        components: vec!["broken".to_string()],
        targets: vec!["out.txt".to_string()],
        ..BuildRequest::default()
    };

    let error = project.build(&request).await.unwrap_err();
    assert!(error.to_string().contains("Build failed"), "{error}");
    assert!(!project.project_output("broken").join("yakka_summary.json").exists());
    Ok(())
}
