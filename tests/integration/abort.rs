#![cfg(unix)]

use serde_json::json;
use serial_test::serial;
use std::sync::Arc;
use yakka_cli::blueprint::{BlueprintDatabase, TargetDatabase};
use yakka_cli::build::{BuildGraph, DataDiff, ExecutionOptions};

#[tokio::test]
#[serial]
async fn test_failure_stops_targets_not_yet_started() {
    yakka_cli::test_utils::init_test_logging(None);
    let summary = Arc::new(json!({
        "components": {
            "app": {
                "directory": "/tmp",
                "blueprints": {
                    "all": {"depends": ["slow", "broken", "late"], "process": [{"echo": "all"}]},
                    "slow": {"process": [{"execute": "sleep 1"}]},
                    "broken": {"process": [{"execute": "exit 2"}]},
                    "late": {"process": [{"execute": "true"}]}
                }
            }
        }
    }));
    let targets = TargetDatabase::new(
        Arc::new(BlueprintDatabase::from_summary(&summary)),
        Arc::clone(&summary),
    );
    let graph = BuildGraph::construct(
        &["all".to_string()],
        &targets,
        &DataDiff::new(None, Arc::clone(&summary)),
    )
    .unwrap();

    let options = ExecutionOptions {
        max_jobs: 2,
        show_progress: false,
    };
    let report = graph.execute(summary, options).await.unwrap();

    assert_eq!(report.executed, vec!["slow"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "broken");
    assert!(report.skipped.contains(&"late".to_string()), "{:?}", report.skipped);
    assert!(report.skipped.contains(&"all".to_string()), "{:?}", report.skipped);
}
