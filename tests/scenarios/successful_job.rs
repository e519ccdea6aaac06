//! Test: Successful Job - every step succeeds

use crate::helpers::*;
use workflow_runner::core::{Event, JobStatus};

/// Six succeeding steps give a succeeded job with six successful results
#[tokio::test]
async fn test_all_steps_succeed() {
    let workflow = workflow_from_yaml(TESTS_WORKFLOW);
    let result = run_workflow_with_fake(&workflow, Event::push("refs/heads/main"), FakeProvisioner::new())
        .await
        .unwrap();

    assert_run_succeeded(&result);
    assert_job_status(&result, "run_tests", JobStatus::Succeeded);

    let steps = result.step_results("run_tests");
    assert_eq!(steps.len(), 6);
    assert!(steps.iter().all(|s| s.is_success()), "{:?}", steps);

    assert_execution_order(
        &result,
        "run_tests",
        &[
            "actions/checkout@v2",
            "actions-rs/toolchain@v1",
            "cargo test",
            "cargo test --all-features",
            "cargo run --example tiny_map",
            "cargo run --example tiny_set",
        ],
    );
    assert_eq!(
        result.executed_steps("run_tests"),
        vec![
            "actions/checkout@v2",
            "Install toolchain",
            "Test",
            "Test all features",
            "Run example 1",
            "Run example 2",
        ]
    );
    assert!(result.skipped_steps("run_tests").is_empty());
}

/// The environment is released once the job is done
#[tokio::test]
async fn test_environment_released() {
    let workflow = workflow_from_yaml(TESTS_WORKFLOW);
    let provisioner = FakeProvisioner::new();
    run_workflow_with_fake(&workflow, Event::push("refs/heads/main"), provisioner.clone())
        .await
        .unwrap();

    assert_eq!(provisioner.provisioned(), 1);
    assert_eq!(provisioner.teardowns(), 1);
}
