//! Test: Fail Fast - the first failing step ends its job

use crate::helpers::*;
use workflow_runner::core::{Event, JobFailure, JobStatus, StepResult};

/// `cargo test` exiting 101 fails the job and the remaining steps never run
#[tokio::test]
async fn test_failing_step_stops_job() {
    let workflow = workflow_from_yaml(TESTS_WORKFLOW);
    let provisioner = FakeProvisioner::new().fail_with("cargo test", 101);
    let result = run_workflow_with_fake(&workflow, Event::push("refs/heads/main"), provisioner)
        .await
        .unwrap();

    assert_run_failed(&result);
    assert_job_status(&result, "run_tests", JobStatus::Failed);

    assert_execution_order(
        &result,
        "run_tests",
        &["actions/checkout@v2", "actions-rs/toolchain@v1", "cargo test"],
    );
    assert_eq!(
        result.skipped_steps("run_tests"),
        vec!["Test all features", "Run example 1", "Run example 2"]
    );

    let steps = result.step_results("run_tests");
    assert_eq!(steps.len(), 3);
    assert!(matches!(
        steps[2],
        StepResult::Failure {
            exit_code: Some(101),
            ..
        }
    ));
    assert_eq!(
        result.job("run_tests").failure,
        Some(JobFailure::Step {
            index: 2,
            name: "Test".to_string(),
            exit_code: Some(101),
        })
    );
    assert_eq!(result.provisioner.teardowns(), 1);
}

/// A failure in the first step stops everything after it
#[tokio::test]
async fn test_first_step_failure() {
    let workflow = workflow_from_yaml(TESTS_WORKFLOW);
    let provisioner = FakeProvisioner::new().fail_with("actions/checkout@v2", 128);
    let result = run_workflow_with_fake(&workflow, Event::push("refs/heads/main"), provisioner)
        .await
        .unwrap();

    assert_run_failed(&result);
    assert_execution_order(&result, "run_tests", &["actions/checkout@v2"]);
    assert_eq!(result.skipped_steps("run_tests").len(), 5);
}

/// A step that never finishes is failed by its timeout
#[tokio::test]
async fn test_hanging_step_times_out() {
    let workflow = workflow_from_yaml(
        r#"
name: hang
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: ./configure
      - run: make
      - run: make install
"#,
    );
    let provisioner = FakeProvisioner::new().hang("make");
    let result = run_workflow_with_fake(&workflow, Event::push("refs/heads/main"), provisioner)
        .await
        .unwrap();

    assert_run_failed(&result);
    let steps = result.step_results("build");
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[1].exit_code(), None);
    assert!(steps[1].output().contains("timed out"));
    assert_eq!(result.skipped_steps("build"), vec!["Run make install"]);
    assert_eq!(result.provisioner.teardowns(), 1);
}
