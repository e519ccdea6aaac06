//! Test: Environment Errors - provisioning failures are not step failures

use crate::helpers::*;
use workflow_runner::core::{Event, JobFailure, JobStatus};

const MULTI_RUNNER: &str = r#"
name: matrix
on: push
jobs:
  linux:
    runs-on: ubuntu-latest
    steps:
      - run: cargo test
  gpu:
    runs-on: [self-hosted, gpu]
    steps:
      - run: cargo test --features cuda
"#;

/// A job whose environment cannot be provisioned fails without running steps
#[tokio::test]
async fn test_unavailable_runner_fails_job() {
    let workflow = workflow_from_yaml(MULTI_RUNNER);
    let provisioner = FakeProvisioner::new().reject_label("gpu");
    let result = run_workflow_with_fake(&workflow, Event::push("refs/heads/main"), provisioner)
        .await
        .unwrap();

    assert_run_failed(&result);
    assert_job_status(&result, "gpu", JobStatus::Failed);
    assert!(result.executed_steps("gpu").is_empty());
    match &result.job("gpu").failure {
        Some(JobFailure::Environment { message }) => assert!(message.contains("gpu"), "{}", message),
        other => panic!("expected an environment failure, got {:?}", other),
    }

    // the sibling job is unaffected
    assert_job_status(&result, "linux", JobStatus::Succeeded);
    assert_eq!(result.provisioner.provisioned(), 1);
    assert_eq!(result.provisioner.teardowns(), 1);
}
