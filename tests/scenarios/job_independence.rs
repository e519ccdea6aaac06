//! Test: Job Independence - sibling jobs never affect each other

use crate::helpers::*;
use workflow_runner::core::{Event, JobStatus};
use workflow_runner::execution::SchedulingStrategy;

const THREE_JOBS: &str = r#"
name: ci
on: push
jobs:
  fmt:
    runs-on: ubuntu-latest
    steps:
      - run: cargo fmt --check
  test:
    runs-on: ubuntu-latest
    steps:
      - run: cargo test
      - run: cargo test --doc
  clippy:
    runs-on: ubuntu-latest
    steps:
      - run: cargo clippy
"#;

async fn check_independence(strategy: SchedulingStrategy) {
    let workflow = workflow_from_yaml(THREE_JOBS);
    let provisioner = FakeProvisioner::new().fail_with("cargo fmt --check", 1);
    let result = run_workflow_with_strategy(&workflow, Event::push("refs/heads/main"), provisioner, strategy)
        .await
        .unwrap();

    assert_run_failed(&result);
    assert_job_status(&result, "fmt", JobStatus::Failed);
    assert_job_status(&result, "test", JobStatus::Succeeded);
    assert_job_status(&result, "clippy", JobStatus::Succeeded);
    assert_execution_order(&result, "test", &["cargo test", "cargo test --doc"]);
    assert_eq!(result.run.failed_jobs(), vec!["fmt"]);
    assert_eq!(result.provisioner.teardowns(), 3);
}

#[tokio::test]
async fn test_independence_sequential() {
    check_independence(SchedulingStrategy::Sequential).await;
}

#[tokio::test]
async fn test_independence_parallel() {
    check_independence(SchedulingStrategy::Parallel).await;
}

#[tokio::test]
async fn test_independence_limited_parallel() {
    check_independence(SchedulingStrategy::LimitedParallel(2)).await;
}

/// Jobs are recorded in declaration order whatever order they finish in
#[tokio::test]
async fn test_job_order_preserved() {
    let workflow = workflow_from_yaml(THREE_JOBS);
    let result = run_workflow_with_strategy(
        &workflow,
        Event::push("refs/heads/main"),
        FakeProvisioner::new(),
        SchedulingStrategy::Parallel,
    )
    .await
    .unwrap();

    assert_run_succeeded(&result);
    assert_eq!(result.run.jobs.keys().collect::<Vec<_>>(), vec!["fmt", "test", "clippy"]);
}
