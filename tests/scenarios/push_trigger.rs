//! Test: Push Trigger - a push event creates exactly one run

use crate::helpers::*;
use std::sync::Arc;
use workflow_runner::core::{Event, RunStatus};
use workflow_runner::execution::{evaluate, ExecutionEngine, ExecutionEvent, SchedulingStrategy};

/// A push to a workflow with a push trigger creates one pending run that starts running
#[tokio::test]
async fn test_push_creates_run() {
    let workflow = workflow_from_yaml(TESTS_WORKFLOW);
    let engine = ExecutionEngine::new(Arc::new(FakeProvisioner::new()), SchedulingStrategy::Sequential);

    let mut run = engine
        .trigger(&workflow, Event::push("refs/heads/main"))
        .expect("push should trigger the workflow");
    assert_eq!(run.status, RunStatus::Pending);
    assert_eq!(run.workflow_name, "tests");
    assert_eq!(run.jobs.keys().collect::<Vec<_>>(), vec!["run_tests"]);

    run.start();
    assert_eq!(run.status, RunStatus::Running);
    assert!(run.started_at.is_some());
}

/// The run passes through Running before settling
#[tokio::test]
async fn test_run_started_before_jobs() {
    let workflow = workflow_from_yaml(TESTS_WORKFLOW);
    let result = run_workflow_with_fake(&workflow, Event::push("refs/heads/main"), FakeProvisioner::new())
        .await
        .expect("push should trigger the workflow");

    assert!(matches!(result.events.first(), Some(ExecutionEvent::RunStarted { .. })));
    assert!(matches!(
        result.events.last(),
        Some(ExecutionEvent::RunFinished {
            status: RunStatus::Succeeded,
            ..
        })
    ));
    let started = result.run.started_at.expect("run should have started");
    let completed = result.run.completed_at.expect("run should have completed");
    assert!(started <= completed);
}

/// Delivering the same event twice yields two independent runs
#[tokio::test]
async fn test_same_event_twice_gives_two_runs() {
    let workflow = workflow_from_yaml(TESTS_WORKFLOW);
    let event = Event::push("refs/heads/main");

    let first = run_workflow_with_fake(&workflow, event.clone(), FakeProvisioner::new())
        .await
        .unwrap();
    let second = run_workflow_with_fake(&workflow, event.clone(), FakeProvisioner::new().fail_with("cargo test", 101))
        .await
        .unwrap();

    assert_ne!(first.run.id, second.run.id);
    assert_run_succeeded(&first);
    assert_run_failed(&second);

    // evaluation is pure
    assert_eq!(evaluate(&workflow, &event), evaluate(&workflow, &event));
}

/// Push triggers restricted to branches ignore other branches
#[tokio::test]
async fn test_branch_filter() {
    let workflow = workflow_from_yaml(
        r#"
name: release
on:
  push:
    branches: [main, 'release/**']
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: cargo build --release
"#,
    );

    assert!(run_workflow_with_fake(&workflow, Event::push("refs/heads/release/1.2"), FakeProvisioner::new())
        .await
        .is_some());

    let provisioner = FakeProvisioner::new();
    assert!(run_workflow_with_fake(&workflow, Event::push("refs/heads/feature"), provisioner.clone())
        .await
        .is_none());
    assert_eq!(provisioner.provisioned(), 0);
}
