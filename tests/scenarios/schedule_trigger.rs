//! Test: Schedule Trigger - scheduler ticks against `0 6 * * 6`

use crate::helpers::*;
use chrono::{TimeZone, Utc};
use workflow_runner::core::{Event, Trigger};
use workflow_runner::execution::evaluate;

/// A tick that does not match the cron triggers nothing and creates no run
#[tokio::test]
async fn test_non_matching_tick() {
    let workflow = workflow_from_yaml(TESTS_WORKFLOW);

    for at in [
        Utc.with_ymd_and_hms(2026, 10, 16, 6, 0, 0).unwrap(),  // Friday
        Utc.with_ymd_and_hms(2026, 10, 17, 6, 1, 0).unwrap(),  // Saturday 06:01
        Utc.with_ymd_and_hms(2026, 10, 17, 18, 0, 0).unwrap(), // Saturday 18:00
    ] {
        let event = Event::tick(at);
        assert!(evaluate(&workflow, &event).is_none(), "{} should not trigger", at);

        let provisioner = FakeProvisioner::new();
        assert!(run_workflow_with_fake(&workflow, event, provisioner.clone()).await.is_none());
        assert_eq!(provisioner.provisioned(), 0);
    }
}

/// Saturday 06:00 triggers `run_tests` and creates a run
#[tokio::test]
async fn test_saturday_morning_tick() {
    let workflow = workflow_from_yaml(TESTS_WORKFLOW);
    let saturday = Utc.with_ymd_and_hms(2026, 10, 17, 6, 0, 0).unwrap();
    let event = Event::tick(saturday);

    let triggered = evaluate(&workflow, &event).expect("tick should trigger");
    assert_eq!(triggered.jobs, vec!["run_tests"]);
    assert!(matches!(triggered.trigger, Trigger::Schedule { .. }));

    let result = run_workflow_with_fake(&workflow, event, FakeProvisioner::new())
        .await
        .expect("tick should create a run");
    assert_run_succeeded(&result);
    assert_eq!(result.run.event, Event::tick(saturday));
}

/// A push-only workflow ignores ticks; a schedule-only workflow ignores pushes
#[tokio::test]
async fn test_event_kinds_do_not_cross() {
    let push_only = workflow_from_yaml(
        "on: push\njobs:\n  build:\n    runs-on: ubuntu-latest\n    steps:\n      - run: make\n",
    );
    let saturday = Utc.with_ymd_and_hms(2026, 10, 17, 6, 0, 0).unwrap();
    assert!(evaluate(&push_only, &Event::tick(saturday)).is_none());

    let schedule_only = workflow_from_yaml(
        "on:\n  schedule:\n    - cron: '0 6 * * 6'\njobs:\n  build:\n    runs-on: ubuntu-latest\n    steps:\n      - run: make\n",
    );
    assert!(evaluate(&schedule_only, &Event::push("refs/heads/main")).is_none());
    assert!(evaluate(&schedule_only, &Event::tick(saturday)).is_some());
}
