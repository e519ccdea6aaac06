//! Scenario-based tests for workflow-runner

mod environment_errors;
mod fail_fast;
mod job_independence;
mod push_trigger;
mod schedule_trigger;
mod successful_job;
