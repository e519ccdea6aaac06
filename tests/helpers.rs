//! Test utility functions for workflow-runner

use workflow_runner::core::{
    parse, EnvironmentDescriptor, Event, JobResult, JobStatus, Run, RunStatus, StepResult, Workflow,
};
use workflow_runner::environment::{
    CommandOutput, Environment, EnvironmentError, Provisioner, StepInvocation,
};
use workflow_runner::execution::{ExecutionEngine, ExecutionEvent, SchedulingStrategy};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// The weekly-and-on-push test workflow shipped in `demos/`
pub const TESTS_WORKFLOW: &str = include_str!("../demos/tests.yml");

#[derive(Clone)]
enum Script {
    Exit(i32),
    Hang,
}

/// Fake provisioner: commands succeed unless scripted otherwise
///
/// Steps are identified by their display form (the command line for `run`
/// steps, the action reference for `uses` steps).
#[derive(Clone, Default)]
pub struct FakeProvisioner {
    script: HashMap<String, Script>,
    rejected_labels: Vec<String>,
    executed: Arc<Mutex<Vec<(String, String)>>>,
    provisioned: Arc<AtomicUsize>,
    teardowns: Arc<AtomicUsize>,
}

impl FakeProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a step exit with the given code
    pub fn fail_with(mut self, step: &str, exit_code: i32) -> Self {
        self.script.insert(step.to_string(), Script::Exit(exit_code));
        self
    }

    /// Make a step never finish
    pub fn hang(mut self, step: &str) -> Self {
        self.script.insert(step.to_string(), Script::Hang);
        self
    }

    /// Refuse to provision environments requiring this label
    pub fn reject_label(mut self, label: &str) -> Self {
        self.rejected_labels.push(label.to_string());
        self
    }

    /// Every executed step as (job id, step)
    pub fn executed(&self) -> Vec<(String, String)> {
        self.executed.lock().unwrap().clone()
    }

    /// Steps executed by one job, in order
    pub fn executed_in(&self, job_id: &str) -> Vec<String> {
        self.executed()
            .into_iter()
            .filter(|(job, _)| job == job_id)
            .map(|(_, step)| step)
            .collect()
    }

    pub fn provisioned(&self) -> usize {
        self.provisioned.load(Ordering::SeqCst)
    }

    pub fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn provision(
        &self,
        job_id: &str,
        descriptor: &EnvironmentDescriptor,
    ) -> Result<Box<dyn Environment>, EnvironmentError> {
        if descriptor.labels.iter().any(|l| self.rejected_labels.contains(l)) {
            return Err(EnvironmentError::UnsupportedRunner(descriptor.to_string()));
        }
        self.provisioned.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeEnvironment {
            job_id: job_id.to_string(),
            provisioner: self.clone(),
        }))
    }
}

struct FakeEnvironment {
    job_id: String,
    provisioner: FakeProvisioner,
}

#[async_trait]
impl Environment for FakeEnvironment {
    fn describe(&self) -> String {
        format!("fake environment for {}", self.job_id)
    }

    async fn execute(&self, invocation: &StepInvocation) -> Result<CommandOutput, EnvironmentError> {
        let step = invocation.action.to_string();
        self.provisioner
            .executed
            .lock()
            .unwrap()
            .push((self.job_id.clone(), step.clone()));

        let exit_code = match self.provisioner.script.get(&step) {
            None => 0,
            Some(Script::Exit(code)) => *code,
            Some(Script::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                0
            }
        };

        Ok(CommandOutput {
            exit_code: Some(exit_code),
            output: format!("{} exited with {}", step, exit_code),
        })
    }

    async fn teardown(self: Box<Self>) -> Result<(), EnvironmentError> {
        self.provisioner.teardowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Test result from delivering an event to a workflow
pub struct WorkflowTestResult {
    pub run: Run,
    pub events: Vec<ExecutionEvent>,
    pub provisioner: FakeProvisioner,
}

impl WorkflowTestResult {
    pub fn is_success(&self) -> bool {
        self.run.status == RunStatus::Succeeded
    }

    pub fn is_failed(&self) -> bool {
        self.run.status == RunStatus::Failed
    }

    pub fn job(&self, job_id: &str) -> &JobResult {
        self.run
            .job(job_id)
            .unwrap_or_else(|| panic!("Job '{}' not found in run", job_id))
    }

    /// Results of the executed steps of a job
    pub fn step_results(&self, job_id: &str) -> Vec<&StepResult> {
        self.job(job_id).steps.iter().map(|s| &s.result).collect()
    }

    /// Names of the executed steps of a job
    pub fn executed_steps(&self, job_id: &str) -> Vec<String> {
        self.job(job_id).steps.iter().map(|s| s.name.clone()).collect()
    }

    /// Names of steps reported as never executed
    pub fn skipped_steps(&self, job_id: &str) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ExecutionEvent::StepSkipped { job_id: id, name, .. } if id == job_id => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn summary(&self) -> String {
        let status = match self.run.status {
            RunStatus::Succeeded => "✅ Succeeded",
            RunStatus::Failed => "❌ Failed",
            RunStatus::Running => "🔄 Running",
            RunStatus::Pending => "⏸ Pending",
        };
        format!(
            "{} - {} jobs, failed: {:?}, {} steps executed",
            status,
            self.run.jobs.len(),
            self.run.failed_jobs(),
            self.run.executed_steps()
        )
    }
}

/// Parse a workflow from YAML string
pub fn workflow_from_yaml(yaml: &str) -> Workflow {
    parse(yaml.as_bytes()).unwrap_or_else(|e| panic!("Failed to parse workflow YAML: {}", e))
}

/// Deliver an event through a sequential engine backed by the fake provisioner
pub async fn run_workflow_with_fake(
    workflow: &Workflow,
    event: Event,
    provisioner: FakeProvisioner,
) -> Option<WorkflowTestResult> {
    run_workflow_with_strategy(workflow, event, provisioner, SchedulingStrategy::Sequential).await
}

pub async fn run_workflow_with_strategy(
    workflow: &Workflow,
    event: Event,
    provisioner: FakeProvisioner,
    strategy: SchedulingStrategy,
) -> Option<WorkflowTestResult> {
    let engine = ExecutionEngine::new(Arc::new(provisioner.clone()), strategy)
        .with_default_step_timeout(Duration::from_millis(200));

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    engine.add_event_handler(move |event| sink.lock().unwrap().push(event));

    let run = engine.handle_event(workflow, event).await?;
    let events = events.lock().unwrap().clone();

    Some(WorkflowTestResult {
        run,
        events,
        provisioner,
    })
}

/// Assert the run succeeded
pub fn assert_run_succeeded(result: &WorkflowTestResult) {
    assert!(result.is_success(), "Run should have succeeded, but was: {}", result.summary());
}

/// Assert the run failed
pub fn assert_run_failed(result: &WorkflowTestResult) {
    assert!(result.is_failed(), "Run should have failed, but was: {}", result.summary());
}

/// Assert a job ended with the given status
pub fn assert_job_status(result: &WorkflowTestResult, job_id: &str, expected: JobStatus) {
    let job = result.job(job_id);
    assert_eq!(
        job.status, expected,
        "Job '{}' should be {:?}, but was {:?} ({:?})",
        job_id, expected, job.status, job.failure
    );
}

/// Assert exactly these steps ran in this job, in this order
pub fn assert_execution_order(result: &WorkflowTestResult, job_id: &str, expected: &[&str]) {
    let actual = result.provisioner.executed_in(job_id);
    assert_eq!(
        actual, expected,
        "Expected execution order: {:?}\nActual: {:?}",
        expected, actual
    );
}
