//! Job executor - runs a job's steps inside a provisioned environment

use crate::{
    core::{Job, JobFailure, JobResult, Step, StepRecord, StepResult},
    environment::{Environment, Provisioner, StepInvocation},
    execution::engine::{EventEmitter, ExecutionEvent},
};
use chrono::Utc;
use std::sync::Arc;
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, error, info, warn};

/// Step timeout used when neither the step nor its job sets one (6 hours)
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(360 * 60);

/// Executes jobs: provision, run steps in order, tear down
pub struct JobExecutor {
    provisioner: Arc<dyn Provisioner>,
    default_step_timeout: Duration,
    events: EventEmitter,
}

impl JobExecutor {
    pub fn new(provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            provisioner,
            default_step_timeout: DEFAULT_STEP_TIMEOUT,
            events: EventEmitter::default(),
        }
    }

    pub fn with_default_step_timeout(mut self, timeout: Duration) -> Self {
        self.default_step_timeout = timeout;
        self
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    /// Execute a job and return its terminal result
    ///
    /// Steps run strictly in declaration order. The first failing step aborts
    /// the rest of the job; nothing is retried. The environment is torn down
    /// whatever the outcome.
    pub async fn execute_job(&self, job: &Job) -> JobResult {
        let started_at = Utc::now();
        info!("Starting job {} on [{}]", job.id, job.runs_on);
        self.events.emit(ExecutionEvent::JobStarted {
            job_id: job.id.clone(),
            runs_on: job.runs_on.to_string(),
            steps: job.steps.len(),
        });

        let environment = match self.provisioner.provision(&job.id, &job.runs_on).await {
            Ok(environment) => environment,
            Err(e) => {
                error!("Failed to provision environment for job {}: {}", job.id, e);
                let result = JobResult::finished(
                    job.id.clone(),
                    Vec::new(),
                    Some(JobFailure::Environment {
                        message: e.to_string(),
                    }),
                    started_at,
                );
                self.emit_finished(&result);
                return result;
            }
        };

        debug!("Job {} running in {}", job.id, environment.describe());
        self.events.emit(ExecutionEvent::EnvironmentReady {
            job_id: job.id.clone(),
            environment: environment.describe(),
        });

        let mut records = Vec::with_capacity(job.steps.len());
        let mut failure = None;

        for (index, step) in job.steps.iter().enumerate() {
            if failure.is_some() {
                self.events.emit(ExecutionEvent::StepSkipped {
                    job_id: job.id.clone(),
                    index,
                    name: step.name.clone(),
                });
                continue;
            }

            self.events.emit(ExecutionEvent::StepStarted {
                job_id: job.id.clone(),
                index,
                total: job.steps.len(),
                name: step.name.clone(),
            });

            let step_started = Utc::now();
            let clock = Instant::now();
            let result = self.execute_step(job, step, environment.as_ref()).await;

            if let StepResult::Failure { exit_code, .. } = &result {
                failure = Some(JobFailure::Step {
                    index,
                    name: step.name.clone(),
                    exit_code: *exit_code,
                });
            }

            self.events.emit(ExecutionEvent::StepFinished {
                job_id: job.id.clone(),
                index,
                name: step.name.clone(),
                result: result.clone(),
                duration: clock.elapsed(),
            });

            records.push(StepRecord {
                index,
                name: step.name.clone(),
                result,
                started_at: step_started,
                finished_at: Utc::now(),
            });
        }

        if let Err(e) = environment.teardown().await {
            warn!("Job {}: {}", job.id, e);
        }

        let result = JobResult::finished(job.id.clone(), records, failure, started_at);
        match &result.failure {
            None => info!("Job {} succeeded", job.id),
            Some(failure) => warn!("Job {} failed: {}", job.id, failure),
        }
        self.emit_finished(&result);
        result
    }

    /// Execute one step inside an environment
    ///
    /// Non-zero exits, environment errors and timeouts all become
    /// `StepResult::Failure`; only a zero exit is a success.
    pub async fn execute_step(&self, job: &Job, step: &Step, environment: &dyn Environment) -> StepResult {
        let mut env = job.env.clone();
        env.extend(step.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        let invocation = StepInvocation {
            action: step.action.clone(),
            env,
        };

        let limit = self.step_timeout(job, step);
        info!("Job {}: running step '{}'", job.id, step.name);

        match timeout(limit, environment.execute(&invocation)).await {
            Ok(Ok(out)) if out.success() => StepResult::Success { output: out.output },
            Ok(Ok(out)) => {
                warn!(
                    "Job {}: step '{}' exited with code {:?}",
                    job.id, step.name, out.exit_code
                );
                StepResult::Failure {
                    exit_code: out.exit_code,
                    output: out.output,
                }
            }
            Ok(Err(e)) => {
                error!("Job {}: step '{}' could not run: {}", job.id, step.name, e);
                StepResult::Failure {
                    exit_code: None,
                    output: e.to_string(),
                }
            }
            Err(_) => {
                error!(
                    "Job {}: step '{}' timed out after {}s",
                    job.id,
                    step.name,
                    limit.as_secs()
                );
                StepResult::Failure {
                    exit_code: None,
                    output: format!("Step timed out after {} seconds", limit.as_secs()),
                }
            }
        }
    }

    fn step_timeout(&self, job: &Job, step: &Step) -> Duration {
        step.timeout.or(job.timeout).unwrap_or(self.default_step_timeout)
    }

    fn emit_finished(&self, result: &JobResult) {
        self.events.emit(ExecutionEvent::JobFinished {
            job_id: result.job_id.clone(),
            status: result.status,
            failure: result.failure.clone(),
        });
    }
}
