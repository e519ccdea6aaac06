//! Main execution engine - turns events into runs and drives them to completion

use crate::{
    core::{Event, Job, JobFailure, JobResult, JobStatus, Run, RunStatus, StepResult, Workflow},
    environment::Provisioner,
    execution::{evaluator::evaluate, executor::JobExecutor, scheduler::SchedulingStrategy},
};
use std::sync::{Arc, RwLock};
use tokio::{sync::Semaphore, task::JoinSet, time::Duration};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during a run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        workflow: String,
        event: Event,
        jobs: usize,
    },
    JobStarted {
        job_id: String,
        runs_on: String,
        steps: usize,
    },
    EnvironmentReady {
        job_id: String,
        environment: String,
    },
    StepStarted {
        job_id: String,
        index: usize,
        total: usize,
        name: String,
    },
    StepFinished {
        job_id: String,
        index: usize,
        name: String,
        result: StepResult,
        duration: Duration,
    },
    /// A step that was never executed because an earlier step failed
    StepSkipped {
        job_id: String,
        index: usize,
        name: String,
    },
    JobFinished {
        job_id: String,
        status: JobStatus,
        failure: Option<JobFailure>,
    },
    RunFinished {
        run_id: Uuid,
        status: RunStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fan-out of execution events to registered handlers
///
/// Clones share the same handler list.
#[derive(Clone, Default)]
pub struct EventEmitter {
    handlers: Arc<RwLock<Vec<EventHandler>>>,
}

impl EventEmitter {
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.push(Arc::new(handler));
        }
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let handlers = match self.handlers.read() {
            Ok(handlers) => handlers.clone(),
            Err(_) => return,
        };
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }
}

/// Main workflow execution engine
pub struct ExecutionEngine {
    provisioner: Arc<dyn Provisioner>,
    executor: Arc<JobExecutor>,
    strategy: SchedulingStrategy,
    events: EventEmitter,
}

impl ExecutionEngine {
    pub fn new(provisioner: Arc<dyn Provisioner>, strategy: SchedulingStrategy) -> Self {
        let events = EventEmitter::default();
        let executor = Arc::new(JobExecutor::new(provisioner.clone()).with_events(events.clone()));

        Self {
            provisioner,
            executor,
            strategy,
            events,
        }
    }

    /// Override the timeout applied to steps whose job and step set none
    pub fn with_default_step_timeout(mut self, timeout: Duration) -> Self {
        self.executor = Arc::new(
            JobExecutor::new(self.provisioner.clone())
                .with_default_step_timeout(timeout)
                .with_events(self.events.clone()),
        );
        self
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler);
    }

    /// Create a pending run if the event fires one of the workflow's triggers
    pub fn trigger(&self, workflow: &Workflow, event: Event) -> Option<Run> {
        let triggered = evaluate(workflow, &event)?;
        let run = Run::new(workflow.name.clone(), event, triggered.jobs);
        info!(
            "Run {} of '{}' created by {} ({} jobs)",
            run.id,
            workflow.name,
            triggered.trigger,
            run.jobs.len()
        );
        Some(run)
    }

    /// Evaluate an event and, if it triggers the workflow, execute the run
    pub async fn handle_event(&self, workflow: &Workflow, event: Event) -> Option<Run> {
        let mut run = self.trigger(workflow, event)?;
        self.execute(workflow, &mut run).await;
        Some(run)
    }

    /// Execute every job of a run and settle its final status
    ///
    /// Jobs are independent: a failing job never stops its siblings.
    pub async fn execute(&self, workflow: &Workflow, run: &mut Run) -> RunStatus {
        info!("Starting run {} of '{}'", run.id, run.workflow_name);
        run.start();
        self.events.emit(ExecutionEvent::RunStarted {
            run_id: run.id,
            workflow: run.workflow_name.clone(),
            event: run.event.clone(),
            jobs: run.jobs.len(),
        });

        let mut jobs = Vec::with_capacity(run.jobs.len());
        for job_id in run.jobs.keys() {
            match workflow.job(job_id) {
                Some(job) => jobs.push(job.clone()),
                None => warn!("Job {} is not defined in workflow '{}'", job_id, workflow.name),
            }
        }

        match self.strategy {
            SchedulingStrategy::Sequential => {
                for job in &jobs {
                    run.job_started(&job.id);
                    let result = self.executor.execute_job(job).await;
                    run.record_job(result);
                }
            }
            SchedulingStrategy::Parallel | SchedulingStrategy::LimitedParallel(_) => {
                self.execute_concurrently(jobs, run).await;
            }
        }

        let unfinished: Vec<String> = run
            .jobs
            .values()
            .filter(|job| !job.status.is_terminal())
            .map(|job| job.job_id.clone())
            .collect();
        for job_id in unfinished {
            let result = JobResult::finished(
                job_id.clone(),
                Vec::new(),
                Some(JobFailure::Aborted {
                    message: "job did not complete".to_string(),
                }),
                chrono::Utc::now(),
            );
            error!("Job {} aborted", job_id);
            run.record_job(result);
        }

        let status = run.finish();
        info!("Run {} finished: {}", run.id, status);
        self.events.emit(ExecutionEvent::RunFinished {
            run_id: run.id,
            status,
        });
        status
    }

    async fn execute_concurrently(&self, jobs: Vec<Job>, run: &mut Run) {
        let permits = Arc::new(Semaphore::new(self.strategy.max_concurrent_jobs(jobs.len())));
        let mut tasks = JoinSet::new();

        for job in jobs {
            run.job_started(&job.id);
            let executor = self.executor.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                executor.execute_job(&job).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => run.record_job(result),
                Err(e) => error!("Job task failed: {}", e),
            }
        }
    }
}
