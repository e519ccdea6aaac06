//! Persistence layer for workflow run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

pub use crate::core::RunStatus;
use crate::core::{Run, StepResult};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of a workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run ID
    pub run_id: Uuid,

    /// Workflow name
    pub workflow_name: String,

    /// Event that started the run, as displayed
    pub event: String,

    /// Run status
    pub status: RunStatus,

    /// When the run started (creation time if it never started)
    pub started_at: DateTime<Utc>,

    /// When the run completed (if complete)
    pub completed_at: Option<DateTime<Utc>>,

    /// Number of triggered jobs
    pub total_jobs: usize,

    /// Number of failed jobs
    pub failed_jobs: usize,

    /// Number of steps that actually ran
    pub executed_steps: usize,

    /// Progress (0.0 to 1.0)
    pub progress: f64,
}

/// Captured result of one executed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLog {
    pub run_id: Uuid,
    pub job_id: String,
    pub index: usize,
    pub name: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub output: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run and the logs of its executed steps, replacing earlier saves
    async fn save_run(&self, run: &Run) -> Result<()>;

    /// Load a run summary by ID
    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>>;

    /// Load the step logs of a run, ordered by job then step
    async fn load_step_logs(&self, run_id: Uuid) -> Result<Vec<StepLog>>;

    /// List all runs of a workflow, newest first
    async fn list_runs(&self, workflow_name: &str) -> Result<Vec<RunSummary>>;

    /// Most recent run of a workflow
    async fn latest_run(&self, workflow_name: &str) -> Result<Option<RunSummary>> {
        Ok(self.list_runs(workflow_name).await?.into_iter().next())
    }

    /// List all workflow names
    async fn list_workflows(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryPersistence {
    runs: RwLock<HashMap<Uuid, RunSummary>>,
    logs: RwLock<HashMap<Uuid, Vec<StepLog>>>,
    by_workflow: RwLock<HashMap<String, Vec<Uuid>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, run: &Run) -> Result<()> {
        let summary = create_summary(run);
        let workflow_name = summary.workflow_name.clone();

        // At most one guard is held at a time
        self.logs.write().await.insert(run.id, step_logs(run));
        self.runs.write().await.insert(run.id, summary);

        let mut by_workflow = self.by_workflow.write().await;
        let ids = by_workflow.entry(workflow_name).or_default();
        if !ids.contains(&run.id) {
            ids.push(run.id);
        }
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        Ok(self.runs.read().await.get(&run_id).cloned())
    }

    async fn load_step_logs(&self, run_id: Uuid) -> Result<Vec<StepLog>> {
        Ok(self.logs.read().await.get(&run_id).cloned().unwrap_or_default())
    }

    async fn list_runs(&self, workflow_name: &str) -> Result<Vec<RunSummary>> {
        let ids = self
            .by_workflow
            .read()
            .await
            .get(workflow_name)
            .cloned()
            .unwrap_or_default();

        let runs = self.runs.read().await;
        let mut result: Vec<RunSummary> = ids.iter().filter_map(|id| runs.get(id).cloned()).collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.by_workflow.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Create a summary from a run
pub fn create_summary(run: &Run) -> RunSummary {
    RunSummary {
        run_id: run.id,
        workflow_name: run.workflow_name.clone(),
        event: run.event.to_string(),
        status: run.status,
        started_at: run.started_at.unwrap_or(run.created_at),
        completed_at: run.completed_at,
        total_jobs: run.jobs.len(),
        failed_jobs: run.failed_jobs().len(),
        executed_steps: run.executed_steps(),
        progress: run.progress(),
    }
}

/// Flatten the executed steps of a run into log records
pub fn step_logs(run: &Run) -> Vec<StepLog> {
    run.jobs
        .values()
        .flat_map(|job| {
            job.steps.iter().map(move |step| StepLog {
                run_id: run.id,
                job_id: job.job_id.clone(),
                index: step.index,
                name: step.name.clone(),
                success: step.result.is_success(),
                exit_code: step.result.exit_code(),
                output: match &step.result {
                    StepResult::Success { output } | StepResult::Failure { output, .. } => output.clone(),
                },
                started_at: step.started_at,
                finished_at: step.finished_at,
            })
        })
        .collect()
}
