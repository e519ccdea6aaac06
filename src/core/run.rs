//! A single execution of a workflow

use crate::core::{
    state::{JobResult, JobStatus, RunStatus},
    trigger::Event,
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One execution instance, created when a trigger fires
///
/// A run exclusively owns its job and step records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique run id
    pub id: Uuid,

    /// Name of the workflow that was triggered
    pub workflow_name: String,

    /// Event that started the run
    pub event: Event,

    pub status: RunStatus,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Triggered jobs in declaration order
    pub jobs: IndexMap<String, JobResult>,
}

impl Run {
    /// Create a pending run for the given jobs
    pub fn new<I, S>(workflow_name: impl Into<String>, event: Event, job_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let jobs = job_ids
            .into_iter()
            .map(|id| {
                let id = id.into();
                (id.clone(), JobResult::pending(id))
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            workflow_name: workflow_name.into(),
            event,
            status: RunStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            jobs,
        }
    }

    /// Pending -> Running
    pub fn start(&mut self) {
        if self.status == RunStatus::Pending {
            self.status = RunStatus::Running;
            self.started_at = Some(Utc::now());
        }
    }

    /// Mark a job as running
    pub fn job_started(&mut self, job_id: &str) {
        if let Some(job) = self.jobs.get_mut(job_id) {
            job.status = JobStatus::Running;
            job.started_at.get_or_insert_with(Utc::now);
        }
    }

    /// Store a job's terminal result
    pub fn record_job(&mut self, result: JobResult) {
        if let Some(slot) = self.jobs.get_mut(&result.job_id) {
            *slot = result;
        }
    }

    /// Running -> Succeeded | Failed, once every job is terminal
    ///
    /// Returns the resulting status; a run with unfinished jobs stays `Running`.
    pub fn finish(&mut self) -> RunStatus {
        if self.status != RunStatus::Running || !self.all_jobs_terminal() {
            return self.status;
        }

        self.status = if self.jobs.values().all(JobResult::is_success) {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };
        self.completed_at = Some(Utc::now());
        self.status
    }

    pub fn all_jobs_terminal(&self) -> bool {
        self.jobs.values().all(|job| job.status.is_terminal())
    }

    pub fn job(&self, job_id: &str) -> Option<&JobResult> {
        self.jobs.get(job_id)
    }

    /// Ids of jobs that failed
    pub fn failed_jobs(&self) -> Vec<&str> {
        self.jobs
            .values()
            .filter(|job| job.status == JobStatus::Failed)
            .map(|job| job.job_id.as_str())
            .collect()
    }

    /// Number of steps executed across all jobs
    pub fn executed_steps(&self) -> usize {
        self.jobs.values().map(|job| job.steps.len()).sum()
    }

    /// Fraction of jobs in a terminal state (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.jobs.is_empty() {
            return 0.0;
        }
        let done = self.jobs.values().filter(|job| job.status.is_terminal()).count();
        done as f64 / self.jobs.len() as f64
    }
}
