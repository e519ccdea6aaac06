//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run was created but has not started
    Pending,
    /// Jobs are executing
    Running,
    /// Every job succeeded
    Succeeded,
    /// At least one job failed
    Failed,
}

/// Status of a single job within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "Pending",
            RunStatus::Running => "Running",
            RunStatus::Succeeded => "Succeeded",
            RunStatus::Failed => "Failed",
        }
    }
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(RunStatus::Pending),
            "Running" => Ok(RunStatus::Running),
            "Succeeded" => Ok(RunStatus::Succeeded),
            "Failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {}", other)),
        }
    }
}

/// Result of executing one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepResult {
    /// The invocation exited with status 0
    Success { output: String },
    /// The invocation exited non-zero, crashed or timed out
    ///
    /// `exit_code` is `None` when the process never produced one
    /// (killed by a signal, timed out, could not be started).
    Failure {
        exit_code: Option<i32>,
        output: String,
    },
}

impl StepResult {
    pub fn is_success(&self) -> bool {
        matches!(self, StepResult::Success { .. })
    }

    pub fn output(&self) -> &str {
        match self {
            StepResult::Success { output } | StepResult::Failure { output, .. } => output,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            StepResult::Success { .. } => Some(0),
            StepResult::Failure { exit_code, .. } => *exit_code,
        }
    }
}

/// Record of an executed step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Position of the step in its job (0-based)
    pub index: usize,
    pub name: String,
    pub result: StepResult,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// First failure encountered by a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobFailure {
    /// The environment could not be provisioned; no step ran
    Environment { message: String },
    /// A step failed; later steps were not executed
    Step {
        index: usize,
        name: String,
        exit_code: Option<i32>,
    },
    /// The job task ended abnormally
    Aborted { message: String },
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobFailure::Environment { message } => write!(f, "environment error: {}", message),
            JobFailure::Step {
                name,
                exit_code: Some(code),
                ..
            } => write!(f, "step '{}' failed with exit code {}", name, code),
            JobFailure::Step { name, exit_code: None, .. } => {
                write!(f, "step '{}' failed without an exit code", name)
            }
            JobFailure::Aborted { message } => write!(f, "aborted: {}", message),
        }
    }
}

/// Status and step records of one job in a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub status: JobStatus,
    /// Executed steps only, in execution order
    pub steps: Vec<StepRecord>,
    pub failure: Option<JobFailure>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobResult {
    /// A job that has not started
    pub fn pending(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Pending,
            steps: Vec::new(),
            failure: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Build a terminal result from executed steps and the first failure (if any)
    pub fn finished(
        job_id: impl Into<String>,
        steps: Vec<StepRecord>,
        failure: Option<JobFailure>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let status = if failure.is_none() {
            JobStatus::Succeeded
        } else {
            JobStatus::Failed
        };
        Self {
            job_id: job_id.into(),
            status,
            steps,
            failure,
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}
