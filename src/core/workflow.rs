//! Workflow domain model
//!
//! A `Workflow` is the immutable, validated form of a workflow file. It is
//! built once by `core::config` and shared read-only by every run.

use crate::core::trigger::Trigger;
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// A validated workflow definition
#[derive(Debug, Clone, Serialize)]
pub struct Workflow {
    /// Workflow name
    pub name: String,

    /// Conditions that start a run
    pub triggers: Vec<Trigger>,

    /// Jobs in declaration order, keyed by unique id
    pub jobs: IndexMap<String, Job>,
}

impl Workflow {
    /// Get a job by id
    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.get(id)
    }

    /// Total number of steps across all jobs
    pub fn step_count(&self) -> usize {
        self.jobs.values().map(|job| job.steps.len()).sum()
    }
}

/// Labels describing the execution environment a job needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EnvironmentDescriptor {
    pub labels: Vec<String>,
}

impl EnvironmentDescriptor {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for EnvironmentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.labels.join(", "))
    }
}

/// A named group of sequential steps sharing one environment
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    /// Unique job id (the key under `jobs:`)
    pub id: String,

    /// Display name (defaults to the id)
    pub name: String,

    /// Environment the job must run in
    pub runs_on: EnvironmentDescriptor,

    /// Steps in declaration order
    pub steps: Vec<Step>,

    /// Per-step timeout applied when a step sets none
    #[serde(skip_serializing_if = "Option::is_none", with = "duration_minutes")]
    pub timeout: Option<Duration>,

    /// Environment variables for every step (workflow-level merged in)
    pub env: IndexMap<String, String>,
}

/// A single action executed within a job
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    /// Human-readable name
    pub name: String,

    /// What the step invokes
    pub action: StepAction,

    /// Step-specific environment variables (override job variables)
    pub env: IndexMap<String, String>,

    /// Step timeout, overriding the job's
    #[serde(skip_serializing_if = "Option::is_none", with = "duration_minutes")]
    pub timeout: Option<Duration>,
}

/// The invocation behind a step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Run a shell command line
    Run { command: String },
    /// Use a reusable action with inputs
    Uses {
        action: ActionRef,
        with: IndexMap<String, String>,
    },
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepAction::Run { command } => {
                f.write_str(command.lines().next().unwrap_or_default())
            }
            StepAction::Uses { action, .. } => write!(f, "{}", action),
        }
    }
}

/// Error for malformed action references
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid action reference '{0}': expected owner/repo[/path]@ref")]
pub struct ActionRefError(pub String);

/// Reference to a reusable action: `owner/repo[/path]@ref`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRef {
    pub owner: String,
    pub repo: String,
    pub path: Option<String>,
    pub git_ref: String,
}

impl ActionRef {
    /// `owner/repo`, without path or ref
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl FromStr for ActionRef {
    type Err = ActionRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ActionRefError(s.to_string());

        let (name, git_ref) = s.trim().rsplit_once('@').ok_or_else(err)?;
        if git_ref.is_empty() {
            return Err(err());
        }

        let mut parts = name.splitn(3, '/');
        let owner = parts.next().filter(|p| !p.is_empty()).ok_or_else(err)?;
        let repo = parts.next().filter(|p| !p.is_empty()).ok_or_else(err)?;
        let path = match parts.next() {
            Some("") => return Err(err()),
            Some(path) => Some(path.to_string()),
            None => None,
        };

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            path,
            git_ref: git_ref.to_string(),
        })
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)?;
        if let Some(path) = &self.path {
            write!(f, "/{}", path)?;
        }
        write!(f, "@{}", self.git_ref)
    }
}

impl Serialize for ActionRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

mod duration_minutes {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_u64(d.as_secs() / 60),
            None => serializer.serialize_none(),
        }
    }
}
