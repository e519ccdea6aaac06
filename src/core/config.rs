//! Workflow configuration from YAML
//!
//! Parsing is pure: bytes in, a validated [`Workflow`] or a [`DefinitionError`]
//! out. Nothing here touches the filesystem except [`load`].

use crate::core::{
    cron::{CronError, CronSchedule},
    trigger::{BranchFilter, Trigger},
    workflow::{ActionRef, ActionRefError, EnvironmentDescriptor, Job, Step, StepAction, Workflow},
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Errors in a workflow definition; fatal before any run starts
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to read workflow file: {0}")]
    Io(#[from] std::io::Error),

    #[error("workflow file is not valid UTF-8")]
    Encoding,

    #[error("malformed workflow: {0}")]
    Syntax(#[from] serde_yaml::Error),

    #[error("workflow declares no triggers")]
    NoTriggers,

    #[error("invalid trigger '{name}': {reason}")]
    InvalidTrigger { name: String, reason: String },

    #[error(transparent)]
    Cron(#[from] CronError),

    #[error("workflow declares no jobs")]
    NoJobs,

    #[error("job '{0}' has no steps")]
    EmptyJob(String),

    #[error("job '{0}' has an empty runs-on")]
    MissingRunsOn(String),

    #[error("job '{job}' step {index}: {reason}")]
    InvalidStep {
        job: String,
        index: usize,
        reason: String,
    },

    #[error("job '{job}' step {index}: {source}")]
    InvalidAction {
        job: String,
        index: usize,
        #[source]
        source: ActionRefError,
    },

    #[error("{0}: timeout-minutes must be greater than zero")]
    ZeroTimeout(String),

    #[error("{owner}: timeout-minutes {minutes} is too large")]
    TimeoutTooLarge { owner: String, minutes: u64 },
}

/// Top-level workflow configuration as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Workflow name
    #[serde(default)]
    pub name: Option<String>,

    /// Trigger declaration (`on:`); string, list or mapping form
    #[serde(default, rename = "on", alias = "triggers")]
    pub on: Value,

    /// Environment variables for every job
    #[serde(default)]
    pub env: IndexMap<String, Value>,

    /// Jobs keyed by id, in declaration order
    #[serde(default)]
    pub jobs: IndexMap<String, JobConfig>,
}

/// Job configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Display name
    #[serde(default)]
    pub name: Option<String>,

    /// Runner label(s)
    #[serde(rename = "runs-on", alias = "runs_on", alias = "runsOn")]
    pub runs_on: RunsOn,

    /// Ordered steps
    #[serde(default)]
    pub steps: Vec<StepConfig>,

    /// Timeout applied to each step of this job
    #[serde(default, rename = "timeout-minutes", alias = "timeout_minutes")]
    pub timeout_minutes: Option<u64>,

    /// Environment variables for every step of this job
    #[serde(default)]
    pub env: IndexMap<String, Value>,
}

/// `runs-on` accepts one label or a list of labels
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunsOn {
    One(String),
    Many(Vec<String>),
}

impl RunsOn {
    fn labels(&self) -> Vec<String> {
        match self {
            RunsOn::One(label) => vec![label.clone()],
            RunsOn::Many(labels) => labels.clone(),
        }
    }
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Human-readable name
    #[serde(default)]
    pub name: Option<String>,

    /// Action reference (`owner/repo@ref`)
    #[serde(default)]
    pub uses: Option<String>,

    /// Inputs for `uses`
    #[serde(default)]
    pub with: IndexMap<String, Value>,

    /// Shell command line
    #[serde(default)]
    pub run: Option<String>,

    /// Step environment variables
    #[serde(default)]
    pub env: IndexMap<String, Value>,

    /// Timeout for this step
    #[serde(default, rename = "timeout-minutes", alias = "timeout_minutes")]
    pub timeout_minutes: Option<u64>,
}

/// Parse and validate a workflow definition
pub fn parse(bytes: &[u8]) -> Result<Workflow, DefinitionError> {
    let text = std::str::from_utf8(bytes).map_err(|_| DefinitionError::Encoding)?;
    WorkflowConfig::from_yaml(text)?.to_workflow()
}

/// Load a workflow file; an unnamed workflow is named after the file stem
pub fn load<P: AsRef<Path>>(path: P) -> Result<Workflow, DefinitionError> {
    let config = WorkflowConfig::from_file(&path)?;
    let mut workflow = config.to_workflow()?;
    if config.name.is_none() {
        if let Some(stem) = path.as_ref().file_stem().and_then(|s| s.to_str()) {
            workflow.name = stem.to_string();
        }
    }
    Ok(workflow)
}

impl WorkflowConfig {
    /// Load workflow configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DefinitionError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Deserialize workflow configuration from a YAML string
    ///
    /// Only the document shape is checked here; [`WorkflowConfig::to_workflow`]
    /// does the validation.
    pub fn from_yaml(yaml: &str) -> Result<Self, DefinitionError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse the `on:` block into triggers
    pub fn triggers(&self) -> Result<Vec<Trigger>, DefinitionError> {
        let mut triggers = Vec::new();

        match &self.on {
            Value::String(name) => parse_trigger(name, &Value::Null, &mut triggers)?,
            Value::Sequence(entries) => {
                for entry in entries {
                    match entry {
                        Value::String(name) => parse_trigger(name, &Value::Null, &mut triggers)?,
                        Value::Mapping(map) => {
                            for (name, value) in map {
                                parse_trigger(&key_name(name)?, value, &mut triggers)?;
                            }
                        }
                        other => return Err(invalid_trigger("on", format!("unexpected entry {:?}", other))),
                    }
                }
            }
            Value::Mapping(map) => {
                for (name, value) in map {
                    parse_trigger(&key_name(name)?, value, &mut triggers)?;
                }
            }
            Value::Null => return Err(DefinitionError::NoTriggers),
            other => return Err(invalid_trigger("on", format!("unexpected value {:?}", other))),
        }

        if triggers.is_empty() {
            return Err(DefinitionError::NoTriggers);
        }
        Ok(triggers)
    }

    /// Convert config to a validated Workflow domain model
    pub fn to_workflow(&self) -> Result<Workflow, DefinitionError> {
        let triggers = self.triggers()?;

        if self.jobs.is_empty() {
            return Err(DefinitionError::NoJobs);
        }

        let workflow_env = string_map(&self.env);
        let mut jobs = IndexMap::new();
        for (id, job) in &self.jobs {
            jobs.insert(id.clone(), job.to_job(id, &workflow_env)?);
        }

        Ok(Workflow {
            name: self.name.clone().unwrap_or_else(|| "workflow".to_string()),
            triggers,
            jobs,
        })
    }
}

impl JobConfig {
    fn to_job(&self, id: &str, workflow_env: &IndexMap<String, String>) -> Result<Job, DefinitionError> {
        let labels: Vec<String> = self
            .runs_on
            .labels()
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if labels.is_empty() {
            return Err(DefinitionError::MissingRunsOn(id.to_string()));
        }
        if self.steps.is_empty() {
            return Err(DefinitionError::EmptyJob(id.to_string()));
        }

        let mut env = workflow_env.clone();
        env.extend(string_map(&self.env));

        let steps = self
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| step.to_step(id, index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Job {
            id: id.to_string(),
            name: self.name.clone().unwrap_or_else(|| id.to_string()),
            runs_on: EnvironmentDescriptor::new(labels),
            steps,
            timeout: minutes(self.timeout_minutes, || format!("job '{}'", id))?,
            env,
        })
    }
}

impl StepConfig {
    fn to_step(&self, job: &str, index: usize) -> Result<Step, DefinitionError> {
        let invalid = |reason: &str| DefinitionError::InvalidStep {
            job: job.to_string(),
            index,
            reason: reason.to_string(),
        };

        let action = match (&self.run, &self.uses) {
            (Some(_), Some(_)) => return Err(invalid("a step cannot have both 'run' and 'uses'")),
            (None, None) => return Err(invalid("a step needs either 'run' or 'uses'")),
            (Some(command), None) => {
                if command.trim().is_empty() {
                    return Err(invalid("'run' must not be empty"));
                }
                if !self.with.is_empty() {
                    return Err(invalid("'with' is only valid together with 'uses'"));
                }
                StepAction::Run {
                    command: command.clone(),
                }
            }
            (None, Some(uses)) => {
                let action: ActionRef = uses.parse().map_err(|source| DefinitionError::InvalidAction {
                    job: job.to_string(),
                    index,
                    source,
                })?;
                StepAction::Uses {
                    action,
                    with: string_map(&self.with),
                }
            }
        };

        let name = self
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| match &action {
                StepAction::Run { .. } => format!("Run {}", action),
                StepAction::Uses { .. } => action.to_string(),
            });

        Ok(Step {
            timeout: minutes(self.timeout_minutes, || format!("job '{}' step '{}'", job, name))?,
            name,
            action,
            env: string_map(&self.env),
        })
    }
}

fn parse_trigger(name: &str, value: &Value, triggers: &mut Vec<Trigger>) -> Result<(), DefinitionError> {
    match name {
        "push" => {
            let branches = match value {
                Value::Null => Vec::new(),
                Value::Mapping(map) => match map.get("branches") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(value) => string_list(value)
                        .ok_or_else(|| invalid_trigger(name, "'branches' must be a string or a list of strings"))?
                        .iter()
                        .map(|pattern| {
                            BranchFilter::new(pattern)
                                .map_err(|e| invalid_trigger(name, format!("bad branch pattern '{}': {}", pattern, e)))
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                },
                _ => return Err(invalid_trigger(name, "expected a mapping or nothing")),
            };
            triggers.push(Trigger::Push { branches });
        }
        "schedule" => {
            let entries: Vec<&Value> = match value {
                Value::Sequence(items) => items.iter().collect(),
                Value::Null => return Err(invalid_trigger(name, "a schedule needs at least one cron expression")),
                single => vec![single],
            };
            if entries.is_empty() {
                return Err(invalid_trigger(name, "a schedule needs at least one cron expression"));
            }
            for entry in entries {
                let expression = match entry {
                    Value::String(expr) => expr.as_str(),
                    Value::Mapping(map) => map
                        .get("cron")
                        .and_then(Value::as_str)
                        .ok_or_else(|| invalid_trigger(name, "each schedule entry needs a 'cron' string"))?,
                    _ => return Err(invalid_trigger(name, "each schedule entry needs a 'cron' string")),
                };
                triggers.push(Trigger::Schedule {
                    cron: CronSchedule::parse(expression)?,
                });
            }
        }
        other => {
            warn!("Ignoring unsupported trigger event '{}'", other);
        }
    }
    Ok(())
}

fn invalid_trigger(name: &str, reason: impl Into<String>) -> DefinitionError {
    DefinitionError::InvalidTrigger {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn key_name(key: &Value) -> Result<String, DefinitionError> {
    key.as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid_trigger("on", format!("event names must be strings, got {:?}", key)))
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(vec![s.clone()]),
        Value::Sequence(items) => items.iter().map(|v| v.as_str().map(str::to_string)).collect(),
        _ => None,
    }
}

/// Render scalar YAML values as strings (`true`, `1`, `stable`)
fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other).unwrap_or_default().trim_end().to_string(),
    }
}

fn string_map(map: &IndexMap<String, Value>) -> IndexMap<String, String> {
    map.iter()
        .map(|(k, v)| (k.clone(), scalar_to_string(v)))
        .collect()
}

fn minutes(value: Option<u64>, owner: impl FnOnce() -> String) -> Result<Option<Duration>, DefinitionError> {
    match value {
        Some(0) => Err(DefinitionError::ZeroTimeout(owner())),
        Some(m) => m
            .checked_mul(60)
            .map(|secs| Some(Duration::from_secs(secs)))
            .ok_or_else(|| DefinitionError::TimeoutTooLarge {
                owner: owner(),
                minutes: m,
            }),
        None => Ok(None),
    }
}
