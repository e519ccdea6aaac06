//! CLI command definitions

use crate::core::{Event, Workflow};
use crate::environment::LocalEnvironmentConfig;
use crate::execution::SchedulingStrategy;
use chrono::{DateTime, Utc};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

/// Options shared by every command that executes a workflow
#[derive(Debug, Args, Clone)]
pub struct ExecutionArgs {
    /// Scheduling strategy for the jobs of a run
    #[arg(long, value_enum, default_value_t = SchedulingStrategyArg::Sequential)]
    pub strategy: SchedulingStrategyArg,

    /// Maximum concurrent jobs with `--strategy parallel-limited`
    #[arg(long, default_value_t = 4)]
    pub max_jobs: usize,

    /// Repository cloned by `actions/checkout`
    #[arg(long, env = "WORKFLOW_SOURCE", default_value = ".")]
    pub source: PathBuf,

    /// Timeout for steps whose job and step set none
    #[arg(long, env = "WORKFLOW_STEP_TIMEOUT_MINS", value_parser = parse_timeout_minutes)]
    pub step_timeout_mins: Option<u64>,

    /// Run jobs whatever their runs-on labels
    #[arg(long)]
    pub accept_any_runner: bool,

    /// Extra environment variables for every job (KEY=VALUE)
    #[arg(long = "env", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Don't save runs to history
    #[arg(long)]
    pub no_history: bool,
}

impl ExecutionArgs {
    pub fn strategy(&self) -> SchedulingStrategy {
        match self.strategy {
            SchedulingStrategyArg::Sequential => SchedulingStrategy::Sequential,
            SchedulingStrategyArg::Parallel => SchedulingStrategy::Parallel,
            SchedulingStrategyArg::ParallelLimited => {
                SchedulingStrategy::LimitedParallel(self.max_jobs.max(1))
            }
        }
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_mins
            .map(|mins| Duration::from_secs(mins.saturating_mul(60)))
    }

    /// Local environment settings derived from the flags
    pub fn environment_config(&self) -> LocalEnvironmentConfig {
        LocalEnvironmentConfig::new()
            .with_source_dir(self.source.clone())
            .with_accept_any_runner(self.accept_any_runner)
    }

    /// Apply `--env` overrides to every job
    pub fn apply_env(&self, workflow: &mut Workflow) {
        for job in workflow.jobs.values_mut() {
            for (key, value) in &self.env {
                job.env.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Evaluate an event and run the workflow
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to workflow YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Kind of event to deliver
    #[arg(long, value_enum, default_value_t = EventKind::Push)]
    pub event: EventKind,

    /// Git ref of a push event
    #[arg(long = "ref", default_value = "refs/heads/main")]
    pub git_ref: String,

    /// Commit of a push event
    #[arg(long)]
    pub sha: Option<String>,

    /// Instant of a schedule tick (RFC 3339, defaults to now)
    #[arg(long, value_parser = parse_timestamp)]
    pub at: Option<DateTime<Utc>>,

    #[command(flatten)]
    pub execution: ExecutionArgs,
}

impl RunCommand {
    /// The event described by the flags
    pub fn to_event(&self) -> Event {
        match self.event {
            EventKind::Push => Event::Push {
                git_ref: self.git_ref.clone(),
                sha: self.sha.clone(),
            },
            EventKind::Schedule => Event::tick(self.at.unwrap_or_else(Utc::now)),
        }
    }
}

/// Validate a workflow file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to workflow YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Run a workflow on its schedule
#[derive(Debug, Args, Clone)]
pub struct WatchCommand {
    /// Path to workflow YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Stop after the first scheduled run
    #[arg(long)]
    pub once: bool,

    #[command(flatten)]
    pub execution: ExecutionArgs,
}

/// List workflows in history
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show run counts
    #[arg(long)]
    pub with_counts: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Workflow name to filter by
    #[arg(short, long)]
    pub workflow: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show step logs
    #[arg(long)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific run
    #[arg(long)]
    pub run_id: Option<String>,
}

/// Event kind argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EventKind {
    Push,
    Schedule,
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulingStrategyArg {
    Sequential,
    Parallel,
    #[clap(name = "parallel-limited")]
    ParallelLimited,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}

/// Parse a step timeout in minutes; zero and values overflowing seconds are rejected
pub fn parse_timeout_minutes(s: &str) -> Result<u64, String> {
    let minutes: u64 = s
        .parse()
        .map_err(|e| format!("Invalid timeout '{}': {}", s, e))?;
    if minutes == 0 {
        return Err("timeout must be greater than zero".to_string());
    }
    if minutes.checked_mul(60).is_none() {
        return Err(format!("timeout of {} minutes is too large", minutes));
    }
    Ok(minutes)
}

/// Parse an RFC 3339 timestamp
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("Invalid RFC 3339 timestamp '{}': {}", s, e))
}
