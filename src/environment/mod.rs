//! Execution environments for jobs
//!
//! The runner never reaches for a runner pool directly: it asks an injected
//! [`Provisioner`] for an [`Environment`] matching a job's descriptor, runs the
//! job's steps inside it, and hands it back through [`Environment::teardown`].

pub mod config;
pub mod local;

use crate::core::{EnvironmentDescriptor, StepAction};
use async_trait::async_trait;
use indexmap::IndexMap;
use thiserror::Error;

pub use config::LocalEnvironmentConfig;
pub use local::{LocalEnvironment, LocalProvisioner};

/// Error types for environment operations
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("no runner available for labels [{0}]")]
    UnsupportedRunner(String),

    #[error("failed to prepare workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported action '{0}'")]
    UnsupportedAction(String),

    #[error("action '{action}': {reason}")]
    ActionInput { action: String, reason: String },

    #[error("failed to tear down environment: {0}")]
    Teardown(String),
}

/// Everything an environment needs to run one step
#[derive(Debug, Clone)]
pub struct StepInvocation {
    pub action: StepAction,
    /// Job and step environment variables, already merged
    pub env: IndexMap<String, String>,
}

/// Exit status and combined output of an invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A provisioned execution context, exclusively owned by one job
#[async_trait]
pub trait Environment: Send + Sync {
    /// Short human-readable description (e.g. the workspace path)
    fn describe(&self) -> String;

    /// Run an invocation and capture its exit status and output
    async fn execute(&self, invocation: &StepInvocation) -> Result<CommandOutput, EnvironmentError>;

    /// Release the environment
    async fn teardown(self: Box<Self>) -> Result<(), EnvironmentError>;
}

/// Source of execution environments
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Acquire an environment satisfying the descriptor
    async fn provision(
        &self,
        job_id: &str,
        descriptor: &EnvironmentDescriptor,
    ) -> Result<Box<dyn Environment>, EnvironmentError>;
}
