//! workflow-runner - A build-and-verify pipeline runner for declarative CI workflows

pub mod cli;
pub mod core;
pub mod environment;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use core::{DefinitionError, Event, Job, JobResult, Run, RunStatus, Step, StepResult, Trigger, Workflow};
pub use environment::{Environment, EnvironmentError, LocalProvisioner, Provisioner};
pub use execution::{evaluate, ExecutionEngine, ExecutionEvent, SchedulingStrategy};
