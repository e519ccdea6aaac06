//! Core domain models for workflows
//!
//! This module defines the workflow definition (triggers, jobs, steps),
//! its YAML configuration, and the per-run execution records.

pub mod config;
pub mod cron;
pub mod run;
pub mod state;
pub mod trigger;
pub mod workflow;

pub use config::{parse, load, DefinitionError, WorkflowConfig};
pub use cron::CronSchedule;
pub use run::Run;
pub use state::*;
pub use trigger::{Event, Trigger};
pub use workflow::*;
