//! Trigger evaluation - decides whether an event starts a run

use crate::core::{Event, Trigger, Workflow};
use tracing::debug;

/// Outcome of an event that fired one of the workflow's triggers
#[derive(Debug, Clone, PartialEq)]
pub struct TriggeredJobs {
    /// First trigger that matched
    pub trigger: Trigger,
    /// Every job of the workflow, in declaration order
    pub jobs: Vec<String>,
}

/// Evaluate an event against a workflow's triggers
///
/// Returns `None` when no trigger matches. Several matching triggers still
/// produce a single result, so one event never starts more than one run.
pub fn evaluate(workflow: &Workflow, event: &Event) -> Option<TriggeredJobs> {
    let Some(trigger) = workflow.triggers.iter().find(|t| t.matches(event)) else {
        debug!("Event '{}' does not trigger workflow '{}'", event, workflow.name);
        return None;
    };

    debug!("Event '{}' fired trigger {} of '{}'", event, trigger, workflow.name);
    Some(TriggeredJobs {
        trigger: trigger.clone(),
        jobs: workflow.jobs.keys().cloned().collect(),
    })
}
