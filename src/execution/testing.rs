//! Scripted provisioner shared by the execution unit tests

use crate::{
    core::{EnvironmentDescriptor, Job, Step, StepAction},
    environment::{CommandOutput, Environment, EnvironmentError, Provisioner, StepInvocation},
};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
enum Behavior {
    Exit(i32),
    Sleep(Duration),
    Error,
}

/// Provisioner whose environments answer each command from a script
///
/// Commands not in the script exit 0. Shared state is cloned across every
/// environment it hands out, so tests can inspect what ran afterwards.
#[derive(Clone, Default)]
pub struct ScriptedProvisioner {
    script: Arc<HashMap<String, Behavior>>,
    refuse: bool,
    executed: Arc<Mutex<Vec<String>>>,
    last_env: Arc<Mutex<Option<IndexMap<String, String>>>>,
    teardowns: Arc<AtomicUsize>,
}

impl ScriptedProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(mut self, command: &str, behavior: Behavior) -> Self {
        Arc::make_mut(&mut self.script).insert(command.to_string(), behavior);
        self
    }

    pub fn exit(self, command: &str, code: i32) -> Self {
        self.with(command, Behavior::Exit(code))
    }

    pub fn sleep(self, command: &str, duration: Duration) -> Self {
        self.with(command, Behavior::Sleep(duration))
    }

    pub fn error(self, command: &str) -> Self {
        self.with(command, Behavior::Error)
    }

    pub fn refuse_provisioning(mut self) -> Self {
        self.refuse = true;
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn last_env(&self) -> Option<IndexMap<String, String>> {
        self.last_env.lock().unwrap().clone()
    }

    pub fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provisioner for ScriptedProvisioner {
    async fn provision(
        &self,
        _job_id: &str,
        descriptor: &EnvironmentDescriptor,
    ) -> Result<Box<dyn Environment>, EnvironmentError> {
        if self.refuse {
            return Err(EnvironmentError::UnsupportedRunner(descriptor.to_string()));
        }
        Ok(Box::new(ScriptedEnvironment {
            provisioner: self.clone(),
        }))
    }
}

struct ScriptedEnvironment {
    provisioner: ScriptedProvisioner,
}

#[async_trait]
impl Environment for ScriptedEnvironment {
    fn describe(&self) -> String {
        "scripted".to_string()
    }

    async fn execute(&self, invocation: &StepInvocation) -> Result<CommandOutput, EnvironmentError> {
        let command = invocation.action.to_string();
        self.provisioner.executed.lock().unwrap().push(command.clone());
        *self.provisioner.last_env.lock().unwrap() = Some(invocation.env.clone());

        let code = match self.provisioner.script.get(&command).cloned() {
            None => 0,
            Some(Behavior::Exit(code)) => code,
            Some(Behavior::Sleep(duration)) => {
                tokio::time::sleep(duration).await;
                0
            }
            Some(Behavior::Error) => return Err(EnvironmentError::UnsupportedAction(command)),
        };

        Ok(CommandOutput {
            exit_code: Some(code),
            output: format!("{}: exit {}", command, code),
        })
    }

    async fn teardown(self: Box<Self>) -> Result<(), EnvironmentError> {
        self.provisioner.teardowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Job running each command as a `run` step named after it
pub fn job(id: &str, commands: &[&str]) -> Job {
    Job {
        id: id.to_string(),
        name: id.to_string(),
        runs_on: EnvironmentDescriptor::new(["ubuntu-latest"]),
        steps: commands
            .iter()
            .map(|command| Step {
                name: command.to_string(),
                action: StepAction::Run {
                    command: command.to_string(),
                },
                env: IndexMap::new(),
                timeout: None,
            })
            .collect(),
        timeout: None,
        env: IndexMap::new(),
    }
}
