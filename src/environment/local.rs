//! Environments provisioned on the local host
//!
//! Each job gets a fresh temporary workspace directory. `run` steps execute
//! through the configured shell inside it; a small set of well-known actions
//! (`actions/checkout`, Rust toolchain installers) map onto host tools.

use crate::core::{ActionRef, EnvironmentDescriptor, StepAction};
use crate::environment::{
    CommandOutput, Environment, EnvironmentError, LocalEnvironmentConfig, Provisioner, StepInvocation,
};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Provisions a temporary workspace per job on this machine
#[derive(Debug, Clone)]
pub struct LocalProvisioner {
    config: Arc<LocalEnvironmentConfig>,
}

impl LocalProvisioner {
    pub fn new(config: LocalEnvironmentConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &LocalEnvironmentConfig {
        &self.config
    }
}

#[async_trait]
impl Provisioner for LocalProvisioner {
    async fn provision(
        &self,
        job_id: &str,
        descriptor: &EnvironmentDescriptor,
    ) -> Result<Box<dyn Environment>, EnvironmentError> {
        if !self.config.accepts(&descriptor.labels) {
            return Err(EnvironmentError::UnsupportedRunner(descriptor.to_string()));
        }

        let prefix = format!(
            "workflow-{}-",
            job_id.replace(|c: char| !c.is_ascii_alphanumeric() && c != '-' && c != '_', "_")
        );
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let workspace = match &self.config.workspace_root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(EnvironmentError::Workspace)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(EnvironmentError::Workspace)?;

        info!(
            "Provisioned local environment for job {} at {}",
            job_id,
            workspace.path().display()
        );

        Ok(Box::new(LocalEnvironment {
            workspace,
            config: self.config.clone(),
        }))
    }
}

/// A job workspace on the local host; removed on teardown (or drop)
#[derive(Debug)]
pub struct LocalEnvironment {
    workspace: TempDir,
    config: Arc<LocalEnvironmentConfig>,
}

impl LocalEnvironment {
    /// Workspace directory steps run in
    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }

    /// Spawn a process in the workspace and capture stdout followed by stderr
    async fn run_process(
        &self,
        program: &str,
        args: &[String],
        env: &IndexMap<String, String>,
    ) -> Result<CommandOutput, EnvironmentError> {
        debug!("Spawning {} {:?} in {}", program, args, self.workspace().display());

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(self.workspace())
            .envs(env)
            .env("CI", "true")
            .env("WORKFLOW_WORKSPACE", self.workspace())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        isolate(&mut command);

        let spawn_error = |source: io::Error| EnvironmentError::Spawn {
            program: program.to_string(),
            source,
        };
        let child = command.spawn().map_err(spawn_error)?;
        // Dropped on completion and on cancellation alike
        let _group = ProcessGroup(child.id());
        let output = child.wait_with_output().await.map_err(spawn_error)?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }

        let exit_code = output.status.code();
        if !output.status.success() {
            warn!("{} exited with code {:?}", program, exit_code);
        }
        debug!("{} produced {} bytes of output", program, text.len());

        Ok(CommandOutput {
            exit_code,
            output: text,
        })
    }

    async fn run_shell(
        &self,
        command: &str,
        env: &IndexMap<String, String>,
    ) -> Result<CommandOutput, EnvironmentError> {
        let (program, leading) = self.config.shell.split_first().ok_or_else(|| EnvironmentError::Spawn {
            program: "<shell>".to_string(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "no shell configured"),
        })?;

        let mut args = leading.to_vec();
        args.push(command.to_string());
        self.run_process(program, &args, env).await
    }

    async fn checkout(
        &self,
        action: &ActionRef,
        with: &IndexMap<String, String>,
        env: &IndexMap<String, String>,
    ) -> Result<CommandOutput, EnvironmentError> {
        let source = self.config.source_dir.as_ref().ok_or_else(|| EnvironmentError::ActionInput {
            action: action.to_string(),
            reason: "no source directory configured".to_string(),
        })?;
        let target = with.get("path").map(String::as_str).unwrap_or(".");

        let args = vec![
            "clone".to_string(),
            "--quiet".to_string(),
            source.display().to_string(),
            target.to_string(),
        ];
        self.run_process(&self.config.git_path, &args, env).await
    }

    async fn install_toolchain(
        &self,
        action: &ActionRef,
        with: &IndexMap<String, String>,
        env: &IndexMap<String, String>,
    ) -> Result<CommandOutput, EnvironmentError> {
        // dtolnay/rust-toolchain encodes the channel in the ref (`@stable`, `@1.70`)
        let pinned_by_ref = action.full_name() == "dtolnay/rust-toolchain"
            && !matches!(action.git_ref.as_str(), "master" | "main" | "v1");

        let channel = with
            .get("toolchain")
            .cloned()
            .or_else(|| pinned_by_ref.then(|| action.git_ref.clone()))
            .ok_or_else(|| EnvironmentError::ActionInput {
                action: action.to_string(),
                reason: "missing 'toolchain' input".to_string(),
            })?;

        let mut args = vec![
            "toolchain".to_string(),
            "install".to_string(),
            channel.clone(),
            "--profile".to_string(),
            with.get("profile").cloned().unwrap_or_else(|| "minimal".to_string()),
        ];
        if let Some(components) = with.get("components").filter(|c| !c.is_empty()) {
            args.push("--component".to_string());
            args.push(components.replace(' ', ""));
        }
        if let Some(target) = with.get("target").or_else(|| with.get("targets")) {
            args.push("--target".to_string());
            args.push(target.replace(' ', ""));
        }

        let install = self.run_process(&self.config.rustup_path, &args, env).await?;
        if !install.success() {
            return Ok(install);
        }

        let is_flag = |key: &str| with.get(key).is_some_and(|v| v == "true");
        let pin = action.full_name() == "dtolnay/rust-toolchain" || is_flag("override") || is_flag("default");
        if !pin {
            return Ok(install);
        }

        // Pinned to the workspace directory only, never the host-wide default
        let args = vec!["override".to_string(), "set".to_string(), channel];
        let pinned = self.run_process(&self.config.rustup_path, &args, env).await?;

        Ok(CommandOutput {
            exit_code: pinned.exit_code,
            output: format!("{}{}", install.output, pinned.output),
        })
    }
}

/// Every process a step started, killed together when the step ends or is cancelled
struct ProcessGroup(Option<u32>);

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if let Some(pgid) = self.0 {
            kill_group(pgid);
        }
    }
}

#[cfg(unix)]
fn isolate(command: &mut Command) {
    command.process_group(0);
}

#[cfg(not(unix))]
fn isolate(_command: &mut Command) {}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg only sends a signal; an already empty group yields ESRCH
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
        debug!("Killed leftover processes in group {}", pgid);
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

#[async_trait]
impl Environment for LocalEnvironment {
    fn describe(&self) -> String {
        format!("local:{}", self.workspace().display())
    }

    async fn execute(&self, invocation: &StepInvocation) -> Result<CommandOutput, EnvironmentError> {
        match &invocation.action {
            StepAction::Run { command } => self.run_shell(command, &invocation.env).await,
            StepAction::Uses { action, with } => match action.full_name().as_str() {
                "actions/checkout" => self.checkout(action, with, &invocation.env).await,
                "actions-rs/toolchain" | "dtolnay/rust-toolchain" => {
                    self.install_toolchain(action, with, &invocation.env).await
                }
                _ => Err(EnvironmentError::UnsupportedAction(action.to_string())),
            },
        }
    }

    async fn teardown(self: Box<Self>) -> Result<(), EnvironmentError> {
        let this = *self;
        let path = this.workspace().display().to_string();
        this.workspace
            .close()
            .map_err(|e| EnvironmentError::Teardown(format!("{}: {}", path, e)))?;
        debug!("Removed workspace {}", path);
        Ok(())
    }
}
