//! Local environment configuration

use std::path::PathBuf;

/// Runner labels a Linux host satisfies out of the box
pub const LINUX_LABELS: &[&str] = &[
    "ubuntu-latest",
    "ubuntu-24.04",
    "ubuntu-22.04",
    "ubuntu-20.04",
    "linux",
    "self-hosted",
];

/// Configuration for environments provisioned on the local host
#[derive(Debug, Clone)]
pub struct LocalEnvironmentConfig {
    /// Program and leading arguments used to run `run` steps; the command
    /// line is appended as the final argument
    pub shell: Vec<String>,

    /// Repository checked out by `actions/checkout`
    pub source_dir: Option<PathBuf>,

    /// Runner labels this host satisfies
    pub accepted_labels: Vec<String>,

    /// Accept every label regardless of `accepted_labels`
    pub accept_any_runner: bool,

    /// Parent directory for job workspaces (system temp dir when unset)
    pub workspace_root: Option<PathBuf>,

    /// Path to `git`
    pub git_path: String,

    /// Path to `rustup`
    pub rustup_path: String,
}

impl Default for LocalEnvironmentConfig {
    fn default() -> Self {
        let accepted_labels = if cfg!(target_os = "linux") {
            LINUX_LABELS.iter().map(|l| l.to_string()).collect()
        } else {
            Vec::new()
        };

        Self {
            shell: ["bash", "--noprofile", "--norc", "-eo", "pipefail", "-c"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            source_dir: None,
            accepted_labels,
            accept_any_runner: false,
            workspace_root: None,
            git_path: "git".to_string(),
            rustup_path: "rustup".to_string(),
        }
    }
}

impl LocalEnvironmentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shell<I, S>(mut self, shell: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shell = shell.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_source_dir(mut self, source_dir: impl Into<PathBuf>) -> Self {
        self.source_dir = Some(source_dir.into());
        self
    }

    pub fn with_accepted_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepted_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_accept_any_runner(mut self, accept: bool) -> Self {
        self.accept_any_runner = accept;
        self
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    pub fn with_rustup_path(mut self, path: impl Into<String>) -> Self {
        self.rustup_path = path.into();
        self
    }

    pub fn with_git_path(mut self, path: impl Into<String>) -> Self {
        self.git_path = path.into();
        self
    }

    /// Check whether every label is satisfied by this host
    pub fn accepts(&self, labels: &[String]) -> bool {
        self.accept_any_runner
            || labels
                .iter()
                .all(|label| self.accepted_labels.iter().any(|a| a.eq_ignore_ascii_case(label)))
    }
}
