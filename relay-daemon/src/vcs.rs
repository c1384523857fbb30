//! Version-control collaborator.
//!
//! The orchestrator only sees the [`Vcs`] trait. [`GitVcs`] shells out to the
//! `git` client; calls are blocking and run on the blocking thread pool.

use std::path::Path;
use std::process::{Command, Output};

use relay_core::{Project, ProjectName, RelayConfig};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("version-control task aborted: {0}")]
    Aborted(String),
}

/// Captured output of a successful pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullOutput {
    pub stdout: String,
    pub stderr: String,
}

pub trait Vcs: Send + Sync + 'static {
    /// Clone the project's remote into `work_dir` unless it already exists.
    /// Returns `true` when a fresh clone was made.
    fn ensure_cloned(&self, project: &Project) -> Result<bool, VcsError>;

    /// Bring `work_dir` up to date with its remote.
    fn pull(&self, project: &Project) -> Result<PullOutput, VcsError>;

    /// Short identifier of the checked-out revision.
    fn current_revision(&self, project: &Project) -> Result<String, VcsError>;
}

#[derive(Debug, Clone)]
pub struct GitVcs {
    git_bin: String,
    remote_url_template: String,
}

impl GitVcs {
    pub fn new(git_bin: impl Into<String>, remote_url_template: impl Into<String>) -> Self {
        Self {
            git_bin: git_bin.into(),
            remote_url_template: remote_url_template.into(),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.git_bin.clone(), config.remote_url_template.clone())
    }

    pub fn remote_url(&self, name: &ProjectName) -> String {
        name.remote_url(&self.remote_url_template)
    }

    fn git(&self, cwd: &Path, args: &[&str]) -> Result<Output, VcsError> {
        let command = format!("{} {}", self.git_bin, args.join(" "));
        tracing::debug!(cwd = %cwd.display(), %command, "running git");
        let output = Command::new(&self.git_bin)
            .args(args)
            .current_dir(cwd)
            .output()
            .map_err(|source| VcsError::Spawn {
                command: command.clone(),
                source,
            })?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(VcsError::Failed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Run a setup command whose failure does not matter.
    fn git_lenient(&self, cwd: &Path, args: &[&str]) {
        if let Err(err) = self.git(cwd, args) {
            tracing::debug!(error = %err, "ignoring git failure");
        }
    }
}

impl Vcs for GitVcs {
    fn ensure_cloned(&self, project: &Project) -> Result<bool, VcsError> {
        if project.work_dir.exists() {
            return Ok(false);
        }
        let parent = project.work_dir.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|source| VcsError::Spawn {
            command: format!("mkdir {}", parent.display()),
            source,
        })?;

        tracing::info!(project = %project.name, "performing initial clone");
        let url = self.remote_url(&project.name);
        let target = project.work_dir.to_string_lossy();
        self.git(parent, &["clone", &url, &target])?;
        Ok(true)
    }

    fn pull(&self, project: &Project) -> Result<PullOutput, VcsError> {
        let cwd = project.work_dir.as_path();
        let url = self.remote_url(&project.name);
        self.git_lenient(cwd, &["config", "core.autocrlf", "false"]);
        self.git_lenient(cwd, &["remote", "set-url", "origin", &url]);

        let output = self.git(cwd, &["pull"])?;
        let pulled = PullOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        if !pulled.stdout.is_empty() {
            tracing::info!(project = %project.name, "git stdout:\n{}", pulled.stdout);
        }
        if !pulled.stderr.is_empty() {
            tracing::info!(project = %project.name, "git stderr:\n{}", pulled.stderr);
        }
        Ok(pulled)
    }

    fn current_revision(&self, project: &Project) -> Result<String, VcsError> {
        let output = self.git(&project.work_dir, &["show", "-s", "--format=%h"])?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let version = stdout.lines().next().unwrap_or_default().trim().to_string();
        tracing::info!(project = %project.name, "git version now {version}");
        Ok(version)
    }
}
