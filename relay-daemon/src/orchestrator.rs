//! Per-project update runs.
//!
//! A run moves a project through
//! `Idle -> Pulling -> Manifesting -> Syncing -> Comparing -> Persisting -> Idle`,
//! leaving early from `Comparing` when the freshly built manifest matches the
//! published one. Each project has a single-flight lock: a second run request
//! while one is active is rejected, never queued. The lock covers other relay
//! processes too (see [`crate::project_lock`]). Different projects run
//! independently.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use relay_core::{InclusionRules, Project, ProjectName, RelayConfig};
use relay_sync::{build_manifest, publish, sync_tree, BuildOptions, SyncError, SyncOptions};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::project_lock::{LockError, ProjectLock};
use crate::vcs::{Vcs, VcsError};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Pulling,
    Manifesting,
    Syncing,
    Comparing,
    Persisting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "phase")]
pub enum RunState {
    Idle,
    Locked(Phase),
}

impl RunState {
    pub fn is_locked(&self) -> bool {
        matches!(self, RunState::Locked(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Locked(Phase::Pulling) => "pulling",
            RunState::Locked(Phase::Manifesting) => "manifesting",
            RunState::Locked(Phase::Syncing) => "syncing",
            RunState::Locked(Phase::Comparing) => "comparing",
            RunState::Locked(Phase::Persisting) => "persisting",
        }
    }
}

/// Summary of the most recent finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastRun {
    pub at_unix: i64,
    pub outcome: String,
}

#[derive(Debug)]
struct SlotState {
    run: RunState,
    last_run: Option<LastRun>,
}

/// One project plus its run lock.
#[derive(Debug)]
pub struct ProjectSlot {
    project: Project,
    state: Mutex<SlotState>,
}

impl ProjectSlot {
    pub fn new(project: Project) -> Self {
        Self {
            project,
            state: Mutex::new(SlotState {
                run: RunState::Idle,
                last_run: None,
            }),
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn state(&self) -> RunState {
        self.lock().run
    }

    pub fn last_run(&self) -> Option<LastRun> {
        self.lock().last_run.clone()
    }

    /// Take the run lock. Fails with [`RunError::Busy`] when this process is
    /// already running the project and [`RunError::Locked`] when another
    /// process holds it.
    pub fn try_begin(self: &Arc<Self>) -> Result<RunGuard, RunError> {
        {
            let mut state = self.lock();
            if state.run.is_locked() {
                return Err(RunError::Busy(self.project.name.clone()));
            }
            state.run = RunState::Locked(Phase::Pulling);
        }
        let mut guard = RunGuard {
            slot: self.clone(),
            file_lock: None,
        };
        let file_lock =
            ProjectLock::try_acquire(&self.project).map_err(|source| RunError::Locked {
                project: self.project.name.clone(),
                source,
            })?;
        tracing::debug!(
            project = %self.project.name,
            lock = %file_lock.path().display(),
            "run lock taken",
        );
        guard.file_lock = Some(file_lock);
        Ok(guard)
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Held for the duration of a run. Dropping it returns the slot to `Idle`,
/// whichever way the run ended.
#[derive(Debug)]
pub struct RunGuard {
    slot: Arc<ProjectSlot>,
    file_lock: Option<ProjectLock>,
}

impl RunGuard {
    pub fn project(&self) -> &Project {
        &self.slot.project
    }

    fn enter(&self, phase: Phase) {
        self.slot.lock().run = RunState::Locked(phase);
    }

    fn record(&self, outcome: &Result<RunOutcome, RunError>) {
        let label = match outcome {
            Ok(RunOutcome::Published { .. }) => "published".to_string(),
            Ok(RunOutcome::Unchanged { .. }) => "unchanged".to_string(),
            Err(err) => format!("failed: {err}"),
        };
        self.slot.lock().last_run = Some(LastRun {
            at_unix: chrono::Utc::now().timestamp(),
            outcome: label,
        });
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        // Unlock the file before the slot reads as idle again.
        drop(self.file_lock.take());
        self.slot.lock().run = RunState::Idle;
    }
}

// ---------------------------------------------------------------------------
// Status sink
// ---------------------------------------------------------------------------

/// Receives a run's progress messages in the order they happen. Every message
/// is also logged.
#[derive(Debug, Clone)]
pub struct StatusSink {
    project: ProjectName,
    tx: Option<mpsc::UnboundedSender<String>>,
}

impl StatusSink {
    pub fn new(project: ProjectName, tx: Option<mpsc::UnboundedSender<String>>) -> Self {
        Self { project, tx }
    }

    /// A sink that only logs.
    pub fn log_only(project: ProjectName) -> Self {
        Self::new(project, None)
    }

    pub fn send(&self, message: &str) {
        tracing::info!(project = %self.project, "{message}");
        if let Some(tx) = &self.tx {
            // A disconnected listener must not disturb the run.
            let _ = tx.send(message.to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A new manifest was written.
    Published {
        /// `None` when the revision could not be read.
        version: Option<String>,
        copied: usize,
        /// `None` when the history snapshot could not be written.
        history_path: Option<PathBuf>,
    },
    /// The built manifest matched the published one; nothing was persisted.
    Unchanged { copied: usize },
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("update already in progress for {0}")]
    Busy(ProjectName),

    #[error("unknown project \"{0}\"")]
    UnknownProject(String),

    #[error("update already in progress for {project}: {source}")]
    Locked {
        project: ProjectName,
        #[source]
        source: LockError,
    },

    #[error("version-control update failed: {0}")]
    Fetch(#[source] VcsError),

    #[error("manifest generation failed: {0}")]
    Manifest(#[source] SyncError),
}

impl RunError {
    /// Whether another run of the same project was in the way.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            RunError::Busy(_)
                | RunError::Locked {
                    source: LockError::Contended { .. },
                    ..
                }
        )
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    slots: Vec<Arc<ProjectSlot>>,
    vcs: Arc<dyn Vcs>,
    rules: InclusionRules,
    max_open_files: usize,
}

impl Orchestrator {
    pub fn new(
        projects: Vec<Project>,
        vcs: Arc<dyn Vcs>,
        rules: InclusionRules,
        max_open_files: usize,
    ) -> Self {
        Self {
            slots: projects
                .into_iter()
                .map(|p| Arc::new(ProjectSlot::new(p)))
                .collect(),
            vcs,
            rules,
            max_open_files,
        }
    }

    pub fn from_config(config: &RelayConfig, vcs: Arc<dyn Vcs>) -> Self {
        Self::new(
            config.projects(),
            vcs,
            config.rules.clone(),
            config.max_open_files,
        )
    }

    /// Projects in configuration order.
    pub fn slots(&self) -> &[Arc<ProjectSlot>] {
        &self.slots
    }

    pub fn slot(&self, name: &str) -> Option<Arc<ProjectSlot>> {
        self.slots
            .iter()
            .find(|slot| slot.project.name.as_str() == name)
            .cloned()
    }

    /// Look up `name`, take its lock and run an update.
    pub async fn run_update(&self, name: &str, status: &StatusSink) -> Result<RunOutcome, RunError> {
        let slot = self
            .slot(name)
            .ok_or_else(|| RunError::UnknownProject(name.to_string()))?;
        let guard = slot.try_begin()?;
        self.run_locked(guard, status).await
    }

    /// Drive a run for a project whose lock the caller already holds.
    pub async fn run_locked(&self, guard: RunGuard, status: &StatusSink) -> Result<RunOutcome, RunError> {
        let result = self.drive(&guard, status).await;
        if let Err(err) = &result {
            tracing::error!(project = %guard.project().name, error = %err, "update aborted");
        }
        guard.record(&result);
        result
    }

    /// Run every project once, one after another. A failed project is logged
    /// and the pass moves on.
    pub async fn bootstrap_all(&self) -> Vec<(ProjectName, Result<RunOutcome, RunError>)> {
        let mut results = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let name = slot.project.name.clone();
            let status = StatusSink::log_only(name.clone());
            let result = self.run_update(name.as_str(), &status).await;
            if let Err(err) = &result {
                tracing::warn!(project = %name, error = %err, "bootstrap update failed");
            }
            results.push((name, result));
        }
        results
    }

    async fn drive(&self, guard: &RunGuard, status: &StatusSink) -> Result<RunOutcome, RunError> {
        let project = guard.project().clone();

        guard.enter(Phase::Pulling);
        status.send("Pulling from Git...");
        self.fetch(&project).await.map_err(RunError::Fetch)?;

        guard.enter(Phase::Manifesting);
        status.send("Generating manifest...");
        let build_options = BuildOptions {
            base_mode: false,
            max_open_files: self.max_open_files,
        };
        let manifest = build_manifest(&project.work_dir, &self.rules, &build_options)
            .await
            .map_err(RunError::Manifest)?;
        let manifest_text = manifest.render();

        guard.enter(Phase::Syncing);
        status.send("Copying files...");
        let sync_options = SyncOptions {
            dry_run: false,
            max_open_files: self.max_open_files,
        };
        let copied = match sync_tree(&project.work_dir, &project.out_dir, &sync_options).await {
            Ok(report) => {
                tracing::info!(
                    project = %project.name,
                    copied = report.copied(),
                    unchanged = report.unchanged(),
                    failed = report.failed(),
                    "sync finished",
                );
                report.copied()
            }
            Err(err) => {
                tracing::error!(project = %project.name, error = %err, "sync failed");
                0
            }
        };

        guard.enter(Phase::Comparing);
        status.send("Checking manifest...");
        let previous = publish::read_published(&project).await;
        if publish::is_unchanged(previous.as_deref(), &manifest_text) {
            status.send("No change detected, ignoring.");
            return Ok(RunOutcome::Unchanged { copied });
        }

        guard.enter(Phase::Persisting);
        status.send("Saving manifest...");
        let persisted =
            publish::write_manifest(&project, &manifest_text, chrono::Utc::now().timestamp()).await;

        status.send("Updating version.txt...");
        let version = match self.revision(&project).await {
            Ok(version) => {
                publish::write_version(&project, &version).await;
                Some(version)
            }
            Err(err) => {
                tracing::error!(project = %project.name, error = %err, "unable to read revision");
                None
            }
        };

        status.send("Complete.");
        Ok(RunOutcome::Published {
            version,
            copied,
            history_path: persisted.history_path,
        })
    }

    async fn fetch(&self, project: &Project) -> Result<(), VcsError> {
        let vcs = self.vcs.clone();
        let project = project.clone();
        tokio::task::spawn_blocking(move || {
            vcs.ensure_cloned(&project)?;
            vcs.pull(&project).map(|_| ())
        })
        .await
        .map_err(|err| VcsError::Aborted(err.to_string()))?
    }

    async fn revision(&self, project: &Project) -> Result<String, VcsError> {
        let vcs = self.vcs.clone();
        let project = project.clone();
        tokio::task::spawn_blocking(move || vcs.current_revision(&project))
            .await
            .map_err(|err| VcsError::Aborted(err.to_string()))?
    }
}
