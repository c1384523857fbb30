//! `relay update <project>`: one update run, progress printed as it happens.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tokio::sync::mpsc;

use relay_daemon::{GitVcs, Orchestrator, RunOutcome, StatusSink};

use super::{load_config, runtime};

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Project to update.
    pub project: String,
}

impl UpdateArgs {
    pub fn run(self, config_path: Option<&Path>) -> Result<()> {
        let config = load_config(config_path)?;
        let orchestrator = Orchestrator::from_config(&config, Arc::new(GitVcs::from_config(&config)));

        let name = self.project.clone();
        let orchestrator = &orchestrator;
        let outcome = runtime()?.block_on(async move {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let status = StatusSink::new(name.as_str().into(), Some(tx));
            // The printer stops once the sink is dropped.
            let run = async move {
                let result = orchestrator.run_update(&name, &status).await;
                drop(status);
                result
            };
            let print = async {
                while let Some(message) = rx.recv().await {
                    println!("{message}");
                }
            };
            let (result, ()) = tokio::join!(run, print);
            result
        });

        match outcome.with_context(|| format!("update failed for '{}'", self.project))? {
            RunOutcome::Published {
                version,
                copied,
                history_path,
            } => {
                println!(
                    "{} '{}' published {} ({copied} copied)",
                    "✓".green(),
                    self.project,
                    version.as_deref().unwrap_or("unknown revision"),
                );
                if let Some(path) = history_path {
                    println!("  history: {}", path.display());
                }
            }
            RunOutcome::Unchanged { copied } => {
                println!(
                    "{} '{}' unchanged ({copied} copied)",
                    "·".bright_black(),
                    self.project
                );
            }
        }
        Ok(())
    }
}
