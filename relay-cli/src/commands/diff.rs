//! `relay diff <project>`: show how publishing now would change the manifest.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use relay_sync::{diff_project, BuildOptions};

use super::{load_config, runtime};

/// Arguments for `relay diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Project name to diff.
    pub project: String,
}

impl DiffArgs {
    pub fn run(self, config_path: Option<&Path>) -> Result<()> {
        let config = load_config(config_path)?;
        let project = config
            .project(&self.project)
            .with_context(|| format!("unknown project '{}'", self.project))?;
        let options = BuildOptions {
            base_mode: false,
            max_open_files: config.max_open_files,
        };

        let diff = runtime()?
            .block_on(diff_project(&project, &config.rules, &options))
            .with_context(|| format!("diff failed for '{}'", self.project))?;

        let Some(unified) = diff.unified_diff else {
            println!("No differences for '{}'.", diff.project);
            return Ok(());
        };

        print!("{unified}");
        if !unified.ends_with('\n') {
            println!();
        }
        println!(
            "{} added, {} removed, {} changed",
            diff.added.len(),
            diff.removed.len(),
            diff.changed.len()
        );
        Ok(())
    }
}
