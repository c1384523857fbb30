//! `relay manifest <dir>`: print or write the checksum manifest of a tree.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use relay_core::{ConfigError, InclusionRules};
use relay_sync::{build_manifest, BuildOptions};

use super::runtime;

#[derive(Args, Debug)]
pub struct ManifestArgs {
    /// Root of the tree to describe.
    pub dir: PathBuf,

    /// Include every file except the manifest itself.
    #[arg(long)]
    pub base: bool,

    /// Write to this file instead of stdout.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

impl ManifestArgs {
    pub fn run(self, config_path: Option<&Path>) -> Result<()> {
        // Rules come from the config when one is available; defaults otherwise.
        let (rules, max_open_files) = match relay_core::config::load(config_path) {
            Ok(config) => (config.rules, config.max_open_files),
            Err(ConfigError::ConfigNotFound { .. }) if config_path.is_none() => (
                InclusionRules::default(),
                relay_core::config::DEFAULT_MAX_OPEN_FILES,
            ),
            Err(err) => return Err(err).context("failed to load configuration"),
        };
        let options = BuildOptions {
            base_mode: self.base,
            max_open_files,
        };

        let manifest = runtime()?
            .block_on(build_manifest(&self.dir, &rules, &options))
            .with_context(|| format!("failed to build manifest for {}", self.dir.display()))?;
        let text = manifest.render();

        match self.output {
            Some(path) => {
                std::fs::write(&path, &text)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("wrote {} entries to {}", manifest.len(), path.display());
            }
            None => println!("{text}"),
        }
        Ok(())
    }
}
