//! `relay sync <src> <dst>`: mirror a tree, copying only files that differ.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use relay_sync::{sync_tree, FileAction, SyncOptions, SyncReport};

use super::runtime;

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Source tree.
    pub src: PathBuf,

    /// Destination tree, created if missing.
    pub dst: PathBuf,

    /// Show what would be copied without writing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Show unchanged files too.
    #[arg(long, short)]
    pub verbose: bool,
}

impl SyncArgs {
    pub fn run(self, config_path: Option<&Path>) -> Result<()> {
        let max_open_files = config_path
            .map(|path| relay_core::config::load(Some(path)))
            .transpose()
            .context("failed to load configuration")?
            .map(|config| config.max_open_files)
            .unwrap_or(relay_core::config::DEFAULT_MAX_OPEN_FILES);
        let options = SyncOptions {
            dry_run: self.dry_run,
            max_open_files,
        };

        let report = runtime()?
            .block_on(sync_tree(&self.src, &self.dst, &options))
            .with_context(|| format!("sync failed for {}", self.src.display()))?;
        print_report(&report, self.dry_run, self.verbose);

        if report.failed() > 0 {
            anyhow::bail!("{} file(s) could not be copied", report.failed());
        }
        Ok(())
    }
}

fn print_report(report: &SyncReport, dry_run: bool, verbose: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };
    if report.copied() == 0 && report.failed() == 0 {
        println!("{prefix}✓ nothing to do ({} unchanged)", report.unchanged());
        return;
    }

    println!(
        "{prefix}✓ synced ({} copied, {} unchanged, {} failed)",
        report.copied(),
        report.unchanged(),
        report.failed()
    );
    for action in &report.actions {
        match action {
            FileAction::Copied { path, reason } => println!("  ✎  {path} ({reason})"),
            FileAction::WouldCopy { path, reason } => println!("  ~  {path} ({reason})"),
            FileAction::Failed { path } => println!("  ✗  {path}"),
            FileAction::Unchanged { path } if verbose => println!("  ·  {path}"),
            FileAction::Unchanged { .. } => {}
        }
    }
}
