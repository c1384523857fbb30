//! `relay verify <dir>`: check a published tree against its manifest.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use relay_core::types::MANIFEST_FILE;
use relay_sync::{read_manifest, verify_tree, Discrepancy};

use super::runtime;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Published directory.
    pub dir: PathBuf,

    /// Manifest to check against (default: `<dir>/manifest.txt`).
    #[arg(long)]
    pub manifest: Option<PathBuf>,
}

impl VerifyArgs {
    pub fn run(self, _config_path: Option<&Path>) -> Result<()> {
        let manifest_path = self
            .manifest
            .clone()
            .unwrap_or_else(|| self.dir.join(MANIFEST_FILE));
        let manifest = read_manifest(&manifest_path)
            .with_context(|| format!("failed to read {}", manifest_path.display()))?;

        let report = runtime()?.block_on(verify_tree(
            &self.dir,
            &manifest,
            relay_core::config::DEFAULT_MAX_OPEN_FILES,
        ));

        if report.is_clean() {
            println!("{} {} files match", "✓".green(), report.checked);
            return Ok(());
        }

        for discrepancy in &report.discrepancies {
            match discrepancy {
                Discrepancy::Missing { path } => println!("  {}  {path}", "missing".red()),
                Discrepancy::SizeMismatch {
                    path,
                    expected,
                    actual,
                } => println!("  {}  {path} ({expected} → {actual} bytes)", "size".yellow()),
                Discrepancy::CrcMismatch { path, .. } => {
                    println!("  {}  {path}", "crc".yellow())
                }
            }
        }
        anyhow::bail!(
            "{} of {} files do not match {}",
            report.discrepancies.len(),
            report.checked,
            manifest_path.display()
        )
    }
}
