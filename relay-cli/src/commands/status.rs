//! `relay status`: published state of every configured project.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use relay_core::Project;
use relay_sync::{publish::read_published, Manifest};

use super::{load_config, runtime};

/// Arguments for `relay status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize)]
struct ProjectStatus {
    project: String,
    checked_out: bool,
    version: Option<String>,
    files: Option<usize>,
    history: usize,
    last_published_at: Option<String>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "project")]
    project: String,
    #[tabled(rename = "checkout")]
    checkout: String,
    #[tabled(rename = "version")]
    version: String,
    #[tabled(rename = "files")]
    files: String,
    #[tabled(rename = "history")]
    history: usize,
    #[tabled(rename = "last published")]
    last_published: String,
}

impl StatusArgs {
    pub fn run(self, config_path: Option<&Path>) -> Result<()> {
        let config = load_config(config_path)?;
        let rt = runtime()?;

        let mut rows = Vec::new();
        for project in config.projects() {
            let row = rt
                .block_on(project_status(&project))
                .with_context(|| format!("status check failed for '{}'", project.name))?;
            rows.push(row);
        }

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_table(rows);
        Ok(())
    }
}

async fn project_status(project: &Project) -> Result<ProjectStatus> {
    let files = read_published(project)
        .await
        .and_then(|text| Manifest::parse(&text).ok())
        .map(|manifest| manifest.len());
    let version = tokio::fs::read_to_string(project.version_path())
        .await
        .ok()
        .map(|v| v.trim().to_string());

    let (history, newest) = history_snapshots(project)?;
    let last_published_at = newest
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|at| at.to_rfc3339());

    Ok(ProjectStatus {
        project: project.name.to_string(),
        checked_out: project.work_dir.is_dir(),
        version,
        files,
        history,
        last_published_at,
    })
}

/// Count `manifest.txt.<unix-seconds>` files and return the newest timestamp.
fn history_snapshots(project: &Project) -> Result<(usize, Option<i64>)> {
    let entries = match std::fs::read_dir(&project.out_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok((0, None)),
        Err(err) => {
            return Err(err).with_context(|| format!("read {}", project.out_dir.display()))
        }
    };

    let prefix = format!("{}.", relay_core::types::MANIFEST_FILE);
    let stamps: Vec<i64> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_prefix(&prefix))
                .and_then(|stamp| stamp.parse().ok())
        })
        .collect();
    Ok((stamps.len(), stamps.iter().copied().max()))
}

fn print_table(rows: Vec<ProjectStatus>) {
    println!(
        "Relay v{} | {} projects",
        env!("CARGO_PKG_VERSION"),
        rows.len()
    );
    if rows.is_empty() {
        println!("No projects configured. Run `relay config add-project <name>`.");
        return;
    }

    let never = || "never".bright_black().to_string();
    let table_rows: Vec<StatusTableRow> = rows
        .into_iter()
        .map(|row| StatusTableRow {
            project: row.project,
            checkout: if row.checked_out {
                "yes".green().to_string()
            } else {
                "missing".red().to_string()
            },
            version: row.version.unwrap_or_else(never),
            files: row
                .files
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
            history: row.history,
            last_published: row.last_published_at.unwrap_or_else(never),
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");
}
