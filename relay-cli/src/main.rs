//! Relay: game-script update server and publishing tools.
//!
//! # Usage
//!
//! ```text
//! relay serve [--no-bootstrap] [--log-json]
//! relay update <project>
//! relay manifest <dir> [--base] [--output <file>]
//! relay sync <src> <dst> [--dry-run]
//! relay verify <dir> [--manifest <file>]
//! relay diff <project>
//! relay status [--json]
//! relay trigger <project> [--url <url>] [--password <pw>]
//! relay health [--url <url>]
//! relay daemon status|stop|logs
//! relay config init|show|add-project
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigCommand, daemon::DaemonCommand, diff::DiffArgs, manifest::ManifestArgs,
    serve::ServeArgs, status::StatusArgs, sync::SyncArgs, trigger::HealthArgs,
    trigger::TriggerArgs, update::UpdateArgs, verify::VerifyArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "relay",
    version,
    about = "Publish version-controlled script trees with checksum manifests",
    long_about = None,
)]
struct Cli {
    /// Configuration file (default: ~/.relay/config.yaml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the update server: bootstrap pass, HTTP trigger and control socket.
    Serve(ServeArgs),

    /// Run one project's update in the foreground.
    Update(UpdateArgs),

    /// Print the checksum manifest of a directory.
    Manifest(ManifestArgs),

    /// Mirror one tree into another, copying only changed files.
    Sync(SyncArgs),

    /// Check a published directory against its manifest.
    Verify(VerifyArgs),

    /// Show how the published manifest would change for a project.
    Diff(DiffArgs),

    /// Show published state for every configured project.
    Status(StatusArgs),

    /// Ask a running server to update a project and stream its progress.
    Trigger(TriggerArgs),

    /// Check that a running server answers HTTP.
    Health(HealthArgs),

    /// Talk to a running server over its control socket.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Create, inspect or extend the configuration file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Serve(args) => args.run(config),
        Commands::Update(args) => args.run(config),
        Commands::Manifest(args) => args.run(config),
        Commands::Sync(args) => args.run(config),
        Commands::Verify(args) => args.run(config),
        Commands::Diff(args) => args.run(config),
        Commands::Status(args) => args.run(config),
        Commands::Trigger(args) => args.run(config),
        Commands::Health(args) => args.run(config),
        Commands::Daemon { command } => commands::daemon::run(command, config),
        Commands::Config { command } => commands::config::run(command, config),
    }
}
