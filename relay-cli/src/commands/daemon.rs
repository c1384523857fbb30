//! `relay daemon`: control-socket client and log viewer for a running server.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use relay_daemon::{request_status, request_stop, DaemonError};

use super::load_config;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Query server runtime status over the control socket.
    Status,
    /// Request graceful server shutdown over the control socket.
    Stop,
    /// Print recent log lines.
    Logs(DaemonLogsArgs),
}

#[derive(Args, Debug)]
pub struct DaemonLogsArgs {
    /// Number of trailing lines to show.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,
}

pub fn run(command: DaemonCommand, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let socket = config.control_socket.as_path();

    match command {
        DaemonCommand::Status => match request_status(socket) {
            Ok(status) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status)
                        .context("failed to render server status JSON")?
                );
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let payload = serde_json::json!({
                    "running": false,
                    "socket": socket.display().to_string(),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payload)
                        .context("failed to render server status JSON")?
                );
            }
            Err(err) => return Err(err).context("failed to query server status"),
        },
        DaemonCommand::Stop => match request_stop(socket) {
            Ok(()) => println!("server stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => println!("server is not running"),
            Err(err) => return Err(err).context("failed to stop server"),
        },
        DaemonCommand::Logs(args) => {
            print_tail(&config.log_file, args.lines).context("failed to read log file")?;
        }
    }

    Ok(())
}

fn print_tail(path: &Path, lines: usize) -> Result<()> {
    if !path.exists() {
        println!("log file not found: {}", path.display());
        return Ok(());
    }

    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut tail = VecDeque::<String>::new();
    for line in reader.lines() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if tail.len() == lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    println!("==> {} <==", path.display());
    for line in tail {
        println!("{line}");
    }
    Ok(())
}
