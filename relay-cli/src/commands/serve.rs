//! `relay serve`: run the update server in the foreground.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use relay_daemon::{start_blocking, LogFormat};

use super::load_config;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Skip the startup pass that updates every project once.
    #[arg(long)]
    pub no_bootstrap: bool,

    /// Write the log file as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

impl ServeArgs {
    pub fn run(self, config_path: Option<&Path>) -> Result<()> {
        let mut config = load_config(config_path)?;
        if self.no_bootstrap {
            config.bootstrap = false;
        }
        let format = if self.log_json {
            LogFormat::Json
        } else {
            LogFormat::Text
        };
        start_blocking(config, format).context("server exited with error")
    }
}
