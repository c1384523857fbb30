pub mod config;
pub mod daemon;
pub mod diff;
pub mod manifest;
pub mod serve;
pub mod status;
pub mod sync;
pub mod trigger;
pub mod update;
pub mod verify;

use std::path::Path;

use anyhow::{Context, Result};
use relay_core::RelayConfig;

/// Load the configuration named by `--config`, or the default one.
pub fn load_config(path: Option<&Path>) -> Result<RelayConfig> {
    relay_core::config::load(path).context("failed to load configuration; run `relay config init` first")
}

/// Runtime for commands that drive async library code.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}
