//! `relay trigger` and `relay health`: HTTP clients for a running server.

use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;

use super::load_config;

#[derive(Args, Debug)]
pub struct TriggerArgs {
    /// Project to update.
    pub project: String,

    /// Server base URL (default: derived from the configured listen address).
    #[arg(long)]
    pub url: Option<String>,

    /// Shared secret (default: the configured password).
    #[arg(long)]
    pub password: Option<String>,
}

impl TriggerArgs {
    pub fn run(self, config_path: Option<&Path>) -> Result<()> {
        let (url, configured_password) = match (&self.url, &self.password) {
            (Some(url), Some(_)) => (url.clone(), None),
            _ => {
                let config = load_config(config_path)?;
                (
                    self.url.clone().unwrap_or_else(|| local_url(&config.listen)),
                    Some(config.password),
                )
            }
        };
        let password = self
            .password
            .clone()
            .or(configured_password)
            .unwrap_or_default();

        let response = ureq::post(&url)
            .query("password", &password)
            .query("project", &self.project)
            .call();
        let response = match response {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                anyhow::bail!("server answered {code}: {}", body.trim());
            }
            Err(err) => return Err(err).with_context(|| format!("failed to reach {url}")),
        };

        // Status lines arrive as `<message>\r\n\r\n` while the run progresses.
        let mut failed = None;
        for line in BufReader::new(response.into_reader()).lines() {
            let line = line.context("failed to read status stream")?;
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            println!("{line}");
            if line.starts_with("Update failed:") {
                failed = Some(line.to_string());
            }
        }

        match failed {
            Some(message) => anyhow::bail!("{message}"),
            None => Ok(()),
        }
    }
}

#[derive(Args, Debug)]
pub struct HealthArgs {
    /// Server base URL (default: derived from the configured listen address).
    #[arg(long)]
    pub url: Option<String>,
}

impl HealthArgs {
    pub fn run(self, config_path: Option<&Path>) -> Result<()> {
        let base = match self.url {
            Some(url) => url,
            None => local_url(&load_config(config_path)?.listen),
        };
        let url = format!("{}/health", base.trim_end_matches('/'));
        let body: Value = ureq::get(&url)
            .call()
            .with_context(|| format!("failed to reach {url}"))?
            .into_json()
            .context("health response was not JSON")?;
        println!("{}", serde_json::to_string_pretty(&body)?);
        Ok(())
    }
}

/// URL for a listener bound to `addr`, using loopback for wildcard binds.
fn local_url(addr: &std::net::SocketAddr) -> String {
    let host = if addr.ip().is_unspecified() {
        "127.0.0.1".to_string()
    } else {
        addr.ip().to_string()
    };
    format!("http://{host}:{}/", addr.port())
}
