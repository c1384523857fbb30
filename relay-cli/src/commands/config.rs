//! `relay config`: create, show and extend the configuration file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use relay_core::{config, ProjectConfig, ProjectName};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write a default configuration if none exists.
    Init(InitArgs),
    /// Print the resolved configuration.
    Show,
    /// Add a project to the configuration.
    AddProject(AddProjectArgs),
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Shared secret for trigger requests.
    #[arg(long, default_value = "")]
    pub password: String,
}

#[derive(Args, Debug)]
pub struct AddProjectArgs {
    /// Project name; also names the remote repository.
    pub name: String,

    /// Checkout directory (default: `<work_root>/<name>`).
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Publish directory (default: `<out_root>/<name>`).
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
}

pub fn run(command: ConfigCommand, config_path: Option<&Path>) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config::config_path_at(&home));

    match command {
        ConfigCommand::Init(args) => {
            let existed = path.exists();
            config::init_at(&home, &path, &args.password)
                .with_context(|| format!("failed to initialize {}", path.display()))?;
            if existed {
                println!("config already exists: {}", path.display());
            } else {
                println!("✓ wrote {}", path.display());
            }
        }
        ConfigCommand::Show => {
            let mut resolved = config::load_at(&home, &path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            resolved.apply_env();
            if !resolved.password.is_empty() {
                resolved.password = "********".to_string();
            }
            print!(
                "{}",
                serde_yaml::to_string(&resolved).context("failed to render configuration")?
            );
        }
        ConfigCommand::AddProject(args) => {
            let name = ProjectName::from(args.name.as_str());
            let updated = config::add_project_at(
                &home,
                &path,
                ProjectConfig {
                    name: name.clone(),
                    work_dir: args.work_dir,
                    out_dir: args.out_dir,
                },
            )
            .with_context(|| format!("failed to add project '{name}'"))?;
            let project = updated
                .project(name.as_str())
                .with_context(|| format!("project '{name}' missing after save"))?;
            println!("✓ project '{name}'");
            println!("  work_dir: {}", project.work_dir.display());
            println!("  out_dir:  {}", project.out_dir.display());
            println!("  remote:   {}", updated.remote_url(&name));
        }
    }
    Ok(())
}
