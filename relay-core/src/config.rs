//! YAML configuration for relay.
//!
//! # Storage layout
//!
//! ```text
//! ~/.relay/
//!   config.yaml       (mode 0600, holds the trigger password)
//!   relay.sock        (control socket, created by the daemon)
//!   logs/relay.log
//!   work/<project>/   (default checkouts)
//!   out/<project>/    (default published trees)
//! ```
//!
//! # API pattern
//!
//! Every function that touches the filesystem has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::{InclusionRules, Project, ProjectName};

/// Environment variable that overrides the configured trigger password.
pub const PASSWORD_ENV: &str = "RELAY_PASSWORD";

pub const DEFAULT_LISTEN: &str = "0.0.0.0:4003";
pub const DEFAULT_REMOTE_URL_TEMPLATE: &str = "https://github.com/DashingStrike/Automato-{name}.git";
pub const DEFAULT_MAX_OPEN_FILES: usize = 64;

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.relay/`
pub fn relay_root(home: &Path) -> PathBuf {
    home.join(".relay")
}

/// `<home>/.relay/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    relay_root(home).join("config.yaml")
}

/// `config_path_at` convenience wrapper.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_path_at(&home()?))
}

// ---------------------------------------------------------------------------
// 2. Types
// ---------------------------------------------------------------------------

/// One configured project. Paths default to `<work_root>/<name>` and
/// `<out_root>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: ProjectName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,
}

impl From<&str> for ProjectConfig {
    fn from(name: &str) -> Self {
        Self {
            name: ProjectName::from(name),
            work_dir: None,
            out_dir: None,
        }
    }
}

/// Fully resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    pub listen: SocketAddr,
    pub password: String,
    pub work_root: PathBuf,
    pub out_root: PathBuf,
    pub log_file: PathBuf,
    pub control_socket: PathBuf,
    /// `{name}` is replaced with the project name.
    pub remote_url_template: String,
    pub git_bin: String,
    /// Run every project once, in order, before the listener starts.
    pub bootstrap: bool,
    pub max_open_files: usize,
    pub projects: Vec<ProjectConfig>,
    pub rules: InclusionRules,
}

/// On-disk shape: every field optional, home-relative defaults filled in by
/// [`RelayConfig::resolve`].
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    listen: Option<SocketAddr>,
    password: Option<String>,
    work_root: Option<PathBuf>,
    out_root: Option<PathBuf>,
    log_file: Option<PathBuf>,
    control_socket: Option<PathBuf>,
    remote_url_template: Option<String>,
    git_bin: Option<String>,
    bootstrap: Option<bool>,
    max_open_files: Option<usize>,
    #[serde(default)]
    projects: Vec<ProjectConfig>,
    #[serde(default)]
    rules: InclusionRules,
}

impl RelayConfig {
    /// Default configuration rooted at `home`, with no projects.
    pub fn default_at(home: &Path) -> Self {
        Self::resolve(RawConfig::default(), home)
    }

    fn resolve(raw: RawConfig, home: &Path) -> Self {
        let root = relay_root(home);
        Self {
            listen: raw.listen.unwrap_or_else(default_listen),
            password: raw.password.unwrap_or_default(),
            work_root: raw.work_root.unwrap_or_else(|| root.join("work")),
            out_root: raw.out_root.unwrap_or_else(|| root.join("out")),
            log_file: raw
                .log_file
                .unwrap_or_else(|| root.join("logs").join("relay.log")),
            control_socket: raw
                .control_socket
                .unwrap_or_else(|| root.join("relay.sock")),
            remote_url_template: raw
                .remote_url_template
                .unwrap_or_else(|| DEFAULT_REMOTE_URL_TEMPLATE.to_string()),
            git_bin: raw.git_bin.unwrap_or_else(|| "git".to_string()),
            bootstrap: raw.bootstrap.unwrap_or(true),
            max_open_files: raw.max_open_files.unwrap_or(DEFAULT_MAX_OPEN_FILES),
            projects: raw.projects,
            rules: raw.rules,
        }
    }

    /// Resolve every configured project to concrete paths, in file order.
    pub fn projects(&self) -> Vec<Project> {
        self.projects
            .iter()
            .map(|p| Project {
                name: p.name.clone(),
                work_dir: p
                    .work_dir
                    .clone()
                    .unwrap_or_else(|| self.work_root.join(&p.name.0)),
                out_dir: p
                    .out_dir
                    .clone()
                    .unwrap_or_else(|| self.out_root.join(&p.name.0)),
            })
            .collect()
    }

    /// Look up one project by exact name.
    pub fn project(&self, name: &str) -> Option<Project> {
        self.projects().into_iter().find(|p| p.name.0 == name)
    }

    /// Remote URL for `name` under the configured template.
    pub fn remote_url(&self, name: &ProjectName) -> String {
        name.remote_url(&self.remote_url_template)
    }

    /// Replace the password with `$RELAY_PASSWORD` when it is set.
    pub fn apply_env(&mut self) {
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            self.password = password;
        }
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_open_files == 0 {
            return Err(ConfigError::Invalid(
                "max_open_files must be at least 1".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for project in self.projects() {
            if !project.name.is_valid() {
                return Err(ConfigError::Invalid(format!(
                    "project name {:?} must be non-empty and must not contain '/', '\\' or '..'",
                    project.name.as_str()
                )));
            }
            if !seen.insert(project.name.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate project '{}'",
                    project.name
                )));
            }
            if project.work_dir == project.out_dir {
                return Err(ConfigError::Invalid(format!(
                    "project '{}' uses {} as both work_dir and out_dir",
                    project.name,
                    project.work_dir.display()
                )));
            }
        }
        Ok(())
    }
}

fn default_listen() -> SocketAddr {
    // Constant literal; parse cannot fail.
    DEFAULT_LISTEN
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 4003)))
}

// ---------------------------------------------------------------------------
// 3. Load
// ---------------------------------------------------------------------------

/// Load and validate the config at `path`, filling defaults relative to `home`.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path, path: &Path) -> Result<RelayConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let raw: RawConfig = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    let config = RelayConfig::resolve(raw, home);
    config.validate()?;
    Ok(config)
}

/// Load from `path` (or `~/.relay/config.yaml`) and apply `$RELAY_PASSWORD`.
pub fn load(path: Option<&Path>) -> Result<RelayConfig, ConfigError> {
    let home = home()?;
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config_path_at(&home));
    let mut config = load_at(&home, &path)?;
    config.apply_env();
    Ok(config)
}

// ---------------------------------------------------------------------------
// 4. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save `config` to `path`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(path: &Path, config: &RelayConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let tmp_path = path.with_extension("yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// 5. Init / add project
// ---------------------------------------------------------------------------

/// Write a default config at `path` if none exists.
///
/// Idempotent: an existing file is loaded and returned unchanged.
pub fn init_at(home: &Path, path: &Path, password: &str) -> Result<RelayConfig, ConfigError> {
    if path.exists() {
        return load_at(home, path);
    }
    let mut config = RelayConfig::default_at(home);
    config.password = password.to_string();
    save_at(path, &config)?;
    Ok(config)
}

/// Append a project to the config at `path`.
///
/// Idempotent: adding an existing name returns the config unchanged.
pub fn add_project_at(
    home: &Path,
    path: &Path,
    project: ProjectConfig,
) -> Result<RelayConfig, ConfigError> {
    let mut config = load_at(home, path)?;
    if config.projects.iter().any(|p| p.name == project.name) {
        return Ok(config);
    }
    config.projects.push(project);
    config.validate()?;
    save_at(path, &config)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
