//! relay core library: domain types, configuration persistence and errors.
//!
//! - [`types`]: newtypes, [`Project`] and [`InclusionRules`]
//! - [`error`]: [`ConfigError`]
//! - [`config`]: load / save / init

pub mod config;
pub mod error;
pub mod types;

pub use config::{ProjectConfig, RelayConfig};
pub use error::ConfigError;
pub use types::{InclusionRules, NamedFile, Project, ProjectName, TextDir};
