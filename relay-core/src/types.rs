//! Domain types for relay.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! All types are serializable/deserializable via serde + serde_yaml.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed project name. Unique within a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectName(pub String);

impl ProjectName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Expand `{name}` in a remote URL template.
    pub fn remote_url(&self, template: &str) -> String {
        template.replace("{name}", &self.0)
    }

    /// A name must be usable as a single directory component and inside a URL.
    pub fn is_valid(&self) -> bool {
        let name = self.0.as_str();
        !name.trim().is_empty()
            && name != "."
            && !name.contains("..")
            && !name.contains(['/', '\\'])
    }
}

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProjectName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

/// A named unit of synchronization: one version-controlled checkout paired
/// with one published output tree.
///
/// Built once from configuration; both paths are stable for the lifetime of
/// the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: ProjectName,
    /// Local checkout the version-control client updates.
    pub work_dir: PathBuf,
    /// Public tree the synchronizer publishes into.
    pub out_dir: PathBuf,
}

impl Project {
    /// Canonical manifest path inside the published tree.
    pub fn manifest_path(&self) -> PathBuf {
        self.out_dir.join(MANIFEST_FILE)
    }

    /// Append-only history path for a manifest published at `unix_seconds`.
    pub fn manifest_history_path(&self, unix_seconds: i64) -> PathBuf {
        self.out_dir.join(format!("{MANIFEST_FILE}.{unix_seconds}"))
    }

    /// Version marker path inside the published tree.
    pub fn version_path(&self) -> PathBuf {
        self.out_dir.join(VERSION_FILE)
    }
}

pub const MANIFEST_FILE: &str = "manifest.txt";
pub const VERSION_FILE: &str = "version.txt";

// ---------------------------------------------------------------------------
// Inclusion rules
// ---------------------------------------------------------------------------

/// A single file admitted by name when it sits directly inside `dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedFile {
    pub dir: String,
    pub file: String,
}

/// Files with `extension` admitted when they sit directly inside `dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDir {
    pub dir: String,
    pub extension: String,
}

/// Which files the manifest builder checksums and publishes.
///
/// A file is included when any rule admits it; see `relay_sync::rules` for
/// the evaluation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InclusionRules {
    /// Binary asset extensions, without the dot, compared case-insensitively.
    pub asset_extensions: Vec<String>,
    /// Directory name whose contents are always included.
    pub script_dir: String,
    pub named_files: Vec<NamedFile>,
    pub text_dirs: Vec<TextDir>,
    /// Dot-prefixed names the manifest walk still descends into or includes.
    pub hidden_allow: Vec<String>,
    /// Skipped without an audit log line.
    pub silent_skips: Vec<String>,
    /// The one file name base mode leaves out.
    pub base_exclude: String,
}

impl Default for InclusionRules {
    fn default() -> Self {
        Self {
            asset_extensions: vec!["png".to_string(), "wav".to_string()],
            script_dir: "scripts".to_string(),
            named_files: vec![NamedFile {
                dir: "data".to_string(),
                file: "charTemplate.txt".to_string(),
            }],
            text_dirs: vec![TextDir {
                dir: "ATITD".to_string(),
                extension: "txt".to_string(),
            }],
            hidden_allow: vec![".luacheckrc".to_string()],
            silent_skips: vec!["README.md".to_string(), "LICENSE".to_string()],
            base_exclude: MANIFEST_FILE.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(ProjectName::from("ATITD").to_string(), "ATITD");
    }

    #[test]
    fn project_artifact_paths() {
        let project = Project {
            name: ProjectName::from("common"),
            work_dir: PathBuf::from("/srv/work/common"),
            out_dir: PathBuf::from("/srv/out/common"),
        };
        assert_eq!(
            project.manifest_path(),
            PathBuf::from("/srv/out/common/manifest.txt")
        );
        assert_eq!(
            project.manifest_history_path(1_700_000_000),
            PathBuf::from("/srv/out/common/manifest.txt.1700000000")
        );
        assert_eq!(
            project.version_path(),
            PathBuf::from("/srv/out/common/version.txt")
        );
    }

    #[test]
    fn partial_rules_yaml_keeps_defaults() {
        let rules: InclusionRules =
            serde_yaml::from_str("asset_extensions: [png, ogg]\n").expect("parse");
        assert_eq!(rules.asset_extensions, vec!["png", "ogg"]);
        assert_eq!(rules.script_dir, "scripts");
        assert_eq!(rules.hidden_allow, vec![".luacheckrc"]);
    }
}
