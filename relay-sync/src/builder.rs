//! Checksum manifest builder.
//!
//! Walks a tree, applies the inclusion predicate, reads each included file
//! once and records its CRC-32 and byte length. Discovery and reads run
//! concurrently; the only ordering guarantee is the sort applied to the final
//! [`Manifest`].

use std::path::Path;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use relay_core::{config::DEFAULT_MAX_OPEN_FILES, InclusionRules};

use crate::error::SyncError;
use crate::manifest::{Manifest, ManifestEntry};
use crate::rules::{classify, Candidate, Classification};
use crate::walk::{walk_tree, Visitor, WalkedFile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Snapshot every file except the manifest itself.
    pub base_mode: bool,
    pub max_open_files: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            base_mode: false,
            max_open_files: DEFAULT_MAX_OPEN_FILES,
        }
    }
}

struct ManifestVisitor {
    rules: InclusionRules,
    base_mode: bool,
}

impl Visitor for ManifestVisitor {
    type Output = ManifestEntry;

    fn admit_hidden(&self, name: &str) -> bool {
        self.rules.hidden_allow.iter().any(|allowed| allowed == name)
    }

    fn visit_file(self: Arc<Self>, file: WalkedFile) -> BoxFuture<'static, Option<ManifestEntry>> {
        async move {
            let file_name = file.file_name();
            let parent_name = file.parent_name();
            let candidate = Candidate {
                relative: &file.relative,
                file_name: &file_name,
                parent_name: parent_name.as_deref(),
            };
            match classify(&self.rules, &candidate, self.base_mode) {
                Classification::Include(_) => {}
                Classification::SilentSkip => return None,
                Classification::Skip => {
                    tracing::info!("Skipping {}", file.relative);
                    return None;
                }
            }

            let data = match tokio::fs::read(&file.path).await {
                Ok(data) => data,
                Err(err) => {
                    tracing::warn!("unable to read {}: {}", file.path.display(), err);
                    return None;
                }
            };
            let mut entry = ManifestEntry::from_bytes(file.relative, &data);
            entry.modified = file.metadata.modified().ok();
            Some(entry)
        }
        .boxed()
    }
}

/// Build the manifest for the tree at `root`.
///
/// Fails only when `root` itself cannot be listed.
pub async fn build_manifest(
    root: &Path,
    rules: &InclusionRules,
    options: &BuildOptions,
) -> Result<Manifest, SyncError> {
    let visitor = Arc::new(ManifestVisitor {
        rules: rules.clone(),
        base_mode: options.base_mode,
    });
    let entries = walk_tree(root, visitor, options.max_open_files).await?;
    tracing::debug!("manifest for {}: {} entries", root.display(), entries.len());
    Ok(Manifest::from_entries(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, data: &[u8]) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }

    async fn build(root: &Path) -> Manifest {
        build_manifest(root, &InclusionRules::default(), &BuildOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn scenario_asset_and_script_included_readme_excluded() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.png", b"\x89PNG");
        write(tmp.path(), "readme.md", b"# hi");
        write(tmp.path(), "scripts/x.lua", b"print('x')");

        let manifest = build(tmp.path()).await;
        let paths: Vec<_> = manifest
            .entries()
            .iter()
            .map(|e| e.relative_path.as_str())
            .collect();
        assert_eq!(paths, vec!["a.png", "scripts/x.lua"]);
    }

    #[tokio::test]
    async fn size_and_crc_come_from_file_bytes() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "scripts/x.lua", b"hello world");

        let manifest = build(tmp.path()).await;
        let entry = manifest.get("scripts/x.lua").unwrap();
        assert_eq!(entry.size, 11);
        assert_eq!(entry.crc, crc32fast::hash(b"hello world"));
        assert!(entry.modified.is_some());
    }

    #[tokio::test]
    async fn hidden_allow_list_applies_to_manifest_walk() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "scripts/.luacheckrc", b"std = 'lua51'");
        write(tmp.path(), "scripts/.hidden.lua", b"--");
        write(tmp.path(), ".git/config", b"[core]");

        let manifest = build(tmp.path()).await;
        let paths: Vec<_> = manifest
            .entries()
            .iter()
            .map(|e| e.relative_path.as_str())
            .collect();
        assert_eq!(paths, vec!["scripts/.luacheckrc"]);
    }

    #[tokio::test]
    async fn base_mode_snapshots_everything_but_manifest() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "manifest.txt", b"Version 1");
        write(tmp.path(), "docs/guide.md", b"guide");
        write(tmp.path(), "README.md", b"readme");

        let options = BuildOptions {
            base_mode: true,
            ..BuildOptions::default()
        };
        let manifest = build_manifest(tmp.path(), &InclusionRules::default(), &options)
            .await
            .unwrap();
        let paths: Vec<_> = manifest
            .entries()
            .iter()
            .map(|e| e.relative_path.as_str())
            .collect();
        assert_eq!(paths, vec!["docs/guide.md", "README.md"]);
    }

    #[tokio::test]
    async fn project_root_name_admits_top_level_text() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("ATITD");
        write(&root, "carrot_config.txt", b"carrots=4");
        write(&root, "notes/other.txt", b"no");

        let manifest = build(&root).await;
        assert_eq!(manifest.len(), 1);
        assert!(manifest.get("carrot_config.txt").is_some());
    }

    #[tokio::test]
    async fn unreadable_root_fails() {
        let tmp = TempDir::new().unwrap();
        let result = build_manifest(
            &tmp.path().join("missing"),
            &InclusionRules::default(),
            &BuildOptions::default(),
        )
        .await;
        assert!(matches!(result, Err(SyncError::Io { .. })));
    }
}
