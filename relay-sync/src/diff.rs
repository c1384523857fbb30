//! Dry-run manifest diff support for `relay diff`.

use std::collections::BTreeMap;

use relay_core::{InclusionRules, Project, ProjectName};
use similar::TextDiff;

use crate::builder::{build_manifest, BuildOptions};
use crate::manifest::{Manifest, ManifestEntry};
use crate::publish::read_published;
use crate::SyncError;

/// What publishing the current work tree would change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDiff {
    pub project: ProjectName,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
    /// `None` when the rendered manifests are identical.
    pub unified_diff: Option<String>,
}

impl ManifestDiff {
    pub fn is_empty(&self) -> bool {
        self.unified_diff.is_none()
    }
}

/// Build the manifest for `project.work_dir` and compare it to the published
/// one. No files are written.
pub async fn diff_project(
    project: &Project,
    rules: &InclusionRules,
    options: &BuildOptions,
) -> Result<ManifestDiff, SyncError> {
    let manifest = build_manifest(&project.work_dir, rules, options).await?;
    let previous = read_published(project).await.unwrap_or_default();
    Ok(diff_manifests(project.name.clone(), &previous, &manifest.render()))
}

/// Compare two rendered manifests. Unparseable old text counts as empty.
pub fn diff_manifests(project: ProjectName, old_text: &str, new_text: &str) -> ManifestDiff {
    if old_text == new_text {
        return ManifestDiff {
            project,
            added: vec![],
            removed: vec![],
            changed: vec![],
            unified_diff: None,
        };
    }

    let old = index(old_text);
    let new = index(new_text);
    let added = new
        .keys()
        .filter(|path| !old.contains_key(*path))
        .cloned()
        .collect();
    let removed = old
        .keys()
        .filter(|path| !new.contains_key(*path))
        .cloned()
        .collect();
    let changed = new
        .iter()
        .filter(|(path, entry)| {
            old.get(*path)
                .is_some_and(|before| before.crc != entry.crc || before.size != entry.size)
        })
        .map(|(path, _)| path.clone())
        .collect();

    let unified = TextDiff::from_lines(old_text, new_text)
        .unified_diff()
        .header("a/manifest.txt", "b/manifest.txt")
        .context_radius(5)
        .to_string();

    ManifestDiff {
        project,
        added,
        removed,
        changed,
        unified_diff: Some(unified),
    }
}

fn index(text: &str) -> BTreeMap<String, ManifestEntry> {
    Manifest::parse(text)
        .map(|manifest| {
            manifest
                .entries()
                .iter()
                .map(|entry| (entry.relative_path.clone(), entry.clone()))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn manifest(entries: &[(&str, &[u8])]) -> String {
        Manifest::from_entries(
            entries
                .iter()
                .map(|(path, data)| ManifestEntry::from_bytes(*path, data))
                .collect(),
        )
        .render()
    }

    #[test]
    fn identical_manifests_have_no_diff() {
        let text = manifest(&[("a.png", b"a")]);
        let diff = diff_manifests(ProjectName::from("p"), &text, &text);
        assert!(diff.is_empty());
    }

    #[test]
    fn classifies_added_removed_changed() {
        let old = manifest(&[("a.png", b"a"), ("b.png", b"b")]);
        let new = manifest(&[("a.png", b"A"), ("c.png", b"c")]);
        let diff = diff_manifests(ProjectName::from("p"), &old, &new);

        assert_eq!(diff.added, vec!["c.png"]);
        assert_eq!(diff.removed, vec!["b.png"]);
        assert_eq!(diff.changed, vec!["a.png"]);
        let unified = diff.unified_diff.expect("diff text");
        assert!(unified.contains("--- a/manifest.txt"));
        assert!(unified.contains("+    filename \"c.png\""));
    }

    #[test]
    fn first_publish_diffs_against_nothing() {
        let new = manifest(&[("a.png", b"a")]);
        let diff = diff_manifests(ProjectName::from("p"), "", &new);
        assert_eq!(diff.added, vec!["a.png"]);
        assert!(diff.removed.is_empty());
    }

    #[tokio::test]
    async fn diff_project_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let project = Project {
            name: ProjectName::from("common"),
            work_dir: tmp.path().join("work"),
            out_dir: tmp.path().join("out"),
        };
        fs::create_dir_all(project.work_dir.join("scripts")).unwrap();
        fs::create_dir_all(&project.out_dir).unwrap();
        fs::write(project.work_dir.join("scripts/x.lua"), b"x").unwrap();

        let diff = diff_project(&project, &InclusionRules::default(), &BuildOptions::default())
            .await
            .unwrap();
        assert_eq!(diff.added, vec!["scripts/x.lua"]);
        assert!(!project.manifest_path().exists(), "diff must not publish");
    }
}
