//! Inclusion predicate: decides which files the manifest describes.

use std::path::Path;

use relay_core::InclusionRules;

/// Why a file was admitted. The first matching rule wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inclusion {
    Asset,
    Script,
    Base,
    NamedFile,
    TextDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Include(Inclusion),
    /// Expected non-published file (README, LICENSE); not worth a log line.
    SilentSkip,
    Skip,
}

/// What the predicate needs to know about one file.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    /// Root-relative path with `/` separators.
    pub relative: &'a str,
    pub file_name: &'a str,
    /// Name of the directory containing the file; the walk root's own name for
    /// top-level files.
    pub parent_name: Option<&'a str>,
}

pub fn classify(rules: &InclusionRules, candidate: &Candidate<'_>, base_mode: bool) -> Classification {
    let extension = Path::new(candidate.file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned());
    let has_extension = |wanted: &str| {
        extension
            .as_deref()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
    };
    let parent_is = |dir: &str| candidate.parent_name == Some(dir);

    if rules.asset_extensions.iter().any(|ext| has_extension(ext.as_str())) {
        return Classification::Include(Inclusion::Asset);
    }
    if parent_is(rules.script_dir.as_str()) || in_dir_segment(candidate.relative, &rules.script_dir) {
        return Classification::Include(Inclusion::Script);
    }
    if base_mode && candidate.file_name != rules.base_exclude {
        return Classification::Include(Inclusion::Base);
    }
    if rules
        .named_files
        .iter()
        .any(|named| parent_is(named.dir.as_str()) && candidate.file_name == named.file)
    {
        return Classification::Include(Inclusion::NamedFile);
    }
    if rules
        .text_dirs
        .iter()
        .any(|text| parent_is(text.dir.as_str()) && has_extension(text.extension.as_str()))
    {
        return Classification::Include(Inclusion::TextDir);
    }

    if rules
        .silent_skips
        .iter()
        .any(|name| name.eq_ignore_ascii_case(candidate.file_name))
    {
        Classification::SilentSkip
    } else {
        Classification::Skip
    }
}

/// Whether any directory segment of `relative` (not the file name) is `dir`.
fn in_dir_segment(relative: &str, dir: &str) -> bool {
    let mut segments: Vec<&str> = relative.split('/').collect();
    segments.pop();
    segments.iter().any(|segment| *segment == dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_path(relative: &str, root_name: &str, base_mode: bool) -> Classification {
        let (dirs, file_name) = match relative.rsplit_once('/') {
            Some((dirs, name)) => (Some(dirs), name),
            None => (None, relative),
        };
        let parent_name = match dirs {
            Some(dirs) => dirs.rsplit('/').next(),
            None => Some(root_name),
        };
        classify(
            &InclusionRules::default(),
            &Candidate {
                relative,
                file_name,
                parent_name,
            },
            base_mode,
        )
    }

    #[test]
    fn assets_match_case_insensitively() {
        assert_eq!(
            classify_path("images/Logo.PNG", "common", false),
            Classification::Include(Inclusion::Asset)
        );
        assert_eq!(
            classify_path("beep.wav", "common", false),
            Classification::Include(Inclusion::Asset)
        );
    }

    #[test]
    fn scripts_by_parent_or_ancestor_segment() {
        assert_eq!(
            classify_path("scripts/x.lua", "common", false),
            Classification::Include(Inclusion::Script)
        );
        assert_eq!(
            classify_path("scripts/lib/deep/y.lua", "common", false),
            Classification::Include(Inclusion::Script)
        );
        assert_eq!(
            classify_path("notscripts/y.lua", "common", false),
            Classification::Skip
        );
    }

    #[test]
    fn top_level_file_uses_root_name_as_parent() {
        assert_eq!(
            classify_path("carrot_config.txt", "ATITD", false),
            Classification::Include(Inclusion::TextDir)
        );
        assert_eq!(
            classify_path("carrot_config.txt", "ATITD9", false),
            Classification::Skip
        );
        assert_eq!(
            classify_path("tool.lua", "scripts", false),
            Classification::Include(Inclusion::Script)
        );
    }

    #[test]
    fn named_file_carve_out() {
        assert_eq!(
            classify_path("data/charTemplate.txt", "common", false),
            Classification::Include(Inclusion::NamedFile)
        );
        assert_eq!(
            classify_path("data/other.txt", "common", false),
            Classification::Skip
        );
    }

    #[test]
    fn base_mode_includes_everything_but_manifest() {
        assert_eq!(
            classify_path("docs/notes.md", "ref", true),
            Classification::Include(Inclusion::Base)
        );
        assert_eq!(
            classify_path("manifest.txt", "ref", true),
            Classification::Skip
        );
    }

    #[test]
    fn readme_and_license_skip_silently() {
        assert_eq!(
            classify_path("README.md", "common", false),
            Classification::SilentSkip
        );
        assert_eq!(
            classify_path("LICENSE", "common", false),
            Classification::SilentSkip
        );
        assert_eq!(classify_path("Cargo.toml", "common", false), Classification::Skip);
    }

    #[test]
    fn silent_skips_ignore_case() {
        assert_eq!(
            classify_path("readme.md", "common", false),
            Classification::SilentSkip
        );
        assert_eq!(
            classify_path("docs/License", "common", false),
            Classification::SilentSkip
        );
    }

    #[test]
    fn configured_extensions_replace_defaults() {
        let rules = InclusionRules {
            asset_extensions: vec!["ogg".to_string()],
            ..InclusionRules::default()
        };
        let png = Candidate {
            relative: "a.png",
            file_name: "a.png",
            parent_name: Some("root"),
        };
        let ogg = Candidate {
            relative: "a.ogg",
            file_name: "a.ogg",
            parent_name: Some("root"),
        };
        assert_eq!(classify(&rules, &png, false), Classification::Skip);
        assert_eq!(
            classify(&rules, &ogg, false),
            Classification::Include(Inclusion::Asset)
        );
    }
}
