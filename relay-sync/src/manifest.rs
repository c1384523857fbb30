//! Manifest model and its text format.
//!
//! ```text
//! Version 1
//! ManifestFileEntry
//!     filename "scripts/x.lua"
//!     crc 3632233996
//!     size 12
//! End
//! ```
//!
//! Entries are sorted case-insensitively by relative path, with ties broken by
//! the raw path, so rendering an unchanged tree twice gives identical text.
//! Rendering has no trailing newline and no time field.

use std::cmp::Ordering;
use std::fmt;
use std::time::SystemTime;

use thiserror::Error;

pub const MANIFEST_HEADER: &str = "Version 1";

const ENTRY_OPEN: &str = "ManifestFileEntry";
const ENTRY_CLOSE: &str = "End";
const FILENAME_PREFIX: &str = "    filename \"";
const CRC_PREFIX: &str = "    crc ";
const TIME_PREFIX: &str = "    time ";
const SIZE_PREFIX: &str = "    size ";

/// One included file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Root-relative, `/`-separated.
    pub relative_path: String,
    /// CRC-32 (IEEE) of the raw bytes.
    pub crc: u32,
    pub size: u64,
    /// Observed while walking but never rendered.
    pub modified: Option<SystemTime>,
}

impl ManifestEntry {
    pub fn from_bytes(relative_path: impl Into<String>, data: &[u8]) -> Self {
        Self {
            relative_path: relative_path.into(),
            crc: crc32fast::hash(data),
            size: data.len() as u64,
            modified: None,
        }
    }
}

/// Total order used for manifest entries.
pub fn compare_paths(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// A sorted description of a published tree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestParseError {
    #[error("expected `{MANIFEST_HEADER}` header, found {found:?}")]
    MissingHeader { found: String },
}

impl Manifest {
    /// Build a manifest from entries discovered in any order.
    pub fn from_entries(mut entries: Vec<ManifestEntry>) -> Self {
        entries.sort_by(|a, b| compare_paths(&a.relative_path, &b.relative_path));
        Self { entries }
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, relative_path: &str) -> Option<&ManifestEntry> {
        self.entries
            .iter()
            .find(|entry| entry.relative_path == relative_path)
    }

    /// Serialized text; the only form ever compared or persisted.
    pub fn render(&self) -> String {
        let mut lines = Vec::with_capacity(1 + self.entries.len() * 5);
        lines.push(MANIFEST_HEADER.to_string());
        for entry in &self.entries {
            lines.push(ENTRY_OPEN.to_string());
            lines.push(format!("{FILENAME_PREFIX}{}\"", entry.relative_path));
            lines.push(format!("{CRC_PREFIX}{}", entry.crc));
            lines.push(format!("{SIZE_PREFIX}{}", entry.size));
            lines.push(ENTRY_CLOSE.to_string());
        }
        lines.join("\n")
    }

    /// Read a rendered manifest back.
    ///
    /// The header is mandatory. After it, the first line that does not
    /// continue a well-formed entry ends the document; a partial trailing
    /// entry is dropped. A legacy `time` line between `crc` and `size` is
    /// accepted and ignored. Entry order is kept as written.
    pub fn parse(text: &str) -> Result<Self, ManifestParseError> {
        let mut lines = text.lines().map(|line| line.trim_end_matches('\r'));
        match lines.next() {
            Some(MANIFEST_HEADER) => {}
            other => {
                return Err(ManifestParseError::MissingHeader {
                    found: other.unwrap_or_default().to_string(),
                })
            }
        }

        let mut entries = Vec::new();
        while let Some(entry) = parse_entry(&mut lines) {
            entries.push(entry);
        }
        Ok(Self { entries })
    }
}

fn parse_entry<'a>(lines: &mut impl Iterator<Item = &'a str>) -> Option<ManifestEntry> {
    if lines.next()? != ENTRY_OPEN {
        return None;
    }
    let relative_path = lines
        .next()?
        .strip_prefix(FILENAME_PREFIX)?
        .strip_suffix('"')?
        .to_string();
    let crc = lines.next()?.strip_prefix(CRC_PREFIX)?.parse().ok()?;

    let mut line = lines.next()?;
    if let Some(time) = line.strip_prefix(TIME_PREFIX) {
        time.parse::<f64>().ok()?;
        line = lines.next()?;
    }
    let size = line.strip_prefix(SIZE_PREFIX)?.parse().ok()?;

    if lines.next()? != ENTRY_CLOSE {
        return None;
    }
    Some(ManifestEntry {
        relative_path,
        crc,
        size,
        modified: None,
    })
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
