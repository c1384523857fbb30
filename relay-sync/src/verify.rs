//! Check a published tree against its manifest, the way a downstream client
//! does before trusting a download.

use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};

use crate::error::{io_err, SyncError};
use crate::manifest::{compare_paths, Manifest, ManifestEntry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discrepancy {
    Missing { path: String },
    SizeMismatch { path: String, expected: u64, actual: u64 },
    CrcMismatch { path: String, expected: u32, actual: u32 },
}

impl Discrepancy {
    pub fn path(&self) -> &str {
        match self {
            Discrepancy::Missing { path }
            | Discrepancy::SizeMismatch { path, .. }
            | Discrepancy::CrcMismatch { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub checked: usize,
    /// Sorted by path.
    pub discrepancies: Vec<Discrepancy>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

/// Re-read every file the manifest lists under `root` and compare.
pub async fn verify_tree(root: &Path, manifest: &Manifest, max_open_files: usize) -> VerifyReport {
    let root = root.to_path_buf();
    let mut discrepancies: Vec<Discrepancy> = stream::iter(manifest.entries().iter().cloned())
        .map(|entry| check_entry(root.clone(), entry))
        .buffer_unordered(max_open_files.max(1))
        .filter_map(|found| async move { found })
        .collect()
        .await;
    discrepancies.sort_by(|a, b| compare_paths(a.path(), b.path()));
    VerifyReport {
        checked: manifest.len(),
        discrepancies,
    }
}

async fn check_entry(root: PathBuf, entry: ManifestEntry) -> Option<Discrepancy> {
    let data = match tokio::fs::read(root.join(&entry.relative_path)).await {
        Ok(data) => data,
        Err(err) => {
            tracing::debug!("verify {}: {}", entry.relative_path, err);
            return Some(Discrepancy::Missing {
                path: entry.relative_path,
            });
        }
    };
    let actual = ManifestEntry::from_bytes(entry.relative_path.as_str(), &data);
    if actual.size != entry.size {
        return Some(Discrepancy::SizeMismatch {
            path: entry.relative_path,
            expected: entry.size,
            actual: actual.size,
        });
    }
    if actual.crc != entry.crc {
        return Some(Discrepancy::CrcMismatch {
            path: entry.relative_path,
            expected: entry.crc,
            actual: actual.crc,
        });
    }
    None
}

/// Read and parse the manifest at `path`.
pub fn read_manifest(path: &Path) -> Result<Manifest, SyncError> {
    let text = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    Manifest::parse(&text).map_err(|source| SyncError::ManifestParse {
        path: path.to_path_buf(),
        source,
    })
}
