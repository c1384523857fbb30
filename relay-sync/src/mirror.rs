//! Selective tree synchronizer.
//!
//! Walks the source tree and copies a file to the matching destination path
//! only when the destination is missing, unreadable, empty, or byte-different.
//! Files already identical are left untouched, so a second pass over an
//! unchanged source performs no copies. Destination directories are created
//! on demand. Hidden entries are never published.
//!
//! Best-effort: a failure on one file is logged and reported as
//! [`FileAction::Failed`]; the walk continues.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use relay_core::config::DEFAULT_MAX_OPEN_FILES;

use crate::error::SyncError;
use crate::manifest::compare_paths;
use crate::walk::{walk_tree, Visitor, WalkedFile};

/// Why a file had to be copied. Checks run in this order and stop at the first
/// that applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyReason {
    Missing,
    Unreadable,
    /// Destination is empty while the source is not.
    Empty,
    Different,
}

impl fmt::Display for CopyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyReason::Missing => write!(f, "does not exist"),
            CopyReason::Unreadable => write!(f, "unable to read"),
            CopyReason::Empty => write!(f, "read no data"),
            CopyReason::Different => write!(f, "data comparison failed"),
        }
    }
}

/// Outcome for one source file. Paths are relative to the source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileAction {
    Copied { path: String, reason: CopyReason },
    /// Dry-run: the file would have been copied.
    WouldCopy { path: String, reason: CopyReason },
    Unchanged { path: String },
    Failed { path: String },
}

impl FileAction {
    pub fn path(&self) -> &str {
        match self {
            FileAction::Copied { path, .. }
            | FileAction::WouldCopy { path, .. }
            | FileAction::Unchanged { path }
            | FileAction::Failed { path } => path,
        }
    }
}

/// Every action of one sync pass, sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub actions: Vec<FileAction>,
}

impl SyncReport {
    /// Files copied, or that would be copied in a dry run.
    pub fn copied(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| matches!(a, FileAction::Copied { .. } | FileAction::WouldCopy { .. }))
            .count()
    }

    pub fn unchanged(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| matches!(a, FileAction::Unchanged { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| matches!(a, FileAction::Failed { .. }))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub dry_run: bool,
    pub max_open_files: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_open_files: DEFAULT_MAX_OPEN_FILES,
        }
    }
}

struct MirrorVisitor {
    dst_root: PathBuf,
    dry_run: bool,
}

impl Visitor for MirrorVisitor {
    type Output = FileAction;

    fn admit_hidden(&self, _name: &str) -> bool {
        false
    }

    fn visit_file(self: Arc<Self>, file: WalkedFile) -> BoxFuture<'static, Option<FileAction>> {
        async move { Some(self.mirror_file(file).await) }.boxed()
    }
}

impl MirrorVisitor {
    async fn mirror_file(&self, file: WalkedFile) -> FileAction {
        let path = file.relative;
        let source = match tokio::fs::read(&file.path).await {
            Ok(data) => data,
            Err(err) => {
                tracing::warn!("  {path} unable to read source: {err}");
                return FileAction::Failed { path };
            }
        };

        let dest = self.dst_root.join(&path);
        let Some(reason) = copy_reason(&dest, &source).await else {
            return FileAction::Unchanged { path };
        };

        if self.dry_run {
            tracing::info!("  [dry-run] {path} {reason}, would copy");
            return FileAction::WouldCopy { path, reason };
        }

        tracing::info!("  {path} {reason}, copying...");
        match write_with_parents(&dest, &source).await {
            Ok(()) => FileAction::Copied { path, reason },
            Err(err) => {
                tracing::error!("  {path} copy to {} failed: {err}", dest.display());
                FileAction::Failed { path }
            }
        }
    }
}

async fn copy_reason(dest: &Path, source: &[u8]) -> Option<CopyReason> {
    if let Ok(false) = tokio::fs::try_exists(dest).await {
        return Some(CopyReason::Missing);
    }
    match tokio::fs::read(dest).await {
        Err(err) => {
            tracing::debug!("{} unreadable: {}", dest.display(), err);
            Some(CopyReason::Unreadable)
        }
        Ok(existing) if existing.is_empty() && !source.is_empty() => Some(CopyReason::Empty),
        Ok(existing) if existing != source => Some(CopyReason::Different),
        Ok(_) => None,
    }
}

/// Write `data` to `dest`, creating every missing ancestor directory first.
async fn write_with_parents(dest: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(dest, data).await
}

/// Bring `dst_root` in line with `src_root`, copying only what differs.
///
/// Fails only when `src_root` cannot be listed.
pub async fn sync_tree(
    src_root: &Path,
    dst_root: &Path,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError> {
    let visitor = Arc::new(MirrorVisitor {
        dst_root: dst_root.to_path_buf(),
        dry_run: options.dry_run,
    });
    let mut actions = walk_tree(src_root, visitor, options.max_open_files).await?;
    actions.sort_by(|a, b| compare_paths(a.path(), b.path()));
    Ok(SyncReport { actions })
}
