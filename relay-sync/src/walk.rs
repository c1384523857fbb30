//! Concurrent directory walker shared by the manifest builder and the
//! synchronizer.
//!
//! Every directory and every file becomes a task on the parent directory's
//! [`JoinSet`]. A directory's future resolves only once all of its children
//! have resolved, so the root future completing means the whole tree has been
//! visited. Nesting depth is unbounded; the number of concurrently open files
//! is capped by a semaphore.
//!
//! Only the root listing can fail the walk. Every other error is logged and
//! the entry is skipped.

use std::ffi::OsString;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{io_err, SyncError};

/// A regular file discovered by the walk.
#[derive(Debug)]
pub struct WalkedFile {
    /// Absolute (root-joined) path.
    pub path: PathBuf,
    /// Path relative to the walk root with `/` separators on every host.
    pub relative: String,
    pub metadata: Metadata,
}

impl WalkedFile {
    /// Name of the directory that directly contains the file. For files at the
    /// top of the tree this is the name of the walk root itself.
    pub fn parent_name(&self) -> Option<String> {
        self.path
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Per-walk behaviour.
pub trait Visitor: Send + Sync + 'static {
    type Output: Send + 'static;

    /// Whether a dot-prefixed entry is still walked.
    fn admit_hidden(&self, name: &str) -> bool;

    /// Handle one file. Returning `None` contributes nothing to the result.
    fn visit_file(self: Arc<Self>, file: WalkedFile) -> BoxFuture<'static, Option<Self::Output>>;
}

struct WalkContext<V> {
    root: PathBuf,
    visitor: Arc<V>,
    permits: Semaphore,
}

/// Walk `root`, returning the outputs of every visited file in completion
/// order.
pub async fn walk_tree<V: Visitor>(
    root: &Path,
    visitor: Arc<V>,
    max_open_files: usize,
) -> Result<Vec<V::Output>, SyncError> {
    let entries = list_dir(root).await.map_err(|e| io_err(root, e))?;
    let ctx = Arc::new(WalkContext {
        root: root.to_path_buf(),
        visitor,
        permits: Semaphore::new(max_open_files.max(1)),
    });
    Ok(walk_entries(ctx, root.to_path_buf(), entries).await)
}

fn walk_dir<V: Visitor>(ctx: Arc<WalkContext<V>>, dir: PathBuf) -> BoxFuture<'static, Vec<V::Output>> {
    async move {
        let listing = {
            let _permit = ctx.permits.acquire().await.ok();
            list_dir(&dir).await
        };
        match listing {
            Ok(entries) => walk_entries(ctx, dir, entries).await,
            Err(err) => {
                tracing::warn!("unable to list {}: {}", dir.display(), err);
                Vec::new()
            }
        }
    }
    .boxed()
}

async fn walk_entries<V: Visitor>(
    ctx: Arc<WalkContext<V>>,
    dir: PathBuf,
    entries: Vec<OsString>,
) -> Vec<V::Output> {
    let mut tasks = JoinSet::new();
    for name in entries {
        let lossy = name.to_string_lossy();
        if lossy.starts_with('.') && !ctx.visitor.admit_hidden(&lossy) {
            continue;
        }
        let path = dir.join(&name);
        tasks.spawn(visit_entry(ctx.clone(), path));
    }

    let mut outputs = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(items) => outputs.extend(items),
            Err(err) => tracing::error!("walk task under {} failed: {}", dir.display(), err),
        }
    }
    outputs
}

async fn visit_entry<V: Visitor>(ctx: Arc<WalkContext<V>>, path: PathBuf) -> Vec<V::Output> {
    let metadata = {
        let _permit = ctx.permits.acquire().await.ok();
        tokio::fs::metadata(&path).await
    };
    let metadata = match metadata {
        Ok(metadata) => metadata,
        Err(err) => {
            tracing::warn!("unable to stat {}: {}", path.display(), err);
            return Vec::new();
        }
    };

    if metadata.is_dir() {
        return walk_dir(ctx, path).await;
    }
    if !metadata.is_file() {
        return Vec::new();
    }

    let file = WalkedFile {
        relative: relative_path(&ctx.root, &path),
        path,
        metadata,
    };
    let _permit = ctx.permits.acquire().await.ok();
    ctx.visitor.clone().visit_file(file).await.into_iter().collect()
}

async fn list_dir(dir: &Path) -> std::io::Result<Vec<OsString>> {
    let mut reader = tokio::fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        names.push(entry.file_name());
    }
    Ok(names)
}

/// `path` relative to `root`, joined with `/`.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
