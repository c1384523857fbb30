//! Published-state artifacts under a project's output directory:
//! `manifest.txt`, `manifest.txt.<unix-seconds>` and `version.txt`.
//!
//! Every write here is best-effort. Failures are logged and reported back in
//! the return value; none of them abort the caller.

use std::io::ErrorKind;
use std::path::PathBuf;

use relay_core::Project;
use tokio::io::AsyncWriteExt;

/// The previously published manifest text, if there is one to read.
pub async fn read_published(project: &Project) -> Option<String> {
    let path = project.manifest_path();
    match tokio::fs::read_to_string(&path).await {
        Ok(text) => Some(text),
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => {
            tracing::warn!("unable to read {}: {}", path.display(), err);
            None
        }
    }
}

/// Whether publishing `manifest_text` would change nothing.
pub fn is_unchanged(previous: Option<&str>, manifest_text: &str) -> bool {
    previous == Some(manifest_text)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistReport {
    pub manifest_written: bool,
    /// `None` when the history snapshot could not be created.
    pub history_path: Option<PathBuf>,
}

/// Overwrite the canonical manifest and add an immutable history snapshot.
pub async fn write_manifest(project: &Project, manifest_text: &str, unix_seconds: i64) -> PersistReport {
    let canonical = project.manifest_path();
    let manifest_written = match tokio::fs::write(&canonical, manifest_text).await {
        Ok(()) => true,
        Err(err) => {
            tracing::error!("unable to write {}: {}", canonical.display(), err);
            false
        }
    };

    let history = project.manifest_history_path(unix_seconds);
    let history_path = match write_new(&history, manifest_text).await {
        Ok(()) => Some(history),
        Err(err) => {
            tracing::error!("unable to write {}: {}", history.display(), err);
            None
        }
    };

    PersistReport {
        manifest_written,
        history_path,
    }
}

/// Record the published revision. Returns whether the write succeeded.
pub async fn write_version(project: &Project, version: &str) -> bool {
    let path = project.version_path();
    match tokio::fs::write(&path, version).await {
        Ok(()) => true,
        Err(err) => {
            tracing::error!("unable to write {}: {}", path.display(), err);
            false
        }
    }
}

/// History snapshots are never overwritten.
async fn write_new(path: &std::path::Path, contents: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(contents.as_bytes()).await?;
    file.flush().await
}
