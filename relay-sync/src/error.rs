//! Error types for relay-sync.

use std::path::PathBuf;

use thiserror::Error;

use crate::manifest::ManifestParseError;

/// All errors that can arise from manifest and tree operations.
///
/// Per-file failures inside a walk never surface here; they are logged and
/// the file is skipped. Only whole-operation failures (an unreadable root, an
/// unparseable manifest) become a `SyncError`.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted manifest could not be read back.
    #[error("malformed manifest at {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: ManifestParseError,
    },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
