//! # relay-sync
//!
//! Manifest builder and selective tree synchronizer.
//!
//! Call [`build_manifest`] to produce the checksum manifest of a work tree and
//! [`sync_tree`] to mirror it into an output directory, copying only files
//! whose bytes differ. [`publish`] holds the output-directory artifacts and
//! [`verify_tree`] checks a published tree against its manifest.

pub mod builder;
pub mod diff;
pub mod error;
pub mod manifest;
pub mod mirror;
pub mod publish;
pub mod rules;
pub mod verify;
pub mod walk;

pub use builder::{build_manifest, BuildOptions};
pub use diff::{diff_manifests, diff_project, ManifestDiff};
pub use error::SyncError;
pub use manifest::{Manifest, ManifestEntry, ManifestParseError, MANIFEST_HEADER};
pub use mirror::{sync_tree, CopyReason, FileAction, SyncOptions, SyncReport};
pub use publish::PersistReport;
pub use verify::{read_manifest, verify_tree, Discrepancy, VerifyReport};
