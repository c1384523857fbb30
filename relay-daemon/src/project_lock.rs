//! Cross-process run lock.
//!
//! A running server and a foreground `relay update` each keep their own
//! in-memory slots, so a run also takes an exclusive `flock` on
//! `<out_dir>/.relay.lock`. The kernel drops the lock when the handle closes,
//! so a crashed run never leaves a project stuck.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use relay_core::Project;
use rustix::fs::{flock, FlockOperation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const LOCK_FILE: &str = ".relay.lock";

/// Who holds a project's lock, as written into the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    pub pid: u32,
    pub command: String,
    pub started_at_unix: i64,
}

impl fmt::Display for LockHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` (pid {})", self.command, self.pid)
    }
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("{} is held by {}", .path.display(), describe(.holder))]
    Contended {
        path: PathBuf,
        holder: Option<LockHolder>,
    },

    #[error("failed to lock {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn describe(holder: &Option<LockHolder>) -> String {
    match holder {
        Some(holder) => holder.to_string(),
        None => "another process".to_string(),
    }
}

/// Exclusive lock on one project's directories. Released on drop.
#[derive(Debug)]
pub struct ProjectLock {
    _file: File,
    path: PathBuf,
}

impl ProjectLock {
    /// Take the lock without waiting.
    pub fn try_acquire(project: &Project) -> Result<Self, LockError> {
        let path = project.out_dir.join(LOCK_FILE);
        let io_err = |source| LockError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&project.out_dir).map_err(io_err)?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(io_err)?;

        if let Err(err) = try_lock_exclusive(&file) {
            if err.kind() == io::ErrorKind::WouldBlock {
                let holder = read_holder(&mut file);
                return Err(LockError::Contended { path, holder });
            }
            return Err(io_err(err));
        }

        write_holder(&mut file).map_err(io_err)?;
        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn try_lock_exclusive(file: &File) -> io::Result<()> {
    flock(file, FlockOperation::NonBlockingLockExclusive)
        .map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

fn write_holder(file: &mut File) -> io::Result<()> {
    let holder = LockHolder {
        pid: std::process::id(),
        command: std::env::args().collect::<Vec<_>>().join(" "),
        started_at_unix: chrono::Utc::now().timestamp(),
    };
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    serde_json::to_writer(&mut *file, &holder)?;
    file.flush()
}

/// Best effort: the holder may not have written its metadata yet.
fn read_holder(file: &mut File) -> Option<LockHolder> {
    let mut contents = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut contents).ok()?;
    serde_json::from_str(&contents).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::ProjectName;
    use tempfile::TempDir;

    fn project(tmp: &TempDir) -> Project {
        Project {
            name: ProjectName::from("common"),
            work_dir: tmp.path().join("work"),
            out_dir: tmp.path().join("out"),
        }
    }

    #[test]
    fn second_acquire_reports_holder() {
        let tmp = TempDir::new().unwrap();
        let project = project(&tmp);

        let held = ProjectLock::try_acquire(&project).expect("first lock");
        assert_eq!(held.path(), project.out_dir.join(LOCK_FILE));

        let err = ProjectLock::try_acquire(&project).unwrap_err();
        let LockError::Contended { holder, .. } = &err else {
            panic!("expected contention, got {err}");
        };
        assert_eq!(holder.as_ref().map(|h| h.pid), Some(std::process::id()));
        assert!(err.to_string().contains("is held by"));
    }

    #[test]
    fn dropping_releases_lock() {
        let tmp = TempDir::new().unwrap();
        let project = project(&tmp);

        drop(ProjectLock::try_acquire(&project).expect("first lock"));
        assert!(ProjectLock::try_acquire(&project).is_ok());
    }

    #[test]
    fn creates_missing_out_dir() {
        let tmp = TempDir::new().unwrap();
        let project = project(&tmp);
        assert!(!project.out_dir.exists());

        let _lock = ProjectLock::try_acquire(&project).expect("lock");
        assert!(project.out_dir.is_dir());
    }
}
