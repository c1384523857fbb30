//! Size-based rotation for the relay log file, and the shared writer that
//! every tracing layer appends through.
//!
//! Rotation keeps at most 5 backups:
//!   relay.log → relay.log.1 → relay.log.2 → … → relay.log.5

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing_subscriber::fmt::MakeWriter;

/// Maximum log file size before rotation (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated backup files to keep.
pub const MAX_ROTATED_FILES: usize = 5;

/// Rotate `log_path` if its size is at least `max_bytes`.
///
/// Returns `true` if rotation occurred. Missing files are not an error.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };

    if size < max_bytes {
        return Ok(false);
    }

    let oldest = numbered_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }

    for n in (1..max_files).rev() {
        let src = numbered_path(log_path, n);
        if src.exists() {
            fs::rename(&src, numbered_path(log_path, n + 1))?;
        }
    }

    fs::rename(log_path, numbered_path(log_path, 1))?;
    Ok(true)
}

/// Append-only log file shared by all tracing output.
///
/// Each event is formatted into one buffer and written with a single call
/// while the mutex is held, so lines from concurrent projects never interleave.
#[derive(Debug, Clone)]
pub struct LogSink {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl LogSink {
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(Mutex::new(open_append(path)?)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rotate when oversized, then point the writer at a fresh file.
    pub fn rotate(&self) -> io::Result<bool> {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if !rotate_if_needed(&self.path, MAX_LOG_BYTES, MAX_ROTATED_FILES)? {
            return Ok(false);
        }
        *file = open_append(&self.path)?;
        Ok(true)
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Buffers one event; flushed to the file on drop.
pub struct LineWriter {
    file: Arc<Mutex<File>>,
    buf: Vec<u8>,
}

impl Write for LineWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(&self.buf)?;
        self.buf.clear();
        Ok(())
    }
}

impl Drop for LineWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LineWriter {
            file: self.file.clone(),
            buf: Vec::with_capacity(256),
        }
    }
}

/// Path of the `n`-th rotated copy of `base` (e.g. `relay.log.2`).
fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("relay.log");
    base.with_file_name(format!("{name}.{n}"))
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_log(path: &Path, size_bytes: usize) {
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .unwrap();
        let chunk = vec![b'x'; 64 * 1024];
        let mut written = 0usize;
        while written < size_bytes {
            let to_write = (size_bytes - written).min(chunk.len());
            f.write_all(&chunk[..to_write]).unwrap();
            written += to_write;
        }
    }

    #[test]
    fn rotation_noop_when_file_under_threshold() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("relay.log");
        make_log(&log, 1024);
        assert!(!rotate_if_needed(&log, MAX_LOG_BYTES, MAX_ROTATED_FILES).unwrap());
        assert!(!numbered_path(&log, 1).exists());
    }

    #[test]
    fn rotation_skips_missing_file() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("nonexistent.log");
        assert!(!rotate_if_needed(&log, MAX_LOG_BYTES, MAX_ROTATED_FILES).unwrap());
    }

    #[test]
    fn backups_are_capped_and_shifted() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("relay.log");
        for n in 1..=MAX_ROTATED_FILES {
            fs::write(numbered_path(&log, n), format!("rotated-{n}")).unwrap();
        }
        fs::write(&log, b"live").unwrap();

        assert!(rotate_if_needed(&log, 4, MAX_ROTATED_FILES).unwrap());
        assert_eq!(fs::read_to_string(numbered_path(&log, 1)).unwrap(), "live");
        assert_eq!(
            fs::read_to_string(numbered_path(&log, MAX_ROTATED_FILES)).unwrap(),
            "rotated-4"
        );
        assert!(!numbered_path(&log, MAX_ROTATED_FILES + 1).exists());
        assert!(!log.exists());
    }

    #[test]
    fn sink_writes_whole_events_and_reopens_after_rotation() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("logs").join("relay.log");
        let sink = LogSink::open(&log).unwrap();

        {
            let mut writer = sink.make_writer();
            writer.write_all(b"first ").unwrap();
            writer.write_all(b"line\n").unwrap();
        }
        assert_eq!(fs::read_to_string(&log).unwrap(), "first line\n");

        make_log(&log, MAX_LOG_BYTES as usize);
        assert!(sink.rotate().unwrap());
        {
            let mut writer = sink.make_writer();
            writer.write_all(b"after rotation\n").unwrap();
        }
        assert_eq!(fs::read_to_string(&log).unwrap(), "after rotation\n");
        assert!(numbered_path(&log, 1).exists());
    }
}
