//! Per-run JSON-lines file sink.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use labhost_core::{LogEntry, LogLevel};
use time::OffsetDateTime;

use crate::{LogSink, LogSinkError};

/// Appends one JSON object per line to a log file.
///
/// Each entry is encoded before the file lock is taken and written with a
/// single `write_all`, so concurrent writers never interleave entry bytes.
#[derive(Debug)]
pub struct FileLogSink {
    file: Mutex<File>,
    path: PathBuf,
}

impl FileLogSink {
    /// Opens (or creates) `path` in append mode.
    ///
    /// # Errors
    /// Returns [`LogSinkError::Io`] when the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LogSinkError> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }

    /// Creates `<dir>/<YYYYMMDD_HHMMSS>_log.jsonl` for the current run.
    ///
    /// # Errors
    /// Returns [`LogSinkError::Io`] when the directory or file cannot be
    /// created.
    pub fn create_in(dir: &Path, started_at: OffsetDateTime) -> Result<Self, LogSinkError> {
        std::fs::create_dir_all(dir)?;
        Self::open(dir.join(format!("{}_log.jsonl", timestamp_compact(started_at))))
    }

    /// Returns the file path being written.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileLogSink {
    fn write(&self, entry: LogEntry) -> Result<(), LogSinkError> {
        let mut line = entry.to_json_line()?;
        line.push('\n');

        let mut file = self
            .file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(line.as_bytes())?;
        if entry.level == LogLevel::Error {
            file.flush()?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), LogSinkError> {
        let mut file = self
            .file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }
}

fn timestamp_compact(at: OffsetDateTime) -> String {
    format!(
        "{:04}{:02}{:02}_{:02}{:02}{:02}",
        at.year(),
        at.month() as u8,
        at.day(),
        at.hour(),
        at.minute(),
        at.second()
    )
}
