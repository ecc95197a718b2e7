//! Durable storage initialization.
//!
//! The host cannot run without its storage, so any error returned here is
//! fatal to startup.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Schema version written by this build.
pub const STORAGE_SCHEMA_VERSION: u32 = 3;
/// Marker file holding the schema version inside the data directory.
pub const SCHEMA_MARKER_FILE: &str = "schema.version";

/// Result of a successful initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStatus {
    /// Storage did not exist and was created.
    Created,
    /// Storage was upgraded from an older schema.
    Migrated {
        /// Schema version found on disk.
        from: u32,
    },
    /// Storage was already at the current schema.
    Current,
}

/// Storage initialization failures.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem access failed.
    #[error("storage i/o failed at '{path}': {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Marker content is not a schema version.
    #[error("storage marker '{path}' is corrupt: {detail}")]
    Corrupt {
        /// Marker path.
        path: PathBuf,
        /// What was wrong.
        detail: String,
    },
    /// Storage was written by a newer build.
    #[error("storage schema {found} is newer than supported schema {supported}")]
    UnsupportedSchema {
        /// Version on disk.
        found: u32,
        /// Version this build writes.
        supported: u32,
    },
    /// Initializer-specific failure.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Ensures durable storage exists and is migrated.
pub trait StorageInitializer: Send + Sync {
    /// Creates or migrates storage.
    ///
    /// # Errors
    /// Returns [`StorageError`] when storage cannot be made usable.
    fn initialize(&self) -> Result<StorageStatus, StorageError>;
}

/// Directory-backed storage with a schema marker file.
#[derive(Debug, Clone)]
pub struct DirectoryStorageInitializer {
    root: PathBuf,
}

impl DirectoryStorageInitializer {
    /// Creates an initializer for `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Data directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn marker_path(&self) -> PathBuf {
        self.root.join(SCHEMA_MARKER_FILE)
    }

    fn write_marker(&self, version: u32) -> Result<(), StorageError> {
        let path = self.marker_path();
        fs::write(&path, format!("{version}\n")).map_err(|source| StorageError::Io { path, source })
    }

    fn read_marker(&self) -> Result<Option<u32>, StorageError> {
        let path = self.marker_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StorageError::Io { path, source }),
        };
        raw.trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|error| StorageError::Corrupt {
                path,
                detail: error.to_string(),
            })
    }

    fn migrate(&self, from: u32) -> Result<(), StorageError> {
        for step in from..STORAGE_SCHEMA_VERSION {
            tracing::info!(from = step, to = step + 1, root = %self.root.display(), "migrating storage schema");
            self.write_marker(step + 1)?;
        }
        Ok(())
    }
}

impl StorageInitializer for DirectoryStorageInitializer {
    fn initialize(&self) -> Result<StorageStatus, StorageError> {
        fs::create_dir_all(&self.root).map_err(|source| StorageError::Io {
            path: self.root.clone(),
            source,
        })?;

        match self.read_marker()? {
            None => {
                self.write_marker(STORAGE_SCHEMA_VERSION)?;
                Ok(StorageStatus::Created)
            }
            Some(found) if found == STORAGE_SCHEMA_VERSION => Ok(StorageStatus::Current),
            Some(found) if found < STORAGE_SCHEMA_VERSION => {
                self.migrate(found)?;
                Ok(StorageStatus::Migrated { from: found })
            }
            Some(found) => Err(StorageError::UnsupportedSchema {
                found,
                supported: STORAGE_SCHEMA_VERSION,
            }),
        }
    }
}
