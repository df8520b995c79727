//! Error types for the persistence layer.
//!
//! All errors are propagated via [`StoreError`], which records the path
//! involved so that a failed startup or a failed write can be diagnosed
//! from the message alone.

use std::path::PathBuf;

use points_core::SnapshotError;

/// Errors that can occur in the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A filesystem operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A snapshot file exists but could not be turned into a collection.
    #[error("could not correctly read snapshot {path}: {source}")]
    Corrupt {
        /// The unreadable snapshot file.
        path: PathBuf,
        /// What was wrong with it.
        source: SnapshotError,
    },

    /// The live collection could not be encoded.
    #[error("snapshot encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The backup id is malformed or names no stored backup.
    #[error("unknown backup: {0}")]
    UnknownBackup(String),

    /// The configured backup directory does not exist.
    #[error("backup directory does not exist: {0}")]
    MissingBackupDir(PathBuf),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
