//! Error types for the points daemon binary.
//!
//! [`DaemonError`] is the top-level error type that wraps every failure
//! mode during startup and serving.

use std::path::PathBuf;

/// Top-level error for the points daemon.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: crate::config::ConfigError,
    },

    /// The secret file could not be read.
    #[error("failed to read secret file {}: {source}", path.display())]
    Secret {
        /// The secret file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The secret file holds no credential.
    #[error("secret file {} is empty", .0.display())]
    EmptySecret(PathBuf),

    /// Opening or loading the point database failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: points_store::StoreError,
    },

    /// The control API server failed.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: points_server::ServerError,
    },
}
