//! Persistence layer for point collections.
//!
//! The live collection is written through to a single JSON database file
//! after every mutation. Backups are further snapshots kept in a backup
//! directory and can be restored into the live collection; every restore
//! first takes a safety backup of the state it replaces.
//!
//! # Modules
//!
//! - [`backup`] -- Backup naming convention ([`BackupId`])
//! - [`error`] -- Shared error type ([`StoreError`])
//! - [`store`] -- Database and backup operations ([`PointStore`])

pub mod backup;
pub mod error;
pub mod store;

// Re-export primary types for convenience.
pub use backup::BackupId;
pub use error::StoreError;
pub use store::PointStore;
