//! File-backed persistence for a point collection.
//!
//! The database file holds one snapshot of the live collection and is
//! rewritten after every successful mutation. Backups are additional
//! snapshots written once into the backup directory under a
//! [`BackupId`] name; their mtime is their timestamp.
//!
//! All operations are synchronous. Callers serialise access: the server
//! holds its collection write lock for the duration of each call.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use points_core::{Hardware, PointCollection};
use tracing::{debug, info, warn};

use crate::backup::BackupId;
use crate::error::StoreError;

/// Database file plus backup directory.
#[derive(Debug, Clone)]
pub struct PointStore {
    database: PathBuf,
    backup_dir: PathBuf,
}

impl PointStore {
    /// Bind a store to its database file and backup directory.
    ///
    /// The backup directory must already exist; the database file may not.
    pub fn open(
        database: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
    ) -> Result<Self, StoreError> {
        let backup_dir = backup_dir.into();
        if !backup_dir.is_dir() {
            return Err(StoreError::MissingBackupDir(backup_dir));
        }
        Ok(Self {
            database: database.into(),
            backup_dir,
        })
    }

    /// Path of the database file.
    pub fn database(&self) -> &Path {
        &self.database
    }

    /// Path of the backup directory.
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Load the collection from the database file.
    ///
    /// A missing file yields an empty collection. A file that exists but
    /// cannot be read or parsed is an error: state is never silently
    /// discarded.
    pub fn load(&self, hardware: Hardware) -> Result<PointCollection, StoreError> {
        if !self.database.exists() {
            info!(path = %self.database.display(), "no database file, starting empty");
            return Ok(PointCollection::new(hardware));
        }
        let collection = read_snapshot(&self.database, hardware)?;
        info!(
            path = %self.database.display(),
            points = collection.len(),
            "database loaded"
        );
        Ok(collection)
    }

    /// Overwrite the database file with the current snapshot.
    ///
    /// Writes a sibling temporary file and renames it into place, so a
    /// reader never sees a half-written database.
    pub fn persist(&self, collection: &PointCollection) -> Result<(), StoreError> {
        let text = collection.to_json()?;
        let tmp = temp_path(&self.database);
        fs::write(&tmp, text.as_bytes()).map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, &self.database).map_err(|e| StoreError::io(&self.database, e))?;
        debug!(path = %self.database.display(), points = collection.len(), "database written");
        Ok(())
    }

    /// Write a new backup of `collection` and return its id.
    pub fn backup(&self, collection: &PointCollection) -> Result<BackupId, StoreError> {
        let text = collection.to_json()?;
        let id = BackupId::generate();
        let path = self.backup_path(&id);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;
        file.write_all(text.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| StoreError::io(&path, e))?;
        info!(backup = %id, points = collection.len(), "backup written");
        Ok(id)
    }

    /// Every stored backup with its timestamp.
    ///
    /// Only regular files whose name follows the backup naming convention
    /// are listed.
    pub fn list_backups(&self) -> Result<BTreeMap<BackupId, DateTime<Utc>>, StoreError> {
        let entries =
            fs::read_dir(&self.backup_dir).map_err(|e| StoreError::io(&self.backup_dir, e))?;
        let mut backups = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.backup_dir, e))?;
            let Some(id) = entry.file_name().to_str().and_then(BackupId::parse) else {
                continue;
            };
            let metadata = entry.metadata().map_err(|e| StoreError::io(entry.path(), e))?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata
                .modified()
                .map_err(|e| StoreError::io(entry.path(), e))?;
            backups.insert(id, DateTime::<Utc>::from(modified));
        }
        Ok(backups)
    }

    /// Resolve `name` to a stored backup.
    ///
    /// Returns `None` if `name` does not follow the naming convention or
    /// no such backup file exists.
    pub fn known_backup(&self, name: &str) -> Option<BackupId> {
        BackupId::parse(name).filter(|id| self.backup_path(id).is_file())
    }

    /// Read a stored backup into a fresh collection bound to `hardware`.
    pub fn read_backup(
        &self,
        id: &BackupId,
        hardware: Hardware,
    ) -> Result<PointCollection, StoreError> {
        read_snapshot(&self.backup_path(id), hardware)
    }

    /// Restore the backup named `name` into `collection`.
    ///
    /// A safety backup of the current state is taken first; its id is
    /// returned. If the safety backup or reading the requested backup
    /// fails, `collection` is left untouched. After the swap the database
    /// file is rewritten; a failure there is reported, but the restored
    /// in-memory state stands.
    pub fn restore(
        &self,
        name: &str,
        collection: &mut PointCollection,
    ) -> Result<BackupId, StoreError> {
        let id = self
            .known_backup(name)
            .ok_or_else(|| StoreError::UnknownBackup(name.to_owned()))?;

        let safety = self.backup(collection)?;
        let restored = self.read_backup(&id, collection.hardware().clone())?;
        collection.replace_points(restored);
        info!(backup = %id, safety_backup = %safety, "backup restored");

        if let Err(e) = self.persist(collection) {
            warn!(error = %e, "restored state not written to database");
            return Err(e);
        }
        Ok(safety)
    }

    fn backup_path(&self, id: &BackupId) -> PathBuf {
        self.backup_dir.join(id.as_str())
    }
}

fn read_snapshot(path: &Path, hardware: Hardware) -> Result<PointCollection, StoreError> {
    let text = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    PointCollection::from_json(&text, hardware).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
