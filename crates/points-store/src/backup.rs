//! Backup naming convention.
//!
//! Backups are stored as files named by a random 128-bit identifier in
//! lowercase hex (32 characters, no separators). Only names of that exact
//! shape are ever listed or restored, so stray files in the backup
//! directory are ignored and path traversal through an id is impossible.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Length of a backup name in hex digits.
const BACKUP_ID_LEN: usize = 32;

/// Name of one stored backup.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct BackupId(String);

impl BackupId {
    /// Generate a fresh random backup name.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Accept `name` only if it follows the naming convention.
    pub fn parse(name: &str) -> Option<Self> {
        let valid = name.len() == BACKUP_ID_LEN
            && name
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(name.to_owned()))
    }

    /// The file name of this backup.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BackupId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("not a backup id: {s}"))
    }
}

impl<'de> Deserialize<'de> for BackupId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
