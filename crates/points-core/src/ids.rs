//! Identifier for points.
//!
//! Every point carries a [`PointId`] that is assigned once at creation and
//! never changes. The id is an opaque, non-empty string: points created by
//! this process get UUID v7 text (time-ordered), while databases written by
//! older tools may key their points by any name, such as `"point 2"`.

use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Unique identifier for a point in a collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PointId(String);

/// Error returned when an empty string is offered as a [`PointId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("point id must not be empty")]
pub struct EmptyPointId;

impl PointId {
    /// Create a new identifier from UUID v7 text.
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// The id as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PointId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for PointId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PointId {
    type Err = EmptyPointId;

    /// Any non-empty string is a valid id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(EmptyPointId);
        }
        Ok(Self(s.to_owned()))
    }
}

impl<'de> Deserialize<'de> for PointId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
