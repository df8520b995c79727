//! Error types for the points-core crate.
//!
//! Every fallible operation on a [`Point`](crate::Point) or a
//! [`PointCollection`](crate::PointCollection) returns a typed error. Setter
//! validation happens before any field is touched, so an `Err` always means
//! the target was left unchanged.

use crate::ids::PointId;

/// Errors that can occur during point and collection operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PointError {
    /// A numeric value fell outside its documented inclusive range.
    #[error("{field} {value} not in range [{min}, {max}]")]
    OutOfRange {
        /// The field being set.
        field: &'static str,
        /// The rejected value.
        value: f64,
        /// Lower bound (inclusive).
        min: f64,
        /// Upper bound (inclusive).
        max: f64,
    },

    /// A textual value was not one of the accepted choices.
    #[error("{field} '{value}' not one of {allowed}")]
    InvalidChoice {
        /// The field being set.
        field: &'static str,
        /// The rejected value.
        value: String,
        /// Human-readable list of accepted values.
        allowed: &'static str,
    },

    /// A point name was empty after trimming.
    #[error("point name must not be empty")]
    EmptyName,

    /// No point with the given id exists in the collection.
    #[error("point not found: {0}")]
    NotFound(PointId),

    /// Removing the point would leave the collection empty.
    #[error("not allowed to delete the last point in a collection")]
    LastPoint,

    /// Every controller channel is already assigned.
    #[error("no free channel left on the controller")]
    NoFreeChannel,

    /// The requested channel is held by another point.
    #[error("channel {0} is already in use")]
    ChannelInUse(u8),
}

/// Errors that can occur when turning snapshot text into a collection.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The text is not a valid snapshot document.
    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),

    /// The document parsed but describes an invalid collection.
    #[error("invalid snapshot: {0}")]
    Invalid(#[from] PointError),
}
