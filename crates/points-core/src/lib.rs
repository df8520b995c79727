//! Point state machine and collection logic for servo-driven railroad
//! switches.
//!
//! This crate holds everything that operates on point state without
//! touching files or sockets. Persistence lives in `points-store`; the
//! HTTP surface lives in `points-server`.
//!
//! # Modules
//!
//! - [`collection`] -- Ordered point collection with channel allocation ([`PointCollection`])
//! - [`error`] -- Error types ([`PointError`], [`SnapshotError`])
//! - [`hardware`] -- Pulse and pacing capabilities, pulse mapping, [`MockPwm`]
//! - [`ids`] -- Type-safe point identifier ([`PointId`])
//! - [`point`] -- The per-switch state machine and glide algorithm ([`Point`])

pub mod collection;
pub mod error;
pub mod hardware;
pub mod ids;
pub mod point;

// Re-export primary types at crate root for convenience.
pub use collection::{PointCollection, Snapshot};
pub use error::{PointError, SnapshotError};
pub use hardware::{
    CHANNEL_COUNT, Hardware, MockPwm, PULSE_MAX, Pacer, RecordingPacer, ServoPulse, ThreadPacer,
    position_to_pulse, pulse_to_position,
};
pub use ids::{EmptyPointId, PointId};
pub use point::{
    DefaultEndpoint, GlidePlan, MAX_GLIDE_STEPS, Point, PointPatch, PointRecord, PointType,
    normalize_description,
};
