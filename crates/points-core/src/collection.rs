//! Ordered collection of points sharing one controller.
//!
//! [`PointCollection`] owns the [`Hardware`] handle and injects it into
//! every point it creates or loads. It enforces the two collection-level
//! invariants:
//!
//! - no two points share a channel
//! - removal never empties the collection
//!
//! Listing order is insertion order.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tracing::info;

use crate::error::{PointError, SnapshotError};
use crate::hardware::{CHANNEL_COUNT, Hardware};
use crate::ids::PointId;
use crate::point::{Point, PointPatch, PointRecord, validate_channel};

/// Serialized form of a whole collection: id to stored field-set, in
/// listing order.
pub type Snapshot = IndexMap<PointId, PointRecord>;

/// All points driven by one controller.
#[derive(Debug)]
pub struct PointCollection {
    points: IndexMap<PointId, Point>,
    hardware: Hardware,
    started_at: Instant,
}

impl PointCollection {
    /// Create an empty collection bound to `hardware`.
    pub fn new(hardware: Hardware) -> Self {
        Self {
            points: IndexMap::new(),
            hardware,
            started_at: Instant::now(),
        }
    }

    /// The shared hardware handle.
    pub const fn hardware(&self) -> &Hardware {
        &self.hardware
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the collection holds no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether a point with `id` exists.
    pub fn contains(&self, id: &PointId) -> bool {
        self.points.contains_key(id)
    }

    /// Look up a point.
    pub fn get(&self, id: &PointId) -> Option<&Point> {
        self.points.get(id)
    }

    /// Look up a point for mutation.
    pub fn get_mut(&mut self, id: &PointId) -> Option<&mut Point> {
        self.points.get_mut(id)
    }

    /// Look up a point, failing with [`PointError::NotFound`].
    pub fn require(&self, id: &PointId) -> Result<&Point, PointError> {
        self.points.get(id).ok_or(PointError::NotFound(id.clone()))
    }

    /// Look up a point for mutation, failing with [`PointError::NotFound`].
    pub fn require_mut(&mut self, id: &PointId) -> Result<&mut Point, PointError> {
        self.points.get_mut(id).ok_or(PointError::NotFound(id.clone()))
    }

    /// Iterate points in listing order.
    pub fn iter(&self) -> impl Iterator<Item = (&PointId, &Point)> {
        self.points.iter()
    }

    /// Time since the collection was created.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Channels not held by any point.
    pub fn free_channels(&self) -> BTreeSet<u8> {
        let used: BTreeSet<u8> = self.points.values().map(Point::channel).collect();
        (0..CHANNEL_COUNT).filter(|c| !used.contains(c)).collect()
    }

    /// Add a point.
    ///
    /// With `channel` the request must be in range and free; without, the
    /// lowest free channel is taken. An empty or absent `name` keeps the
    /// default name.
    pub fn add(&mut self, channel: Option<u8>, name: Option<&str>) -> Result<&Point, PointError> {
        let channel = match channel {
            Some(requested) => {
                validate_channel(requested)?;
                self.ensure_free(requested, None)?;
                requested
            }
            None => self
                .free_channels()
                .first()
                .copied()
                .ok_or(PointError::NoFreeChannel)?,
        };

        let id = PointId::new();
        let mut point = Point::new(id.clone(), channel, self.hardware.clone())?;
        if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
            point.set_name(name)?;
        }
        info!(point = %id, channel, name = point.name(), "point added");
        Ok(self.points.entry(id).or_insert(point))
    }

    /// Remove a point. The last remaining point can never be removed.
    pub fn remove(&mut self, id: &PointId) -> Result<Point, PointError> {
        if !self.points.contains_key(id) {
            return Err(PointError::NotFound(id.clone()));
        }
        if self.points.len() <= 1 {
            return Err(PointError::LastPoint);
        }
        let removed = self
            .points
            .shift_remove(id)
            .ok_or(PointError::NotFound(id.clone()))?;
        info!(point = %id, channel = removed.channel(), "point removed");
        Ok(removed)
    }

    /// Move a point to another channel, keeping channels unique.
    pub fn set_channel(&mut self, id: &PointId, channel: u8) -> Result<&Point, PointError> {
        validate_channel(channel)?;
        self.ensure_free(channel, Some(id))?;
        let point = self.require_mut(id)?;
        point.set_channel(channel)?;
        Ok(point)
    }

    /// Unchecked bulk overwrite of a point's fields.
    ///
    /// Field values are applied as given (see [`Point::restore_raw`]).
    /// A `port` in the patch is still checked for range and uniqueness,
    /// before anything is written.
    pub fn restore_raw(&mut self, id: &PointId, mut patch: PointPatch) -> Result<&Point, PointError> {
        self.require(id)?;
        if let Some(channel) = patch.port.take() {
            validate_channel(channel)?;
            self.ensure_free(channel, Some(id))?;
            self.require_mut(id)?.set_channel(channel)?;
        }
        let point = self.require_mut(id)?;
        point.restore_raw(patch);
        Ok(point)
    }

    fn ensure_free(&self, channel: u8, except: Option<&PointId>) -> Result<(), PointError> {
        let taken = self
            .points
            .iter()
            .any(|(id, p)| Some(id) != except && p.channel() == channel);
        if taken {
            Err(PointError::ChannelInUse(channel))
        } else {
            Ok(())
        }
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// The stored form of every point, in listing order.
    pub fn to_snapshot(&self) -> Snapshot {
        self.points
            .iter()
            .map(|(id, point)| (id.clone(), point.to_record()))
            .collect()
    }

    /// Rebuild a collection from its stored form, attaching `hardware` to
    /// every point. Channels must be in range and unique.
    pub fn from_snapshot(snapshot: Snapshot, hardware: Hardware) -> Result<Self, PointError> {
        let mut collection = Self::new(hardware);
        for (id, record) in snapshot {
            validate_channel(record.port)?;
            collection.ensure_free(record.port, None)?;
            let point = Point::from_record(id.clone(), record, collection.hardware.clone())?;
            collection.points.insert(id, point);
        }
        Ok(collection)
    }

    /// Serialize to snapshot text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_snapshot())
    }

    /// Parse snapshot text into a collection bound to `hardware`.
    pub fn from_json(text: &str, hardware: Hardware) -> Result<Self, SnapshotError> {
        let snapshot: Snapshot = serde_json::from_str(text)?;
        Ok(Self::from_snapshot(snapshot, hardware)?)
    }

    /// Replace every point with those of `restored`.
    ///
    /// The live hardware handle and start time are kept; restored points
    /// are re-bound to the live handle.
    pub fn replace_points(&mut self, restored: Self) {
        let hardware = self.hardware.clone();
        self.points = restored
            .points
            .into_iter()
            .map(|(id, point)| (id, point.with_hardware(hardware.clone())))
            .collect();
        info!(points = self.points.len(), "collection replaced");
    }
}
