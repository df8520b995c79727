//! The state machine for one physical switch.
//!
//! A [`Point`] starts `disabled`. While disabled every movement still
//! tracks the logical position, but no pulse reaches the controller. All
//! bounded fields are validated at the setter boundary; an `Err` means
//! nothing changed.
//!
//! The only unchecked path is [`Point::restore_raw`], which overwrites
//! fields from a [`PointPatch`] without validation. It exists for
//! restoring serialized state and for the trusted `save` command.

use core::fmt;
use core::ops::RangeInclusive;
use core::str::FromStr;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PointError;
use crate::hardware::{CHANNEL_COUNT, Hardware};
use crate::ids::PointId;

/// Valid range for positions and endpoints.
pub const POSITION_RANGE: RangeInclusive<f64> = -1.0..=1.0;

/// Valid range for glide speed, in position units per second.
pub const SPEED_RANGE: RangeInclusive<f64> = 0.05..=4.0;

/// Valid range for the glide step interval, in seconds.
pub const STEP_INTERVAL_RANGE: RangeInclusive<f64> = 0.005..=0.1;

/// Most micro-steps one glide takes: full travel (2.0) at the slowest
/// speed (0.05) with the shortest step interval (0.005 s).
pub const MAX_GLIDE_STEPS: u32 = 8_000;

/// Maximum number of characters kept from a description.
pub const DESCRIPTION_LIMIT: usize = 1024;

/// Tab stop width used when expanding tabs in descriptions.
const TAB_WIDTH: usize = 4;

const DEFAULT_SPEED: f64 = 2.0;
const DEFAULT_STEP_INTERVAL: f64 = 0.02;
const DEFAULT_DESCRIPTION: &str = "A point";

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Which endpoint the `start` action moves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultEndpoint {
    /// The left endpoint.
    #[default]
    Left,
    /// The mid endpoint.
    Mid,
    /// The right endpoint.
    Right,
}

impl DefaultEndpoint {
    const ALLOWED: &'static str = "{left, mid, right}";

    const fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Mid => "mid",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for DefaultEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DefaultEndpoint {
    type Err = PointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Self::Left),
            "mid" => Ok(Self::Mid),
            "right" => Ok(Self::Right),
            other => Err(PointError::InvalidChoice {
                field: "default",
                value: other.to_owned(),
                allowed: Self::ALLOWED,
            }),
        }
    }
}

/// Physical layout of the switch. Descriptive only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PointType {
    /// Left-hand turnout.
    #[default]
    Left,
    /// Curved left-hand turnout.
    #[serde(alias = "curved left")]
    CurvedLeft,
    /// Symmetric (Y) turnout.
    Wye,
    /// Right-hand turnout.
    Right,
    /// Curved right-hand turnout.
    #[serde(alias = "curved right")]
    CurvedRight,
    /// Double slip.
    Double,
    /// Three-way turnout.
    Triple,
}

impl PointType {
    const ALLOWED: &'static str =
        "{left, curved-left, wye, right, curved-right, double, triple}";

    const fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::CurvedLeft => "curved-left",
            Self::Wye => "wye",
            Self::Right => "right",
            Self::CurvedRight => "curved-right",
            Self::Double => "double",
            Self::Triple => "triple",
        }
    }
}

impl fmt::Display for PointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PointType {
    type Err = PointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Self::Left),
            "curved-left" | "curved left" => Ok(Self::CurvedLeft),
            "wye" => Ok(Self::Wye),
            "right" => Ok(Self::Right),
            "curved-right" | "curved right" => Ok(Self::CurvedRight),
            "double" => Ok(Self::Double),
            "triple" => Ok(Self::Triple),
            other => Err(PointError::InvalidChoice {
                field: "pointType",
                value: other.to_owned(),
                allowed: Self::ALLOWED,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Serialized forms
// ---------------------------------------------------------------------------

/// The stored field-set of one point, as it appears in a snapshot.
///
/// Older snapshots used `_left`, `_right`, `_mid`, `deltat` and
/// `pointtype`; those keys are still accepted on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    /// Controller channel.
    pub port: u8,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Whether pulses are emitted.
    #[serde(default)]
    pub enabled: bool,
    /// Last commanded position.
    #[serde(default)]
    pub current: f64,
    /// Escaped free text.
    #[serde(default = "default_description")]
    pub description: String,
    /// Left endpoint.
    #[serde(default, alias = "_left")]
    pub left: f64,
    /// Right endpoint.
    #[serde(default, alias = "_right")]
    pub right: f64,
    /// Mid endpoint.
    #[serde(default, alias = "_mid")]
    pub mid: f64,
    /// Glide speed.
    #[serde(default = "default_speed")]
    pub speed: f64,
    /// Endpoint used by `start`.
    #[serde(default)]
    pub default: DefaultEndpoint,
    /// Seconds between glide micro-steps.
    #[serde(default = "default_step_interval", rename = "deltaT", alias = "deltat")]
    pub delta_t: f64,
    /// Switch layout.
    #[serde(default, rename = "pointType", alias = "pointtype")]
    pub point_type: PointType,
}

fn default_description() -> String {
    DEFAULT_DESCRIPTION.to_owned()
}

const fn default_speed() -> f64 {
    DEFAULT_SPEED
}

const fn default_step_interval() -> f64 {
    DEFAULT_STEP_INTERVAL
}

/// A partial field-set for [`Point::restore_raw`].
///
/// Absent fields are left untouched. `port` is applied by
/// [`PointCollection::restore_raw`](crate::PointCollection::restore_raw),
/// which owns channel uniqueness.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointPatch {
    /// Controller channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u8>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Whether pulses are emitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Last commanded position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
    /// Free text, stored as given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Left endpoint.
    #[serde(default, alias = "_left", skip_serializing_if = "Option::is_none")]
    pub left: Option<f64>,
    /// Right endpoint.
    #[serde(default, alias = "_right", skip_serializing_if = "Option::is_none")]
    pub right: Option<f64>,
    /// Mid endpoint.
    #[serde(default, alias = "_mid", skip_serializing_if = "Option::is_none")]
    pub mid: Option<f64>,
    /// Glide speed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Endpoint used by `start`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultEndpoint>,
    /// Seconds between glide micro-steps.
    #[serde(
        default,
        rename = "deltaT",
        alias = "deltat",
        skip_serializing_if = "Option::is_none"
    )]
    pub delta_t: Option<f64>,
    /// Switch layout.
    #[serde(
        default,
        rename = "pointType",
        alias = "pointtype",
        skip_serializing_if = "Option::is_none"
    )]
    pub point_type: Option<PointType>,
}

impl From<PointRecord> for PointPatch {
    fn from(record: PointRecord) -> Self {
        Self {
            port: Some(record.port),
            name: Some(record.name),
            enabled: Some(record.enabled),
            current: Some(record.current),
            description: Some(record.description),
            left: Some(record.left),
            right: Some(record.right),
            mid: Some(record.mid),
            speed: Some(record.speed),
            default: Some(record.default),
            delta_t: Some(record.delta_t),
            point_type: Some(record.point_type),
        }
    }
}

// ---------------------------------------------------------------------------
// Glide planning
// ---------------------------------------------------------------------------

/// Step plan for one glide between two positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlidePlan {
    /// Signed distance advanced per micro-step.
    pub step: f64,
    /// Number of intermediate micro-steps before the final exact move.
    pub steps: u64,
}

impl GlidePlan {
    /// Plan a glide from `start` to `end`.
    ///
    /// The step is `speed * step_interval`, pointed at `end`. The step
    /// count is the truncated quotient of distance over step, so a glide
    /// never overshoots; the final exact move absorbs the remainder.
    ///
    /// Unvalidated values written through `save` can ask for far more
    /// steps than validated ones ever produce. The count is capped at
    /// [`MAX_GLIDE_STEPS`] and the step widened to cover the same distance.
    pub fn new(start: f64, end: f64, speed: f64, step_interval: f64) -> Self {
        let speed = if start > end { -speed } else { speed };
        let step = speed * step_interval;
        let ratio = ((end - start) / step).trunc();
        let cap = f64::from(MAX_GLIDE_STEPS);
        if !ratio.is_finite() || ratio <= 0.0 {
            Self { step, steps: 0 }
        } else if ratio > cap {
            Self {
                step: (end - start) / cap,
                steps: u64::from(MAX_GLIDE_STEPS),
            }
        } else {
            Self {
                step,
                steps: ratio as u64,
            }
        }
    }

    /// Number of pauses the glide performs (two per step).
    pub const fn pauses(&self) -> u64 {
        self.steps.saturating_mul(2)
    }
}

// ---------------------------------------------------------------------------
// Point
// ---------------------------------------------------------------------------

/// One servo-driven switch.
#[derive(Debug, Clone)]
pub struct Point {
    id: PointId,
    channel: u8,
    name: String,
    enabled: bool,
    current: f64,
    left: f64,
    right: f64,
    mid: f64,
    speed: f64,
    step_interval: f64,
    default_endpoint: DefaultEndpoint,
    point_type: PointType,
    description: String,
    hardware: Hardware,
}

impl Point {
    /// Create a disabled point on `channel` with default calibration.
    pub fn new(id: PointId, channel: u8, hardware: Hardware) -> Result<Self, PointError> {
        validate_channel(channel)?;
        Ok(Self {
            id,
            channel,
            name: default_name(channel),
            enabled: false,
            current: 0.0,
            left: 0.0,
            right: 0.0,
            mid: 0.0,
            speed: DEFAULT_SPEED,
            step_interval: DEFAULT_STEP_INTERVAL,
            default_endpoint: DefaultEndpoint::Left,
            point_type: PointType::Left,
            description: DEFAULT_DESCRIPTION.to_owned(),
            hardware,
        })
    }

    /// Rebuild a point from its stored form.
    ///
    /// Only the channel is validated; every other field is restored as
    /// stored. An empty stored name falls back to the default name.
    pub fn from_record(
        id: PointId,
        record: PointRecord,
        hardware: Hardware,
    ) -> Result<Self, PointError> {
        let mut point = Self::new(id, record.port, hardware)?;
        let name_missing = record.name.trim().is_empty();
        point.restore_raw(PointPatch::from(record));
        if name_missing {
            point.name = default_name(point.channel);
        }
        Ok(point)
    }

    /// Re-bind this point to another hardware handle.
    pub(crate) fn with_hardware(mut self, hardware: Hardware) -> Self {
        self.hardware = hardware;
        self
    }

    /// The stored form of this point.
    pub fn to_record(&self) -> PointRecord {
        PointRecord {
            port: self.channel,
            name: self.name.clone(),
            enabled: self.enabled,
            current: self.current,
            description: self.description.clone(),
            left: self.left,
            right: self.right,
            mid: self.mid,
            speed: self.speed,
            default: self.default_endpoint,
            delta_t: self.step_interval,
            point_type: self.point_type,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The immutable identifier.
    pub const fn id(&self) -> &PointId {
        &self.id
    }

    /// Controller channel.
    pub const fn channel(&self) -> u8 {
        self.channel
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether pulses reach the controller.
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Last commanded position.
    pub const fn current_position(&self) -> f64 {
        self.current
    }

    /// Left endpoint.
    pub const fn left(&self) -> f64 {
        self.left
    }

    /// Right endpoint.
    pub const fn right(&self) -> f64 {
        self.right
    }

    /// Mid endpoint.
    pub const fn mid(&self) -> f64 {
        self.mid
    }

    /// Glide speed in position units per second.
    pub const fn speed(&self) -> f64 {
        self.speed
    }

    /// Seconds between glide micro-steps.
    pub const fn step_interval(&self) -> f64 {
        self.step_interval
    }

    /// Endpoint used by [`Point::move_start`].
    pub const fn default_endpoint(&self) -> DefaultEndpoint {
        self.default_endpoint
    }

    /// Switch layout.
    pub const fn point_type(&self) -> PointType {
        self.point_type
    }

    /// Escaped description text.
    pub fn description(&self) -> &str {
        &self.description
    }

    // -----------------------------------------------------------------------
    // State transitions
    // -----------------------------------------------------------------------

    /// Allow pulses to reach the controller.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Stop emitting pulses. Position tracking continues.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    // -----------------------------------------------------------------------
    // Movement
    // -----------------------------------------------------------------------

    /// Move straight to `position`, clamped to `[-1.0, 1.0]`.
    ///
    /// Emits one pulse when enabled; always updates the tracked position.
    pub fn move_to(&mut self, position: f64) {
        let position = if position.is_nan() {
            self.current
        } else {
            position.clamp(*POSITION_RANGE.start(), *POSITION_RANGE.end())
        };
        if self.enabled {
            self.hardware.pulse(self.channel, position);
        }
        self.current = position;
    }

    /// Glide to the left endpoint.
    pub fn move_left(&mut self) {
        self.glide(self.left);
    }

    /// Glide to the right endpoint.
    pub fn move_right(&mut self) {
        self.glide(self.right);
    }

    /// Glide to the mid endpoint.
    pub fn move_mid(&mut self) {
        self.glide(self.mid);
    }

    /// Glide to the configured default endpoint.
    pub fn move_start(&mut self) {
        let target = match self.default_endpoint {
            DefaultEndpoint::Left => self.left,
            DefaultEndpoint::Mid => self.mid,
            DefaultEndpoint::Right => self.right,
        };
        self.glide(target);
    }

    /// Step from the current position to `end` at the configured speed.
    ///
    /// Each step pauses, moves, pauses again, then advances. The final
    /// exact move corrects for truncation of the step count. Runs to
    /// completion once started.
    fn glide(&mut self, end: f64) {
        let start = self.current;
        let plan = GlidePlan::new(start, end, self.speed, self.step_interval);
        debug!(
            point = %self.id,
            start,
            end,
            steps = plan.steps,
            step = plan.step,
            "glide"
        );
        let mut position = start;
        for _ in 0..plan.steps {
            self.hardware.pause(self.step_interval);
            self.move_to(position);
            self.hardware.pause(self.step_interval);
            position += plan.step;
        }
        self.move_to(end);
    }

    // -----------------------------------------------------------------------
    // Validated setters
    // -----------------------------------------------------------------------

    /// Set the left endpoint.
    pub fn set_left(&mut self, pos: f64) -> Result<(), PointError> {
        self.left = check_range("left", pos, &POSITION_RANGE)?;
        Ok(())
    }

    /// Set the right endpoint.
    pub fn set_right(&mut self, pos: f64) -> Result<(), PointError> {
        self.right = check_range("right", pos, &POSITION_RANGE)?;
        Ok(())
    }

    /// Set the mid endpoint.
    pub fn set_mid(&mut self, pos: f64) -> Result<(), PointError> {
        self.mid = check_range("mid", pos, &POSITION_RANGE)?;
        Ok(())
    }

    /// Set the glide speed.
    pub fn set_speed(&mut self, speed: f64) -> Result<(), PointError> {
        self.speed = check_range("speed", speed, &SPEED_RANGE)?;
        Ok(())
    }

    /// Set the seconds between glide micro-steps.
    pub fn set_step_interval(&mut self, dt: f64) -> Result<(), PointError> {
        self.step_interval = check_range("deltaT", dt, &STEP_INTERVAL_RANGE)?;
        Ok(())
    }

    /// Set the controller channel.
    ///
    /// Crate-private: inside a collection the channel must stay unique, so
    /// callers go through [`PointCollection::set_channel`](crate::PointCollection::set_channel).
    pub(crate) fn set_channel(&mut self, channel: u8) -> Result<(), PointError> {
        validate_channel(channel)?;
        self.channel = channel;
        Ok(())
    }

    /// Set the endpoint used by `start`.
    pub const fn set_default_endpoint(&mut self, default: DefaultEndpoint) {
        self.default_endpoint = default;
    }

    /// Set the switch layout.
    pub const fn set_point_type(&mut self, point_type: PointType) {
        self.point_type = point_type;
    }

    /// Set the display name. Surrounding whitespace is trimmed.
    pub fn set_name(&mut self, name: &str) -> Result<(), PointError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(PointError::EmptyName);
        }
        trimmed.clone_into(&mut self.name);
        Ok(())
    }

    /// Set the description, normalised by [`normalize_description`].
    pub fn set_description(&mut self, text: &str) {
        self.description = normalize_description(text);
    }

    // -----------------------------------------------------------------------
    // Unchecked restore
    // -----------------------------------------------------------------------

    /// Overwrite fields from `patch` WITHOUT validation.
    ///
    /// Callers are trusted: this is the restore path for serialized state
    /// and the `save` command, not a substitute for the setters. `port` is
    /// ignored here; see
    /// [`PointCollection::restore_raw`](crate::PointCollection::restore_raw).
    /// No pulse is emitted even if `current` changes.
    pub fn restore_raw(&mut self, patch: PointPatch) {
        let PointPatch {
            port: _,
            name,
            enabled,
            current,
            description,
            left,
            right,
            mid,
            speed,
            default,
            delta_t,
            point_type,
        } = patch;
        if let Some(v) = name {
            self.name = v;
        }
        if let Some(v) = enabled {
            self.enabled = v;
        }
        if let Some(v) = current {
            self.current = v;
        }
        if let Some(v) = description {
            self.description = v;
        }
        if let Some(v) = left {
            self.left = v;
        }
        if let Some(v) = right {
            self.right = v;
        }
        if let Some(v) = mid {
            self.mid = v;
        }
        if let Some(v) = speed {
            self.speed = v;
        }
        if let Some(v) = default {
            self.default_endpoint = v;
        }
        if let Some(v) = delta_t {
            self.step_interval = v;
        }
        if let Some(v) = point_type {
            self.point_type = v;
        }
    }
}

fn default_name(channel: u8) -> String {
    format!("Point {channel}")
}

/// Reject channels outside `0..CHANNEL_COUNT`.
pub fn validate_channel(channel: u8) -> Result<u8, PointError> {
    if channel < CHANNEL_COUNT {
        Ok(channel)
    } else {
        Err(PointError::OutOfRange {
            field: "port",
            value: f64::from(channel),
            min: 0.0,
            max: f64::from(CHANNEL_COUNT - 1),
        })
    }
}

fn check_range(
    field: &'static str,
    value: f64,
    range: &RangeInclusive<f64>,
) -> Result<f64, PointError> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(PointError::OutOfRange {
            field,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

/// Normalise free text for storage as a description.
///
/// Keeps the first [`DESCRIPTION_LIMIT`] characters, trims surrounding
/// whitespace, expands tabs to 4-column stops, then escapes quotes,
/// backslashes and control characters the way a JSON string literal would.
///
/// The escaped text is what gets stored. Serializing a record escapes it
/// a second time, so JSON clients read the escapes literally: a stored
/// `say \"hi\"` arrives as the string `say \"hi\"`, not `say "hi"`.
/// Descriptions written through `save` skip this step and are stored as
/// given.
pub fn normalize_description(text: &str) -> String {
    let truncated: String = text.chars().take(DESCRIPTION_LIMIT).collect();
    escape_control(&expand_tabs(truncated.trim(), TAB_WIDTH))
}

fn expand_tabs(text: &str, width: usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut column = 0usize;
    for c in text.chars() {
        match c {
            '\t' => {
                let pad = width - column % width;
                out.extend(core::iter::repeat_n(' ', pad));
                column += pad;
            }
            '\n' | '\r' => {
                out.push(c);
                column = 0;
            }
            _ => {
                out.push(c);
                column += 1;
            }
        }
    }
    out
}

fn escape_control(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::hardware::{MockPwm, Pacer, RecordingPacer, position_to_pulse};

    fn rig() -> (Point, Arc<MockPwm>, Arc<RecordingPacer>) {
        let pwm = Arc::new(MockPwm::new());
        let pacer = Arc::new(RecordingPacer::new());
        let hardware = Hardware::new(
            Arc::clone(&pwm) as Arc<dyn crate::hardware::ServoPulse>,
            Arc::clone(&pacer) as Arc<dyn Pacer>,
        );
        let point = Point::new(PointId::new(), 4, hardware).unwrap();
        (point, pwm, pacer)
    }

    #[test]
    fn new_point_is_disabled_with_defaults() {
        let (point, _, _) = rig();
        assert!(!point.is_enabled());
        assert_eq!(point.channel(), 4);
        assert_eq!(point.name(), "Point 4");
        assert!((point.speed() - 2.0).abs() < f64::EPSILON);
        assert!((point.step_interval() - 0.02).abs() < f64::EPSILON);
        assert_eq!(point.default_endpoint(), DefaultEndpoint::Left);
        assert_eq!(point.point_type(), PointType::Left);
        assert_eq!(point.description(), "A point");
    }

    #[test]
    fn new_point_rejects_channel_16() {
        let pwm = Arc::new(MockPwm::new());
        let result = Point::new(PointId::new(), 16, Hardware::with_pwm(pwm));
        assert!(matches!(result, Err(PointError::OutOfRange { field: "port", .. })));
    }

    #[test]
    fn endpoint_setters_roundtrip_exactly() {
        let (mut point, _, _) = rig();
        for i in -20..=20 {
            let pos = f64::from(i) / 20.0;
            assert!(point.set_left(pos).is_ok());
            assert!(point.set_right(pos).is_ok());
            assert!(point.set_mid(pos).is_ok());
            assert_eq!(point.left().to_bits(), pos.to_bits());
            assert_eq!(point.right().to_bits(), pos.to_bits());
            assert_eq!(point.mid().to_bits(), pos.to_bits());
        }
    }

    #[test]
    fn out_of_range_endpoint_leaves_value_unchanged() {
        let (mut point, _, _) = rig();
        assert!(point.set_left(-0.5).is_ok());
        assert!(point.set_left(-1.01).is_err());
        assert!(point.set_left(f64::NAN).is_err());
        assert!((point.left() + 0.5).abs() < f64::EPSILON);

        assert!(point.set_right(1.5).is_err());
        assert!(point.right().abs() < f64::EPSILON);
    }

    #[test]
    fn speed_and_interval_bounds_are_inclusive() {
        let (mut point, _, _) = rig();
        assert!(point.set_speed(0.05).is_ok());
        assert!(point.set_speed(4.0).is_ok());
        assert!(point.set_speed(4.01).is_err());
        assert!((point.speed() - 4.0).abs() < f64::EPSILON);

        assert!(point.set_step_interval(0.005).is_ok());
        assert!(point.set_step_interval(0.1).is_ok());
        assert!(point.set_step_interval(0.004).is_err());
        assert!((point.step_interval() - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn move_to_while_disabled_tracks_without_pulses() {
        let (mut point, pwm, _) = rig();
        point.move_to(0.5);
        assert!((point.current_position() - 0.5).abs() < f64::EPSILON);
        assert!(pwm.pulses().is_empty());
    }

    #[test]
    fn move_to_while_enabled_emits_one_pulse() {
        let (mut point, pwm, _) = rig();
        point.enable();
        point.move_to(1.0);
        assert_eq!(pwm.pulses(), vec![(4, 4095)]);
    }

    #[test]
    fn move_to_clamps() {
        let (mut point, pwm, _) = rig();
        point.enable();
        point.move_to(-3.0);
        assert!((point.current_position() + 1.0).abs() < f64::EPSILON);
        assert_eq!(pwm.last_pulse(4), Some(0));
    }

    #[test]
    fn glide_plan_scenario() {
        // From 1.0 to -1.0 at speed 2.0 with 20ms steps.
        let plan = GlidePlan::new(1.0, -1.0, 2.0, 0.02);
        assert_eq!(plan.steps, 50);
        assert_eq!(plan.pauses(), 100);
        assert!((plan.step + 0.04).abs() < 1e-12);
    }

    #[test]
    fn glide_plan_zero_distance() {
        let plan = GlidePlan::new(0.3, 0.3, 2.0, 0.02);
        assert_eq!(plan.steps, 0);
    }

    #[test]
    fn glide_plan_is_capped_for_unvalidated_intervals() {
        let plan = GlidePlan::new(1.0, -1.0, 2.0, 1e-9);
        assert_eq!(plan.steps, u64::from(MAX_GLIDE_STEPS));
        assert!((plan.step * f64::from(MAX_GLIDE_STEPS) + 2.0).abs() < 1e-9);

        // The slowest validated glide fits under the cap.
        let slowest = GlidePlan::new(-1.0, 1.0, 0.05, 0.005);
        assert!(slowest.steps <= u64::from(MAX_GLIDE_STEPS));
        assert!(slowest.steps >= u64::from(MAX_GLIDE_STEPS) - 1);
    }

    #[test]
    fn saved_tiny_interval_glide_still_arrives() {
        let (mut point, pwm, pacer) = rig();
        point.restore_raw(PointPatch {
            left: Some(-1.0),
            right: Some(1.0),
            delta_t: Some(1e-9),
            ..PointPatch::default()
        });
        point.enable();
        point.move_to(1.0);

        point.move_left();

        assert_eq!(point.current_position().to_bits(), (-1.0f64).to_bits());
        assert_eq!(pacer.count(), 2 * MAX_GLIDE_STEPS as usize);
        assert_eq!(pwm.last_pulse(4), Some(position_to_pulse(-1.0)));
    }

    #[test]
    fn move_left_scenario_from_right() {
        let (mut point, pwm, pacer) = rig();
        assert!(point.set_left(-1.0).is_ok());
        assert!(point.set_right(1.0).is_ok());
        point.enable();
        point.move_to(1.0);
        let before = pwm.pulses().len();

        point.move_left();

        assert_eq!(point.current_position().to_bits(), (-1.0f64).to_bits());
        assert_eq!(pacer.count(), 100);
        assert_eq!(pacer.total(), Duration::from_millis(20) * 100);
        // 50 intermediate moves plus the final exact move.
        assert_eq!(pwm.pulses().len() - before, 51);
        assert_eq!(pwm.last_pulse(4), Some(position_to_pulse(-1.0)));
    }

    #[test]
    fn move_left_then_right_ends_on_right_endpoint() {
        let (mut point, _, pacer) = rig();
        assert!(point.set_left(-0.7).is_ok());
        assert!(point.set_right(0.9).is_ok());
        assert!(point.set_speed(1.3).is_ok());
        assert!(point.set_step_interval(0.01).is_ok());
        point.move_to(0.2);

        point.move_left();
        assert!((point.current_position() + 0.7).abs() < 1e-9);
        point.move_right();
        assert!((point.current_position() - 0.9).abs() < 1e-9);

        let expected = GlidePlan::new(0.2, -0.7, 1.3, 0.01).pauses()
            + GlidePlan::new(-0.7, 0.9, 1.3, 0.01).pauses();
        assert_eq!(pacer.count() as u64, expected);
    }

    #[test]
    fn glide_to_same_position_moves_once_without_pauses() {
        let (mut point, pwm, pacer) = rig();
        point.enable();
        point.move_left();
        assert_eq!(pacer.count(), 0);
        assert_eq!(pwm.pulses().len(), 1);
    }

    #[test]
    fn disabled_glide_tracks_position_silently() {
        let (mut point, pwm, pacer) = rig();
        assert!(point.set_right(0.5).is_ok());
        point.move_right();
        assert!((point.current_position() - 0.5).abs() < f64::EPSILON);
        assert!(pwm.pulses().is_empty());
        assert!(pacer.count() > 0);
    }

    #[test]
    fn move_start_follows_default_endpoint() {
        let (mut point, _, _) = rig();
        assert!(point.set_left(-0.4).is_ok());
        assert!(point.set_mid(0.1).is_ok());
        assert!(point.set_right(0.6).is_ok());

        point.move_start();
        assert!((point.current_position() + 0.4).abs() < 1e-9);

        point.set_default_endpoint(DefaultEndpoint::Mid);
        point.move_start();
        assert!((point.current_position() - 0.1).abs() < 1e-9);

        point.set_default_endpoint(DefaultEndpoint::Right);
        point.move_start();
        assert!((point.current_position() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn move_mid_glides_to_mid() {
        let (mut point, _, pacer) = rig();
        assert!(point.set_mid(-0.2).is_ok());
        point.move_to(0.8);
        point.move_mid();
        assert!((point.current_position() + 0.2).abs() < 1e-9);
        assert!(pacer.count() > 0);
    }

    #[test]
    fn choices_parse_and_reject() {
        assert_eq!("mid".parse::<DefaultEndpoint>().ok(), Some(DefaultEndpoint::Mid));
        assert!("centre".parse::<DefaultEndpoint>().is_err());
        assert_eq!(
            "curved left".parse::<PointType>().ok(),
            Some(PointType::CurvedLeft)
        );
        assert_eq!(
            "curved-right".parse::<PointType>().ok(),
            Some(PointType::CurvedRight)
        );
        assert!("diamond".parse::<PointType>().is_err());
    }

    #[test]
    fn set_name_trims_and_rejects_blank() {
        let (mut point, _, _) = rig();
        assert!(point.set_name("  Yard entry ").is_ok());
        assert_eq!(point.name(), "Yard entry");
        assert_eq!(point.set_name("   "), Err(PointError::EmptyName));
        assert_eq!(point.name(), "Yard entry");
    }

    #[test]
    fn description_is_trimmed_expanded_and_escaped() {
        assert_eq!(normalize_description("  a\tb  "), "a   b");
        assert_eq!(normalize_description("ab\tc"), "ab  c");
        assert_eq!(normalize_description("say \"hi\"\nnow"), "say \\\"hi\\\"\\nnow");
        assert_eq!(normalize_description("bell\u{7}"), "bell\\u0007");
    }

    #[test]
    fn stored_description_keeps_its_escapes_in_json() {
        let (mut point, _, _) = rig();
        point.set_description("say \"hi\"\nnow");
        assert_eq!(point.description(), r#"say \"hi\"\nnow"#);

        let json = serde_json::to_value(point.to_record()).unwrap();
        assert_eq!(json["description"], r#"say \"hi\"\nnow"#);
        let text = serde_json::to_string(&point.to_record()).unwrap();
        assert!(text.contains(r#""description":"say \\\"hi\\\"\\nnow""#));
    }

    #[test]
    fn description_is_capped() {
        let long = "x".repeat(DESCRIPTION_LIMIT + 50);
        assert_eq!(normalize_description(&long).chars().count(), DESCRIPTION_LIMIT);
    }

    #[test]
    fn restore_raw_bypasses_validation() {
        let (mut point, _, _) = rig();
        point.restore_raw(PointPatch {
            speed: Some(9.0),
            left: Some(-2.0),
            enabled: Some(true),
            port: Some(11),
            ..PointPatch::default()
        });
        assert!((point.speed() - 9.0).abs() < f64::EPSILON);
        assert!((point.left() + 2.0).abs() < f64::EPSILON);
        assert!(point.is_enabled());
        // Channel is owned by the collection.
        assert_eq!(point.channel(), 4);
    }

    #[test]
    fn record_roundtrip_preserves_fields() {
        let (mut point, pwm, _) = rig();
        assert!(point.set_left(-0.8).is_ok());
        assert!(point.set_speed(1.25).is_ok());
        point.set_point_type(PointType::Wye);
        point.set_description("yard\tthroat");
        point.enable();

        let record = point.to_record();
        let restored = Point::from_record(point.id().clone(), record.clone(), Hardware::with_pwm(pwm));
        assert!(restored.is_ok());
        assert_eq!(restored.map(|p| p.to_record()).ok(), Some(record));
    }

    #[test]
    fn legacy_record_keys_are_accepted() {
        let json = r#"{"port":2, "enabled":false, "current":0.00000,
            "description":"A point","_left":-1.00000, "_right":1.00000,
            "_mid":0.00000, "speed":2.00000, "default":"right",
            "deltat":0.02000, "pointtype":"curved left"}"#;
        let record: PointRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.port, 2);
        assert!((record.left + 1.0).abs() < f64::EPSILON);
        assert_eq!(record.default, DefaultEndpoint::Right);
        assert_eq!(record.point_type, PointType::CurvedLeft);
        assert!(record.name.is_empty());
    }
}
