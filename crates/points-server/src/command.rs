//! The point command allow-list.
//!
//! `PUT /point/{id}/{command}[/{arg}]` can only ever run an operation named
//! in [`COMMANDS`]. A requested name is resolved against that table
//! directly, then with a `move` prefix, then with a `set` prefix, so
//! `left` runs `moveleft` and `speed` runs `setspeed`. Names are matched
//! case-insensitively.
//!
//! Resolution and argument parsing happen before the collection is
//! touched. A parse failure therefore never mutates state.

use std::collections::HashMap;
use std::sync::LazyLock;

use points_core::{
    DefaultEndpoint, Point, PointCollection, PointError, PointId, PointPatch, PointType,
};
use tracing::{debug, info};

use crate::error::ApiError;

/// What argument a command takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// No argument.
    None,
    /// One finite number.
    Number,
    /// One string.
    Text,
    /// A JSON object in the request body.
    Payload,
}

/// The operation an allow-listed command performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Start driving the servo.
    Enable,
    /// Stop driving the servo.
    Disable,
    /// Glide to the left endpoint.
    MoveLeft,
    /// Glide to the right endpoint.
    MoveRight,
    /// Glide to the mid endpoint.
    MoveMid,
    /// Glide to the default endpoint.
    MoveStart,
    /// Jump to a position.
    Move,
    /// Set the left endpoint.
    SetLeft,
    /// Set the right endpoint.
    SetRight,
    /// Set the mid endpoint.
    SetMid,
    /// Set the glide speed.
    SetSpeed,
    /// Set the glide step interval.
    SetDeltaT,
    /// Move the point to another channel.
    SetPort,
    /// Rename the point.
    SetName,
    /// Set the default endpoint.
    SetDefault,
    /// Set the point type.
    SetPointType,
    /// Set the description.
    SetDescription,
    /// Overwrite fields from a stored record without validation.
    Save,
}

/// One row of the allow-list.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    /// Canonical lower-case command name.
    pub name: &'static str,
    /// Argument shape.
    pub arity: Arity,
    /// What the command does.
    pub operation: Operation,
}

const fn spec(name: &'static str, arity: Arity, operation: Operation) -> CommandSpec {
    CommandSpec {
        name,
        arity,
        operation,
    }
}

/// Every command a client may run.
pub static COMMANDS: [CommandSpec; 18] = [
    spec("enable", Arity::None, Operation::Enable),
    spec("disable", Arity::None, Operation::Disable),
    spec("moveleft", Arity::None, Operation::MoveLeft),
    spec("moveright", Arity::None, Operation::MoveRight),
    spec("movemid", Arity::None, Operation::MoveMid),
    spec("movestart", Arity::None, Operation::MoveStart),
    spec("move", Arity::Number, Operation::Move),
    spec("setleft", Arity::Number, Operation::SetLeft),
    spec("setright", Arity::Number, Operation::SetRight),
    spec("setmid", Arity::Number, Operation::SetMid),
    spec("setspeed", Arity::Number, Operation::SetSpeed),
    spec("setdeltat", Arity::Number, Operation::SetDeltaT),
    spec("setport", Arity::Number, Operation::SetPort),
    spec("setname", Arity::Text, Operation::SetName),
    spec("setdefault", Arity::Text, Operation::SetDefault),
    spec("setpointtype", Arity::Text, Operation::SetPointType),
    spec("setdescription", Arity::Text, Operation::SetDescription),
    spec("save", Arity::Payload, Operation::Save),
];

static BY_NAME: LazyLock<HashMap<&'static str, &'static CommandSpec>> =
    LazyLock::new(|| COMMANDS.iter().map(|c| (c.name, c)).collect());

/// Resolve a requested command name against the allow-list.
///
/// Tries the name itself, then `move` + name, then `set` + name. An empty
/// name never resolves, so `/point/{id}//0.5` is not a bare `move`.
pub fn resolve(requested: &str) -> Option<&'static CommandSpec> {
    if requested.is_empty() {
        return None;
    }
    let name = requested.to_ascii_lowercase();
    ["", "move", "set"]
        .iter()
        .find_map(|prefix| BY_NAME.get(format!("{prefix}{name}").as_str()).copied())
}

/// A resolved command with its parsed argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Start driving the servo.
    Enable,
    /// Stop driving the servo.
    Disable,
    /// Glide to the left endpoint.
    MoveLeft,
    /// Glide to the right endpoint.
    MoveRight,
    /// Glide to the mid endpoint.
    MoveMid,
    /// Glide to the default endpoint.
    MoveStart,
    /// Jump to a position.
    Move(f64),
    /// Set the left endpoint.
    SetLeft(f64),
    /// Set the right endpoint.
    SetRight(f64),
    /// Set the mid endpoint.
    SetMid(f64),
    /// Set the glide speed.
    SetSpeed(f64),
    /// Set the glide step interval.
    SetDeltaT(f64),
    /// Move to a channel.
    SetPort(u8),
    /// Rename.
    SetName(String),
    /// Set the default endpoint.
    SetDefault(DefaultEndpoint),
    /// Set the point type.
    SetPointType(PointType),
    /// Set the description.
    SetDescription(String),
    /// Unchecked overwrite from a partial record.
    Save(Box<PointPatch>),
}

impl Command {
    /// Parse the argument `spec` requires.
    ///
    /// `arg` is the optional trailing path segment and `body` the raw
    /// request body, used only by payload commands.
    pub fn parse(spec: &CommandSpec, arg: Option<&str>, body: &[u8]) -> Result<Self, ApiError> {
        let command = match spec.operation {
            Operation::Enable => Self::Enable,
            Operation::Disable => Self::Disable,
            Operation::MoveLeft => Self::MoveLeft,
            Operation::MoveRight => Self::MoveRight,
            Operation::MoveMid => Self::MoveMid,
            Operation::MoveStart => Self::MoveStart,
            Operation::Move => Self::Move(number(spec, arg)?),
            Operation::SetLeft => Self::SetLeft(number(spec, arg)?),
            Operation::SetRight => Self::SetRight(number(spec, arg)?),
            Operation::SetMid => Self::SetMid(number(spec, arg)?),
            Operation::SetSpeed => Self::SetSpeed(number(spec, arg)?),
            Operation::SetDeltaT => Self::SetDeltaT(number(spec, arg)?),
            Operation::SetPort => Self::SetPort(channel(spec, arg)?),
            Operation::SetName => Self::SetName(required(spec, arg)?.to_owned()),
            Operation::SetDefault => Self::SetDefault(required(spec, arg)?.parse()?),
            Operation::SetPointType => Self::SetPointType(required(spec, arg)?.parse()?),
            Operation::SetDescription => Self::SetDescription(required(spec, arg)?.to_owned()),
            Operation::Save => Self::Save(Box::new(payload(body)?)),
        };
        Ok(command)
    }

    /// Run the command against point `id`.
    ///
    /// Glides block the calling thread until the servo has arrived.
    pub fn apply(self, points: &mut PointCollection, id: &PointId) -> Result<(), ApiError> {
        debug!(point = %id, command = ?self, "applying command");
        match self {
            Self::SetPort(channel) => {
                points.set_channel(id, channel)?;
                info!(point = %id, channel, "point moved to channel");
            }
            Self::Save(patch) => {
                points.restore_raw(id, *patch)?;
                info!(point = %id, "point fields overwritten");
            }
            other => other.apply_to(points.require_mut(id)?)?,
        }
        Ok(())
    }

    fn apply_to(self, point: &mut Point) -> Result<(), PointError> {
        match self {
            Self::Enable => point.enable(),
            Self::Disable => point.disable(),
            Self::MoveLeft => point.move_left(),
            Self::MoveRight => point.move_right(),
            Self::MoveMid => point.move_mid(),
            Self::MoveStart => point.move_start(),
            Self::Move(position) => point.move_to(position),
            Self::SetLeft(v) => point.set_left(v)?,
            Self::SetRight(v) => point.set_right(v)?,
            Self::SetMid(v) => point.set_mid(v)?,
            Self::SetSpeed(v) => point.set_speed(v)?,
            Self::SetDeltaT(v) => point.set_step_interval(v)?,
            Self::SetName(name) => point.set_name(&name)?,
            Self::SetDefault(default) => point.set_default_endpoint(default),
            Self::SetPointType(point_type) => point.set_point_type(point_type),
            Self::SetDescription(text) => point.set_description(&text),
            // Collection-level commands are dispatched by `apply`.
            Self::SetPort(_) | Self::Save(_) => {}
        }
        Ok(())
    }
}

fn required<'a>(spec: &CommandSpec, arg: Option<&'a str>) -> Result<&'a str, ApiError> {
    arg.ok_or_else(|| ApiError::InvalidArgument(format!("{} requires an argument", spec.name)))
}

fn number(spec: &CommandSpec, arg: Option<&str>) -> Result<f64, ApiError> {
    let raw = required(spec, arg)?;
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ApiError::InvalidArgument(format!("{}: '{raw}' is not a number", spec.name)))
}

fn channel(spec: &CommandSpec, arg: Option<&str>) -> Result<u8, ApiError> {
    let value = number(spec, arg)?.trunc();
    if (0.0..=f64::from(u8::MAX)).contains(&value) {
        Ok(value as u8)
    } else {
        Err(ApiError::InvalidArgument(format!(
            "{}: channel {value} out of range",
            spec.name
        )))
    }
}

fn payload(body: &[u8]) -> Result<PointPatch, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::InvalidArgument(String::from(
            "save requires a JSON object body",
        )));
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::InvalidArgument(format!("save: invalid body: {e}")))
}
