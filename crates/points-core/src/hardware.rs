//! Hardware capabilities consumed by points.
//!
//! A point never talks to a bus directly. It is handed a [`Hardware`]
//! bundle holding two shared capabilities:
//!
//! - [`ServoPulse`] -- writes a pulse value to one controller channel
//! - [`Pacer`] -- waits between glide micro-steps
//!
//! # Pulse mapping
//!
//! Logical positions in `[-1.0, 1.0]` map linearly onto the raw 12-bit
//! duty-cycle count of the controller: `-1.0 -> 0`, `0.0 -> 2048`,
//! `1.0 -> 4095`. [`position_to_pulse`] and [`pulse_to_position`] are the
//! only places this mapping lives.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

/// Largest raw duty-cycle count accepted by the controller (12 bits).
pub const PULSE_MAX: u16 = 4095;

/// Number of output channels on the controller.
pub const CHANNEL_COUNT: u8 = 16;

/// Capability to drive one PWM output line.
///
/// Implementations are shared by every point of a collection, so they must
/// serialise bus access internally if the bus needs it. Errors are a
/// lower-layer concern and are not reported here.
pub trait ServoPulse: Send + Sync {
    /// Write `pulse` (a raw duty count in `0..=PULSE_MAX`) to `channel`.
    fn set_servo_pulse(&self, channel: u8, pulse: u16);
}

/// Capability to wait between glide micro-steps.
pub trait Pacer: Send + Sync {
    /// Block the calling thread for `duration`.
    fn pause(&self, duration: Duration);
}

/// [`Pacer`] that sleeps the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// [`Pacer`] that records requested pauses without sleeping.
///
/// Used for dry runs and tests where glide timing must be observed but
/// not actually waited out.
#[derive(Debug, Default)]
pub struct RecordingPacer {
    pauses: Mutex<Vec<Duration>>,
}

impl RecordingPacer {
    /// Create a pacer with no recorded pauses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pauses requested so far.
    pub fn count(&self) -> usize {
        self.pauses.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Sum of every pause requested so far.
    pub fn total(&self) -> Duration {
        self.pauses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .sum()
    }
}

impl Pacer for RecordingPacer {
    fn pause(&self, duration: Duration) {
        self.pauses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
    }
}

/// In-memory stand-in for a PWM controller.
///
/// Logs every pulse and keeps them in order so callers can inspect what
/// would have been sent to the bus.
#[derive(Debug, Default)]
pub struct MockPwm {
    pulses: Mutex<Vec<(u8, u16)>>,
}

impl MockPwm {
    /// Create a mock controller with no recorded pulses.
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(channel, pulse)` pairs written so far, oldest first.
    pub fn pulses(&self) -> Vec<(u8, u16)> {
        self.pulses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The most recent pulse written to `channel`, if any.
    pub fn last_pulse(&self, channel: u8) -> Option<u16> {
        self.pulses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|(c, _)| *c == channel)
            .map(|(_, pulse)| *pulse)
    }
}

impl ServoPulse for MockPwm {
    fn set_servo_pulse(&self, channel: u8, pulse: u16) {
        debug!(channel, pulse, "setServoPulse");
        self.pulses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((channel, pulse));
    }
}

/// Shared hardware handle injected into every point of a collection.
///
/// Never serialized; snapshot loading re-attaches the live handle.
#[derive(Clone)]
pub struct Hardware {
    pwm: Arc<dyn ServoPulse>,
    pacer: Arc<dyn Pacer>,
}

impl Hardware {
    /// Bundle a pulse writer with a pacer.
    pub fn new(pwm: Arc<dyn ServoPulse>, pacer: Arc<dyn Pacer>) -> Self {
        Self { pwm, pacer }
    }

    /// Bundle a pulse writer with a [`ThreadPacer`].
    pub fn with_pwm(pwm: Arc<dyn ServoPulse>) -> Self {
        Self::new(pwm, Arc::new(ThreadPacer))
    }

    /// Drive `channel` to the logical `position`.
    pub fn pulse(&self, channel: u8, position: f64) {
        self.pwm.set_servo_pulse(channel, position_to_pulse(position));
    }

    /// Wait `seconds` through the pacer. Non-finite or negative values
    /// do not wait at all.
    pub fn pause(&self, seconds: f64) {
        let duration = Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO);
        self.pacer.pause(duration);
    }
}

impl core::fmt::Debug for Hardware {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hardware").finish_non_exhaustive()
    }
}

/// Map a logical position onto the controller's raw duty count.
///
/// Positions outside `[-1.0, 1.0]` are clamped first.
pub fn position_to_pulse(position: f64) -> u16 {
    let clamped = if position.is_nan() {
        0.0
    } else {
        position.clamp(-1.0, 1.0)
    };
    ((clamped + 1.0) / 2.0 * f64::from(PULSE_MAX)).round() as u16
}

/// Inverse of [`position_to_pulse`], up to the 12-bit quantisation.
pub fn pulse_to_position(pulse: u16) -> f64 {
    f64::from(pulse.min(PULSE_MAX)) / f64::from(PULSE_MAX) * 2.0 - 1.0
}
