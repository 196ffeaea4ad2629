//! # Motor output capability
//!
//! The flight loop hands a fully mixed, clamped, arm-gated [`MotorMix`] to
//! whatever implements [`MotorDriver`]. PWM/H-bridge drivers live outside
//! this crate; here live the trait and a recording driver for demos and
//! tests.

use crate::mixer::MotorMix;
use crate::sensors::SensorError;

/// Sink for the four mixed motor commands
///
/// By the time a mix reaches a driver the safety gating is already done:
/// while disarmed the flight loop always writes [`MotorMix::ZERO`].
pub trait MotorDriver {
    /// Apply one mix to the hardware
    ///
    /// # Errors
    ///
    /// [`SensorError::Fault`] for a transient write problem (the loop
    /// continues); construction-time absence of the peripheral is
    /// [`SensorError::Unavailable`] and never surfaces here.
    fn apply(&mut self, mix: &MotorMix) -> Result<(), SensorError>;
}

/// Driver that records the last applied mix and does nothing else
///
/// Stands in for hardware in demos and lets tests assert on exactly what
/// would have reached the motors.
#[derive(Debug, Default)]
pub struct RecordingMotors {
    last: MotorMix,
    applied: u64,
}

impl RecordingMotors {
    /// Create a recording driver with an all-zero last mix
    pub fn new() -> Self {
        RecordingMotors::default()
    }

    /// The most recently applied mix
    pub fn last(&self) -> MotorMix {
        self.last
    }

    /// How many mixes have been applied
    pub fn applied(&self) -> u64 {
        self.applied
    }
}

impl MotorDriver for RecordingMotors {
    fn apply(&mut self, mix: &MotorMix) -> Result<(), SensorError> {
        self.last = *mix;
        self.applied += 1;
        Ok(())
    }
}
