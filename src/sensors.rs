//! # Sensor capability interface
//!
//! Chip drivers (I2C/UART register access) live outside this crate. The
//! flight loop only depends on the [`SensorHub`] capability, which yields one
//! [`SensorSample`] per tick with every field optional. Which IMU chip backs
//! the hub is discovered once at startup and reported as an [`ImuKind`]; it
//! is never re-probed per read.
//!
//! A transient read problem is a [`SensorError::Fault`] and must never abort
//! a tick — the flight loop substitutes its last-known-good sample. A missing
//! required peripheral is a [`SensorError::Unavailable`], raised only at
//! construction, and is fatal.

use std::f32::consts::TAU;

use thiserror::Error;

/// Sensor acquisition errors, split by recovery class
#[derive(Debug, Error)]
pub enum SensorError {
    /// Transient read failure; the caller substitutes and continues
    #[error("transient sensor fault: {0}")]
    Fault(String),
    /// Required peripheral absent at construction; fatal
    #[error("sensor hardware unavailable: {0}")]
    Unavailable(String),
}

/// Which inertial chip a sensor hub resolved at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImuKind {
    /// TDK InvenSense ICM-20948
    Icm20948,
    /// TDK InvenSense MPU-9250
    Mpu9250,
    /// No physical IMU; readings are simulated or substituted
    Absent,
}

/// One sensor sample, all fields optional
///
/// Absent fields mean "this hub cannot supply that quantity right now", not
/// an error. Downstream code defaults or omits accordingly.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorSample {
    /// Sample timestamp on the monotonic millisecond counter
    pub ts_ms: u32,
    /// Body-frame specific force in g
    pub accel_g: Option<[f32; 3]>,
    /// Body-frame angular rates in degrees/second
    pub gyro_dps: Option<[f32; 3]>,
    /// Magnetic field in microtesla (telemetry only; no yaw fusion)
    pub mag_ut: Option<[f32; 3]>,
    /// IMU die temperature in Celsius
    pub imu_temp_c: Option<f32>,
    /// Barometer temperature in Celsius
    pub temperature_c: Option<f32>,
    /// Static pressure in Pascal
    pub pressure_pa: Option<f32>,
    /// Barometric altitude in meters (ISA)
    pub altitude_m: Option<f32>,
}

impl SensorSample {
    /// Best available temperature: barometer first, IMU die as fallback
    pub fn best_temp_c(&self) -> Option<f32> {
        self.temperature_c.or(self.imu_temp_c)
    }
}

/// Capability producing one [`SensorSample`] per tick
pub trait SensorHub {
    /// Which IMU chip was resolved at startup
    fn imu_kind(&self) -> ImuKind;

    /// Read the current sample
    ///
    /// # Arguments
    ///
    /// * `now_ms` - Current monotonic tick, stamped into the sample
    ///
    /// # Errors
    ///
    /// [`SensorError::Fault`] on a transient read problem. Implementations
    /// must not return [`SensorError::Unavailable`] from here; absence is a
    /// construction-time failure.
    fn sample(&mut self, now_ms: u32) -> Result<SensorSample, SensorError>;
}

/// Simulated sensor hub
///
/// Produces the same gentle sinusoidal motion the bench rig uses when no
/// IMU responds: sub-degree accelerometer wobble around level 1 g, small
/// gyro rates, and a barometer breathing around standard pressure. Useful
/// for demos and as a deterministic test double.
#[derive(Debug, Default)]
pub struct SimulatedSensors;

impl SimulatedSensors {
    /// Create a simulated hub
    pub fn new() -> Self {
        SimulatedSensors
    }
}

impl SensorHub for SimulatedSensors {
    fn imu_kind(&self) -> ImuKind {
        ImuKind::Absent
    }

    fn sample(&mut self, now_ms: u32) -> Result<SensorSample, SensorError> {
        let imu_phase = (now_ms % 2000) as f32 / 2000.0 * TAU;
        let baro_phase = (now_ms % 10_000) as f32 / 10_000.0 * TAU;

        let pressure_pa = 101_325.0 + 200.0 * baro_phase.sin();
        let altitude_m = 44_330.0 * (1.0 - (pressure_pa / 101_325.0).powf(0.1903));

        Ok(SensorSample {
            ts_ms: now_ms,
            accel_g: Some([0.02 * imu_phase.sin(), 0.02 * imu_phase.cos(), 1.0]),
            gyro_dps: Some([0.5 * imu_phase.sin(), 0.5 * imu_phase.cos(), 0.0]),
            mag_ut: Some([30.0 * imu_phase.sin(), 0.0, 15.0 * imu_phase.cos()]),
            imu_temp_c: Some(30.0),
            temperature_c: Some(25.0 + 2.0 * baro_phase.sin()),
            pressure_pa: Some(pressure_pa),
            altitude_m: Some(altitude_m),
        })
    }
}
