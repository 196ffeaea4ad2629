//! # Complementary attitude filter
//!
//! Blends integrated gyro rates (smooth, drifting) with accelerometer-derived
//! angles (noisy, drift-free) into roll and pitch estimates. Yaw has no
//! reference to correct against — it is pure gyro integration and drifts by
//! design; magnetometer fusion is deliberately out of scope.

/// Roll/pitch/yaw estimate produced once per tick
///
/// Angles are in degrees. `yaw_deg` is unbounded: it never wraps and
/// accumulates whatever drift the gyro has.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AttitudeState {
    /// Roll angle in degrees, positive right wing down
    pub roll_deg: f32,
    /// Pitch angle in degrees, positive nose up
    pub pitch_deg: f32,
    /// Integrated yaw angle in degrees, unbounded
    pub yaw_deg: f32,
    /// Raw yaw rate in degrees per second (last gyro z reading)
    pub yaw_rate_dps: f32,
}

/// Complementary filter over accelerometer and gyro input
///
/// `alpha` weights the gyro path; `1 - alpha` weights the accelerometer
/// path. The default of 0.98 trusts the gyro over one tick and lets the
/// accelerometer pull slow drift out. `alpha` must lie in `[0, 1]`; the
/// filter does not enforce this, the caller owns the configuration.
#[derive(Debug, Clone)]
pub struct ComplementaryFilter {
    alpha: f32,
    state: AttitudeState,
}

impl ComplementaryFilter {
    /// Create a filter with the given gyro blend weight
    pub fn new(alpha: f32) -> Self {
        ComplementaryFilter {
            alpha,
            state: AttitudeState::default(),
        }
    }

    /// The current estimate, as updated by the last call to
    /// [`update`](ComplementaryFilter::update)
    pub fn state(&self) -> AttitudeState {
        self.state
    }

    /// Advance the estimate by one step
    ///
    /// Missing inputs take benign defaults: level 1 g accelerometer
    /// `(0, 0, 1)` and zero rates. If the accelerometer vector is degenerate
    /// (no defined tilt angle), the previous roll/pitch stand in for the
    /// accel-derived angles rather than failing the update.
    ///
    /// # Arguments
    ///
    /// * `accel_g` - Body-frame specific force in g, or `None` if absent
    /// * `gyro_dps` - Body-frame angular rates in degrees/second, or `None`
    /// * `dt` - Step duration in seconds
    ///
    /// # Returns
    ///
    /// The updated `(roll_deg, pitch_deg, yaw_deg)` triple.
    pub fn update(
        &mut self,
        accel_g: Option<[f32; 3]>,
        gyro_dps: Option<[f32; 3]>,
        dt: f32,
    ) -> (f32, f32, f32) {
        let [ax, ay, az] = accel_g.unwrap_or([0.0, 0.0, 1.0]);
        let [gx, gy, gz] = gyro_dps.unwrap_or([0.0, 0.0, 0.0]);

        // Gyro path: integrate body rates
        let roll_g = self.state.roll_deg + gx * dt;
        let pitch_g = self.state.pitch_deg + gy * dt;
        let yaw_g = self.state.yaw_deg + gz * dt;

        // Accel path: tilt angles from the gravity vector. atan2(0, 0) has
        // no meaningful direction, so a degenerate vector falls back to the
        // previous estimate.
        let (roll_a, pitch_a) = if ax == 0.0 && ay == 0.0 && az == 0.0 {
            (self.state.roll_deg, self.state.pitch_deg)
        } else {
            let roll_a = ay.atan2(az).to_degrees();
            let pitch_a = (-ax).atan2((ay * ay + az * az).sqrt()).to_degrees();
            if roll_a.is_nan() || pitch_a.is_nan() {
                (self.state.roll_deg, self.state.pitch_deg)
            } else {
                (roll_a, pitch_a)
            }
        };

        let a = self.alpha;
        self.state.roll_deg = a * roll_g + (1.0 - a) * roll_a;
        self.state.pitch_deg = a * pitch_g + (1.0 - a) * pitch_a;
        self.state.yaw_deg = yaw_g;
        self.state.yaw_rate_dps = gz;

        (self.state.roll_deg, self.state.pitch_deg, self.state.yaw_deg)
    }
}

impl Default for ComplementaryFilter {
    fn default() -> Self {
        ComplementaryFilter::new(0.98)
    }
}
