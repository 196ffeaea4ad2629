//! # Per-axis PID controller
//!
//! One [`Pid`] instance stabilizes a single axis. The flight computer runs
//! three of them: roll angle, pitch angle and yaw rate. Gains are unitless
//! against degree (or degree-per-second) errors and the output is a
//! normalized demand, clamped to the configured output limit.

/// Single-axis PID controller with optional integral and output clamping
///
/// State consists of the accumulated integral and the previous error. The
/// previous error is absent until the first successful update, so the first
/// call after construction or [`reset`](Pid::reset) contributes no
/// derivative term.
#[derive(Debug, Clone)]
pub struct Pid {
    /// Proportional gain
    pub kp: f32,
    /// Integral gain
    pub ki: f32,
    /// Derivative gain
    pub kd: f32,
    /// Symmetric clamp on the accumulated integral, when set
    pub i_limit: Option<f32>,
    /// Symmetric clamp on the summed output, when set
    pub out_limit: Option<f32>,
    integral: f32,
    prev_err: Option<f32>,
}

impl Pid {
    /// Create a controller with the given gains and no clamping
    pub fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Pid {
            kp,
            ki,
            kd,
            i_limit: None,
            out_limit: None,
            integral: 0.0,
            prev_err: None,
        }
    }

    /// Set the integral clamp, consuming and returning the controller
    pub fn with_i_limit(mut self, limit: f32) -> Self {
        self.i_limit = Some(limit);
        self
    }

    /// Set the output clamp, consuming and returning the controller
    pub fn with_out_limit(mut self, limit: f32) -> Self {
        self.out_limit = Some(limit);
        self
    }

    /// Clear the integral and the previous error
    ///
    /// After a reset the next update behaves like the first one: no
    /// derivative term. Resetting is never done implicitly; whether the
    /// flight computer resets on arming is a configuration policy.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_err = None;
    }

    /// Advance the controller by one step and return the output demand
    ///
    /// A non-positive `dt` returns `0.0` immediately without touching any
    /// state: no integral accumulation, no derivative, no previous-error
    /// write.
    ///
    /// # Arguments
    ///
    /// * `err` - Setpoint minus measurement for this axis
    /// * `dt` - Step duration in seconds
    pub fn update(&mut self, err: f32, dt: f32) -> f32 {
        if dt <= 0.0 {
            return 0.0;
        }
        let p = self.kp * err;
        self.integral += self.ki * err * dt;
        if let Some(limit) = self.i_limit {
            self.integral = self.integral.clamp(-limit, limit);
        }
        let d = match self.prev_err {
            Some(prev) => self.kd * (err - prev) / dt,
            None => 0.0,
        };
        self.prev_err = Some(err);
        let out = p + self.integral + d;
        match self.out_limit {
            Some(limit) => out.clamp(-limit, limit),
            None => out,
        }
    }

    /// Current accumulated integral term
    pub fn integral(&self) -> f32 {
        self.integral
    }
}
