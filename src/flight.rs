//! # Flight computer
//!
//! Composes the estimator, the three axis controllers, the mixer and the arm
//! switch into one fixed-rate loop, optionally fed by the ground link. One
//! loop owns all mutable state — attitude, integrators, arm state, failsafe
//! timer — so no locking exists anywhere in the control path.

use std::fmt::{self, Display};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::arming::{ArmState, ArmSwitch};
use crate::attitude::ComplementaryFilter;
use crate::clock::{ticks_add, ticks_diff, Clock, WallClock};
use crate::link::{ControlLink, LinkUpdate, Liveness, Transport};
use crate::mixer::{self, MotorMix};
use crate::motors::MotorDriver;
use crate::pid::Pid;
use crate::protocol::ControlCommand;
use crate::sensors::{SensorHub, SensorSample};

/// Gains for one PID axis
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PidGains {
    /// Proportional gain
    pub kp: f32,
    /// Integral gain
    pub ki: f32,
    /// Derivative gain
    pub kd: f32,
}

/// Flight loop configuration
///
/// Deserializable from the deployment JSON next to [`crate::link::LinkConfig`];
/// every field has a default so a partial file works.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightConfig {
    /// Loop rate in Hz
    pub loop_hz: u32,
    /// Complementary filter gyro weight, must lie in `[0, 1]`
    pub alpha: f32,
    /// Roll axis gains
    pub roll_gains: PidGains,
    /// Pitch axis gains
    pub pitch_gains: PidGains,
    /// Yaw-rate axis gains
    pub yaw_gains: PidGains,
    /// Symmetric output clamp applied to all three axis controllers
    pub out_limit: f32,
    /// Full stick deflection maps to this roll/pitch setpoint (degrees)
    pub max_angle_deg: f32,
    /// Full yaw stick maps to this yaw-rate setpoint (degrees/second)
    pub max_yaw_rate_dps: f32,
    /// Arm button debounce window (ms)
    pub debounce_ms: u32,
    /// Arm button lockout window after a toggle (ms)
    pub lockout_ms: u32,
    /// Reset PID state on every disarm→arm transition
    ///
    /// Defaults to `false`: integrator state accumulated while disarmed
    /// carries into the next armed flight, matching the behavior this
    /// controller was tuned against. Set `true` to start each flight with
    /// clean controllers instead.
    pub reset_on_arm: bool,
}

impl Default for FlightConfig {
    fn default() -> Self {
        FlightConfig {
            loop_hz: 100,
            alpha: 0.98,
            roll_gains: PidGains { kp: 0.8, ki: 0.0, kd: 0.02 },
            pitch_gains: PidGains { kp: 0.8, ki: 0.0, kd: 0.02 },
            yaw_gains: PidGains { kp: 0.4, ki: 0.0, kd: 0.01 },
            out_limit: 1.0,
            max_angle_deg: 20.0,
            max_yaw_rate_dps: 90.0,
            debounce_ms: crate::arming::DEFAULT_DEBOUNCE_MS,
            lockout_ms: crate::arming::DEFAULT_LOCKOUT_MS,
            reset_on_arm: false,
        }
    }
}

/// Telemetry emitted once per tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickRecord {
    /// Step duration actually used, in seconds
    pub dt: f32,
    /// Estimated roll angle in degrees
    pub roll_deg: f32,
    /// Estimated pitch angle in degrees
    pub pitch_deg: f32,
    /// Integrated yaw angle in degrees
    pub yaw_deg: f32,
    /// Yaw rate in degrees/second
    pub yaw_rate_dps: f32,
    /// Roll controller output
    pub u_roll: f32,
    /// Pitch controller output
    pub u_pitch: f32,
    /// Yaw controller output
    pub u_yaw: f32,
    /// Throttle after arm gating and clamping
    pub throttle: f32,
    /// The computed mix; the motor driver receives zeros instead while
    /// disarmed
    pub mix: MotorMix,
    /// Barometric altitude, when available
    pub alt_m: Option<f32>,
    /// Best available temperature, when available
    pub temp_c: Option<f32>,
}

impl Display for TickRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dt={:.4} rpy=({:+.2},{:+.2},{:+.1}) yaw_rate={:+.1} u=({:+.3},{:+.3},{:+.3}) thr={:.2} mix=({:+.2},{:+.2},{:+.2},{:+.2})",
            self.dt,
            self.roll_deg,
            self.pitch_deg,
            self.yaw_deg,
            self.yaw_rate_dps,
            self.u_roll,
            self.u_pitch,
            self.u_yaw,
            self.throttle,
            self.mix.l1,
            self.mix.l2,
            self.mix.r1,
            self.mix.r2,
        )?;
        if let Some(alt) = self.alt_m {
            write!(f, " alt={alt:.1}")?;
        }
        if let Some(temp) = self.temp_c {
            write!(f, " temp={temp:.1}")?;
        }
        Ok(())
    }
}

/// The flight computer: all control state behind one `step` per tick
///
/// Generic over the sensor and motor capabilities so demos and tests can
/// substitute simulated hardware. Built at the composition root; a missing
/// required peripheral fails that construction, not the loop.
pub struct FlightComputer<S: SensorHub, M: MotorDriver> {
    config: FlightConfig,
    sensors: S,
    motors: M,
    arming: ArmSwitch,
    ahrs: ComplementaryFilter,
    pid_roll: Pid,
    pid_pitch: Pid,
    pid_yaw: Pid,
    throttle: f32,
    roll_sp_deg: f32,
    pitch_sp_deg: f32,
    yaw_rate_sp_dps: f32,
    last_tick_ms: Option<u32>,
    last_good: SensorSample,
    button: Option<Box<dyn FnMut() -> bool + Send>>,
    heartbeat: Option<Box<dyn FnMut() + Send>>,
}

impl<S: SensorHub, M: MotorDriver> FlightComputer<S, M> {
    /// Create a flight computer; it starts disarmed with zero throttle
    pub fn new(config: FlightConfig, sensors: S, motors: M) -> Self {
        let mk_pid = |g: PidGains, out: f32| Pid::new(g.kp, g.ki, g.kd).with_out_limit(out);
        FlightComputer {
            arming: ArmSwitch::new(config.debounce_ms, config.lockout_ms),
            ahrs: ComplementaryFilter::new(config.alpha),
            pid_roll: mk_pid(config.roll_gains, config.out_limit),
            pid_pitch: mk_pid(config.pitch_gains, config.out_limit),
            pid_yaw: mk_pid(config.yaw_gains, config.out_limit),
            throttle: 0.0,
            roll_sp_deg: 0.0,
            pitch_sp_deg: 0.0,
            yaw_rate_sp_dps: 0.0,
            last_tick_ms: None,
            last_good: SensorSample::default(),
            button: None,
            heartbeat: None,
            config,
            sensors,
            motors,
        }
    }

    /// Attach an arm-button poll callback, read once per tick
    ///
    /// The callback returns the raw level, `true` while pressed.
    pub fn with_button<F>(mut self, poll: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        self.button = Some(Box::new(poll));
        self
    }

    /// Attach a heartbeat-indicator toggle, invoked once per tick
    pub fn with_heartbeat<F>(mut self, toggle: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.heartbeat = Some(Box::new(toggle));
        self
    }

    /// True while armed
    pub fn is_armed(&self) -> bool {
        self.arming.is_armed()
    }

    /// Explicitly arm, applying the configured reset policy
    pub fn arm(&mut self) {
        if !self.arming.is_armed() {
            self.on_armed();
        }
        self.arming.arm();
    }

    /// Explicitly disarm; the next tick forces zero output
    pub fn disarm(&mut self) {
        self.arming.disarm();
    }

    /// Set the commanded throttle
    ///
    /// The value is latched as-is and clamped at tick time; non-finite
    /// input latches zero. Output stays at zero until armed regardless.
    pub fn set_throttle(&mut self, throttle: f32) {
        self.throttle = if throttle.is_finite() { throttle } else { 0.0 };
    }

    /// Apply an accepted ground-link command to the setpoint inputs
    ///
    /// Stick positions scale to attitude setpoints: roll/pitch by
    /// `max_angle_deg`, yaw by `max_yaw_rate_dps`; throttle is taken as-is.
    pub fn apply_command(&mut self, cmd: &ControlCommand) {
        self.throttle = cmd.throttle;
        self.roll_sp_deg = cmd.roll * self.config.max_angle_deg;
        self.pitch_sp_deg = cmd.pitch * self.config.max_angle_deg;
        self.yaw_rate_sp_dps = cmd.yaw * self.config.max_yaw_rate_dps;
    }

    /// Apply one link poll result
    ///
    /// A failsafe update overrides the commanded throttle only; the last
    /// attitude setpoints stay in place while the ramp lands the vehicle.
    pub fn apply_link_update(&mut self, update: &LinkUpdate) {
        match update {
            LinkUpdate::Command(cmd) => self.apply_command(cmd),
            LinkUpdate::FailsafeThrottle(t) => self.throttle = *t,
        }
    }

    fn on_armed(&mut self) {
        if self.config.reset_on_arm {
            self.pid_roll.reset();
            self.pid_pitch.reset();
            self.pid_yaw.reset();
        }
    }

    /// Run one control tick
    ///
    /// Never fails: transient sensor faults substitute the last-known-good
    /// sample and a motor write problem is dropped; both leave their mark
    /// only in the returned record.
    ///
    /// # Arguments
    ///
    /// * `now_ms` - Current monotonic tick
    pub fn step(&mut self, now_ms: u32) -> TickRecord {
        let nominal = 1.0 / self.config.loop_hz as f32;
        // Asymmetric clamp: dt only ever inflates past the nominal period,
        // never shrinks below it, so jitter biases the gains conservative.
        let dt = match self.last_tick_ms {
            Some(last) => (ticks_diff(now_ms, last) as f32 / 1000.0).max(nominal),
            None => nominal,
        };
        self.last_tick_ms = Some(now_ms);

        let sample = match self.sensors.sample(now_ms) {
            Ok(sample) => {
                self.last_good = sample;
                sample
            }
            Err(_) => self.last_good,
        };

        if let Some(poll) = self.button.as_mut() {
            let pressed = poll();
            if self.arming.update(now_ms, pressed) == Some(ArmState::Armed) {
                self.on_armed();
            }
        }

        self.ahrs.update(sample.accel_g, sample.gyro_dps, dt);
        let att = self.ahrs.state();

        let err_roll = self.roll_sp_deg - att.roll_deg;
        let err_pitch = self.pitch_sp_deg - att.pitch_deg;
        let err_yaw = self.yaw_rate_sp_dps - att.yaw_rate_dps;

        let u_roll = self.pid_roll.update(err_roll, dt);
        let u_pitch = self.pid_pitch.update(err_pitch, dt);
        let u_yaw = self.pid_yaw.update(err_yaw, dt);

        let armed = self.arming.is_armed();
        let throttle = if armed { self.throttle.clamp(0.0, 1.0) } else { 0.0 };

        // The mixer has no safety authority: the disarmed override happens
        // here, after mixing, and gates only what reaches the hardware. The
        // record keeps the would-be mix so bench telemetry stays useful
        // while disarmed.
        let mix = mixer::mix(throttle, u_roll, u_pitch, u_yaw);
        let applied = if armed { mix } else { MotorMix::ZERO };
        // A transient driver fault must not abort the tick
        let _ = self.motors.apply(&applied);

        if let Some(toggle) = self.heartbeat.as_mut() {
            toggle();
        }

        TickRecord {
            dt,
            roll_deg: att.roll_deg,
            pitch_deg: att.pitch_deg,
            yaw_deg: att.yaw_deg,
            yaw_rate_dps: att.yaw_rate_dps,
            u_roll,
            u_pitch,
            u_yaw,
            throttle,
            mix,
            alt_m: sample.altitude_m,
            temp_c: sample.best_temp_c(),
        }
    }

    /// Run the loop at the configured rate without a ground link
    ///
    /// # Arguments
    ///
    /// * `seconds` - Run-duration bound, or `None` to run indefinitely
    /// * `telemetry` - Optional per-tick record sink
    pub async fn run<F>(&mut self, seconds: Option<f32>, mut telemetry: Option<F>)
    where
        F: FnMut(&TickRecord),
    {
        let clock = WallClock::new();
        let period_ms = 1000 / self.config.loop_hz.max(1);
        let mut next_ts = clock.now_ms();
        let deadline = seconds.map(|s| ticks_add(clock.now_ms(), (s * 1000.0) as u32));

        loop {
            let record = self.step(clock.now_ms());
            if let Some(sink) = telemetry.as_mut() {
                sink(&record);
            }

            if let Some(end) = deadline {
                if ticks_diff(clock.now_ms(), end) >= 0 {
                    break;
                }
            }

            next_ts = ticks_add(next_ts, period_ms);
            let delay = ticks_diff(next_ts, clock.now_ms());
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay as u64)).await;
            }
            // Overrun: skip the sleep and catch up by omission — ticks are
            // never coalesced or replayed
        }
    }

    /// Run the loop with a ground link feeding the setpoints
    ///
    /// Each tick polls the link non-blockingly before stepping; absence of
    /// a packet is a normal outcome. Only transport failures end the loop.
    ///
    /// # Arguments
    ///
    /// * `link` - The ground link to poll
    /// * `liveness` - Source of optional ACK fields
    /// * `seconds` - Run-duration bound, or `None` to run indefinitely
    /// * `telemetry` - Optional per-tick record sink
    pub async fn run_with_link<T, F>(
        &mut self,
        link: &mut ControlLink<T>,
        liveness: &impl Liveness,
        seconds: Option<f32>,
        mut telemetry: Option<F>,
    ) -> anyhow::Result<()>
    where
        T: Transport,
        F: FnMut(&TickRecord),
    {
        let clock = WallClock::new();
        let period_ms = 1000 / self.config.loop_hz.max(1);
        let mut next_ts = clock.now_ms();
        let deadline = seconds.map(|s| ticks_add(clock.now_ms(), (s * 1000.0) as u32));

        loop {
            let now = clock.now_ms();
            if let Some(update) = link.poll(now, liveness)? {
                self.apply_link_update(&update);
            }
            let record = self.step(now);
            if let Some(sink) = telemetry.as_mut() {
                sink(&record);
            }

            if let Some(end) = deadline {
                if ticks_diff(clock.now_ms(), end) >= 0 {
                    break;
                }
            }

            next_ts = ticks_add(next_ts, period_ms);
            let delay = ticks_diff(next_ts, clock.now_ms());
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay as u64)).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motors::RecordingMotors;
    use crate::sensors::{ImuKind, SensorError};

    fn quiet_hub() -> QuietHub {
        QuietHub
    }

    /// Perfectly level, perfectly still sensors
    struct QuietHub;
    impl SensorHub for QuietHub {
        fn imu_kind(&self) -> ImuKind {
            ImuKind::Absent
        }
        fn sample(&mut self, now_ms: u32) -> Result<SensorSample, SensorError> {
            Ok(SensorSample {
                ts_ms: now_ms,
                accel_g: Some([0.0, 0.0, 1.0]),
                gyro_dps: Some([0.0, 0.0, 0.0]),
                ..Default::default()
            })
        }
    }

    /// Fails every read after the first
    struct FlakyHub {
        reads: u32,
    }
    impl SensorHub for FlakyHub {
        fn imu_kind(&self) -> ImuKind {
            ImuKind::Absent
        }
        fn sample(&mut self, now_ms: u32) -> Result<SensorSample, SensorError> {
            self.reads += 1;
            if self.reads == 1 {
                Ok(SensorSample {
                    ts_ms: now_ms,
                    accel_g: Some([0.0, 0.5, 0.866]),
                    gyro_dps: Some([0.0, 0.0, 0.0]),
                    ..Default::default()
                })
            } else {
                Err(SensorError::Fault("bus timeout".into()))
            }
        }
    }

    fn fc(config: FlightConfig) -> FlightComputer<QuietHub, RecordingMotors> {
        FlightComputer::new(config, quiet_hub(), RecordingMotors::new())
    }

    #[test]
    fn disarmed_forces_zero_motor_output() {
        let mut fc = fc(FlightConfig::default());
        fc.set_throttle(0.9);
        fc.roll_sp_deg = 15.0; // force a large axis demand
        let record = fc.step(10);
        assert_eq!(record.throttle, 0.0);
        assert_eq!(fc.motors.last(), MotorMix::ZERO);
        // The record still carries the would-be mix: the axis demand shows
        // up in telemetry even though the hardware got zeros
        assert!(record.mix.l1 > 0.5);
        assert!(record.mix.r1 < -0.5);
    }

    #[test]
    fn armed_passes_clamped_throttle() {
        let mut fc = fc(FlightConfig::default());
        fc.arm();
        fc.set_throttle(1.7);
        let record = fc.step(10);
        assert_eq!(record.throttle, 1.0);
        assert!(fc.motors.last().l1 > 0.9);
        // Disarming snaps the hardware back to zero on the next tick
        fc.disarm();
        fc.step(20);
        assert_eq!(fc.motors.last(), MotorMix::ZERO);
    }

    #[test]
    fn dt_clamp_only_inflates() {
        let mut fc = fc(FlightConfig::default());
        // First tick: no previous timestamp, nominal period
        assert!((fc.step(1000).dt - 0.01).abs() < 1e-6);
        // 5ms elapsed at 100Hz: clamped up to the nominal 10ms
        assert!((fc.step(1005).dt - 0.01).abs() < 1e-6);
        // 30ms elapsed: measured value wins
        assert!((fc.step(1035).dt - 0.03).abs() < 1e-6);
    }

    #[test]
    fn sensor_fault_substitutes_last_known_good() {
        let motors = RecordingMotors::new();
        let mut fc = FlightComputer::new(FlightConfig::default(), FlakyHub { reads: 0 }, motors);
        let first = fc.step(10);
        let second = fc.step(20);
        let third = fc.step(30);
        // The tilted accel vector keeps feeding the estimator after the
        // hub starts failing; nothing resets and nothing goes NaN
        assert!(first.roll_deg.is_finite());
        assert!(second.roll_deg > first.roll_deg);
        assert!(third.roll_deg > second.roll_deg);
    }

    #[test]
    fn reset_on_arm_policy() {
        let config = FlightConfig {
            roll_gains: PidGains { kp: 0.0, ki: 1.0, kd: 0.0 },
            ..Default::default()
        };

        // Default policy: integrator windup survives a disarm/arm cycle
        let mut fc = fc(config.clone());
        fc.roll_sp_deg = 10.0;
        for t in 0..20 {
            fc.step(t * 10);
        }
        let wound_up = fc.pid_roll.integral();
        assert!(wound_up > 0.0);
        fc.arm();
        assert_eq!(fc.pid_roll.integral(), wound_up);

        // Opt-in reset: arming clears the controllers
        let mut fc = fc_with(config, true);
        fc.roll_sp_deg = 10.0;
        for t in 0..20 {
            fc.step(t * 10);
        }
        assert!(fc.pid_roll.integral() > 0.0);
        fc.arm();
        assert_eq!(fc.pid_roll.integral(), 0.0);
    }

    fn fc_with(mut config: FlightConfig, reset_on_arm: bool) -> FlightComputer<QuietHub, RecordingMotors> {
        config.reset_on_arm = reset_on_arm;
        FlightComputer::new(config, quiet_hub(), RecordingMotors::new())
    }

    #[test]
    fn command_maps_sticks_to_setpoints() {
        let mut fc = fc(FlightConfig::default());
        fc.apply_command(&ControlCommand {
            throttle: 0.5,
            roll: 0.5,
            pitch: -1.0,
            yaw: 0.25,
            authenticated: false,
        });
        assert_eq!(fc.throttle, 0.5);
        assert_eq!(fc.roll_sp_deg, 10.0);
        assert_eq!(fc.pitch_sp_deg, -20.0);
        assert_eq!(fc.yaw_rate_sp_dps, 22.5);

        // A failsafe update touches the throttle only
        fc.apply_link_update(&LinkUpdate::FailsafeThrottle(0.1));
        assert_eq!(fc.throttle, 0.1);
        assert_eq!(fc.roll_sp_deg, 10.0);
    }

    #[test]
    fn button_arms_after_debounce_and_resets_when_configured() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let pressed = Arc::new(AtomicBool::new(false));
        let reader = Arc::clone(&pressed);
        let mut config = FlightConfig::default();
        config.reset_on_arm = true;
        let mut fc = FlightComputer::new(config, quiet_hub(), RecordingMotors::new())
            .with_button(move || reader.load(Ordering::Relaxed));

        fc.step(0);
        assert!(!fc.is_armed());
        pressed.store(true, Ordering::Relaxed);
        fc.step(10);
        assert!(!fc.is_armed(), "still inside the debounce window");
        fc.step(100);
        assert!(fc.is_armed(), "held past the debounce window");
    }

    #[test]
    fn heartbeat_toggles_every_tick() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let toggles = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&toggles);
        let mut fc = FlightComputer::new(FlightConfig::default(), quiet_hub(), RecordingMotors::new())
            .with_heartbeat(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        for t in 0..5 {
            fc.step(t * 10);
        }
        assert_eq!(toggles.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn non_finite_throttle_latches_zero() {
        let mut fc = fc(FlightConfig::default());
        fc.arm();
        fc.set_throttle(f32::NAN);
        let record = fc.step(10);
        assert_eq!(record.throttle, 0.0);
    }

    #[test]
    fn record_display_is_one_line() {
        let mut fc = fc(FlightConfig::default());
        let record = fc.step(10);
        let line = record.to_string();
        assert!(line.starts_with("dt="));
        assert!(!line.contains('\n'));
    }

    #[tokio::test]
    async fn bounded_run_terminates() {
        let mut fc = fc(FlightConfig::default());
        let mut ticks = 0u32;
        fc.run(Some(0.05), Some(|_record: &TickRecord| ticks += 1)).await;
        assert!(ticks >= 2, "expected a few ticks in 50ms, got {ticks}");
    }
}
