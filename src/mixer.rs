//! # Quad-X motor mixing
//!
//! Maps a collective throttle plus three normalized axis demands onto the
//! four motors of an X-configured frame. The mixer is pure arithmetic with
//! no safety authority: forcing outputs to zero while disarmed is the flight
//! loop's job and happens after mixing.

/// Four signed motor commands in `[-1, 1]`
///
/// Signed values support brushed H-bridge drivers which can brake or
/// reverse; a unidirectional ESC layer would clamp negatives to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotorMix {
    /// Front-left motor
    pub l1: f32,
    /// Rear-left motor
    pub l2: f32,
    /// Front-right motor
    pub r1: f32,
    /// Rear-right motor
    pub r2: f32,
}

impl MotorMix {
    /// The all-zero mix, what reaches the hardware while disarmed
    pub const ZERO: MotorMix = MotorMix { l1: 0.0, l2: 0.0, r1: 0.0, r2: 0.0 };

    /// The four commands in `(l1, l2, r1, r2)` order
    pub fn as_tuple(&self) -> (f32, f32, f32, f32) {
        (self.l1, self.l2, self.r1, self.r2)
    }
}

/// Mix throttle and axis demands into four motor commands
///
/// Quad-X sign matrix:
///
/// ```text
/// l1 = t + roll + pitch - yaw
/// l2 = t + roll - pitch + yaw
/// r1 = t - roll + pitch + yaw
/// r2 = t - roll - pitch - yaw
/// ```
///
/// Each output is clamped to `[-1, 1]`.
///
/// # Arguments
///
/// * `throttle` - Collective demand, normally in `[0, 1]`
/// * `u_roll` - Roll demand in `[-1, 1]`
/// * `u_pitch` - Pitch demand in `[-1, 1]`
/// * `u_yaw` - Yaw demand in `[-1, 1]`
pub fn mix(throttle: f32, u_roll: f32, u_pitch: f32, u_yaw: f32) -> MotorMix {
    let clamp = |x: f32| x.clamp(-1.0, 1.0);
    MotorMix {
        l1: clamp(throttle + u_roll + u_pitch - u_yaw),
        l2: clamp(throttle + u_roll - u_pitch + u_yaw),
        r1: clamp(throttle - u_roll + u_pitch + u_yaw),
        r2: clamp(throttle - u_roll - u_pitch - u_yaw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_only_is_uniform() {
        let m = mix(0.5, 0.0, 0.0, 0.0);
        assert_eq!(m.as_tuple(), (0.5, 0.5, 0.5, 0.5));
    }

    #[test]
    fn roll_demand_splits_left_right() {
        let m = mix(0.5, 0.2, 0.0, 0.0);
        assert!((m.l1 - 0.7).abs() < 1e-6);
        assert!((m.l2 - 0.7).abs() < 1e-6);
        assert!((m.r1 - 0.3).abs() < 1e-6);
        assert!((m.r2 - 0.3).abs() < 1e-6);
    }

    #[test]
    fn pitch_demand_splits_front_rear() {
        let m = mix(0.5, 0.0, 0.2, 0.0);
        assert!((m.l1 - 0.7).abs() < 1e-6);
        assert!((m.r1 - 0.7).abs() < 1e-6);
        assert!((m.l2 - 0.3).abs() < 1e-6);
        assert!((m.r2 - 0.3).abs() < 1e-6);
    }

    #[test]
    fn yaw_demand_splits_diagonals() {
        let m = mix(0.5, 0.0, 0.0, 0.2);
        assert!((m.l1 - 0.3).abs() < 1e-6);
        assert!((m.r2 - 0.3).abs() < 1e-6);
        assert!((m.l2 - 0.7).abs() < 1e-6);
        assert!((m.r1 - 0.7).abs() < 1e-6);
    }

    #[test]
    fn outputs_are_clamped() {
        let m = mix(1.0, 1.0, 1.0, -1.0);
        assert_eq!(m.l1, 1.0);
        let m = mix(0.0, -1.0, -1.0, 1.0);
        assert_eq!(m.l1, -1.0);
        let (a, b, c, d) = mix(2.0, 2.0, 2.0, 2.0).as_tuple();
        for v in [a, b, c, d] {
            assert!((-1.0..=1.0).contains(&v));
        }
    }
}
