//! # Monotonic millisecond tick source
//!
//! All timing in the crate is done on a `u32` millisecond counter. Embedded
//! monotonic clocks wrap, so deltas must always go through [`ticks_diff`]
//! rather than plain subtraction.

use std::time::Instant;

/// Wraparound-safe signed difference between two millisecond tick values
///
/// Computes `newer - older` assuming the counter may have wrapped at most
/// once between the two readings. The result is positive when `newer` is
/// later than `older` and negative when it is earlier.
///
/// # Arguments
///
/// * `newer` - The more recent tick reading
/// * `older` - The earlier tick reading
pub fn ticks_diff(newer: u32, older: u32) -> i32 {
    newer.wrapping_sub(older) as i32
}

/// Tick value `delay_ms` milliseconds after `base`, wrapping at the counter
/// boundary
pub fn ticks_add(base: u32, delay_ms: u32) -> u32 {
    base.wrapping_add(delay_ms)
}

/// Source of monotonic millisecond ticks
///
/// The flight loop and the control link read time exclusively through this
/// trait so that tests can drive them with a scripted clock.
pub trait Clock {
    /// Current tick value in milliseconds
    ///
    /// Monotonic between calls modulo `u32` wraparound.
    fn now_ms(&self) -> u32;
}

/// Wall clock backed by [`std::time::Instant`]
///
/// Ticks count milliseconds since the clock was created, truncated to `u32`
/// (so they wrap after about 49.7 days, like the embedded counters this
/// mirrors).
pub struct WallClock {
    epoch: Instant,
}

impl WallClock {
    /// Create a wall clock with its epoch at the current instant
    pub fn new() -> Self {
        WallClock { epoch: Instant::now() }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        WallClock::new()
    }
}

impl Clock for WallClock {
    fn now_ms(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_is_signed() {
        assert_eq!(ticks_diff(1500, 1000), 500);
        assert_eq!(ticks_diff(1000, 1500), -500);
    }

    #[test]
    fn diff_survives_wraparound() {
        // 100ms after the counter wrapped past u32::MAX
        assert_eq!(ticks_diff(50, u32::MAX - 49), 100);
        assert_eq!(ticks_diff(u32::MAX - 49, 50), -100);
    }

    #[test]
    fn add_wraps() {
        assert_eq!(ticks_add(u32::MAX, 1), 0);
        assert_eq!(ticks_diff(ticks_add(u32::MAX - 10, 500), u32::MAX - 10), 500);
    }

    #[test]
    fn wall_clock_advances() {
        let clock = WallClock::new();
        let a = clock.now_ms();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = clock.now_ms();
        assert!(ticks_diff(b, a) >= 5);
    }
}
