//! # Debounced arm/disarm state machine
//!
//! The single authority on whether mixed motor commands may reach hardware.
//! Arming toggles either through the explicit API or through a physical
//! button that must hold its pressed level for a debounce window; a lockout
//! window after each button-driven transition keeps switch chatter from
//! toggling straight back.
//!
//! While [`Disarmed`](ArmState::Disarmed) the flight loop forces all four
//! motor outputs to zero. [`Armed`](ArmState::Armed) merely permits output,
//! it never causes any.

use crate::clock::{ticks_add, ticks_diff};

/// Default time the button level must stay stable before it counts (ms)
pub const DEFAULT_DEBOUNCE_MS: u32 = 80;
/// Default suppression window after a button-driven transition (ms)
pub const DEFAULT_LOCKOUT_MS: u32 = 500;

/// Whether motor output is permitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmState {
    /// Motor output is forced to zero by the flight loop
    Disarmed,
    /// Motor output is permitted (not caused)
    Armed,
}

/// Debounced arm switch
///
/// Tracks the raw button level, the tick of its last change and a lockout
/// deadline. All tick arithmetic is wraparound-safe.
#[derive(Debug, Clone)]
pub struct ArmSwitch {
    state: ArmState,
    debounce_ms: u32,
    lockout_ms: u32,
    last_raw_pressed: bool,
    last_change_tick: u32,
    lockout_until_tick: u32,
}

impl ArmSwitch {
    /// Create a disarmed switch with the given windows
    ///
    /// # Arguments
    ///
    /// * `debounce_ms` - Minimum stable-pressed duration before a toggle
    /// * `lockout_ms` - Suppression window after each button-driven toggle
    pub fn new(debounce_ms: u32, lockout_ms: u32) -> Self {
        ArmSwitch {
            state: ArmState::Disarmed,
            debounce_ms,
            lockout_ms,
            last_raw_pressed: false,
            last_change_tick: 0,
            lockout_until_tick: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> ArmState {
        self.state
    }

    /// True while armed
    pub fn is_armed(&self) -> bool {
        self.state == ArmState::Armed
    }

    /// Explicitly arm; always succeeds, idempotent
    pub fn arm(&mut self) {
        self.state = ArmState::Armed;
    }

    /// Explicitly disarm; always succeeds, idempotent
    pub fn disarm(&mut self) {
        self.state = ArmState::Disarmed;
    }

    /// Feed one raw button reading
    ///
    /// A level change restarts the debounce timer without transitioning.
    /// Once the pressed level has been stable for the debounce window and no
    /// lockout is active, the state toggles and a new lockout begins. A
    /// button that stays held re-toggles after each lockout expires.
    ///
    /// # Arguments
    ///
    /// * `now_ms` - Current monotonic tick
    /// * `raw_pressed` - Raw digital level, `true` while the button is down
    ///
    /// # Returns
    ///
    /// The new state if this reading caused a transition, `None` otherwise.
    pub fn update(&mut self, now_ms: u32, raw_pressed: bool) -> Option<ArmState> {
        if raw_pressed != self.last_raw_pressed {
            self.last_change_tick = now_ms;
            self.last_raw_pressed = raw_pressed;
        }
        if !raw_pressed {
            return None;
        }
        if ticks_diff(now_ms, self.last_change_tick) < self.debounce_ms as i32 {
            return None;
        }
        if ticks_diff(now_ms, self.lockout_until_tick) < 0 {
            return None;
        }
        self.state = match self.state {
            ArmState::Disarmed => ArmState::Armed,
            ArmState::Armed => ArmState::Disarmed,
        };
        self.lockout_until_tick = ticks_add(now_ms, self.lockout_ms);
        Some(self.state)
    }
}

impl Default for ArmSwitch {
    fn default() -> Self {
        ArmSwitch::new(DEFAULT_DEBOUNCE_MS, DEFAULT_LOCKOUT_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disarmed() {
        let sw = ArmSwitch::default();
        assert_eq!(sw.state(), ArmState::Disarmed);
    }

    #[test]
    fn explicit_api_is_idempotent() {
        let mut sw = ArmSwitch::default();
        sw.arm();
        sw.arm();
        assert!(sw.is_armed());
        sw.disarm();
        sw.disarm();
        assert!(!sw.is_armed());
    }

    #[test]
    fn short_press_is_rejected() {
        let mut sw = ArmSwitch::default();
        assert_eq!(sw.update(1000, true), None);
        assert_eq!(sw.update(1050, true), None); // 50ms < 80ms window
        assert_eq!(sw.update(1060, false), None); // released before the window
        assert!(!sw.is_armed());
    }

    #[test]
    fn long_press_toggles_once() {
        let mut sw = ArmSwitch::default();
        assert_eq!(sw.update(1000, true), None);
        assert_eq!(sw.update(1080, true), Some(ArmState::Armed));
        // Immediately after the toggle the lockout suppresses re-triggering
        assert_eq!(sw.update(1090, true), None);
        assert_eq!(sw.update(1400, true), None);
        assert!(sw.is_armed());
    }

    #[test]
    fn held_button_retoggles_after_lockout() {
        let mut sw = ArmSwitch::default();
        sw.update(1000, true);
        assert_eq!(sw.update(1080, true), Some(ArmState::Armed));
        // Lockout runs until 1580; a held button toggles back afterwards
        assert_eq!(sw.update(1579, true), None);
        assert_eq!(sw.update(1580, true), Some(ArmState::Disarmed));
    }

    #[test]
    fn bounce_restarts_the_debounce_timer() {
        let mut sw = ArmSwitch::default();
        sw.update(1000, true);
        sw.update(1040, false); // bounce
        sw.update(1050, true);
        // 80ms from the last change (1050), not from the first press
        assert_eq!(sw.update(1120, true), None);
        assert_eq!(sw.update(1130, true), Some(ArmState::Armed));
    }

    #[test]
    fn debounce_survives_tick_wraparound() {
        let mut sw = ArmSwitch::default();
        let t0 = u32::MAX - 20;
        sw.update(t0, true);
        assert_eq!(sw.update(t0.wrapping_add(79), true), None);
        assert_eq!(sw.update(t0.wrapping_add(80), true), Some(ArmState::Armed));
    }
}
