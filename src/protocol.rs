//! # Ground-link control protocol
//!
//! Stateless parsing and shaping of ASCII control packets, optional keyed
//! packet authentication, and the stateful failsafe throttle smoother.
//!
//! Packet format (newline-terminated, optionally tagged):
//!
//! ```text
//! DRN,<throttle>,<roll>,<pitch>,<yaw>\n
//! <throttle>,<roll>,<pitch>,<yaw>\n
//! DRN,<throttle>,<roll>,<pitch>,<yaw>,<nonce>,<signature>\n
//! ```
//!
//! Ranges: throttle in `[0, 1]`, the other three axes in `[-1, 1]`. Values
//! out of range are clamped, never rejected. The literal heartbeat message
//! [`PING`] keeps the link observable without being a control packet.

use std::fmt::Write as _;

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::clock::ticks_diff;

/// Packet tag prefixing tagged control packets
pub const PACKET_TAG: &str = "DRN";

/// Heartbeat message: acknowledged, but never control-valid
pub const PING: &str = "PING";

/// Default duration of the failsafe throttle ramp (ms)
pub const DEFAULT_SOFT_LAND_MS: u32 = 1500;

/// Errors raised while decoding a control packet
///
/// Both classes are recovered locally by dropping the packet: the link sends
/// no reply and mutates no state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Malformed packet: wrong field count, non-numeric field or missing tag
    #[error("malformed packet: {0}")]
    Format(String),
    /// Signature invalid, or authentication required but fields absent
    #[error("authentication failed: {0}")]
    Auth(String),
}

/// One decoded control packet
///
/// Ephemeral: produced per received packet and consumed by the flight loop's
/// setpoint inputs, never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlCommand {
    /// Collective throttle in `[0, 1]`
    pub throttle: f32,
    /// Roll stick in `[-1, 1]`
    pub roll: f32,
    /// Pitch stick in `[-1, 1]`
    pub pitch: f32,
    /// Yaw stick in `[-1, 1]`
    pub yaw: f32,
    /// Whether the packet carried a valid signature
    pub authenticated: bool,
}

fn clamp(x: f32, lo: f32, hi: f32) -> f32 {
    if x > hi {
        hi
    } else if x < lo {
        lo
    } else {
        x
    }
}

/// Parse a CSV control packet into `(throttle, roll, pitch, yaw)`
///
/// A leading [`PACKET_TAG`] field is stripped before counting. When
/// `expect_tag` is set and the tag is absent the packet is rejected; this is
/// how authenticated deployments refuse tagless traffic. After tag removal
/// exactly four numeric fields are required. Values are clamped into their
/// canonical ranges rather than rejected.
///
/// # Arguments
///
/// * `payload` - The packet text, trailing newline tolerated
/// * `expect_tag` - Require the `DRN` tag to be present
///
/// # Errors
///
/// [`ProtocolError::Format`] on an empty payload, a missing required tag,
/// a wrong field count, or a non-numeric or non-finite field.
pub fn parse_packet(payload: &str, expect_tag: bool) -> Result<(f32, f32, f32, f32), ProtocolError> {
    let line = payload.trim();
    if line.is_empty() {
        return Err(ProtocolError::Format("empty payload".into()));
    }

    let mut parts: Vec<&str> = line.split(',').collect();
    if parts[0] == PACKET_TAG {
        parts.remove(0);
    } else if expect_tag {
        return Err(ProtocolError::Format("missing packet tag".into()));
    }

    if parts.len() != 4 {
        return Err(ProtocolError::Format(format!(
            "expected 4 CSV fields, got {}",
            parts.len()
        )));
    }

    let mut values = [0.0f32; 4];
    for (slot, field) in values.iter_mut().zip(&parts) {
        let value = field
            .trim()
            .parse::<f32>()
            .map_err(|e| ProtocolError::Format(format!("invalid numeric field '{field}': {e}")))?;
        // "NaN" and "inf" parse successfully but would sail through the
        // range clamp; nothing non-finite may reach the control path
        if !value.is_finite() {
            return Err(ProtocolError::Format(format!("non-finite field '{field}'")));
        }
        *slot = value;
    }

    Ok((
        clamp(values[0], 0.0, 1.0),
        clamp(values[1], -1.0, 1.0),
        clamp(values[2], -1.0, 1.0),
        clamp(values[3], -1.0, 1.0),
    ))
}

/// Remove near-center noise and rescale the remaining travel
///
/// Inputs with `|x| <= deadzone` map to exactly `0`; everything outside is
/// rescaled so full deflection still reaches `±1`.
pub fn apply_deadzone(x: f32, deadzone: f32) -> f32 {
    if deadzone <= 0.0 {
        return x;
    }
    if (-deadzone..=deadzone).contains(&x) {
        return 0.0;
    }
    let sign = if x > 0.0 { 1.0 } else { -1.0 };
    let mag = (x.abs() - deadzone) / (1.0 - deadzone);
    sign * clamp(mag, 0.0, 1.0)
}

/// Expo curve blending linear with cubic response
///
/// `expo` in `[0, 1]` (clamped): `0` is linear, `1` is full cubic. Mid-stick
/// inputs are pulled toward center for finer resolution while full
/// deflection is unchanged.
pub fn apply_expo(x: f32, expo: f32) -> f32 {
    let k = clamp(expo, 0.0, 1.0);
    (1.0 - k) * x + k * x * x * x
}

/// Apply deadzone then expo to the attitude axes, never the throttle
///
/// # Arguments
///
/// * `throttle`, `roll`, `pitch`, `yaw` - Clamped packet values
/// * `deadzone` - Deadzone half-width for the attitude axes
/// * `expo` - Expo blend factor for the attitude axes
pub fn process_controls(
    throttle: f32,
    roll: f32,
    pitch: f32,
    yaw: f32,
    deadzone: f32,
    expo: f32,
) -> (f32, f32, f32, f32) {
    let r = apply_expo(apply_deadzone(roll, deadzone), expo);
    let p = apply_expo(apply_deadzone(pitch, deadzone), expo);
    let y = apply_expo(apply_deadzone(yaw, deadzone), expo);
    (throttle, r, p, y)
}

/// Compute the expected packet signature
///
/// Keyed SHA-256 over `secret || payload || "|" || nonce`, lowercase hex.
pub fn compute_signature(payload: &str, nonce: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(payload.as_bytes());
    hasher.update(b"|");
    hasher.update(nonce.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        // Writing to a String cannot fail
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Constant-time string comparison
///
/// Always inspects every byte of equal-length inputs so the comparison time
/// leaks nothing about where a forged signature first diverges.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Verify and strip the authentication fields of a raw message
///
/// With no secret configured the message passes through unauthenticated.
/// Otherwise the last two comma-separated tokens must be `nonce,signature`;
/// the signature is recomputed over everything before them and compared in
/// constant time.
///
/// # Arguments
///
/// * `raw` - The raw message before tag stripping
/// * `secret` - Shared secret, or `None` to disable authentication
///
/// # Returns
///
/// `(payload, authenticated)` where `payload` excludes the auth fields.
///
/// # Errors
///
/// [`ProtocolError::Auth`] when the fields are absent or the signature does
/// not match.
pub fn validate_payload<'a>(
    raw: &'a str,
    secret: Option<&str>,
) -> Result<(&'a str, bool), ProtocolError> {
    let Some(secret) = secret else {
        return Ok((raw, false));
    };

    let mut it = raw.rsplitn(3, ',');
    let signature = it.next().unwrap_or("");
    let nonce = it.next();
    let payload = it.next();
    let (Some(nonce), Some(payload)) = (nonce, payload) else {
        return Err(ProtocolError::Auth("missing nonce/signature fields".into()));
    };

    let expected = compute_signature(payload, nonce, secret);
    if !constant_time_eq(&expected, signature) {
        return Err(ProtocolError::Auth("invalid signature".into()));
    }
    Ok((payload, true))
}

/// Build an acknowledgement line
///
/// `"ACK[ AUTH=OK][ BAT=<v.vv>][ RSSI=<int>]\n"` — optional fields are
/// omitted entirely when unavailable, never emitted as placeholders.
///
/// # Arguments
///
/// * `authenticated` - Whether the acknowledged packet carried a valid
///   signature
/// * `battery_v` - Battery voltage estimate, when the platform can supply it
/// * `rssi` - Link signal strength, when the platform can supply it
pub fn build_ack(authenticated: bool, battery_v: Option<f32>, rssi: Option<i32>) -> String {
    let mut parts = vec!["ACK".to_string()];
    if authenticated {
        parts.push("AUTH=OK".to_string());
    }
    if let Some(v) = battery_v {
        parts.push(format!("BAT={v:.2}"));
    }
    if let Some(r) = rssi {
        parts.push(format!("RSSI={r}"));
    }
    parts.join(" ") + "\n"
}

/// Failsafe throttle smoother
///
/// Tracks the last valid throttle and ramps it toward zero while the link is
/// failing. Each failure tick decays the *current* output against the time
/// elapsed since the first failure, so compounding ticks decay geometrically
/// rather than strictly linearly in real time.
#[derive(Debug, Clone)]
pub struct ThrottleSmoother {
    soft_ms: u32,
    last_out: f32,
    fail_started_tick: Option<u32>,
}

impl ThrottleSmoother {
    /// Create a smoother with the given ramp duration in milliseconds
    pub fn new(soft_ms: u32) -> Self {
        ThrottleSmoother {
            soft_ms,
            last_out: 0.0,
            fail_started_tick: None,
        }
    }

    /// Accept a valid throttle command
    ///
    /// Clears any failure in progress and latches the clamped value.
    pub fn on_valid(&mut self, throttle: f32) -> f32 {
        self.fail_started_tick = None;
        self.last_out = clamp(throttle, 0.0, 1.0);
        self.last_out
    }

    /// Register one failure tick and return the degraded throttle
    ///
    /// The first call records the failure start. Once the elapsed time
    /// reaches the ramp duration the output is exactly zero and stays there
    /// until the next [`on_valid`](ThrottleSmoother::on_valid).
    ///
    /// # Arguments
    ///
    /// * `now_ms` - Current monotonic tick
    pub fn on_fail(&mut self, now_ms: u32) -> f32 {
        let started = *self.fail_started_tick.get_or_insert(now_ms);
        let elapsed = ticks_diff(now_ms, started);
        if elapsed >= self.soft_ms as i32 {
            self.last_out = 0.0;
        } else {
            let k = 1.0 - elapsed as f32 / self.soft_ms as f32;
            self.last_out = (self.last_out * k).max(0.0);
        }
        self.last_out
    }

    /// The most recent smoother output
    pub fn last_output(&self) -> f32 {
        self.last_out
    }
}

impl Default for ThrottleSmoother {
    fn default() -> Self {
        ThrottleSmoother::new(DEFAULT_SOFT_LAND_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_and_tagged() {
        assert_eq!(parse_packet("0.5,0,-0.2,1\n", false).unwrap(), (0.5, 0.0, -0.2, 1.0));
        assert_eq!(parse_packet("DRN,1,1,1,1\n", false).unwrap(), (1.0, 1.0, 1.0, 1.0));
        assert!(matches!(
            parse_packet("DRN,1,1,1\n", false),
            Err(ProtocolError::Format(_))
        ));
    }

    #[test]
    fn parse_clamps_out_of_range_values() {
        assert_eq!(parse_packet("2,-2,0,3\n", false).unwrap(), (1.0, -1.0, 0.0, 1.0));
    }

    #[test]
    fn required_tag_enforced() {
        assert!(matches!(
            parse_packet("0.3,0,0,0", true),
            Err(ProtocolError::Format(_))
        ));
        assert_eq!(parse_packet("DRN,0.3,0,0,0", true).unwrap(), (0.3, 0.0, 0.0, 0.0));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(parse_packet("", false), Err(ProtocolError::Format(_))));
        assert!(matches!(parse_packet("\n", false), Err(ProtocolError::Format(_))));
        assert!(matches!(
            parse_packet("0.5,abc,0,0\n", false),
            Err(ProtocolError::Format(_))
        ));
        assert!(matches!(
            parse_packet("DRN,1,1,1,1,1\n", false),
            Err(ProtocolError::Format(_))
        ));
    }

    #[test]
    fn parse_rejects_non_finite_fields() {
        // These all parse as f32 but have no defined clamp behavior; a NaN
        // throttle accepted here would poison the mix all the way to the
        // motor driver
        for bad in ["NaN,0,0,0\n", "nan,0,0,0\n", "0.5,inf,0,0\n", "0.5,0,-inf,0\n", "DRN,0.5,0,0,NaN\n"] {
            assert!(
                matches!(parse_packet(bad, false), Err(ProtocolError::Format(_))),
                "{bad:?} must be rejected"
            );
        }
    }

    #[test]
    fn deadzone_zeroes_center_and_preserves_range() {
        assert_eq!(apply_deadzone(0.02, 0.05), 0.0);
        assert_eq!(apply_deadzone(-0.05, 0.05), 0.0);
        assert!(apply_deadzone(0.2, 0.05) > 0.0);
        assert!(apply_deadzone(-0.2, 0.05) < 0.0);
        assert!((apply_deadzone(1.0, 0.05) - 1.0).abs() < 1e-6);
        assert!((apply_deadzone(-1.0, 0.05) + 1.0).abs() < 1e-6);
        // Disabled deadzone passes through
        assert_eq!(apply_deadzone(0.02, 0.0), 0.02);
    }

    #[test]
    fn expo_pulls_mid_stick_toward_center() {
        let out = apply_expo(0.5, 0.5);
        assert!(out > 0.0 && out < 0.5);
        // Endpoints are unchanged
        assert!((apply_expo(1.0, 0.7) - 1.0).abs() < 1e-6);
        assert!((apply_expo(-1.0, 0.7) + 1.0).abs() < 1e-6);
        // k is clamped into [0,1]
        assert!((apply_expo(0.5, 2.0) - 0.125).abs() < 1e-6);
    }

    #[test]
    fn shaping_skips_throttle() {
        let (t, r, p, y) = process_controls(0.8, 0.02, -0.04, 0.2, 0.05, 0.3);
        assert_eq!(t, 0.8);
        assert_eq!(r, 0.0);
        assert_eq!(p, 0.0);
        assert!((-1.0..=1.0).contains(&y) && y > 0.0);
    }

    #[test]
    fn signature_roundtrip_and_tamper_rejection() {
        let secret = "hunter2";
        let payload = "DRN,0.5,0,0,0.1";
        let nonce = "12345";
        let sig = compute_signature(payload, nonce, secret);
        let raw = format!("{payload},{nonce},{sig}");

        let (stripped, signed) = validate_payload(&raw, Some(secret)).unwrap();
        assert_eq!(stripped, payload);
        assert!(signed);

        // Any tampering with the payload invalidates the signature
        let forged = format!("DRN,1.0,0,0,0.1,{nonce},{sig}");
        assert!(matches!(
            validate_payload(&forged, Some(secret)),
            Err(ProtocolError::Auth(_))
        ));
    }

    #[test]
    fn missing_auth_fields_is_auth_error() {
        assert!(matches!(
            validate_payload("DRN", Some("key")),
            Err(ProtocolError::Auth(_))
        ));
        // Four bare fields parse as payload,nonce,signature with a bogus
        // signature, which must also fail closed
        assert!(matches!(
            validate_payload("0.5,0,0,0", Some("key")),
            Err(ProtocolError::Auth(_))
        ));
    }

    #[test]
    fn no_secret_passes_through_unauthenticated() {
        let (payload, signed) = validate_payload("0.5,0,0,0", None).unwrap();
        assert_eq!(payload, "0.5,0,0,0");
        assert!(!signed);
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq("abcd", "abcd"));
        assert!(!constant_time_eq("abcd", "abce"));
        assert!(!constant_time_eq("abcd", "abc"));
    }

    #[test]
    fn ack_formatting_omits_absent_fields() {
        assert_eq!(build_ack(false, None, None), "ACK\n");
        assert_eq!(build_ack(true, None, None), "ACK AUTH=OK\n");
        assert_eq!(build_ack(false, Some(3.125), None), "ACK BAT=3.12\n");
        assert_eq!(build_ack(true, Some(3.7), Some(-61)), "ACK AUTH=OK BAT=3.70 RSSI=-61\n");
    }

    #[test]
    fn failsafe_ramp_decays_to_zero() {
        let mut sm = ThrottleSmoother::new(1000);
        assert_eq!(sm.on_valid(0.6), 0.6);

        // First failure tick marks the ramp start at full output
        assert_eq!(sm.on_fail(0), 0.6);

        // Mid-ramp: strictly between 0 and the latched value
        let mid = sm.on_fail(500);
        assert!(mid > 0.0 && mid < 0.6);
        assert!((0.25..=0.35).contains(&mid));

        // At/after the ramp duration: exactly zero, and it stays zero
        assert_eq!(sm.on_fail(1000), 0.0);
        assert_eq!(sm.on_fail(5000), 0.0);

        // A valid command restarts from the new level
        assert_eq!(sm.on_valid(0.4), 0.4);
        assert_eq!(sm.last_output(), 0.4);
    }

    #[test]
    fn compounding_fail_ticks_decay_geometrically() {
        let mut sm = ThrottleSmoother::new(1000);
        sm.on_valid(1.0);
        let a = sm.on_fail(0);
        let b = sm.on_fail(500);
        let c = sm.on_fail(750);
        // Each tick decays the current output, not the pre-failure value
        assert_eq!(a, 1.0); // elapsed 0: factor 1.0
        assert!((b - 0.5).abs() < 1e-6);
        assert!((c - 0.125).abs() < 1e-6);
    }

    #[test]
    fn failsafe_timer_survives_wraparound() {
        let mut sm = ThrottleSmoother::new(1000);
        sm.on_valid(0.8);
        let t0 = u32::MAX - 100;
        sm.on_fail(t0);
        let out = sm.on_fail(t0.wrapping_add(500));
        assert!(out > 0.0 && out < 0.8);
        assert_eq!(sm.on_fail(t0.wrapping_add(1000)), 0.0);
    }
}
