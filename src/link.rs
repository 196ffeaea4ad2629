//! # Ground link
//!
//! Wraps the control protocol around a best-effort datagram transport. The
//! link never blocks the flight loop: each tick it is polled once, consumes
//! at most one datagram, and reports either a freshly accepted command or a
//! failsafe throttle override when no valid packet has arrived for too long.
//!
//! Association/binding of the underlying network is left to the transport
//! implementation; the link only needs "receive next datagram or nothing"
//! and "send reply bytes".

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;

use crate::clock::ticks_diff;
use crate::protocol::{
    self, ControlCommand, ThrottleSmoother, PING,
};

/// Default UDP port for control traffic
pub const DEFAULT_PORT: u16 = 8888;
/// Default silence before the failsafe ramp starts (ms)
pub const DEFAULT_FAILSAFE_MS: u32 = 500;

// Control packets are short ASCII lines; one receive buffer of this size is
// plenty and anything longer is garbage anyway.
const RECV_BUF_LEN: usize = 256;

/// Ground-link configuration
///
/// Deserializable from the deployment's JSON config file alongside the
/// network credentials. Every field has a default so a partial file works.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// UDP port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared secret enabling packet authentication
    #[serde(default)]
    pub secret: Option<String>,
    /// Require the packet tag; defaults to "secret configured"
    #[serde(default)]
    pub expect_signature: Option<bool>,
    /// Stick deadzone half-width for the attitude axes
    #[serde(default = "default_deadzone")]
    pub deadzone: f32,
    /// Expo blend factor for the attitude axes
    #[serde(default = "default_expo")]
    pub expo: f32,
    /// Silence tolerated before the failsafe ramp starts (ms)
    #[serde(default = "default_failsafe_ms")]
    pub failsafe_ms: u32,
    /// Duration of the failsafe throttle ramp (ms)
    #[serde(default = "default_soft_land_ms")]
    pub soft_land_ms: u32,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_deadzone() -> f32 {
    0.05
}
fn default_expo() -> f32 {
    0.2
}
fn default_failsafe_ms() -> u32 {
    DEFAULT_FAILSAFE_MS
}
fn default_soft_land_ms() -> u32 {
    protocol::DEFAULT_SOFT_LAND_MS
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            port: default_port(),
            secret: None,
            expect_signature: None,
            deadzone: default_deadzone(),
            expo: default_expo(),
            failsafe_ms: default_failsafe_ms(),
            soft_land_ms: default_soft_land_ms(),
        }
    }
}

impl LinkConfig {
    /// Whether incoming packets must carry the tag
    ///
    /// Explicit setting wins; otherwise tags are required exactly when a
    /// secret is configured.
    pub fn require_tag(&self) -> bool {
        self.expect_signature.unwrap_or(self.secret.is_some())
    }

    /// Load a configuration from a JSON file
    ///
    /// # Errors
    ///
    /// Fails when the file is missing or not valid JSON; the message names
    /// the path so a misdeployed device is easy to diagnose.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("link config file '{}' not readable: {}", path.display(), e)
        })?;
        let config: LinkConfig = serde_json::from_str(&text).map_err(|e| {
            anyhow::anyhow!("link config file '{}' is not valid JSON: {}", path.display(), e)
        })?;
        Ok(config)
    }
}

/// Best-effort datagram transport
///
/// Implementations must not block: absence of a datagram is a normal
/// outcome, reported as `Ok(None)`.
pub trait Transport {
    /// Receive the next pending datagram, if any
    ///
    /// # Returns
    ///
    /// `Ok(Some((len, sender)))` when a datagram was copied into `buf`,
    /// `Ok(None)` when nothing is pending.
    fn try_recv(&mut self, buf: &mut [u8]) -> anyhow::Result<Option<(usize, SocketAddr)>>;

    /// Send reply bytes to a peer, best-effort
    fn send_to(&mut self, data: &[u8], peer: SocketAddr) -> anyhow::Result<()>;
}

/// Non-blocking UDP transport
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind a UDP socket on all interfaces at the given port
    ///
    /// # Errors
    ///
    /// Fails if the port cannot be bound; the system must not start on a
    /// half-working link.
    pub async fn bind(port: u16) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port))
            .await
            .map_err(|e| anyhow::anyhow!("failed to bind UDP port {}: {}", port, e))?;
        Ok(UdpTransport { socket })
    }

    /// The bound local address
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl Transport for UdpTransport {
    fn try_recv(&mut self, buf: &mut [u8]) -> anyhow::Result<Option<(usize, SocketAddr)>> {
        match self.socket.try_recv_from(buf) {
            Ok((len, peer)) => Ok(Some((len, peer))),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(anyhow::anyhow!("UDP receive failed: {}", e)),
        }
    }

    fn send_to(&mut self, data: &[u8], peer: SocketAddr) -> anyhow::Result<()> {
        // Replies are best-effort; a full send buffer just drops the ACK
        match self.socket.try_send_to(data, peer) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(anyhow::anyhow!("UDP send failed: {}", e)),
        }
    }
}

/// Optional liveness data carried in acknowledgements
///
/// Platforms that can read a battery voltage or link RSSI report them here;
/// the defaults report nothing and the ACK omits the fields.
pub trait Liveness {
    /// Battery voltage estimate in volts
    fn battery_voltage(&self) -> Option<f32> {
        None
    }
    /// Received signal strength indication
    fn rssi(&self) -> Option<i32> {
        None
    }
}

/// A platform with no liveness instrumentation
impl Liveness for () {}

/// Outcome of polling the link for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinkUpdate {
    /// A packet was accepted; apply it to the setpoints
    Command(ControlCommand),
    /// The link is stale; override the commanded throttle only
    FailsafeThrottle(f32),
}

/// The ground link: protocol state bound to a transport
///
/// Owns the failsafe smoother and the last-valid timestamp. Single-threaded
/// by design: the flight loop polls it once per tick.
pub struct ControlLink<T: Transport> {
    transport: T,
    config: LinkConfig,
    smoother: ThrottleSmoother,
    last_valid_ms: u32,
}

impl<T: Transport> ControlLink<T> {
    /// Create a link over an established transport
    ///
    /// # Arguments
    ///
    /// * `transport` - Bound datagram transport
    /// * `config` - Link configuration
    /// * `now_ms` - Current monotonic tick; the link starts "fresh" so the
    ///   failsafe only engages after real silence
    pub fn new(transport: T, config: LinkConfig, now_ms: u32) -> Self {
        let smoother = ThrottleSmoother::new(config.soft_land_ms);
        ControlLink {
            transport,
            config,
            smoother,
            last_valid_ms: now_ms,
        }
    }

    /// The link configuration
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Poll the link once
    ///
    /// Consumes at most one pending datagram. Heartbeats are acknowledged
    /// but are not control-valid and do not reset the failsafe timer.
    /// Malformed or unauthenticated packets are dropped silently with no
    /// reply and no state change. After datagram handling the staleness
    /// check runs: more than `failsafe_ms` without a valid control packet
    /// produces one failsafe tick, whether the silence was empty air or a
    /// stream of garbage.
    ///
    /// # Arguments
    ///
    /// * `now_ms` - Current monotonic tick
    /// * `liveness` - Source of optional ACK fields
    ///
    /// # Errors
    ///
    /// Only transport failures propagate; protocol violations never do.
    pub fn poll(
        &mut self,
        now_ms: u32,
        liveness: &impl Liveness,
    ) -> anyhow::Result<Option<LinkUpdate>> {
        let mut buf = [0u8; RECV_BUF_LEN];
        let mut accepted = None;

        if let Some((len, peer)) = self.transport.try_recv(&mut buf)? {
            let text = String::from_utf8_lossy(&buf[..len]);
            let msg = text.trim();
            if msg == PING {
                // Link-alive and control-valid are distinct signals
                self.send_ack(false, peer, liveness)?;
            } else if let Ok(cmd) = self.decode(msg) {
                self.last_valid_ms = now_ms;
                self.send_ack(cmd.authenticated, peer, liveness)?;
                accepted = Some(LinkUpdate::Command(cmd));
            }
            // Drop anything else silently: no reply, no state change
        }

        if let Some(update) = accepted {
            return Ok(Some(update));
        }
        if ticks_diff(now_ms, self.last_valid_ms) > self.config.failsafe_ms as i32 {
            let throttle = self.smoother.on_fail(now_ms);
            return Ok(Some(LinkUpdate::FailsafeThrottle(throttle)));
        }
        Ok(None)
    }

    fn decode(&mut self, msg: &str) -> Result<ControlCommand, protocol::ProtocolError> {
        let (payload, authenticated) =
            protocol::validate_payload(msg, self.config.secret.as_deref())?;
        let (t, r, p, y) = protocol::parse_packet(payload, self.config.require_tag())?;
        let (t, r, p, y) =
            protocol::process_controls(t, r, p, y, self.config.deadzone, self.config.expo);
        let throttle = self.smoother.on_valid(t);
        Ok(ControlCommand {
            throttle,
            roll: r,
            pitch: p,
            yaw: y,
            authenticated,
        })
    }

    fn send_ack(
        &mut self,
        authenticated: bool,
        peer: SocketAddr,
        liveness: &impl Liveness,
    ) -> anyhow::Result<()> {
        let ack = protocol::build_ack(authenticated, liveness.battery_voltage(), liveness.rssi());
        self.transport.send_to(ack.as_bytes(), peer)
    }
}
