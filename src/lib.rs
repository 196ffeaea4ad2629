//! # Flight computer and UDP ground link for a brushed quad-X micro drone
//!
//! This crate provides the host-testable core of a small quadrotor: a
//! complementary-filter attitude estimator, per-axis PID controllers, a
//! quad-X motor mixer, a debounced arm switch, and an authenticated UDP
//! control protocol with failsafe soft landing. Everything runs in one
//! fixed-rate loop owned by [`FlightComputer`].
//!
//! # Architecture
//!
//! The crate splits along the boundary between control math and hardware:
//! - The estimator, PIDs, mixer and arm switch are pure state machines
//!   that take a monotonic millisecond tick as input. They never block
//!   and never allocate in the hot path.
//! - Hardware hides behind the [`sensors::SensorHub`] and
//!   [`motors::MotorDriver`] traits, so the same loop flies a bench
//!   simulation or a real airframe.
//! - The ground station speaks a line-oriented datagram protocol over
//!   UDP, optionally signed with a shared secret. [`link::ControlLink`]
//!   polls it non-blockingly once per tick and degrades to a throttle
//!   ramp-down when the link goes quiet.
//!
//! All timing uses an unsigned 32-bit millisecond tick with wraparound
//! arithmetic, so the loop behaves the same on a host and on a
//! microcontroller-style clock that rolls over.
//!
//! See the programs under `demos/` for how to wire the pieces together.

#![deny(missing_docs)]

pub mod arming;
pub mod attitude;
pub mod clock;
pub mod flight;
pub mod link;
pub mod mixer;
pub mod motors;
pub mod pid;
pub mod protocol;
pub mod sensors;

pub use attitude::ComplementaryFilter;
pub use flight::{FlightComputer, FlightConfig, TickRecord};
pub use link::{ControlLink, LinkConfig, UdpTransport};
pub use pid::Pid;
