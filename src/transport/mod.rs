//! # Transport Module
//!
//! Live downlink of committed records over an unreliable datagram link.
//!
//! This module handles:
//! - Six-byte peer addressing
//! - The link provider traits and a UDP broadcast implementation
//! - The thread-safe receive queue and role-bound transport

pub mod address;
pub mod link;
pub mod queue;

pub use address::MacAddress;
pub use link::{Link, LinkReceiver, ReceiveHandler, UdpLink};
pub use queue::{Packet, PacketQueue, Role, TransportQueue, MAX_PAYLOAD};
