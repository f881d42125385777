//! Six-byte link addresses

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

/// Link-layer address of a peer
///
/// On the UDP link the six bytes carry the IPv4 octets followed by the
/// big-endian port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Every peer on the link
    pub const BROADCAST: MacAddress = MacAddress([0xFF; 6]);

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

impl From<SocketAddrV4> for MacAddress {
    fn from(addr: SocketAddrV4) -> Self {
        let [a, b, c, d] = addr.ip().octets();
        let [hi, lo] = addr.port().to_be_bytes();
        MacAddress([a, b, c, d, hi, lo])
    }
}

impl From<MacAddress> for SocketAddrV4 {
    fn from(mac: MacAddress) -> Self {
        let [a, b, c, d, hi, lo] = mac.0;
        SocketAddrV4::new(Ipv4Addr::new(a, b, c, d), u16::from_be_bytes([hi, lo]))
    }
}
