//! The handful of IP-layer concepts shared by the TCP, UDP, and ICMP codecs: the
//! `protocol` byte and the pseudo-header it feeds into.

use core::fmt;

/// The IPv4 `protocol` field, restricted to the three values this crate's dispatcher
/// ever routes on (§2, "protocol branch (TCP/UDP/ICMP)"). Anything else is an
/// `Unknown` that the downstream handler silently drops.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
pub enum Protocol {
    Icmp,
    Tcp,
    Udp,
    Unknown(u8),
}

impl From<u8> for Protocol {
    fn from(value: u8) -> Protocol {
        match value {
            0x01 => Protocol::Icmp,
            0x06 => Protocol::Tcp,
            0x11 => Protocol::Udp,
            other => Protocol::Unknown(other),
        }
    }
}

impl From<Protocol> for u8 {
    fn from(value: Protocol) -> u8 {
        match value {
            Protocol::Icmp => 0x01,
            Protocol::Tcp => 0x06,
            Protocol::Udp => 0x11,
            Protocol::Unknown(other) => other,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Protocol::Icmp => write!(f, "ICMP"),
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Unknown(id) => write!(f, "0x{id:02x}"),
        }
    }
}
