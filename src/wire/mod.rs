//! Packet representation: byte-level accessors (`Packet<T>`) and parsed, high-level
//! values (`Repr`), following the split the teacher crate uses throughout its own
//! `wire` module.
//!
//! A `Packet<T>` is a thin, panicking-only-after-`check_len` view over a byte buffer.
//! A `Repr` is produced by `Repr::parse` and consumed by `Repr::emit`, and is the type
//! the rest of the crate actually passes around — nothing outside this module reaches
//! into a `Packet` field by field.

mod field {
    pub type Field = core::ops::Range<usize>;
}

pub(crate) mod icmpv4;
pub(crate) mod ip;
pub(crate) mod ipv4;
pub(crate) mod tcp;
pub(crate) mod udp;

pub use self::icmpv4::{
    Packet as Icmpv4Packet, Repr as Icmpv4Repr, HEADER_LEN as ICMPV4_HEADER_LEN,
};
pub use self::ip::Protocol as IpProtocol;
pub use self::ipv4::{Packet as Ipv4Packet, Repr as Ipv4Repr, HEADER_LEN as IPV4_HEADER_LEN};
pub use self::tcp::{
    Flags as TcpFlags, Packet as TcpPacket, Repr as TcpRepr, HEADER_LEN as TCP_HEADER_LEN,
};
pub use self::udp::{Packet as UdpPacket, Repr as UdpRepr, HEADER_LEN as UDP_HEADER_LEN};

pub use crate::error::{Error, Result};
