//! The fixed 20-byte IPv4 header: no options, ever (§4.2, §6 "Wire format").
//!
//! Grounded on the teacher's `Packet<T>`/`Repr` split as seen in its (complete)
//! `wire::udp` module; the teacher's own `wire::ipv4` only carried the `Address`/`Cidr`
//! helpers, so the `Packet`/`Repr` pair here is new, built in the same idiom.

use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;

pub use core::net::Ipv4Addr as Address;

use super::field::Field;
use super::ip::Protocol;
use crate::checksum::Checksum;
use crate::error::{Error, Result};

mod field {
    use super::Field;

    pub const VER_IHL: usize = 0;
    pub const DSCP_ECN: usize = 1;
    pub const LENGTH: Field = 2..4;
    pub const IDENT: Field = 4..6;
    pub const FLAGS_FRAG_OFFSET: Field = 6..8;
    pub const TTL: usize = 8;
    pub const PROTOCOL: usize = 9;
    pub const CHECKSUM: Field = 10..12;
    pub const SRC_ADDR: Field = 12..16;
    pub const DST_ADDR: Field = 16..20;
}

pub const HEADER_LEN: usize = 20;

/// Sentinel IHL/version byte this crate accepts: IPv4, 5 32-bit words, no options.
pub const VERSION_IHL_NO_OPTIONS: u8 = 0x45;

/// A read/write view over an IPv4 header buffer, holding no options.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> Packet<T> {
    pub const fn new_unchecked(buffer: T) -> Packet<T> {
        Packet { buffer }
    }

    pub fn new_checked(buffer: T) -> Result<Packet<T>> {
        let packet = Self::new_unchecked(buffer);
        packet.check_len()?;
        Ok(packet)
    }

    /// Ensure the buffer is at least `HEADER_LEN` long, carries no options, and that its
    /// `total_len` does not exceed the buffer it was found in.
    pub fn check_len(&self) -> Result<()> {
        let data = self.buffer.as_ref();
        if data.len() < HEADER_LEN {
            return Err(Error::Truncated);
        }
        if data[field::VER_IHL] != VERSION_IHL_NO_OPTIONS {
            return Err(Error::UnsupportedIpVersion);
        }
        if (self.total_len() as usize) < HEADER_LEN || (self.total_len() as usize) > data.len() {
            return Err(Error::Truncated);
        }
        Ok(())
    }

    pub fn into_inner(self) -> T {
        self.buffer
    }

    #[inline]
    pub fn total_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::LENGTH])
    }

    #[inline]
    pub fn ident(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::IDENT])
    }

    #[inline]
    pub fn dont_fragment(&self) -> bool {
        self.buffer.as_ref()[field::FLAGS_FRAG_OFFSET.start] & 0x40 != 0
    }

    #[inline]
    pub fn ttl(&self) -> u8 {
        self.buffer.as_ref()[field::TTL]
    }

    #[inline]
    pub fn protocol(&self) -> Protocol {
        Protocol::from(self.buffer.as_ref()[field::PROTOCOL])
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::CHECKSUM])
    }

    #[inline]
    pub fn src_addr(&self) -> Address {
        Address::from(<[u8; 4]>::try_from(&self.buffer.as_ref()[field::SRC_ADDR]).unwrap())
    }

    #[inline]
    pub fn dst_addr(&self) -> Address {
        Address::from(<[u8; 4]>::try_from(&self.buffer.as_ref()[field::DST_ADDR]).unwrap())
    }

    /// Verify the header checksum (covers only the header, per RFC 791).
    pub fn verify_checksum(&self) -> bool {
        let mut sum = Checksum::init();
        sum.add_range(&self.buffer.as_ref()[..HEADER_LEN]);
        sum.verify()
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Packet<&'a T> {
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        let total_len = self.total_len() as usize;
        &self.buffer.as_ref()[HEADER_LEN..total_len]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    #[inline]
    pub fn set_ver_ihl_no_options(&mut self) {
        self.buffer.as_mut()[field::VER_IHL] = VERSION_IHL_NO_OPTIONS;
    }

    #[inline]
    pub fn set_dscp_ecn(&mut self, value: u8) {
        self.buffer.as_mut()[field::DSCP_ECN] = value;
    }

    #[inline]
    pub fn set_total_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::LENGTH], value)
    }

    #[inline]
    pub fn set_ident(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::IDENT], value)
    }

    #[inline]
    pub fn set_dont_fragment(&mut self, value: bool) {
        let data = self.buffer.as_mut();
        let flags = data[field::FLAGS_FRAG_OFFSET.start] & !0x40;
        data[field::FLAGS_FRAG_OFFSET.start] = flags | if value { 0x40 } else { 0 };
    }

    #[inline]
    pub fn set_ttl(&mut self, value: u8) {
        self.buffer.as_mut()[field::TTL] = value;
    }

    #[inline]
    pub fn set_protocol(&mut self, value: Protocol) {
        self.buffer.as_mut()[field::PROTOCOL] = value.into();
    }

    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::CHECKSUM], value)
    }

    #[inline]
    pub fn set_src_addr(&mut self, value: Address) {
        self.buffer.as_mut()[field::SRC_ADDR].copy_from_slice(&value.octets());
    }

    #[inline]
    pub fn set_dst_addr(&mut self, value: Address) {
        self.buffer.as_mut()[field::DST_ADDR].copy_from_slice(&value.octets());
    }

    /// Recompute and write the header checksum.
    pub fn fill_checksum(&mut self) {
        self.set_checksum(0);
        let checksum = {
            let mut sum = Checksum::init();
            sum.add_range(&self.buffer.as_ref()[..HEADER_LEN]);
            sum.result()
        };
        self.set_checksum(checksum);
    }

    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let total_len = self.total_len() as usize;
        &mut self.buffer.as_mut()[HEADER_LEN..total_len]
    }
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Packet<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

/// A parsed IPv4 header: the values the rest of the crate passes around instead of a
/// byte-level `Packet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repr {
    pub src_addr: Address,
    pub dst_addr: Address,
    pub protocol: Protocol,
    pub payload_len: usize,
    pub ident: u16,
    pub dont_fragment: bool,
    pub ttl: u8,
}

impl Repr {
    pub fn parse<T: AsRef<[u8]> + ?Sized>(packet: &Packet<&T>) -> Result<Repr> {
        if !packet.verify_checksum() {
            return Err(Error::Checksum);
        }
        Ok(Repr {
            src_addr: packet.src_addr(),
            dst_addr: packet.dst_addr(),
            protocol: packet.protocol(),
            payload_len: packet.total_len() as usize - HEADER_LEN,
            ident: packet.ident(),
            dont_fragment: packet.dont_fragment(),
            ttl: packet.ttl(),
        })
    }

    pub const fn buffer_len(&self) -> usize {
        HEADER_LEN
    }

    /// Emit into a header-sized buffer (the payload, if any, is written separately by
    /// the caller immediately after).
    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]>>(&self, buffer: &mut Packet<T>) {
        buffer.set_ver_ihl_no_options();
        buffer.set_dscp_ecn(0);
        buffer.set_total_len((HEADER_LEN + self.payload_len) as u16);
        buffer.set_ident(self.ident);
        buffer.set_dont_fragment(self.dont_fragment);
        buffer.set_ttl(self.ttl);
        buffer.set_protocol(self.protocol);
        buffer.set_src_addr(self.src_addr);
        buffer.set_dst_addr(self.dst_addr);
        buffer.fill_checksum();
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "IPv4 {} -> {} proto={} len={}",
            self.src_addr, self.dst_addr, self.protocol, self.payload_len
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> [u8; HEADER_LEN] {
        let repr = Repr {
            src_addr: Address::new(10, 0, 0, 1),
            dst_addr: Address::new(10, 0, 0, 2),
            protocol: Protocol::Tcp,
            payload_len: 0,
            ident: 0x1234,
            dont_fragment: true,
            ttl: 0x40,
        };
        let mut buffer = [0u8; HEADER_LEN];
        let mut packet = Packet::new_unchecked(&mut buffer);
        repr.emit(&mut packet);
        buffer
    }

    #[test]
    fn emit_then_parse_round_trips() {
        let buffer = sample();
        let packet = Packet::new_checked(&buffer[..]).unwrap();
        let repr = Repr::parse(&packet).unwrap();
        assert_eq!(repr.src_addr, Address::new(10, 0, 0, 1));
        assert_eq!(repr.dst_addr, Address::new(10, 0, 0, 2));
        assert_eq!(repr.protocol, Protocol::Tcp);
        assert_eq!(repr.ident, 0x1234);
        assert!(repr.dont_fragment);
    }

    #[test]
    fn rejects_options() {
        let mut buffer = sample();
        buffer[0] = 0x46; // IHL = 6, i.e. options present
        assert_eq!(
            Packet::new_checked(&buffer[..]).unwrap_err(),
            Error::UnsupportedIpVersion
        );
    }

    #[test]
    fn rejects_corrupted_checksum() {
        let mut buffer = sample();
        buffer[10] ^= 0xff;
        let packet = Packet::new_unchecked(&buffer[..]);
        assert!(!packet.verify_checksum());
    }
}
