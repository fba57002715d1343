//! The fixed 8-byte UDP header (§6 "Wire format").
//!
//! Grounded on the teacher's own `wire::udp::Packet`, which this crate keeps nearly
//! verbatim; `Repr` is tightened to drop the IPv6/checksum-capability machinery this
//! core never needed (no hardware checksum offload, IPv4 only).

use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;
use core::net::Ipv4Addr;

use super::field::Field;
use crate::checksum::{self, Checksum};
use crate::error::{Error, Result};
use crate::wire::ip::Protocol;

mod field {
    use super::Field;

    pub const SRC_PORT: Field = 0..2;
    pub const DST_PORT: Field = 2..4;
    pub const LENGTH: Field = 4..6;
    pub const CHECKSUM: Field = 6..8;

    pub const fn PAYLOAD(length: u16) -> Field {
        CHECKSUM.end..(length as usize)
    }
}

pub const HEADER_LEN: usize = field::CHECKSUM.end;

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

    pub fn check_len(&self) -> Result<()> {
        let buffer_len = self.buffer.as_ref().len();
        if buffer_len < HEADER_LEN {
            return Err(Error::Truncated);
        }
        let field_len = self.len() as usize;
        if buffer_len < field_len || field_len < HEADER_LEN {
            return Err(Error::Truncated);
        }
        Ok(())
    }

    pub fn into_inner(self) -> T {
        self.buffer
    }

    #[inline]
    pub fn src_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::SRC_PORT])
    }

    #[inline]
    pub fn dst_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::DST_PORT])
    }

    #[inline]
    pub fn len(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::LENGTH])
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() as usize == HEADER_LEN
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::CHECKSUM])
    }

    pub fn verify_checksum(&self, src_addr: Ipv4Addr, dst_addr: Ipv4Addr) -> bool {
        if self.checksum() == 0 {
            // RFC 768: an all-zero checksum means none was computed.
            return true;
        }
        let data = self.buffer.as_ref();
        let mut sum = Checksum::init();
        sum.add_u16(checksum::pseudo_header(
            src_addr,
            dst_addr,
            Protocol::Udp,
            self.len(),
        ));
        sum.add_range(&data[..self.len() as usize]);
        sum.verify()
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Packet<&'a T> {
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        let length = self.len();
        &self.buffer.as_ref()[field::PAYLOAD(length)]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    #[inline]
    pub fn set_src_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::SRC_PORT], value)
    }

    #[inline]
    pub fn set_dst_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::DST_PORT], value)
    }

    #[inline]
    pub fn set_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::LENGTH], value)
    }

    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::CHECKSUM], value)
    }

    pub fn fill_checksum(&mut self, src_addr: Ipv4Addr, dst_addr: Ipv4Addr) {
        self.set_checksum(0);
        let computed = {
            let data = self.buffer.as_ref();
            let mut sum = Checksum::init();
            sum.add_u16(checksum::pseudo_header(
                src_addr,
                dst_addr,
                Protocol::Udp,
                self.len(),
            ));
            sum.add_range(&data[..self.len() as usize]);
            sum.result()
        };
        // An all-zero UDP checksum means "none computed", so a genuine zero is sent
        // as all-ones instead (RFC 768 §"Fields"; arithmetically equivalent).
        self.set_checksum(if computed == 0 { 0xffff } else { computed });
    }

    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let length = self.len();
        &mut self.buffer.as_mut()[field::PAYLOAD(length)]
    }
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Packet<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

/// A parsed UDP header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_port: u16,
    pub dst_port: u16,
}

impl Repr {
    pub fn parse<T: AsRef<[u8]> + ?Sized>(
        packet: &Packet<&T>,
        src_addr: Ipv4Addr,
        dst_addr: Ipv4Addr,
    ) -> Result<Repr> {
        packet.check_len()?;
        if !packet.verify_checksum(src_addr, dst_addr) {
            return Err(Error::Checksum);
        }
        Ok(Repr {
            src_port: packet.src_port(),
            dst_port: packet.dst_port(),
        })
    }

    pub const fn header_len(&self) -> usize {
        HEADER_LEN
    }

    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]> + ?Sized>(
        &self,
        packet: &mut Packet<&mut T>,
        src_addr: Ipv4Addr,
        dst_addr: Ipv4Addr,
        payload_len: usize,
        emit_payload: impl FnOnce(&mut [u8]),
    ) {
        packet.set_src_port(self.src_port);
        packet.set_dst_port(self.dst_port);
        packet.set_len((HEADER_LEN + payload_len) as u16);
        emit_payload(packet.payload_mut());
        packet.fill_checksum(src_addr, dst_addr);
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "UDP src={} dst={}", self.src_port, self.dst_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_then_parse_round_trips() {
        let src = Ipv4Addr::new(10, 0, 0, 1);
        let dst = Ipv4Addr::new(10, 0, 0, 2);
        let repr = Repr {
            src_port: 4000,
            dst_port: 80,
        };
        let payload = b"ping";
        let mut buffer = [0u8; HEADER_LEN + 4];
        {
            let mut packet = Packet::new_unchecked(&mut buffer[..]);
            repr.emit(&mut packet, src, dst, payload.len(), |buf| {
                buf.copy_from_slice(payload)
            });
        }
        let packet = Packet::new_checked(&buffer[..]).unwrap();
        let parsed = Repr::parse(&packet, src, dst).unwrap();
        assert_eq!(parsed, repr);
        assert_eq!(packet.payload(), payload);
    }

    #[test]
    fn zero_checksum_sent_as_all_ones() {
        let src = Ipv4Addr::UNSPECIFIED;
        let dst = Ipv4Addr::UNSPECIFIED;
        let repr = Repr {
            src_port: 0,
            dst_port: 1,
        };
        let mut buffer = [0u8; HEADER_LEN];
        let mut packet = Packet::new_unchecked(&mut buffer[..]);
        repr.emit(&mut packet, src, dst, 0, |_| {});
        assert_eq!(packet.checksum(), 0xffff);
    }
}
