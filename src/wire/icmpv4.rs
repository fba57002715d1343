//! ICMPv4 echo request/reply only (§4.8). The teacher's own `wire::icmpv4::Repr`
//! already modeled `EchoRequest`/`EchoReply` (among other variants this core has no
//! use for); this module keeps those two variants and adds the byte-level `Packet<T>`
//! the teacher's tree never got around to writing.

use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;

use super::field::Field;
use crate::checksum::Checksum;
use crate::error::{Error, Result};

mod field {
    use super::Field;

    pub const TYPE: usize = 0;
    pub const CODE: usize = 1;
    pub const CHECKSUM: Field = 2..4;
    pub const ECHO_IDENT: Field = 4..6;
    pub const ECHO_SEQNO: Field = 6..8;
    pub const ECHO_PAYLOAD: core::ops::RangeFrom<usize> = 8..;
}

pub const HEADER_LEN: usize = 8;

pub const TYPE_ECHO_REQUEST: u8 = 8;
pub const TYPE_ECHO_REPLY: u8 = 0;

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
        if self.buffer.as_ref().len() < HEADER_LEN {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    pub fn into_inner(self) -> T {
        self.buffer
    }

    #[inline]
    pub fn msg_type(&self) -> u8 {
        self.buffer.as_ref()[field::TYPE]
    }

    #[inline]
    pub fn msg_code(&self) -> u8 {
        self.buffer.as_ref()[field::CODE]
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::CHECKSUM])
    }

    #[inline]
    pub fn echo_ident(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::ECHO_IDENT])
    }

    #[inline]
    pub fn echo_seq_no(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::ECHO_SEQNO])
    }

    pub fn verify_checksum(&self) -> bool {
        let mut sum = Checksum::init();
        sum.add_range(self.buffer.as_ref());
        sum.verify()
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Packet<&'a T> {
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        &self.buffer.as_ref()[field::ECHO_PAYLOAD]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    #[inline]
    pub fn set_msg_type(&mut self, value: u8) {
        self.buffer.as_mut()[field::TYPE] = value;
    }

    #[inline]
    pub fn set_msg_code(&mut self, value: u8) {
        self.buffer.as_mut()[field::CODE] = value;
    }

    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::CHECKSUM], value)
    }

    #[inline]
    pub fn set_echo_ident(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::ECHO_IDENT], value)
    }

    #[inline]
    pub fn set_echo_seq_no(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::ECHO_SEQNO], value)
    }

    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buffer.as_mut()[field::ECHO_PAYLOAD]
    }

    pub fn fill_checksum(&mut self) {
        self.set_checksum(0);
        let computed = {
            let mut sum = Checksum::init();
            sum.add_range(self.buffer.as_ref());
            sum.result()
        };
        self.set_checksum(computed);
    }
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Packet<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

/// A high-level representation of an ICMPv4 echo request or reply, the only two
/// message kinds this core's optional ICMP module handles (§4.8).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Repr {
    EchoRequest { ident: u16, seq_no: u16 },
    EchoReply { ident: u16, seq_no: u16 },
}

impl Repr {
    pub fn parse<T: AsRef<[u8]> + ?Sized>(packet: &Packet<&T>) -> Result<Repr> {
        packet.check_len()?;
        if !packet.verify_checksum() {
            return Err(Error::Checksum);
        }
        match (packet.msg_type(), packet.msg_code()) {
            (TYPE_ECHO_REQUEST, 0) => Ok(Repr::EchoRequest {
                ident: packet.echo_ident(),
                seq_no: packet.echo_seq_no(),
            }),
            (TYPE_ECHO_REPLY, 0) => Ok(Repr::EchoReply {
                ident: packet.echo_ident(),
                seq_no: packet.echo_seq_no(),
            }),
            _ => Err(Error::Truncated),
        }
    }

    pub const fn buffer_len(&self) -> usize {
        HEADER_LEN
    }

    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]> + ?Sized>(
        &self,
        packet: &mut Packet<&mut T>,
        payload: &[u8],
    ) {
        let (msg_type, ident, seq_no) = match *self {
            Repr::EchoRequest { ident, seq_no } => (TYPE_ECHO_REQUEST, ident, seq_no),
            Repr::EchoReply { ident, seq_no } => (TYPE_ECHO_REPLY, ident, seq_no),
        };
        packet.set_msg_type(msg_type);
        packet.set_msg_code(0);
        packet.set_echo_ident(ident);
        packet.set_echo_seq_no(seq_no);
        packet.payload_mut()[..payload.len()].copy_from_slice(payload);
        packet.fill_checksum();
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Repr::EchoRequest { ident, seq_no } => {
                write!(f, "ICMPv4 echo request ident={ident} seq={seq_no}")
            }
            Repr::EchoReply { ident, seq_no } => {
                write!(f, "ICMPv4 echo reply ident={ident} seq={seq_no}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_request_round_trips() {
        let repr = Repr::EchoRequest {
            ident: 42,
            seq_no: 1,
        };
        let payload = b"abcd";
        let mut buffer = [0u8; HEADER_LEN + 4];
        {
            let mut packet = Packet::new_unchecked(&mut buffer[..]);
            repr.emit(&mut packet, payload);
        }
        let packet = Packet::new_checked(&buffer[..]).unwrap();
        assert_eq!(Repr::parse(&packet).unwrap(), repr);
        assert_eq!(packet.payload(), payload);
    }

    #[test]
    fn echo_reply_from_request() {
        let request = Repr::EchoRequest {
            ident: 7,
            seq_no: 3,
        };
        let mut buffer = [0u8; HEADER_LEN];
        {
            let mut packet = Packet::new_unchecked(&mut buffer[..]);
            request.emit(&mut packet, &[]);
        }
        // An echo reply just flips the type byte; the identifier/sequence/payload are
        // carried through unmodified (§4.8).
        let mut packet = Packet::new_unchecked(&mut buffer[..]);
        packet.set_msg_type(TYPE_ECHO_REPLY);
        packet.fill_checksum();
        let packet = Packet::new_checked(&buffer[..]).unwrap();
        assert_eq!(
            Repr::parse(&packet).unwrap(),
            Repr::EchoReply {
                ident: 7,
                seq_no: 3
            }
        );
    }
}
