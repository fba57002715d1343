//! Optional ICMPv4 echo reply. Stateless: no entry in the socket table is consumed,
//! and there's no handler to notify — a reply is just bytes the stack hands straight
//! back to [`crate::phy::LinkDevice`].

use core::net::Ipv4Addr;

use crate::wire::{Icmpv4Packet, Icmpv4Repr};

/// Build an echo reply for an inbound echo request, if `request` is one. Returns the
/// reply's repr and the identifier/sequence/payload to emit, or `None` for anything
/// else — this module answers echo requests only.
pub(crate) fn echo_reply(request: Icmpv4Repr) -> Option<Icmpv4Repr> {
    match request {
        Icmpv4Repr::EchoRequest { ident, seq_no } => Some(Icmpv4Repr::EchoReply { ident, seq_no }),
        Icmpv4Repr::EchoReply { .. } => None,
    }
}

/// Emit an echo reply directly into `buffer`, source/destination swapped relative to
/// the inbound request. Returns the number of bytes written, or `None` if `request`
/// wasn't an echo request.
pub(crate) fn build_reply(
    buffer: &mut [u8],
    request: Icmpv4Repr,
    payload: &[u8],
) -> Option<usize> {
    let reply = echo_reply(request)?;
    let mut packet = Icmpv4Packet::new_unchecked(&mut buffer[..reply.buffer_len() + payload.len()]);
    reply.emit(&mut packet, payload);
    Some(reply.buffer_len() + payload.len())
}

/// The reply's source/destination pair given the request's (source swapped to
/// destination and vice versa).
pub(crate) fn reply_addresses(request_src: Ipv4Addr, request_dst: Ipv4Addr) -> (Ipv4Addr, Ipv4Addr) {
    (request_dst, request_src)
}
