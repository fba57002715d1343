//! UDP datagram delivery (§4.7). Stateless compared to TCP: a match on local port is
//! the entire dispatch, and there is no handshake or retransmission to speak of.

use super::{Event, Socket};

/// Deliver one inbound UDP datagram to a socket already matched to it. Copies the
/// payload into the receive buffer and fires [`Event::Data`] immediately — UDP has no
/// reassembly buffer to stage data in, since datagrams are delivered whole or not at
/// all (§4.7).
pub(crate) fn on_datagram<const RX: usize, const TX: usize>(
    socket: &mut Socket<RX, TX>,
    remote_port: u16,
    payload: &[u8],
) {
    socket.remote_port = remote_port;
    let len = payload.len().min(socket.rx.len());
    socket.rx[..len].copy_from_slice(&payload[..len]);
    socket.rx_data = len;
    if let Some(handler) = socket.handler.as_mut() {
        handler.handle(Event::Data, &socket.rx[..len]);
    }
    socket.rx_data = 0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::Kind;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn datagram_delivers_and_resets() {
        let mut socket = Socket::<128, 128>::free();
        socket.kind = Kind::Udp;
        socket.local_port = 53;

        let received: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        let received_clone = received.clone();
        socket.handler = Some(Box::new(move |event, data: &[u8]| {
            assert_eq!(event, Event::Data);
            *received_clone.borrow_mut() = data.to_vec();
        }));

        on_datagram(&mut socket, 9000, b"hello");
        assert_eq!(&received.borrow()[..], b"hello");
        assert_eq!(socket.rx_data, 0);
        assert_eq!(socket.remote_port, 9000);
    }

    #[test]
    fn oversized_datagram_is_truncated_to_rx_capacity() {
        let mut socket = Socket::<4, 128>::free();
        socket.kind = Kind::Udp;
        socket.local_port = 53;
        on_datagram(&mut socket, 9000, b"hello world");
        assert_eq!(socket.rx_data, 0); // delivered within the call, as always
    }
}
