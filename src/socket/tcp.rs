//! The TCP state machine and its interaction with the reassembly buffer. This is the
//! hard part the rest of the crate exists to support.

use log::debug;

use super::{Event, Flags, Socket, State};
use crate::config;
use crate::reassembly::{self, Outcome};
use crate::wire::TcpRepr;

/// The flags a retransmission resends for a given state: a retransmit always replays
/// what the last emit in that state would have carried rather than synthesizing
/// something new.
pub(crate) fn retransmit_flags(state: State, has_pending_data: bool) -> Flags {
    match state {
        State::SynSent => Flags::SYN,
        State::SynRec => Flags::SYN | Flags::ACK,
        State::AckWait => Flags::ACK | Flags::PSH,
        State::Connect if has_pending_data => Flags::ACK | Flags::PSH,
        State::Connect => Flags::ACK,
        State::FinSent => Flags::FIN | Flags::ACK,
        State::FinRec | State::FinAckRec => Flags::ACK,
        _ => Flags::empty(),
    }
}

fn is_established_or_later(state: State) -> bool {
    matches!(
        state,
        State::Connect | State::AckWait | State::FinSent | State::FinRec | State::FinAckRec
    )
}

/// Apply one inbound TCP segment, already matched to `socket` by the dispatcher.
/// Delivers at most one [`Event`] to the socket's handler before returning — a
/// downstream packet is fully processed before the next one is accepted.
pub(crate) fn on_segment<const RX: usize, const TX: usize>(
    socket: &mut Socket<RX, TX>,
    repr: &TcpRepr,
    payload: &[u8],
) {
    let flags = repr.flags;
    let data_size = payload.len();
    let original_state = socket.state;

    if flags.contains(Flags::SYN) {
        socket.rem_seq_start = repr.seq_number;
        socket.rem_seq = repr.seq_number.wrapping_add(1);
    }

    // One-outstanding-segment policy: an ACK that doesn't acknowledge the segment we
    // actually have outstanding is dropped unconditionally, RST included — a forged or
    // stale RST|ACK with the wrong ack number is silently dropped rather than forcing
    // a disconnect (§4.3, nwk.c's ack-mismatch `goto drop`).
    if is_established_or_later(original_state)
        && flags.contains(Flags::ACK)
        && repr.ack_number != socket.seq
    {
        debug!(
            "tcp: dropping segment with unexpected ack {} (expected {})",
            repr.ack_number, socket.seq
        );
        return;
    }

    let fin = flags.contains(Flags::FIN) || original_state == State::FinRec;
    if fin {
        socket.rem_seq = repr
            .seq_number
            .wrapping_add(data_size as u32)
            .wrapping_add(1);
    }

    // Reassemble any payload riding on a Connect/AckWait segment, FIN excepted: a
    // FIN's own bytes (if any) are skipped over by the `rem_seq` bump above instead of
    // reassembled, so a FIN always yields a plain `Disconnect`, never
    // `DisconnectWithData`. An RST's payload *is* reassembled here, since RST handling
    // runs after data acceptance below.
    let is_connect_like = matches!(original_state, State::Connect | State::AckWait);
    if is_connect_like && data_size > 0 && !fin {
        let rel = repr.seq_number.wrapping_sub(socket.rem_seq);
        match reassembly::accept(
            &mut socket.rx,
            &mut socket.rx_data,
            &mut socket.rx_oo_start,
            &mut socket.rx_oo_end,
            rel,
            payload,
        ) {
            Outcome::Accepted => socket.to_send |= Flags::ACK,
            Outcome::OutOfWindow => {
                debug!("tcp: out-of-window segment rel={rel}, data_size={data_size}");
                socket.to_send |= Flags::ACK;
            }
            // Case 6: a second hole with nowhere to go. Still resync the peer with an
            // ACK, matching `nwk_schedule_oo_ack`'s call before the original's `goto drop`.
            Outcome::Dropped => socket.to_send |= Flags::ACK,
        }
    }

    let mut event = None;

    match original_state {
        State::Listen => {
            if flags.contains(Flags::SYN) {
                socket.state = State::SynRec;
                socket.to_send = Flags::SYN | Flags::ACK;
            }
        }
        State::SynSent => {
            if flags.contains(Flags::ACK) {
                // `seq` was already advanced past the SYN when it was first emitted;
                // nothing to bump here.
                socket.state = State::Connect;
                socket.to_send = Flags::ACK;
                event = Some(Event::Connect);
            } else if flags.contains(Flags::SYN) {
                socket.state = State::SynRec;
                socket.to_send = Flags::SYN | Flags::ACK;
            }
        }
        State::SynRec => {
            if flags.contains(Flags::ACK) {
                socket.state = State::Connect;
                event = Some(Event::Connect);
            }
        }
        State::Connect | State::AckWait if fin => {
            socket.state = State::FinRec;
            socket.to_send = Flags::ACK | Flags::FIN;
            event = Some(Event::Disconnect);
        }
        State::AckWait => {
            if flags.contains(Flags::ACK) {
                socket.state = State::Connect;
            }
        }
        State::FinSent => match (fin, flags.contains(Flags::ACK)) {
            (true, true) => {
                socket.state = State::Idle;
                socket.to_send = Flags::ACK;
                event = Some(Event::Disconnect);
            }
            (true, false) => {
                socket.state = State::FinRec;
                socket.to_send = Flags::ACK;
            }
            (false, true) => {
                socket.state = State::FinAckRec;
            }
            (false, false) => {}
        },
        State::FinRec => {
            if flags.contains(Flags::ACK) {
                socket.state = State::Idle;
                event = Some(Event::Disconnect);
            }
        }
        State::FinAckRec => {
            if fin {
                socket.state = State::FinRec;
                socket.to_send = Flags::ACK;
                event = Some(Event::Disconnect);
            }
        }
        _ => {}
    }

    // §4.4's tail: whatever got reassembled (if anything) becomes deliverable now,
    // independent of which state-machine branch fired above.
    let delivered_len = socket.rx_data;
    socket.rem_seq = socket.rem_seq.wrapping_add(delivered_len as u32);
    socket.rx_data = 0;
    if event.is_none() && delivered_len > 0 {
        event = Some(Event::Data);
    }

    // RST is processed after data acceptance and the non-RST transitions above, so a
    // final payload riding on the RST itself can still be surfaced (§4.3, §9).
    if flags.contains(Flags::RST) && is_established_or_later(original_state) {
        socket.state = State::Idle;
        socket.to_send = Flags::empty();
        socket.rx_oo_start = 0;
        socket.rx_oo_end = 0;
        event = Some(if data_size > 0 {
            Event::DisconnectWithData
        } else {
            Event::Disconnect
        });
    }

    // A productive pass (anything queued to send) replenishes the retry budget, so a
    // long-lived connection that only occasionally needs a single retransmit doesn't
    // creep toward exhaustion (nwk.c's `done:` label: `if (toSend) retry = RETRIES_TCP`).
    if !socket.to_send.is_empty() {
        socket.retry = config::RETRIES_TCP;
    }

    if let Some(event) = event {
        let data: &[u8] = match event {
            Event::Data | Event::DisconnectWithData => &socket.rx[..delivered_len],
            _ => &[],
        };
        if let Some(handler) = socket.handler.as_mut() {
            handler.handle(event, data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::Kind;
    use crate::wire::TcpFlags;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn listening_socket() -> Socket<256, 256> {
        let mut socket = Socket::free();
        socket.kind = Kind::Tcp;
        socket.state = State::Listen;
        socket.local_port = 80;
        socket.listening = true;
        socket
    }

    fn segment(seq: u32, ack: u32, flags: TcpFlags) -> TcpRepr {
        TcpRepr {
            src_port: 4000,
            dst_port: 80,
            seq_number: seq,
            ack_number: ack,
            flags,
            window_len: 4096,
        }
    }

    #[test]
    fn passive_open_scenario_1() {
        let mut socket = listening_socket();
        on_segment(&mut socket, &segment(1000, 0, TcpFlags::SYN), &[]);
        assert_eq!(socket.state, State::SynRec);
        assert_eq!(socket.to_send, TcpFlags::SYN | TcpFlags::ACK);
        assert_eq!(socket.rem_seq, 1001);

        socket.seq = 5000; // as if the SYN|ACK above was emitted with this seq
        on_segment(&mut socket, &segment(1001, 5000, TcpFlags::ACK), &[]);
        assert_eq!(socket.state, State::Connect);
    }

    #[test]
    fn active_open_scenario_2() {
        let mut socket = Socket::<256, 256>::free();
        socket.kind = Kind::Tcp;
        socket.state = State::SynSent;
        socket.seq = 5001; // as if the initial SYN (wire seq 5000) was already emitted

        on_segment(
            &mut socket,
            &segment(9000, 5001, TcpFlags::SYN | TcpFlags::ACK),
            &[],
        );
        assert_eq!(socket.state, State::Connect);
        assert_eq!(socket.seq, 5001);
        assert_eq!(socket.rem_seq, 9001);
        assert_eq!(socket.to_send, TcpFlags::ACK);
    }

    #[test]
    fn in_order_data_scenario_3() {
        let mut socket = Socket::<256, 256>::free();
        socket.kind = Kind::Tcp;
        socket.state = State::Connect;
        socket.seq = 5001;
        socket.rem_seq = 9001;

        let payload = [7u8; 100];
        on_segment(&mut socket, &segment(9001, 5001, TcpFlags::ACK), &payload);
        assert_eq!(socket.rx_data, 0); // delivered and reset within this call
        assert_eq!(socket.rem_seq, 9101);
        assert_eq!(socket.to_send, TcpFlags::ACK);
    }

    #[test]
    fn out_of_order_then_fill_delivers_once_scenario_4() {
        let mut socket = Socket::<256, 256>::free();
        socket.kind = Kind::Tcp;
        socket.state = State::Connect;
        socket.seq = 1;
        socket.rem_seq = 0;

        on_segment(&mut socket, &segment(100, 1, TcpFlags::ACK), &[2u8; 100]);
        assert_eq!(socket.state, State::Connect);
        assert_eq!(socket.rem_seq, 0); // nothing in-order yet, still a hole

        on_segment(&mut socket, &segment(0, 1, TcpFlags::ACK), &[1u8; 100]);
        assert_eq!(socket.rem_seq, 200); // the fold delivered both halves at once
    }

    #[test]
    fn rst_past_connect_goes_idle_scenario_5() {
        let mut socket = Socket::<256, 256>::free();
        socket.kind = Kind::Tcp;
        socket.state = State::Connect;
        socket.seq = 1;
        socket.rem_seq = 1;

        on_segment(&mut socket, &segment(1, 1, TcpFlags::RST), &[]);
        assert_eq!(socket.state, State::Idle);
        assert_eq!(socket.to_send, TcpFlags::empty());
    }

    #[test]
    fn rst_with_data_scenario_6() {
        let mut socket = Socket::<256, 256>::free();
        socket.kind = Kind::Tcp;
        socket.state = State::Connect;
        socket.seq = 1;
        socket.rem_seq = 1000;

        let received: Rc<RefCell<Option<(Event, Vec<u8>)>>> = Rc::new(RefCell::new(None));
        let received_clone = received.clone();
        socket.handler = Some(Box::new(move |event, data: &[u8]| {
            *received_clone.borrow_mut() = Some((event, data.to_vec()));
        }));

        let payload = [0xABu8; 16];
        on_segment(&mut socket, &segment(1000, 1, TcpFlags::RST), &payload);
        assert_eq!(socket.state, State::Idle);
        let (event, data) = received.borrow_mut().take().unwrap();
        assert_eq!(event, Event::DisconnectWithData);
        assert_eq!(data, payload.to_vec());
    }

    #[test]
    fn ack_mismatch_is_dropped_not_processed() {
        let mut socket = Socket::<256, 256>::free();
        socket.kind = Kind::Tcp;
        socket.state = State::AckWait;
        socket.seq = 500;
        socket.rem_seq = 1;
        socket.to_send = Flags::empty();

        on_segment(&mut socket, &segment(1, 499, TcpFlags::ACK), &[]);
        assert_eq!(socket.state, State::AckWait); // unchanged, segment dropped
        assert_eq!(socket.to_send, Flags::empty());
    }

    #[test]
    fn forged_rst_ack_with_wrong_ack_number_is_dropped() {
        let mut socket = Socket::<256, 256>::free();
        socket.kind = Kind::Tcp;
        socket.state = State::Connect;
        socket.seq = 500;
        socket.rem_seq = 1;
        socket.to_send = Flags::empty();

        on_segment(&mut socket, &segment(1, 499, TcpFlags::RST | TcpFlags::ACK), &[]);
        // The ack-mismatch drop fires before the RST logic ever runs.
        assert_eq!(socket.state, State::Connect);
        assert_eq!(socket.to_send, Flags::empty());
    }

    #[test]
    fn second_hole_dropped_still_schedules_ack_scenario_case6() {
        let mut socket = Socket::<256, 256>::free();
        socket.kind = Kind::Tcp;
        socket.state = State::Connect;
        socket.seq = 1;
        socket.rem_seq = 1000;

        // First out-of-order fragment stashes the single hole.
        on_segment(&mut socket, &segment(1150, 1, TcpFlags::ACK), &[9u8; 10]);
        socket.to_send = Flags::empty(); // isolate the second call's effect

        // A second, non-adjacent fragment has nowhere to go and is dropped (case 6),
        // but must still schedule a resync ACK.
        on_segment(&mut socket, &segment(1050, 1, TcpFlags::ACK), &[8u8; 10]);
        assert!(socket.to_send.contains(Flags::ACK));
    }

    #[test]
    fn productive_pass_replenishes_retry_budget() {
        let mut socket = Socket::<256, 256>::free();
        socket.kind = Kind::Tcp;
        socket.state = State::Connect;
        socket.seq = 5001;
        socket.rem_seq = 9001;
        socket.retry = 0; // as if every attempt but this one had been exhausted

        on_segment(&mut socket, &segment(9001, 5001, TcpFlags::ACK), &[7u8; 10]);
        assert_eq!(socket.retry, crate::config::RETRIES_TCP);
    }
}
