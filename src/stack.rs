//! The owned `Stack` value and the three entry points a host drives it through:
//! `tick`, `downstream`, `upstream`.
//!
//! A single owned value carries the socket table, the IP-id counter, and a reusable
//! scratch header buffer — no routing table, no neighbor cache, no multi-interface
//! plumbing, since this core only ever speaks to one link.

use core::net::Ipv4Addr;

use log::{debug, trace, warn};

use crate::checksum;
use crate::config;
use crate::error::{Error, Result};
use crate::phy::LinkDevice;
use crate::scheduler::{Scheduler, Task};
use crate::socket::{self, Event, Flags, Handle, Kind, Socket, State};
use crate::wire::{
    Icmpv4Packet, Icmpv4Repr, IpProtocol, Ipv4Packet, Ipv4Repr, TcpPacket, TcpRepr, UdpPacket,
    UdpRepr, IPV4_HEADER_LEN, TCP_HEADER_LEN, UDP_HEADER_LEN,
};

/// TTL stamped on every datagram this core emits.
const DEFAULT_TTL: u8 = 0x40;

/// The network-core value a host owns: a fixed-capacity socket table plus the IP-layer
/// state shared across every socket. `N` sizes the socket table, `RX`/`TX` size each
/// socket's buffers — all three picked by the caller at the type level.
pub struct Stack<const N: usize, const RX: usize, const TX: usize> {
    sockets: [Socket<RX, TX>; N],
    ip_local: Ipv4Addr,
    ip_broadcast: Ipv4Addr,
    ip_id: u16,
    header: [u8; config::MTU],
    enable_icmp: bool,
}

impl<const N: usize, const RX: usize, const TX: usize> Stack<N, RX, TX> {
    /// Build a stack bound to `ip_local`, treating `ip_broadcast` as a second valid
    /// destination address. `enable_icmp` toggles the optional echo-reply responder,
    /// decided at construction time rather than compile time so both configurations
    /// build and test in the same crate.
    pub fn new(ip_local: Ipv4Addr, ip_broadcast: Ipv4Addr, enable_icmp: bool) -> Self {
        assert!(N > 0, "a stack with no socket slots can never do anything");
        Stack {
            sockets: core::array::from_fn(|_| Socket::free()),
            ip_local,
            ip_broadcast,
            ip_id: 0,
            header: [0u8; config::MTU],
            enable_icmp,
        }
    }

    fn allocate(&mut self, kind: Kind) -> Option<Handle> {
        let index = self.sockets.iter().position(Socket::is_free)?;
        self.sockets[index].kind = kind;
        Some(Handle(index))
    }

    /// Passive open: listen on `local_port`, accepting a connection from any source.
    pub fn listen(
        &mut self,
        local_port: u16,
        handler: impl socket::Handler + 'static,
    ) -> Option<Handle> {
        let handle = self.allocate(Kind::Tcp)?;
        let socket = &mut self.sockets[handle.0];
        socket.state = State::Listen;
        socket.local_port = local_port;
        socket.listening = true;
        socket.retry = config::RETRIES_TCP;
        socket.handler = Some(Box::new(handler));
        Some(handle)
    }

    /// Active open: connect to `remote_ip:remote_port` from `local_port`, queuing the
    /// first SYN with `initial_seq`.
    pub fn connect(
        &mut self,
        scheduler: &mut impl Scheduler,
        remote_ip: Ipv4Addr,
        remote_port: u16,
        local_port: u16,
        initial_seq: u32,
        handler: impl socket::Handler + 'static,
    ) -> Option<Handle> {
        let handle = self.allocate(Kind::Tcp)?;
        let socket = &mut self.sockets[handle.0];
        socket.state = State::SynSent;
        socket.remote_ip = remote_ip;
        socket.remote_port = remote_port;
        socket.local_port = local_port;
        socket.seq = initial_seq;
        socket.to_send = Flags::SYN;
        socket.retry = config::RETRIES_TCP;
        socket.handler = Some(Box::new(handler));
        scheduler.reschedule_now(Task::Upstream);
        Some(handle)
    }

    /// Bind a UDP socket to `local_port`, accepting datagrams from any source.
    pub fn bind_udp(
        &mut self,
        local_port: u16,
        handler: impl socket::Handler + 'static,
    ) -> Option<Handle> {
        let handle = self.allocate(Kind::Udp)?;
        let socket = &mut self.sockets[handle.0];
        socket.local_port = local_port;
        socket.remote_ip = socket::ANY_REMOTE;
        socket.handler = Some(Box::new(handler));
        Some(handle)
    }

    /// Queue `data` as the next segment (TCP) or datagram (UDP) to send on `handle`.
    /// Actual transmission happens on the next [`Stack::upstream`] pass.
    pub fn send(&mut self, scheduler: &mut impl Scheduler, handle: Handle, data: &[u8]) -> Result<()> {
        let socket = &mut self.sockets[handle.0];
        if socket.kind == Kind::Free {
            return Err(Error::InvalidSocket);
        }
        if data.len() > socket.tx.len() {
            return Err(Error::BufferTooSmall);
        }
        socket.tx[..data.len()].copy_from_slice(data);
        socket.tx_size = data.len();
        match socket.kind {
            Kind::Tcp => {
                socket.to_send |= Flags::ACK | Flags::PSH;
                if socket.state == State::Connect {
                    socket.state = State::AckWait;
                }
            }
            Kind::Udp => socket.to_send |= Flags::PSH,
            Kind::Free => unreachable!("checked above"),
        }
        scheduler.reschedule_now(Task::Upstream);
        Ok(())
    }

    /// Begin a graceful close on `handle` (TCP only): queue a FIN and move toward
    /// FIN_SENT. A UDP socket or one already IDLE is unaffected — call [`Stack::close`]
    /// to reclaim its slot.
    pub fn disconnect(&mut self, scheduler: &mut impl Scheduler, handle: Handle) {
        let socket = &mut self.sockets[handle.0];
        if socket.kind == Kind::Tcp && matches!(socket.state, State::Connect | State::AckWait) {
            socket.state = State::FinSent;
            socket.to_send = Flags::FIN | Flags::ACK;
            scheduler.reschedule_now(Task::Upstream);
        }
    }

    /// Reclaim `handle`'s slot. A socket is only ever freed by this explicit call, not
    /// by any internal transition. Safe to call regardless of state; an established
    /// connection should be torn down with [`Stack::disconnect`] first.
    pub fn close(&mut self, handle: Handle) {
        self.sockets[handle.0].release();
    }

    pub fn socket(&self, handle: Handle) -> &Socket<RX, TX> {
        &self.sockets[handle.0]
    }

    fn next_ip_id(&mut self) -> u16 {
        let id = self.ip_id;
        self.ip_id = self.ip_id.wrapping_add(1);
        id
    }

    /// The periodic retransmit/timeout sweep. A host schedules this every
    /// [`config::TICK_TCP`] ticks.
    pub fn tick(&mut self, scheduler: &mut impl Scheduler) {
        for socket in self.sockets.iter_mut().filter(|s| s.kind == Kind::Tcp) {
            if socket.time == 0 {
                continue;
            }
            socket.time -= 1;
            if socket.time > 0 {
                continue;
            }

            if socket.retry > 0 {
                socket.retry -= 1;
                socket.time = config::socket_timeout(socket.retry);
                socket.to_send = socket::tcp::retransmit_flags(socket.state, socket.tx_size > 0);
                socket.timeout = true;
                debug!(
                    "tcp: retransmitting on port {}, {} attempt(s) left",
                    socket.local_port, socket.retry
                );
                scheduler.reschedule_now(Task::Upstream);
            } else {
                warn!(
                    "tcp: retry budget exhausted on port {}, abandoning connection",
                    socket.local_port
                );
                socket.state = State::Idle;
                socket.rx_data = 0;
                socket.rx_oo_start = 0;
                socket.rx_oo_end = 0;
                socket.to_send = Flags::empty();
                if let Some(handler) = socket.handler.as_mut() {
                    handler.handle(Event::Disconnect, &[]);
                }
            }
        }
        scheduler.schedule(Task::Tick, config::TICK_TCP);
    }

    /// Handle one inbound IPv4 datagram pulled off the link. `link` is needed here,
    /// not just in `upstream`, because an ICMP echo reply is emitted directly from
    /// this path.
    pub fn downstream(
        &mut self,
        scheduler: &mut impl Scheduler,
        link: &mut impl LinkDevice,
        datagram: &[u8],
    ) {
        let packet = match Ipv4Packet::new_checked(datagram) {
            Ok(packet) => packet,
            Err(err) => {
                trace!("ipv4: dropping malformed datagram: {err}");
                return;
            }
        };
        let repr = match Ipv4Repr::parse(&packet) {
            Ok(repr) => repr,
            Err(err) => {
                trace!("ipv4: dropping datagram: {err}");
                return;
            }
        };
        if repr.dst_addr != self.ip_local && repr.dst_addr != self.ip_broadcast {
            trace!("ipv4: dropping datagram not addressed to us ({})", repr.dst_addr);
            return;
        }
        let payload = packet.payload();

        match repr.protocol {
            IpProtocol::Tcp => self.downstream_tcp(scheduler, repr, payload),
            IpProtocol::Udp => self.downstream_udp(repr, payload),
            IpProtocol::Icmp if self.enable_icmp => self.downstream_icmp(link, repr, payload),
            other => trace!("ipv4: dropping datagram with unhandled protocol {other}"),
        }
    }

    fn downstream_tcp(&mut self, scheduler: &mut impl Scheduler, ip: Ipv4Repr, payload: &[u8]) {
        let packet = match TcpPacket::new_checked(payload) {
            Ok(packet) => packet,
            Err(err) => {
                trace!("tcp: dropping malformed segment: {err}");
                return;
            }
        };
        let repr = match TcpRepr::parse(&packet, ip.src_addr, ip.dst_addr, payload.len() as u16) {
            Ok(repr) => repr,
            Err(err) => {
                trace!("tcp: dropping segment: {err}");
                return;
            }
        };
        let segment_payload = packet.payload();

        let Some(index) = self
            .sockets
            .iter()
            .position(|s| s.kind == Kind::Tcp && s.matches(ip.src_addr, repr.src_port, repr.dst_port))
        else {
            trace!("tcp: no socket bound to port {}", repr.dst_port);
            return;
        };

        let socket = &mut self.sockets[index];
        if socket.listening {
            socket.remote_ip = ip.src_addr;
            socket.remote_port = repr.src_port;
            socket.listening = false;
        }
        socket::tcp::on_segment(socket, &repr, segment_payload);
        if !self.sockets[index].to_send.is_empty() {
            scheduler.reschedule_now(Task::Upstream);
        }
    }

    fn downstream_udp(&mut self, ip: Ipv4Repr, payload: &[u8]) {
        let packet = match UdpPacket::new_checked(payload) {
            Ok(packet) => packet,
            Err(err) => {
                trace!("udp: dropping malformed datagram: {err}");
                return;
            }
        };
        let repr = match UdpRepr::parse(&packet, ip.src_addr, ip.dst_addr) {
            Ok(repr) => repr,
            Err(err) => {
                trace!("udp: dropping datagram: {err}");
                return;
            }
        };
        let Some(socket) = self
            .sockets
            .iter_mut()
            .find(|s| s.kind == Kind::Udp && s.matches(ip.src_addr, repr.src_port, repr.dst_port))
        else {
            trace!("udp: no socket bound to port {}", repr.dst_port);
            return;
        };
        socket::udp::on_datagram(socket, repr.src_port, packet.payload());
    }

    fn downstream_icmp(&mut self, link: &mut impl LinkDevice, ip: Ipv4Repr, payload: &[u8]) {
        let packet = match Icmpv4Packet::new_checked(payload) {
            Ok(packet) => packet,
            Err(err) => {
                trace!("icmp: dropping malformed message: {err}");
                return;
            }
        };
        let repr = match Icmpv4Repr::parse(&packet) {
            Ok(repr) => repr,
            Err(err) => {
                trace!("icmp: dropping message: {err}");
                return;
            }
        };
        if !matches!(repr, Icmpv4Repr::EchoRequest { .. }) {
            trace!("icmp: ignoring non-echo-request message");
            return;
        }

        let mut reply = [0u8; config::MTU - IPV4_HEADER_LEN];
        let Some(len) = socket::icmp::build_reply(&mut reply, repr, packet.payload()) else {
            return;
        };
        let (src, dst) = socket::icmp::reply_addresses(ip.src_addr, ip.dst_addr);
        self.emit_ip(link, IpProtocol::Icmp, src, dst, &reply[..len]);
    }

    /// At most one pending segment per invocation: the upstream task serializes
    /// itself so a busy link is never asked for more than one frame at a time.
    pub fn upstream(&mut self, scheduler: &mut impl Scheduler, link: &mut impl LinkDevice) {
        if !link.clear_to_send() {
            scheduler.schedule(Task::Upstream, config::UPSTREAM_BACKOFF);
            return;
        }

        let Some(index) = self.sockets.iter().position(|s| !s.to_send.is_empty()) else {
            return;
        };

        match self.sockets[index].kind {
            Kind::Tcp => self.emit_tcp(link, index),
            Kind::Udp => self.emit_udp(link, index),
            Kind::Free => {}
        }

        if self.sockets.iter().any(|s| !s.to_send.is_empty()) {
            scheduler.schedule(Task::Upstream, config::UPSTREAM_CONTINUE);
        }
    }

    fn emit_tcp(&mut self, link: &mut impl LinkDevice, index: usize) {
        let flags = self.sockets[index].to_send;
        let has_data = flags.contains(Flags::PSH);
        let payload_len = if has_data { self.sockets[index].tx_size } else { 0 };
        let control_bonus = u32::from(flags.contains(Flags::SYN) || flags.contains(Flags::FIN));

        let socket = &self.sockets[index];
        let wire_seq = if socket.timeout {
            // Replaying a retransmission: `seq` already points past this segment, so
            // the replayed header must carry the original value unchanged.
            socket.seq.wrapping_sub(payload_len as u32)
        } else {
            socket.seq
        };
        let window = socket.advertised_window();
        let remote_ip = socket.remote_ip;
        let remote_port = socket.remote_port;
        let local_port = socket.local_port;
        let ack_number = socket.rem_seq;

        let repr = TcpRepr {
            src_port: local_port,
            dst_port: remote_port,
            seq_number: wire_seq,
            ack_number,
            flags,
            window_len: window,
        };

        let header_len = IPV4_HEADER_LEN + TCP_HEADER_LEN + payload_len;
        if header_len > self.header.len() {
            warn!("tcp: segment too large for the scratch buffer, dropping");
            self.sockets[index].to_send = Flags::empty();
            return;
        }

        let ident = self.next_ip_id();
        {
            let (ip_buf, rest) = self.header.split_at_mut(IPV4_HEADER_LEN);
            let tcp_buf = &mut rest[..TCP_HEADER_LEN + payload_len];
            let tx_snapshot = self.sockets[index].tx;
            let mut tcp_packet = TcpPacket::new_unchecked(tcp_buf);
            repr.emit(&mut tcp_packet, self.ip_local, remote_ip, payload_len, |out| {
                out.copy_from_slice(&tx_snapshot[..payload_len]);
            });

            let ip_repr = Ipv4Repr {
                src_addr: self.ip_local,
                dst_addr: remote_ip,
                protocol: IpProtocol::Tcp,
                payload_len: TCP_HEADER_LEN + payload_len,
                ident,
                dont_fragment: true,
                ttl: DEFAULT_TTL,
            };
            let mut ip_packet = Ipv4Packet::new_unchecked(ip_buf);
            ip_repr.emit(&mut ip_packet);
        }

        if !link.send_header(&self.header[..header_len]) {
            trace!("link: deferring tcp segment on port {local_port} (not clear to send)");
            return;
        }
        link.send_payload(&[]);
        link.finish_send();

        let socket = &mut self.sockets[index];
        socket.to_send = Flags::empty();
        if !socket.timeout {
            socket.seq = socket.seq.wrapping_add(payload_len as u32 + control_bonus);
        }
        socket.timeout = false;
        socket.time = config::socket_timeout(socket.retry);
    }

    fn emit_udp(&mut self, link: &mut impl LinkDevice, index: usize) {
        let socket = &self.sockets[index];
        let payload_len = if socket.to_send.contains(Flags::PSH) {
            socket.tx_size
        } else {
            0
        };
        let remote_ip = socket.remote_ip;
        let remote_port = socket.remote_port;
        let local_port = socket.local_port;

        let repr = UdpRepr {
            src_port: local_port,
            dst_port: remote_port,
        };

        let header_len = IPV4_HEADER_LEN + UDP_HEADER_LEN + payload_len;
        if header_len > self.header.len() {
            warn!("udp: datagram too large for the scratch buffer, dropping");
            self.sockets[index].to_send = Flags::empty();
            return;
        }

        let ident = self.next_ip_id();
        {
            let (ip_buf, rest) = self.header.split_at_mut(IPV4_HEADER_LEN);
            let udp_buf = &mut rest[..UDP_HEADER_LEN + payload_len];
            let tx_snapshot = self.sockets[index].tx;
            let mut udp_packet = UdpPacket::new_unchecked(udp_buf);
            repr.emit(&mut udp_packet, self.ip_local, remote_ip, payload_len, |out| {
                out.copy_from_slice(&tx_snapshot[..payload_len]);
            });

            let ip_repr = Ipv4Repr {
                src_addr: self.ip_local,
                dst_addr: remote_ip,
                protocol: IpProtocol::Udp,
                payload_len: UDP_HEADER_LEN + payload_len,
                ident,
                dont_fragment: true,
                ttl: DEFAULT_TTL,
            };
            let mut ip_packet = Ipv4Packet::new_unchecked(ip_buf);
            ip_repr.emit(&mut ip_packet);
        }

        if !link.send_header(&self.header[..header_len]) {
            trace!("link: deferring udp datagram on port {local_port} (not clear to send)");
            return;
        }
        link.send_payload(&[]);
        link.finish_send();

        let socket = &mut self.sockets[index];
        socket.to_send = Flags::empty();
        if let Some(handler) = socket.handler.as_mut() {
            handler.handle(Event::DataSent, &[]);
        }
    }

    fn emit_ip(
        &mut self,
        link: &mut impl LinkDevice,
        protocol: IpProtocol,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        payload: &[u8],
    ) {
        if !link.clear_to_send() {
            trace!("link: dropping reply, not clear to send");
            return;
        }
        let ident = self.next_ip_id();
        let repr = Ipv4Repr {
            src_addr: src,
            dst_addr: dst,
            protocol,
            payload_len: payload.len(),
            ident,
            dont_fragment: true,
            ttl: DEFAULT_TTL,
        };
        let header_len = repr.buffer_len();
        {
            let mut packet = Ipv4Packet::new_unchecked(&mut self.header[..header_len]);
            repr.emit(&mut packet);
        }
        if !link.send_header(&self.header[..header_len]) {
            trace!("link: deferring reply (not clear to send)");
            return;
        }
        link.send_payload(payload);
        link.finish_send();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::Flags as TcpFlags;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Default)]
    struct TestScheduler {
        scheduled: Vec<(Task, u32)>,
    }

    impl Scheduler for TestScheduler {
        fn schedule(&mut self, task: Task, delay_ticks: u32) {
            self.scheduled.push((task, delay_ticks));
        }
        fn cancel(&mut self, task: Task) {
            self.scheduled.retain(|(t, _)| *t != task);
        }
    }

    #[derive(Default)]
    struct TestLink {
        frames: VecDeque<Vec<u8>>,
        clear: bool,
    }

    impl LinkDevice for TestLink {
        fn clear_to_send(&mut self) -> bool {
            self.clear
        }
        fn send_header(&mut self, header: &[u8]) -> bool {
            self.frames.push_back(header.to_vec());
            true
        }
        fn send_payload(&mut self, payload: &[u8]) {
            if let Some(frame) = self.frames.back_mut() {
                frame.extend_from_slice(payload);
            }
        }
        fn finish_send(&mut self) {}
    }

    /// `env_logger::init()` panics if called twice in one process; tests run
    /// concurrently on separate threads within the same process, so `try_init` is the
    /// idiomatic choice here.
    fn init_logger() {
        let _ = env_logger::try_init();
    }

    #[test]
    fn udp_datagram_round_trips_through_downstream_and_upstream() {
        init_logger();
        let mut stack: Stack<4, 256, 256> =
            Stack::new(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 255), false);
        let received: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        let received_clone = received.clone();
        let handle = stack
            .bind_udp(53, move |event, data: &[u8]| {
                if event == Event::Data {
                    *received_clone.borrow_mut() = data.to_vec();
                }
            })
            .unwrap();

        let mut scheduler = TestScheduler::default();
        let mut link = TestLink {
            clear: true,
            ..Default::default()
        };

        let mut datagram = [0u8; IPV4_HEADER_LEN + UDP_HEADER_LEN + 4];
        {
            let udp_repr = UdpRepr {
                src_port: 9000,
                dst_port: 53,
            };
            let (ip_buf, udp_buf) = datagram.split_at_mut(IPV4_HEADER_LEN);
            let mut udp_packet = UdpPacket::new_unchecked(&mut udp_buf[..]);
            udp_repr.emit(
                &mut udp_packet,
                Ipv4Addr::new(10, 0, 0, 2),
                Ipv4Addr::new(10, 0, 0, 1),
                4,
                |out| out.copy_from_slice(b"ping"),
            );
            let ip_repr = Ipv4Repr {
                src_addr: Ipv4Addr::new(10, 0, 0, 2),
                dst_addr: Ipv4Addr::new(10, 0, 0, 1),
                protocol: IpProtocol::Udp,
                payload_len: UDP_HEADER_LEN + 4,
                ident: 1,
                dont_fragment: true,
                ttl: DEFAULT_TTL,
            };
            let mut ip_packet = Ipv4Packet::new_unchecked(ip_buf);
            ip_repr.emit(&mut ip_packet);
        }

        stack.downstream(&mut scheduler, &mut link, &datagram);
        assert_eq!(&received.borrow()[..], b"ping");

        stack.send(&mut scheduler, handle, b"pong").unwrap();
        stack.upstream(&mut scheduler, &mut link);
        assert_eq!(link.frames.len(), 1);
        assert_eq!(stack.socket(handle).to_send, TcpFlags::empty());
    }

    #[test]
    fn retry_exhaustion_disconnects_and_frees_nothing_early() {
        init_logger();
        let mut stack: Stack<2, 64, 64> =
            Stack::new(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 255), false);
        let disconnected = Rc::new(RefCell::new(false));
        let disconnected_clone = disconnected.clone();
        let mut scheduler = TestScheduler::default();
        let handle = stack
            .connect(
                &mut scheduler,
                Ipv4Addr::new(10, 0, 0, 2),
                80,
                4000,
                1000,
                move |event, _: &[u8]| {
                    if event == Event::Disconnect {
                        *disconnected_clone.borrow_mut() = true;
                    }
                },
            )
            .unwrap();

        // Actually emit the initial SYN, which arms the retransmit timer.
        let mut link = TestLink {
            clear: true,
            ..Default::default()
        };
        stack.upstream(&mut scheduler, &mut link);
        assert_eq!(link.frames.len(), 1);

        // Drive the timer well past RETRIES_TCP's final graduated timeout.
        for _ in 0..(config::RETRIES_TCP as u32 + 2) {
            for _ in 0..(config::socket_timeout(0) + 1) {
                stack.tick(&mut scheduler);
            }
        }
        assert!(*disconnected.borrow());
        assert_eq!(stack.socket(handle).state(), State::Idle);
    }
}
