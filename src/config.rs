//! Tunables.
//!
//! Plain `const`s rather than a runtime-configurable struct: a consumer crate can
//! still override them by defining its own module of the same shape, and a reader can
//! follow a reference straight to its definition.

/// Base retransmission timeout, in ticks of [`TICK_TCP`].
pub const TIMEOUT_TCP: u32 = 200;

/// Number of retransmission attempts before a connection is abandoned.
pub const RETRIES_TCP: u8 = 5;

/// Period, in scheduler ticks, at which [`crate::stack::Stack::tick`] is invoked.
pub const TICK_TCP: u32 = 1;

/// Maximum size of an emitted IPv4 datagram, header included.
pub const MTU: usize = 1000;

/// The graduated retransmit back-off schedule: short early intervals tolerate LAN
/// round-trips; later retries grow linearly to tolerate WAN delay. Not RTT-adaptive —
/// a fixed schedule indexed only by retries remaining.
pub const fn socket_timeout(retry: u8) -> u32 {
    TIMEOUT_TCP + 32 * (RETRIES_TCP - retry) as u32
}

/// Delay, in ticks, before [`crate::stack::Stack::upstream`] retries after finding the
/// link not clear-to-send.
pub const UPSTREAM_BACKOFF: u32 = 2;

/// Delay, in ticks, at which `upstream` re-schedules itself to serialize further
/// sockets after successfully emitting one segment.
pub const UPSTREAM_CONTINUE: u32 = 5;
