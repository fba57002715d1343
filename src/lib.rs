//! A minimal IPv4/TCP/UDP network stack core for memory-constrained,
//! single-threaded, cooperatively-scheduled environments.
//!
//! This crate owns the protocol state: checksums, wire formats, the socket table,
//! the TCP state machine, the one-hole reassembly buffer, and (optionally) ICMPv4
//! echo replies. It deliberately does not own a link-layer driver, ARP, or a task
//! scheduler — those are host responsibilities, reached through the [`phy::LinkDevice`]
//! and [`scheduler::Scheduler`] traits so this crate stays usable on a bare-metal
//! target as easily as atop a Unix socket.
//!
//! The three entry points a host drives are all on [`stack::Stack`]:
//! [`Stack::tick`](stack::Stack::tick) for the periodic retransmit/timeout sweep,
//! [`Stack::downstream`](stack::Stack::downstream) for an inbound IPv4 datagram
//! pulled off the wire, and [`Stack::upstream`](stack::Stack::upstream) to drain
//! whatever's queued to send.

pub mod checksum;
pub mod config;
mod error;
pub mod phy;
pub mod reassembly;
pub mod scheduler;
pub mod socket;
pub mod stack;
pub mod wire;

pub use error::{Error, Result};
