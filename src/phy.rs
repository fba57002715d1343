//! The link-layer driver, modeled as a trait.
//!
//! Frame DMA, clear-to-send polling, and ARP resolution live outside this crate
//! entirely; what's left here is the narrow four-method contract the core actually
//! calls to hand a built frame off to whatever sits underneath (a tuntap device, a
//! bare-metal Ethernet MAC, a Unix socket in tests).
//!
//! [`Stack::upstream`](crate::stack::Stack::upstream) drives this trait directly
//! rather than returning buffers for someone else to send: the callee is responsible
//! for moving the bytes, not just staging them.

/// A send-only view of the link layer. Receiving is not modeled as a trait method:
/// the host calls [`Stack::downstream`](crate::stack::Stack::downstream) directly
/// with each inbound IPv4 datagram it pulls off the wire; this core never polls for
/// input on its own.
pub trait LinkDevice {
    /// Nonblocking readiness probe: can a frame be handed off right now?
    fn clear_to_send(&mut self) -> bool;

    /// Emit the header. Returns `false` on ARP miss or other deferral; the caller
    /// retains `to_send` and retries on a later pass.
    fn send_header(&mut self, header: &[u8]) -> bool;

    /// Append the payload after the header already passed to `send_header`.
    fn send_payload(&mut self, payload: &[u8]);

    /// Finalize and hand off the frame built by the preceding `send_header`/
    /// `send_payload` calls.
    fn finish_send(&mut self);
}
