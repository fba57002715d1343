//! The in-window receive reassembly buffer: a contiguous in-order region plus a
//! single out-of-order extent. Deliberately bounded to one hole rather than an
//! arbitrary number of out-of-order ranges — the fixed per-socket memory budget this
//! buffer is built for cannot afford a general interval tree, and the one-outstanding-
//! segment policy upstream never produces more than one hole to track anyway.

/// What happened to a payload handed to [`accept`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The payload fell outside the window; `data_size > 0` segments get an immediate
    /// resync ACK.
    OutOfWindow,
    /// Accepted, but touched neither the in-order region's tail nor the out-of-order
    /// extent cleanly enough to merge — dropped per case 6 (a duplicate or a second
    /// hole we have no room to track).
    Dropped,
    /// Accepted into the in-order region, the out-of-order extent, or both (and
    /// possibly coalesced). `to_send |= ACK` always follows.
    Accepted,
}

/// Apply one inbound TCP segment to a socket's receive window.
///
/// `rx` is the full receive buffer; `rx_data` bytes at its head are already in-order
/// and delivered to the application on the caller's next callback. `[rx_oo_start,
/// rx_oo_end)` is the single out-of-order extent, or `(0, 0)` if none is stashed.
/// `rel` is the payload's offset relative to `rem_seq` (`remote_seq_in_packet -
/// rem_seq`) and `payload` is the segment data.
///
/// Evaluates the out-of-window, in-order-append, tail-extend, head-extend,
/// stash-as-hole, and drop cases in that order, followed by the coalescing fold. The
/// caller is responsible for advancing `rem_seq` by the (possibly just-grown)
/// `*rx_data` and delivering it upward — this function only manages the buffer's
/// shape.
pub fn accept(
    rx: &mut [u8],
    rx_data: &mut usize,
    rx_oo_start: &mut usize,
    rx_oo_end: &mut usize,
    rel: u32,
    payload: &[u8],
) -> Outcome {
    let rx_size = rx.len();
    let rel = rel as usize;
    let mut data_size = payload.len();

    if rel >= rx_size || rel + data_size > rx_size {
        return Outcome::OutOfWindow;
    }

    let outcome = if rel == *rx_data {
        // Case 2: append to the in-order region, clipping to fit the window.
        data_size = data_size.min(rx_size - *rx_data);
        rx[*rx_data..*rx_data + data_size].copy_from_slice(&payload[..data_size]);
        *rx_data += data_size;
        Outcome::Accepted
    } else if *rx_oo_end > 0 && rel == *rx_oo_end {
        // Case 3: extend the out-of-order extent at its tail.
        rx[rel..rel + data_size].copy_from_slice(payload);
        *rx_oo_end = rel + data_size;
        Outcome::Accepted
    } else if *rx_oo_end > 0 && rel + data_size == *rx_oo_start {
        // Case 4: extend the out-of-order extent at its head.
        rx[rel..rel + data_size].copy_from_slice(payload);
        *rx_oo_start = rel;
        Outcome::Accepted
    } else if *rx_oo_end == 0 && rel + data_size < rx_size && rel != *rx_data {
        // Case 5: stash as the single out-of-order extent (only when none is present
        // yet; a second hole has nowhere to go and falls through to case 6).
        rx[rel..rel + data_size].copy_from_slice(payload);
        *rx_oo_start = rel;
        *rx_oo_end = rel + data_size;
        Outcome::Accepted
    } else if rel != 0 {
        Outcome::Dropped
    } else {
        Outcome::Dropped
    };

    if outcome == Outcome::Accepted && *rx_oo_end > 0 && *rx_data == *rx_oo_start {
        // The in-order region's new tail touches the out-of-order extent: fold.
        *rx_data = *rx_oo_end;
        *rx_oo_start = 0;
        *rx_oo_end = 0;
    }

    outcome
}
