//! The crate-wide error type.
//!
//! Kept deliberately small: there is exactly one error type, it carries no backtrace
//! or heap-allocated message, and it is only ever returned from parsing and
//! buffer-sizing code. Protocol-level failures (a malformed frame, a socket with no
//! room) are everyday occurrences on a network and are handled by dropping, not by
//! raising; see [`crate::stack::Stack::downstream`].

use core::fmt;

/// Something went wrong decoding a frame or sizing a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The buffer was shorter than the header it claims to hold, or a length field in the
    /// header disagreed with the buffer it was found in.
    Truncated,
    /// The IPv4 version/IHL byte was not `0x45` (IPv4, no options).
    UnsupportedIpVersion,
    /// A checksum did not validate.
    Checksum,
    /// A payload did not fit in the caller-supplied buffer.
    BufferTooSmall,
    /// The handle named a socket slot that is currently `FREE` (never opened, or
    /// already closed).
    InvalidSocket,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Truncated => write!(f, "truncated packet"),
            Error::UnsupportedIpVersion => write!(f, "unsupported IP version or IHL"),
            Error::Checksum => write!(f, "checksum mismatch"),
            Error::BufferTooSmall => write!(f, "buffer too small"),
            Error::InvalidSocket => write!(f, "socket handle does not name an open socket"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;
