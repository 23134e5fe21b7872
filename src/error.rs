//! Unified error types for the FanBank firmware.
//!
//! A single `Error` enum that every subsystem converts into, so the outer
//! loop's error handling stays uniform.  All variants are `Copy` and carry
//! at most the offending byte; link aborts happen on the hot path and must
//! not allocate.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A host-link transaction failed.
    Link(LinkError),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Host-link errors
// ---------------------------------------------------------------------------

/// Failure modes of a host-link transaction.
///
/// `Timeout` is a transport error (the line went quiet mid-exchange); the
/// rest are protocol errors (the line spoke, but wrongly).  Both classes
/// abort the transaction; the per-link abort handler decides whether the
/// transport is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// Expected byte did not arrive within the bounded wait.
    Timeout,
    /// Transaction opener was not the hello marker.
    BadHello(u8),
    /// Command byte outside the recognized range.
    BadCommand(u8),
    /// Channel byte does not name a configured channel.
    BadChannel(u8),
    /// Payload outside its accepted numeric range.
    BadValue(u8),
    /// Frame checksum missing, unparsable, or mismatched.
    Checksum,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "read timed out"),
            Self::BadHello(b) => write!(f, "expected hello, got 0x{b:02x}"),
            Self::BadCommand(b) => write!(f, "unknown command 0x{b:02x}"),
            Self::BadChannel(b) => write!(f, "invalid channel {b}"),
            Self::BadValue(b) => write!(f, "value 0x{b:02x} out of range"),
            Self::Checksum => write!(f, "checksum invalid"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_error_converts_into_error() {
        let e: Error = LinkError::BadCommand(0x99).into();
        assert_eq!(e, Error::Link(LinkError::BadCommand(0x99)));
    }

    #[test]
    fn display_includes_offending_byte() {
        let msg = format!("{}", LinkError::BadCommand(0x99));
        assert!(msg.contains("0x99"));
    }
}
