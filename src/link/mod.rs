//! Host-facing serial links.
//!
//! Two independent byte protocols, each owning its own port:
//!
//! - [`command`]: binary handshake link (`HELLO`/`ACK`), used by the bridge
//!   to set targets, gains, and mode, and to poll status and settings.
//! - [`framed`]: `STX`/`ETX` text frames with an ASCII CRC-16 trailer, used
//!   by the front-panel display head.
//!
//! Both are driven from the main loop one transaction (command) or one byte
//! (framed) per update, so neither can starve the control loops.

pub mod command;
pub mod crc;
pub mod framed;

/// Byte-oriented serial port.
///
/// The links are generic over `SerialPort`, so swapping the UART for a mock
/// in tests requires zero changes to the protocol logic.
pub trait SerialPort {
    /// Check if at least one byte is waiting to be read.
    fn available(&self) -> bool;

    /// Read one byte, waiting up to `timeout_ms`.
    /// Returns `None` if nothing arrived in time.
    fn read_byte(&mut self, timeout_ms: u32) -> Option<u8>;

    /// Write one byte.
    fn write_byte(&mut self, byte: u8);

    /// Write a run of bytes.
    fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_byte(b);
        }
    }

    /// Drop buffered I/O and reinitialize the port hardware.
    /// Called after a protocol violation to get back to a clean line.
    fn reset(&mut self);
}

/// A null port that discards all writes and never has data.
/// Useful when a deployment leaves one of the links unconnected.
pub struct NullSerial;

impl SerialPort for NullSerial {
    fn available(&self) -> bool {
        false
    }

    fn read_byte(&mut self, _timeout_ms: u32) -> Option<u8> {
        None
    }

    fn write_byte(&mut self, _byte: u8) {}

    fn reset(&mut self) {}
}
