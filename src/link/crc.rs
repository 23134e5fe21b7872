//! CRC-16/CCITT-FALSE and the ASCII-hex trailer format.
//!
//! Polynomial `0x1021`, init `0xFFFF`, no reflection, no final xor.  The
//! framed link carries the checksum as four ASCII hex digits: emitted
//! lowercase, accepted in either case.

pub fn crc16_ccitt_false(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &b in bytes {
        crc ^= u16::from(b) << 8;
        for _ in 0..8 {
            if (crc & 0x8000) != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Four lowercase hex digits, most significant nibble first.
pub fn encode_hex(crc: u16) -> [u8; 4] {
    [
        HEX[usize::from(crc >> 12) & 0xF],
        HEX[usize::from(crc >> 8) & 0xF],
        HEX[usize::from(crc >> 4) & 0xF],
        HEX[usize::from(crc) & 0xF],
    ]
}

/// Parse exactly four hex digits, either case.
pub fn parse_hex(digits: &[u8]) -> Option<u16> {
    if digits.len() != 4 {
        return None;
    }
    let mut value: u16 = 0;
    for &d in digits {
        let nibble = match d {
            b'0'..=b'9' => d - b'0',
            b'a'..=b'f' => d - b'a' + 10,
            b'A'..=b'F' => d - b'A' + 10,
            _ => return None,
        };
        value = (value << 4) | u16::from(nibble);
    }
    Some(value)
}
