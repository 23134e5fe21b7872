//! Framed display link (host link B).
//!
//! Byte-at-a-time stream assembler for the front-panel display head.  The
//! head polls one tracked quantity per request and can push a new target;
//! everything else travels inside delimited, checksummed frames:
//!
//! ```text
//!  STX   command   payload (<= 12 bytes)   CRC-16 as 4 ASCII hex   ETX
//!  0x02  1 byte                            over command + payload  0x03
//! ```
//!
//! `STX` always restarts assembly, so a corrupted or half-seen frame costs
//! exactly one message and never desynchronizes the stream.  `ETX` closes
//! the window and checks the trailing CRC digits; a bad trailer is answered
//! with a single `NAK`, deliberately silent about whether the hex failed to
//! parse or the checksum failed to match.  While the window is full, every
//! further data byte is `NAK`ed so the sender is refused loudly instead of
//! ghosted.
//!
//! Reads are served from strings cached off the bus; the reply reuses the
//! read's code plus [`WRITE_OFFSET`].  The only accepted write is
//! `WRITE_TARGET`.  Keypress events go out unframed, as bare decimal text:
//! the head treats them as a live keystroke feed, not protocol traffic.

use core::fmt::{self, Write as _};

use heapless::{String, Vec};
use log::{debug, warn};

use crate::bus::{Event, Outbox, Payload, Topic};
use crate::config::SystemConfig;
use crate::error::LinkError;
use crate::link::crc;
use crate::link::SerialPort;
use crate::scheduler::Cadence;

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;
pub const ACK: u8 = 0x06;
pub const NAK: u8 = 0x08;

pub const READ_TEMP: u8 = 0x21;
pub const READ_TARGET: u8 = 0x22;
pub const READ_SPEED: u8 = 0x23;
pub const READ_PWM: u8 = 0x24;
pub const READ_KP: u8 = 0x25;
pub const READ_KI: u8 = 0x26;
pub const READ_KD: u8 = 0x27;
pub const READ_MODE: u8 = 0x28;
pub const READ_ALARM: u8 = 0x29;

/// Distance from a read code to the matching write code; replies to
/// `READ_*` are framed under `READ_* + WRITE_OFFSET`.
pub const WRITE_OFFSET: u8 = 0x10;
pub const WRITE_TARGET: u8 = 0x32;

/// Data bytes one inbound window holds (command + payload + CRC digits).
pub const WINDOW_CAP: usize = 16;
/// Longest payload a frame carries.
pub const MAX_PAYLOAD: usize = 12;
/// Full outbound frame: STX + command + payload + CRC digits + ETX.
pub const FRAME_MAX: usize = 2 + MAX_PAYLOAD + 4 + 1;

const CRC_DIGITS: usize = 4;

/// Display-ready strings for every quantity the head can poll.
#[derive(Debug, Default)]
struct QuantityCache {
    temp: String<MAX_PAYLOAD>,
    target: String<MAX_PAYLOAD>,
    speed: String<MAX_PAYLOAD>,
    pwm: String<MAX_PAYLOAD>,
    kp: String<MAX_PAYLOAD>,
    ki: String<MAX_PAYLOAD>,
    kd: String<MAX_PAYLOAD>,
    mode: String<MAX_PAYLOAD>,
    alarm: String<MAX_PAYLOAD>,
}

pub struct FramedLink<P> {
    port: P,
    cadence: Cadence,
    /// The head shows one channel; its reads and writes are scoped here.
    channel: u8,
    window: Vec<u8, WINDOW_CAP>,
    cache: QuantityCache,
}

impl<P: SerialPort> FramedLink<P> {
    pub fn new(port: P, config: &SystemConfig) -> Self {
        Self {
            port,
            cadence: Cadence::new(config.framed_link_interval_ms),
            channel: config.framed_link_channel,
            window: Vec::new(),
            cache: QuantityCache::default(),
        }
    }

    /// Bus intake: keep the display strings current, and pass keystrokes
    /// straight through to the head.
    pub fn on_event(&mut self, event: &Event) {
        if event.topic == Topic::Keypress {
            if let Some(v) = event.payload.as_i32() {
                self.write_decimal(v);
            }
            return;
        }
        if !event.is_for(self.channel) {
            return;
        }

        match event.topic {
            Topic::Temp => {
                if let Some(v) = event.payload.as_f32() {
                    set_cached(&mut self.cache.temp, format_args!("{v:.1}"));
                }
            }
            Topic::Target => {
                if let Some(v) = event.payload.as_f32() {
                    set_cached(&mut self.cache.target, format_args!("{v:.1}"));
                }
            }
            Topic::Speed => {
                if let Some(v) = event.payload.as_i32() {
                    set_cached(&mut self.cache.speed, format_args!("{v}"));
                }
            }
            Topic::Output => {
                if let Some(v) = event.payload.as_i32() {
                    set_cached(&mut self.cache.pwm, format_args!("{v}"));
                }
            }
            Topic::Kp => {
                if let Some(v) = event.payload.as_f32() {
                    set_cached(&mut self.cache.kp, format_args!("{v:.2}"));
                }
            }
            Topic::Ki => {
                if let Some(v) = event.payload.as_f32() {
                    set_cached(&mut self.cache.ki, format_args!("{v:.2}"));
                }
            }
            Topic::Kd => {
                if let Some(v) = event.payload.as_f32() {
                    set_cached(&mut self.cache.kd, format_args!("{v:.2}"));
                }
            }
            Topic::Mode => {
                if let Some(v) = event.payload.as_i32() {
                    set_cached(&mut self.cache.mode, format_args!("{v}"));
                }
            }
            Topic::Alarm => {
                if let Some(v) = event.payload.as_i32() {
                    set_cached(&mut self.cache.alarm, format_args!("{v}"));
                }
            }
            Topic::Keypress => {}
        }
    }

    /// Outer-loop poll; consumes at most one inbound byte when the cadence
    /// fires, so assembly never stalls the loop.
    pub fn poll(&mut self, now_ms: u32, out: &mut Outbox<'_>) {
        if self.cadence.tick(now_ms).is_some() {
            self.update(out);
        }
    }

    fn update(&mut self, out: &mut Outbox<'_>) {
        if !self.port.available() {
            return;
        }
        let Some(byte) = self.port.read_byte(0) else {
            return;
        };

        match byte {
            STX => self.window.clear(),
            ETX => self.finish(out),
            _ => {
                if self.window.push(byte).is_err() {
                    self.port.write_byte(NAK);
                }
            }
        }
    }

    /// `ETX` seen: validate the window and act on it.  Either way the
    /// window is spent.
    fn finish(&mut self, out: &mut Outbox<'_>) {
        let mut body: Vec<u8, WINDOW_CAP> = Vec::new();
        let valid = match validate(&self.window) {
            Some(content) => {
                body.extend_from_slice(content).ok();
                true
            }
            None => false,
        };
        self.window.clear();

        if valid {
            self.dispatch(&body, out);
        } else {
            debug!("framed link: {}", LinkError::Checksum);
            self.port.write_byte(NAK);
        }
    }

    fn dispatch(&mut self, body: &[u8], out: &mut Outbox<'_>) {
        let command = body[0];
        let payload = &body[1..];

        match command {
            READ_TEMP..=READ_ALARM => {
                self.port.write_byte(ACK);
                let text = self.cached(command).clone();
                self.respond(command + WRITE_OFFSET, text.as_bytes());
            }
            WRITE_TARGET => match parse_decimal(payload) {
                Some(value) => {
                    self.port.write_byte(ACK);
                    debug!("framed link: target ch{} = {value}", self.channel);
                    out.publish(Event::scoped(
                        Topic::Target,
                        self.channel,
                        Payload::Int(value),
                    ));
                }
                None => {
                    warn!("framed link: unparseable target payload");
                    self.port.write_byte(NAK);
                }
            },
            _ => self.port.write_byte(NAK),
        }
    }

    fn cached(&self, read_command: u8) -> &String<MAX_PAYLOAD> {
        match read_command {
            READ_TEMP => &self.cache.temp,
            READ_TARGET => &self.cache.target,
            READ_SPEED => &self.cache.speed,
            READ_PWM => &self.cache.pwm,
            READ_KP => &self.cache.kp,
            READ_KI => &self.cache.ki,
            READ_KD => &self.cache.kd,
            READ_MODE => &self.cache.mode,
            _ => &self.cache.alarm,
        }
    }

    fn respond(&mut self, command: u8, payload: &[u8]) {
        if let Some(frame) = build_frame(command, payload) {
            self.port.write_bytes(&frame);
        }
    }

    fn write_decimal(&mut self, value: i32) {
        let mut text: String<12> = String::new();
        if write!(text, "{value}").is_ok() {
            self.port.write_bytes(text.as_bytes());
        }
    }
}

/// Frame and CRC-stamp one outbound message.  `None` only when the payload
/// exceeds [`MAX_PAYLOAD`].  The same CRC routine checks inbound frames in
/// [`validate`]; there is exactly one checksum implementation on this link.
pub fn build_frame(command: u8, payload: &[u8]) -> Option<Vec<u8, FRAME_MAX>> {
    if payload.len() > MAX_PAYLOAD {
        return None;
    }
    let mut frame: Vec<u8, FRAME_MAX> = Vec::new();
    frame.push(STX).ok()?;
    frame.push(command).ok()?;
    frame.extend_from_slice(payload).ok()?;
    let crc = crc::crc16_ccitt_false(&frame[1..]);
    frame.extend_from_slice(&crc::encode_hex(crc)).ok()?;
    frame.push(ETX).ok()?;
    Some(frame)
}

/// Returns the message body (command + payload) when the trailing four hex
/// digits match the CRC of everything before them.
fn validate(window: &[u8]) -> Option<&[u8]> {
    // Shortest legal window: one command byte plus the CRC digits.
    if window.len() < 1 + CRC_DIGITS {
        return None;
    }
    let (body, digits) = window.split_at(window.len() - CRC_DIGITS);
    let claimed = crc::parse_hex(digits)?;
    if crc::crc16_ccitt_false(body) != claimed {
        return None;
    }
    Some(body)
}

fn parse_decimal(payload: &[u8]) -> Option<i32> {
    let text = core::str::from_utf8(payload).ok()?;
    text.trim().parse().ok()
}

fn set_cached(slot: &mut String<MAX_PAYLOAD>, args: fmt::Arguments<'_>) {
    slot.clear();
    // A value too wide for the frame is dropped, not truncated mid-digit.
    if slot.write_fmt(args).is_err() {
        slot.clear();
    }
}
