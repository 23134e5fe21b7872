//! Synchronous command link (host link A).
//!
//! Strict request/response over a raw byte port.  The host opens every
//! exchange with `HELLO`, and each accepted step is answered before the
//! next byte is read:
//!
//! ```text
//! SET exchange                         GET exchange
//! host:  HELLO   cmd   ch   value      host:  HELLO   cmd   ch          ack
//! fw:       ACK   RCVD  RCVD    RCVD   fw:       ACK   RCVD  RCVD  report
//! ```
//!
//! `GET_STATUS` and `GET_SETTINGS` reports are four little-endian 16-bit
//! fields served from caches this link keeps current by listening to the
//! bus, so a host poll never touches the controllers.  Status fields are
//! sent offset-binary (value + 32768) so negative temperatures survive the
//! unsigned wire.
//!
//! Any unexpected byte, out-of-range field, or 4 s silence mid-exchange
//! aborts the transaction: one `ERROR` byte, then the port is reset to a
//! clean line.  At most one transaction runs per update; the scheduler
//! keeps calling in, and calls while the transaction lock is held are
//! no-ops.

use log::{debug, warn};

use crate::bus::{Event, Outbox, Payload, Topic};
use crate::config::{MAX_CHANNELS, SystemConfig};
use crate::error::LinkError;
use crate::link::SerialPort;
use crate::scheduler::Cadence;

pub const HELLO: u8 = 0x01;
pub const ACK: u8 = 0x02;
pub const RCVD: u8 = 0x03;
pub const ERROR: u8 = 0x07;

pub const SET_TARGET: u8 = 0x40;
pub const SET_OUTPUT: u8 = 0x41;
pub const SET_KP: u8 = 0x42;
pub const SET_KI: u8 = 0x43;
pub const SET_KD: u8 = 0x44;
pub const SET_MODE: u8 = 0x45;
pub const GET_STATUS: u8 = 0x46;
pub const GET_SETTINGS: u8 = 0x47;

/// Last-known per-channel state served by `GET_STATUS`.
/// Temperatures are stored pre-scaled (×10) exactly as they go on the wire.
#[derive(Debug, Clone, Copy, Default)]
struct StatusCache {
    temp10: i16,
    target10: i16,
    speed: i16,
    output: i16,
}

/// Last-known per-channel tuning served by `GET_SETTINGS` (gains ×100).
#[derive(Debug, Clone, Copy, Default)]
struct SettingsCache {
    mode: u16,
    kp100: u16,
    ki100: u16,
    kd100: u16,
}

pub struct CommandLink<P> {
    port: P,
    cadence: Cadence,
    channels: u8,
    read_timeout_ms: u32,
    /// Held for the duration of one transaction.
    lock: bool,
    status: [StatusCache; MAX_CHANNELS],
    settings: [SettingsCache; MAX_CHANNELS],
}

impl<P: SerialPort> CommandLink<P> {
    pub fn new(port: P, config: &SystemConfig) -> Self {
        Self {
            port,
            cadence: Cadence::new(config.command_link_interval_ms),
            channels: config.channels,
            read_timeout_ms: config.link_read_timeout_ms,
            lock: false,
            status: [StatusCache::default(); MAX_CHANNELS],
            settings: [SettingsCache::default(); MAX_CHANNELS],
        }
    }

    /// Bus intake: mirror everything the hosts may poll for.
    /// Cache writes are allowed even while a transaction is open.
    pub fn on_event(&mut self, event: &Event) {
        let Some(channel) = event.channel else {
            return;
        };
        if channel < 1 || channel > self.channels {
            return;
        }
        let i = usize::from(channel) - 1;

        match event.topic {
            Topic::Temp => {
                if let Some(v) = event.payload.as_f32() {
                    self.status[i].temp10 = (v * 10.0) as i16;
                }
            }
            Topic::Target => {
                if let Some(v) = event.payload.as_f32() {
                    self.status[i].target10 = (v * 10.0) as i16;
                }
            }
            Topic::Speed => {
                if let Some(v) = event.payload.as_i32() {
                    self.status[i].speed = v as i16;
                }
            }
            Topic::Output => {
                if let Some(v) = event.payload.as_i32() {
                    self.status[i].output = v as i16;
                }
            }
            Topic::Mode => {
                if let Some(v) = event.payload.as_i32() {
                    self.settings[i].mode = v as u16;
                }
            }
            Topic::Kp => {
                if let Some(v) = event.payload.as_f32() {
                    self.settings[i].kp100 = (v * 100.0) as u16;
                }
            }
            Topic::Ki => {
                if let Some(v) = event.payload.as_f32() {
                    self.settings[i].ki100 = (v * 100.0) as u16;
                }
            }
            Topic::Kd => {
                if let Some(v) = event.payload.as_f32() {
                    self.settings[i].kd100 = (v * 100.0) as u16;
                }
            }
            _ => {}
        }
    }

    /// Outer-loop poll; runs at most one transaction when the cadence fires.
    pub fn poll(&mut self, now_ms: u32, out: &mut Outbox<'_>) {
        if self.cadence.tick(now_ms).is_some() {
            self.update(out);
        }
    }

    fn update(&mut self, out: &mut Outbox<'_>) {
        if self.lock || !self.port.available() {
            return;
        }

        self.lock = true;
        if let Err(err) = self.transact(out) {
            warn!("command link: {err}, resetting port");
            self.port.write_byte(ERROR);
            self.port.reset();
        }
        self.lock = false;
    }

    fn transact(&mut self, out: &mut Outbox<'_>) -> Result<(), LinkError> {
        let hello = self.read_u8()?;
        if hello != HELLO {
            return Err(LinkError::BadHello(hello));
        }
        self.port.write_byte(ACK);

        let command = self.read_u8()?;
        if !(SET_TARGET..=GET_SETTINGS).contains(&command) {
            return Err(LinkError::BadCommand(command));
        }
        self.port.write_byte(RCVD);

        let channel = self.read_u8()?;
        if channel < 1 || channel > self.channels {
            return Err(LinkError::BadChannel(channel));
        }
        self.port.write_byte(RCVD);

        match command {
            SET_TARGET => {
                let raw = self.read_u16()?;
                self.port.write_byte(RCVD);
                let target = f32::from(raw) / 100.0;
                debug!("command link: target ch{channel} = {target}");
                out.publish(Event::scoped(Topic::Target, channel, Payload::Float(target)));
            }
            SET_OUTPUT => {
                let raw = self.read_u8()?;
                self.port.write_byte(RCVD);
                debug!("command link: output ch{channel} = {raw}");
                out.publish(Event::scoped(
                    Topic::Output,
                    channel,
                    Payload::Int(i32::from(raw)),
                ));
            }
            SET_KP | SET_KI | SET_KD => {
                let raw = self.read_u16()?;
                self.port.write_byte(RCVD);
                let gain = f32::from(raw) / 100.0;
                let topic = match command {
                    SET_KP => Topic::Kp,
                    SET_KI => Topic::Ki,
                    _ => Topic::Kd,
                };
                debug!("command link: {topic} ch{channel} = {gain}");
                out.publish(Event::scoped(topic, channel, Payload::Float(gain)));
            }
            SET_MODE => {
                let raw = self.read_u8()?;
                if raw > 1 {
                    return Err(LinkError::BadValue(raw));
                }
                self.port.write_byte(RCVD);
                debug!("command link: mode ch{channel} = {raw}");
                out.publish(Event::scoped(Topic::Mode, channel, Payload::Int(i32::from(raw))));
            }
            GET_STATUS => {
                let report = self.status[usize::from(channel) - 1];
                self.write_i16_offset(report.temp10);
                self.write_i16_offset(report.target10);
                self.write_i16_offset(report.speed);
                self.write_i16_offset(report.output);
                self.read_u8()?;
                debug!("command link: status report ch{channel}");
            }
            GET_SETTINGS => {
                let report = self.settings[usize::from(channel) - 1];
                self.write_u16(report.mode);
                self.write_u16(report.kp100);
                self.write_u16(report.ki100);
                self.write_u16(report.kd100);
                self.read_u8()?;
                debug!("command link: settings report ch{channel}");
            }
            _ => return Err(LinkError::BadCommand(command)),
        }

        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8, LinkError> {
        self.port
            .read_byte(self.read_timeout_ms)
            .ok_or(LinkError::Timeout)
    }

    fn read_u16(&mut self) -> Result<u16, LinkError> {
        let lo = self.read_u8()?;
        let hi = self.read_u8()?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    fn write_u16(&mut self, value: u16) {
        self.port.write_bytes(&value.to_le_bytes());
    }

    /// Offset-binary: shift by 32768 so i16 fields ride an unsigned wire.
    fn write_i16_offset(&mut self, value: i16) {
        self.write_u16((value as u16).wrapping_add(0x8000));
    }
}
