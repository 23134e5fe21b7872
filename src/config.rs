//! System configuration parameters.
//!
//! All tunable parameters for the FanBank controller.  Settings are
//! volatile: the firmware boots to these defaults every time; there is no
//! NVS persistence.  The serde derives exist for the host-side tooling that
//! mirrors this struct, and the round-trip tests pin the encoding.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Hard ceiling on channels a board can carry (sizes the tach counter
/// bank); `SystemConfig::channels` selects how many are actually wired.
pub const MAX_CHANNELS: usize = 4;

/// Core system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Channels ---
    /// Number of fan/temperature channels on this board.
    pub channels: u8,

    // --- Control loop ---
    /// PID update interval (milliseconds).
    pub control_interval_ms: u32,
    /// Default temperature setpoint (°C).
    pub default_target_c: f32,
    /// Default proportional gain.
    pub default_kp: f32,
    /// Default integral gain.
    pub default_ki: f32,
    /// Default derivative gain.
    pub default_kd: f32,
    /// Fail-safe watchdog: force full output after this long without a
    /// fresh temperature sample (milliseconds).
    pub watchdog_timeout_ms: u32,

    // --- Tachometer ---
    /// Fan speed measurement window (milliseconds).
    pub tach_interval_ms: u32,
    /// Tach pulses per fan revolution (two-pole hall sensor).
    pub pulses_per_rev: f32,

    // --- Host links ---
    /// Command link (Link A) poll interval (milliseconds).
    pub command_link_interval_ms: u32,
    /// Framed link (Link B) poll interval (milliseconds); the assembler
    /// consumes at most one byte per fire.
    pub framed_link_interval_ms: u32,
    /// Bounded wait for each expected byte in an open transaction
    /// (milliseconds).
    pub link_read_timeout_ms: u32,
    /// Channel the framed link serves (its frames carry no channel field).
    pub framed_link_channel: u8,
    /// Serial baud rate for both links.
    pub baud: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Channels
            channels: 2,

            // Control loop
            control_interval_ms: 1_000, // 1 Hz
            default_target_c: 40.0,
            default_kp: 1.0,
            default_ki: 0.1,
            default_kd: 0.5,
            watchdog_timeout_ms: 30_000,

            // Tachometer
            tach_interval_ms: 2_000,
            pulses_per_rev: 2.0,

            // Host links
            command_link_interval_ms: 100,
            framed_link_interval_ms: 10,
            link_read_timeout_ms: 4_000,
            framed_link_channel: 1,
            baud: 9_600,
        }
    }
}

impl SystemConfig {
    /// Reject configurations the engine cannot wire.
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 || self.channels as usize > MAX_CHANNELS {
            return Err(Error::Config("channel count out of range"));
        }
        if self.framed_link_channel == 0 || self.framed_link_channel > self.channels {
            return Err(Error::Config("framed link channel not wired"));
        }
        if self.control_interval_ms == 0
            || self.tach_interval_ms == 0
            || self.command_link_interval_ms == 0
            || self.framed_link_interval_ms == 0
        {
            return Err(Error::Config("intervals must be non-zero"));
        }
        if self.watchdog_timeout_ms <= self.control_interval_ms {
            return Err(Error::Config("watchdog must outlast the control interval"));
        }
        if self.pulses_per_rev <= 0.0 {
            return Err(Error::Config("pulses per revolution must be positive"));
        }
        Ok(())
    }
}
