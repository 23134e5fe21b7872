//! Fan PWM drive.
//!
//! Tap sink that turns Output events into LEDC duty writes.  Bus channel
//! `n` (1-based) rides LEDC channel `n - 1` on timer 0.  hw_init owns the
//! register access, so host builds only track the last duty written.

use log::debug;

use crate::bus::{Event, EventSink, Topic};
use crate::config::MAX_CHANNELS;
use crate::drivers::hw_init;

pub struct FanPwm {
    duty: [u8; MAX_CHANNELS],
}

impl FanPwm {
    pub fn new() -> Self {
        Self {
            duty: [0; MAX_CHANNELS],
        }
    }

    /// Last duty written for a 1-based channel; 0 for unknown channels.
    pub fn duty(&self, channel: u8) -> u8 {
        self.duty
            .get(usize::from(channel.wrapping_sub(1)))
            .copied()
            .unwrap_or(0)
    }
}

impl Default for FanPwm {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for FanPwm {
    fn emit(&mut self, event: &Event) {
        if event.topic != Topic::Output {
            return;
        }
        let Some(channel) = event.channel else {
            return;
        };
        let index = usize::from(channel.wrapping_sub(1));
        if index >= MAX_CHANNELS {
            return;
        }
        let Some(value) = event.payload.as_i32() else {
            return;
        };
        let duty = value.clamp(0, 255) as u8;
        hw_init::ledc_set(index as u32, duty);
        self.duty[index] = duty;
        debug!("pwm: fan {channel} duty {duty}");
    }
}
