//! Alarm LED driver.
//!
//! Tap sink that latches per-channel Alarm events and drives the single
//! front-panel LED with their OR.  The LED stays lit while any channel
//! (fan stall or watchdog fail-safe) still reports an alarm level of 1.
//!
//! On ESP-IDF the pin is written through hw_init; host builds track the
//! state in-memory only.

use log::info;

use crate::bus::{Event, EventSink, Topic};
use crate::config::MAX_CHANNELS;
use crate::drivers::hw_init;
use crate::pins;

pub struct AlarmLed {
    latched: [bool; MAX_CHANNELS],
    lit: bool,
}

impl AlarmLed {
    pub fn new() -> Self {
        Self {
            latched: [false; MAX_CHANNELS],
            lit: false,
        }
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    fn refresh(&mut self, channel: u8) {
        let any = self.latched.iter().any(|&a| a);
        if any == self.lit {
            return;
        }
        self.lit = any;
        hw_init::gpio_write(pins::ALARM_LED_GPIO, any);
        if any {
            info!("alarm led: on (channel {channel})");
        } else {
            info!("alarm led: off");
        }
    }
}

impl Default for AlarmLed {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for AlarmLed {
    fn emit(&mut self, event: &Event) {
        if event.topic != Topic::Alarm {
            return;
        }
        let Some(channel) = event.channel else {
            return;
        };
        let index = usize::from(channel.wrapping_sub(1));
        if index >= MAX_CHANNELS {
            return;
        }
        let Some(level) = event.payload.as_i32() else {
            return;
        };
        self.latched[index] = level != 0;
        self.refresh(channel);
    }
}
