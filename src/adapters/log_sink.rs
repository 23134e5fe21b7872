//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing every bus event to the logger
//! (UART / USB-CDC in production, stdout in the host simulator).  Handy
//! as the engine tap when no display is attached.

use log::info;

use crate::bus::{Event, EventSink};

/// Adapter that logs every bus [`Event`] to the serial console.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &Event) {
        match event.channel {
            Some(ch) => info!("BUS | ch{} | {}={}", ch, event.topic, event.payload),
            None => info!("BUS | {}={}", event.topic, event.payload),
        }
    }
}
