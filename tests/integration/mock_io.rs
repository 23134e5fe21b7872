//! In-memory serial ports and event taps for integration tests.
//!
//! `MockSerial` hands the engine one end of a scripted byte stream and
//! keeps the other end cloneable, so a test can feed host traffic and
//! inspect replies while the engine owns the port.  An empty script
//! reads as a timeout, which is how the bounded-read paths get
//! exercised without waiting.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use fanbank::bus::{Event, EventSink, Topic};
use fanbank::link::SerialPort;

// ── Scripted serial port ──────────────────────────────────────

#[derive(Default)]
pub struct SerialInner {
    pub script: VecDeque<u8>,
    pub written: Vec<u8>,
    pub resets: u32,
}

/// Cloneable handle; the engine gets one clone, the test keeps another.
#[derive(Clone, Default)]
pub struct MockSerial(pub Rc<RefCell<SerialInner>>);

#[allow(dead_code)]
impl MockSerial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes the engine will read as host traffic.
    pub fn feed(&self, bytes: &[u8]) {
        self.0.borrow_mut().script.extend(bytes.iter().copied());
    }

    pub fn written(&self) -> Vec<u8> {
        self.0.borrow().written.clone()
    }

    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.0.borrow_mut().written)
    }

    pub fn resets(&self) -> u32 {
        self.0.borrow().resets
    }

    pub fn unread(&self) -> usize {
        self.0.borrow().script.len()
    }
}

impl SerialPort for MockSerial {
    fn available(&self) -> bool {
        !self.0.borrow().script.is_empty()
    }

    fn read_byte(&mut self, _timeout_ms: u32) -> Option<u8> {
        // Script exhaustion models the 4 s timeout expiring.
        self.0.borrow_mut().script.pop_front()
    }

    fn write_byte(&mut self, byte: u8) {
        self.0.borrow_mut().written.push(byte);
    }

    fn reset(&mut self) {
        let mut inner = self.0.borrow_mut();
        inner.script.clear();
        inner.resets += 1;
    }
}

// ── Recording event tap ───────────────────────────────────────

/// Engine tap that records every delivered event for later assertions.
#[derive(Clone, Default)]
pub struct RecordingSink(pub Rc<RefCell<Vec<Event>>>);

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    /// Events matching `topic` scoped to `channel`, in delivery order.
    pub fn for_channel(&self, topic: Topic, channel: u8) -> Vec<Event> {
        self.0
            .borrow()
            .iter()
            .filter(|e| e.topic == topic && e.is_for(channel))
            .cloned()
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &Event) {
        self.0.borrow_mut().push(event.clone());
    }
}
