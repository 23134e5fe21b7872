//! Fuzz target: `FramedLink` byte-at-a-time frame assembly
//!
//! Drives arbitrary byte streams into the framed display link, one byte per
//! cadence fire, exactly as the engine loop would.
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - Every published event is a target write scoped to the served channel
//! - At most one event per delimited frame, so events never exceed the
//!   number of `ETX` bytes seen
//! - After any amount of garbage, one well-formed frame is assembled,
//!   `ACK`ed, and published
//!
//! cargo fuzz run fuzz_frame_assembler

#![no_main]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use heapless::Deque;
use libfuzzer_sys::fuzz_target;

use fanbank::bus::{Event, Outbox, Payload, Topic, PENDING_CAP};
use fanbank::config::SystemConfig;
use fanbank::link::framed::{self, FramedLink, ACK, ETX};
use fanbank::link::SerialPort;

#[derive(Default)]
struct Inner {
    script: VecDeque<u8>,
    written: Vec<u8>,
}

#[derive(Clone, Default)]
struct SharedPort(Rc<RefCell<Inner>>);

impl SerialPort for SharedPort {
    fn available(&self) -> bool {
        !self.0.borrow().script.is_empty()
    }

    fn read_byte(&mut self, _timeout_ms: u32) -> Option<u8> {
        self.0.borrow_mut().script.pop_front()
    }

    fn write_byte(&mut self, byte: u8) {
        self.0.borrow_mut().written.push(byte);
    }

    fn reset(&mut self) {
        self.0.borrow_mut().script.clear();
    }
}

fuzz_target!(|data: &[u8]| {
    let config = SystemConfig::default();
    let port = SharedPort::default();
    let mut link = FramedLink::new(port.clone(), &config);

    port.0.borrow_mut().script.extend(data.iter().copied());

    let mut now_ms = 0u32;
    let mut events = Vec::new();
    for _ in 0..data.len() {
        now_ms += 10;
        let mut queue: Deque<Event, PENDING_CAP> = Deque::new();
        let mut overflowed = false;
        link.poll(now_ms, &mut Outbox::new(&mut queue, &mut overflowed));
        assert!(!overflowed, "one byte per poll can never flood the outbox");
        while let Some(event) = queue.pop_front() {
            events.push(event);
        }
    }

    let etx_count = data.iter().filter(|&&b| b == ETX).count();
    assert!(
        events.len() <= etx_count,
        "{} events from {} frame terminators",
        events.len(),
        etx_count
    );
    for event in &events {
        assert_eq!(event.topic, Topic::Target);
        assert!(event.is_for(config.framed_link_channel));
        assert!(matches!(event.payload, Payload::Int(_)));
    }

    // Whatever state the garbage left behind, the next well-formed frame
    // must land: STX restarts assembly unconditionally.
    let frame = framed::build_frame(framed::WRITE_TARGET, b"42").unwrap();
    port.0.borrow_mut().script.extend(frame.iter().copied());
    let garbage_writes = port.0.borrow().written.len();

    let mut recovered = Vec::new();
    for _ in 0..frame.len() {
        now_ms += 10;
        let mut queue: Deque<Event, PENDING_CAP> = Deque::new();
        let mut overflowed = false;
        link.poll(now_ms, &mut Outbox::new(&mut queue, &mut overflowed));
        assert!(!overflowed);
        while let Some(event) = queue.pop_front() {
            recovered.push(event);
        }
    }

    assert_eq!(
        recovered,
        vec![Event::scoped(
            Topic::Target,
            config.framed_link_channel,
            Payload::Int(42)
        )]
    );
    assert_eq!(&port.0.borrow().written[garbage_writes..], &[ACK]);
});
