//! Fuzz target: `CommandLink` transaction handling
//!
//! Plays an arbitrary host byte script against the command link, one
//! transaction per cadence fire, until the line is drained or reset.
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - At most one event per transaction
//! - Published events are scoped to a wired channel and carry in-range
//!   values (`Mode` 0 or 1, `Output` within the 8-bit drive range)
//! - After any amount of garbage, a clean `HELLO` exchange succeeds: a
//!   failed transaction can never wedge the link
//!
//! cargo fuzz run fuzz_command_link

#![no_main]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use heapless::Deque;
use libfuzzer_sys::fuzz_target;

use fanbank::bus::{Event, Outbox, Payload, Topic, PENDING_CAP};
use fanbank::config::SystemConfig;
use fanbank::link::command::{self, CommandLink, ACK, RCVD};
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
    let mut link = CommandLink::new(port.clone(), &config);

    port.0.borrow_mut().script.extend(data.iter().copied());

    // Every transaction consumes at least the opening byte, so the script
    // drains within one poll per input byte.
    let mut now_ms = 0u32;
    for _ in 0..=data.len() {
        if !port.available() {
            break;
        }
        now_ms += 100;
        let mut queue: Deque<Event, PENDING_CAP> = Deque::new();
        let mut overflowed = false;
        link.poll(now_ms, &mut Outbox::new(&mut queue, &mut overflowed));
        assert!(!overflowed, "one transaction can never flood the outbox");

        let mut count = 0;
        while let Some(event) = queue.pop_front() {
            count += 1;
            let channel = event.channel.unwrap();
            assert!((1..=config.channels).contains(&channel));
            match event.topic {
                Topic::Mode => {
                    assert!(matches!(event.payload, Payload::Int(0 | 1)));
                }
                Topic::Output => {
                    let Payload::Int(v) = event.payload else {
                        panic!("output events carry integers");
                    };
                    assert!((0..=255).contains(&v));
                }
                Topic::Target | Topic::Kp | Topic::Ki | Topic::Kd => {
                    assert!(matches!(event.payload, Payload::Float(_)));
                }
                other => panic!("unexpected topic {other} from a host write"),
            }
        }
        assert!(count <= 1, "one transaction published {count} events");
    }

    // The lock is released and the line is clean: a textbook exchange must
    // go through regardless of what the garbage did.
    port.0
        .borrow_mut()
        .script
        .extend([command::HELLO, command::SET_OUTPUT, 1, 0x80]);
    let garbage_writes = port.0.borrow().written.len();

    now_ms += 100;
    let mut queue: Deque<Event, PENDING_CAP> = Deque::new();
    let mut overflowed = false;
    link.poll(now_ms, &mut Outbox::new(&mut queue, &mut overflowed));
    assert!(!overflowed);

    assert_eq!(
        &port.0.borrow().written[garbage_writes..],
        &[ACK, RCVD, RCVD, RCVD]
    );
    assert_eq!(
        queue.pop_front(),
        Some(Event::scoped(Topic::Output, 1, Payload::Int(128)))
    );
    assert!(queue.pop_front().is_none());
});
