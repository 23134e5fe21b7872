//! Engine: the component set and the outer cooperative loop.
//!
//! One `Engine` owns the bus and every core component, and `tick` drives
//! them in a fixed order, once per pass:
//!
//! ```text
//!   tick(now_ms)
//!     ├─ ChannelController 1..n   (control cadence)
//!     ├─ FanMonitor 1..n          (tach cadence)
//!     ├─ CommandLink              (host link A)
//!     └─ FramedLink               (host link B)
//! ```
//!
//! Events a component emits during its poll are staged and published
//! through the bus before the next component runs, so delivery order
//! follows emission order.  Subscription order is fixed at construction:
//! the channel controllers first, then the two links, then the external
//! tap.  The tap is the seam for everything outside the core (PWM drive,
//! display, LEDs) and sees the complete event stream.
//!
//! Fan monitors publish but never subscribe; they are polled directly.

use heapless::Deque;
use log::{info, warn};

use crate::bus::{Dispatch, Event, EventBus, EventSink, Outbox, PENDING_CAP};
use crate::config::{MAX_CHANNELS, SystemConfig};
use crate::control::channel::ChannelController;
use crate::link::SerialPort;
use crate::link::command::CommandLink;
use crate::link::framed::FramedLink;
use crate::sensors::tach::FanMonitor;

/// Subscriber key: the closed set of components reachable from the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeId {
    Channel(u8),
    CommandLink,
    FramedLink,
    Tap,
}

/// The component set behind the bus.  `now_ms` is refreshed at the top of
/// every tick so event handlers see the same clock as the polls.
pub struct Nodes<A, B, S> {
    channels: heapless::Vec<ChannelController, MAX_CHANNELS>,
    fans: heapless::Vec<FanMonitor, MAX_CHANNELS>,
    command_link: CommandLink<A>,
    framed_link: FramedLink<B>,
    tap: S,
    now_ms: u32,
}

impl<A: SerialPort, B: SerialPort, S: EventSink> Dispatch<NodeId> for Nodes<A, B, S> {
    fn deliver(&mut self, key: NodeId, event: &Event, _out: &mut Outbox<'_>) {
        match key {
            NodeId::Channel(ch) => {
                if let Some(controller) = self.channels.get_mut(usize::from(ch).wrapping_sub(1)) {
                    controller.on_event(event, self.now_ms);
                }
            }
            NodeId::CommandLink => self.command_link.on_event(event),
            NodeId::FramedLink => self.framed_link.on_event(event),
            NodeId::Tap => self.tap.emit(event),
        }
    }
}

pub struct Engine<A, B, S> {
    bus: EventBus<NodeId>,
    nodes: Nodes<A, B, S>,
}

impl<A: SerialPort, B: SerialPort, S: EventSink> Engine<A, B, S> {
    pub fn new(config: &SystemConfig, command_port: A, framed_port: B, tap: S) -> Self {
        let mut bus = EventBus::new();
        let mut channels = heapless::Vec::new();
        let mut fans = heapless::Vec::new();

        for ch in 1..=config.channels {
            let _ = channels.push(ChannelController::new(ch, config));
            let _ = fans.push(FanMonitor::new(ch, config));
            bus.subscribe(NodeId::Channel(ch));
        }
        bus.subscribe(NodeId::CommandLink);
        bus.subscribe(NodeId::FramedLink);
        bus.subscribe(NodeId::Tap);

        info!(
            "engine: {} channel(s), {} subscriber(s)",
            config.channels,
            bus.subscriber_count()
        );

        Self {
            bus,
            nodes: Nodes {
                channels,
                fans,
                command_link: CommandLink::new(command_port, config),
                framed_link: FramedLink::new(framed_port, config),
                tap,
                now_ms: 0,
            },
        }
    }

    /// One pass of the cooperative loop.
    pub fn tick(&mut self, now_ms: u32) {
        self.nodes.now_ms = now_ms;

        let mut staged: Deque<Event, PENDING_CAP> = Deque::new();
        let mut overflowed = false;

        for i in 0..self.nodes.channels.len() {
            {
                let mut out = Outbox::new(&mut staged, &mut overflowed);
                self.nodes.channels[i].poll(now_ms, &mut out);
            }
            self.drain(&mut staged);
        }
        for i in 0..self.nodes.fans.len() {
            {
                let mut out = Outbox::new(&mut staged, &mut overflowed);
                self.nodes.fans[i].poll(now_ms, &mut out);
            }
            self.drain(&mut staged);
        }
        {
            let mut out = Outbox::new(&mut staged, &mut overflowed);
            self.nodes.command_link.poll(now_ms, &mut out);
        }
        self.drain(&mut staged);
        {
            let mut out = Outbox::new(&mut staged, &mut overflowed);
            self.nodes.framed_link.poll(now_ms, &mut out);
        }
        self.drain(&mut staged);

        if overflowed {
            warn!("engine: staged event dropped, queue full ({PENDING_CAP})");
        }
    }

    /// Feed an event into the bus from outside the component set: sensor
    /// drivers, the host-sim loop, tests.
    pub fn inject(&mut self, event: Event) {
        self.bus.publish(event, &mut self.nodes);
    }

    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }

    pub fn controller(&self, channel: u8) -> Option<&ChannelController> {
        self.nodes.channels.get(usize::from(channel).wrapping_sub(1))
    }

    pub fn tap(&self) -> &S {
        &self.nodes.tap
    }

    pub fn tap_mut(&mut self) -> &mut S {
        &mut self.nodes.tap
    }

    fn drain(&mut self, staged: &mut Deque<Event, PENDING_CAP>) {
        while let Some(event) = staged.pop_front() {
            self.bus.publish(event, &mut self.nodes);
        }
    }
}
