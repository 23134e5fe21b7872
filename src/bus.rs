//! Event bus: synchronous publish/subscribe fan-out.
//!
//! Everything in the controller talks through here: sensors publish
//! readings, channel controllers publish outputs and mode changes, host
//! links publish configuration writes, and every component sees the full
//! stream and picks out what it cares about.
//!
//! ```text
//!   temp feed ──┐                      ┌──▶ ChannelController (per channel)
//!   host links ─┼──▶ EventBus::publish ┼──▶ CommandLink / FramedLink caches
//!   fan monitor─┘    (registration     ├──▶ tap → PWM / display adapters
//!                     order, sync)     └──▶ ...
//! ```
//!
//! The subscriber table is a fixed-capacity ([`SUBSCRIBER_CAP`]) ordered
//! list of copyable keys; registration past capacity is dropped silently
//! (logged, but not an error: the table is a fixed resource bound, not a
//! growable collection).  Delivery is synchronous and in registration
//! order on the calling thread.
//!
//! A subscriber may publish follow-up events from inside its callback.
//! Those are not dispatched recursively: they land in a bounded pending
//! queue and are delivered, in emission order, after the current delivery
//! pass, all before the outer `publish` returns.  This keeps cascade depth
//! bounded by [`PENDING_CAP`] instead of by stack space; overflow drops the
//! follow-up and logs a warning.

use core::fmt;

use heapless::{Deque, Vec};
use log::warn;

/// Capacity of the subscriber table.
pub const SUBSCRIBER_CAP: usize = 50;

/// Capacity of the follow-up queue inside one `publish` call.
pub const PENDING_CAP: usize = 16;

/// Longest text payload carried on the bus.
pub const TEXT_CAP: usize = 12;

// ---------------------------------------------------------------------------
// Event vocabulary
// ---------------------------------------------------------------------------

/// Fixed, build-time-known event vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    /// Measured temperature for a channel (°C).
    Temp,
    /// Control setpoint for a channel (°C).
    Target,
    /// Fan speed for a channel (RPM).
    Speed,
    /// Actuator drive for a channel (0–255).
    Output,
    /// Control mode: 0 manual, 1 automatic, 2 fail-safe (outbound only).
    Mode,
    /// Proportional gain.
    Kp,
    /// Integral gain.
    Ki,
    /// Derivative gain.
    Kd,
    /// Alarm flag for a channel (0 clear, 1 raised).
    Alarm,
    /// Front-panel key event (global, not channel-scoped).
    Keypress,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temp => "temp",
            Self::Target => "target",
            Self::Speed => "speed",
            Self::Output => "output",
            Self::Mode => "mode",
            Self::Kp => "kp",
            Self::Ki => "ki",
            Self::Kd => "kd",
            Self::Alarm => "alarm",
            Self::Keypress => "keypress",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event payload: numeric, or short text for display-bound values.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Int(i32),
    Float(f32),
    Text(heapless::String<TEXT_CAP>),
}

impl Payload {
    /// Numeric view as `f32`; `None` for text payloads.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Int(v) => Some(*v as f32),
            Self::Float(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    /// Numeric view as `i32` (floats truncate); `None` for text payloads.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) => Some(*v as i32),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:.2}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A published event.  `channel` is `Some` for per-channel quantities and
/// `None` for deployment-global ones; the scoping lives here, never encoded
/// in the topic name.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub topic: Topic,
    pub channel: Option<u8>,
    pub payload: Payload,
}

impl Event {
    /// Channel-scoped event.
    pub fn scoped(topic: Topic, channel: u8, payload: Payload) -> Self {
        Self {
            topic,
            channel: Some(channel),
            payload,
        }
    }

    /// Deployment-global event.
    pub fn global(topic: Topic, payload: Payload) -> Self {
        Self {
            topic,
            channel: None,
            payload,
        }
    }

    /// True when the event is scoped to `channel`.
    pub fn is_for(&self, channel: u8) -> bool {
        self.channel == Some(channel)
    }
}

// ---------------------------------------------------------------------------
// Dispatch seams
// ---------------------------------------------------------------------------

/// Follow-up buffer handed to subscribers during delivery and to components
/// during their scheduled updates.
pub struct Outbox<'a> {
    queue: &'a mut Deque<Event, PENDING_CAP>,
    overflowed: &'a mut bool,
}

impl<'a> Outbox<'a> {
    pub fn new(queue: &'a mut Deque<Event, PENDING_CAP>, overflowed: &'a mut bool) -> Self {
        Self { queue, overflowed }
    }

    /// Queue an event for delivery.  Overflow drops the event and sets the
    /// overflow flag; the bus logs it once per publish pass.
    pub fn publish(&mut self, event: Event) {
        if self.queue.push_back(event).is_err() {
            *self.overflowed = true;
        }
    }
}

/// Routes one delivery to the subscriber identified by `key`.
///
/// The deployment implements this over its closed component set (a match on
/// the key enum); the subscriber set is fixed at build time, so there is no
/// open-ended trait-object registry to manage.
pub trait Dispatch<K> {
    fn deliver(&mut self, key: K, event: &Event, out: &mut Outbox<'_>);
}

/// Consumer of the delivered event stream that lives outside the bus:
/// PWM drive, alarm LED, log adapters.  Sinks only observe; they cannot
/// publish back.
pub trait EventSink {
    fn emit(&mut self, event: &Event);
}

/// Sink that discards everything.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: &Event) {}
}

/// Fans one event stream out to two sinks, first `a` then `b`.  Nest
/// tees to stack more than two.
pub struct Tee<A, B>(pub A, pub B);

impl<A: EventSink, B: EventSink> EventSink for Tee<A, B> {
    fn emit(&mut self, event: &Event) {
        self.0.emit(event);
        self.1.emit(event);
    }
}

// ---------------------------------------------------------------------------
// The bus
// ---------------------------------------------------------------------------

/// Fixed-capacity subscriber registry plus the synchronous fan-out loop.
pub struct EventBus<K: Copy> {
    table: Vec<K, SUBSCRIBER_CAP>,
}

impl<K: Copy> EventBus<K> {
    pub fn new() -> Self {
        Self { table: Vec::new() }
    }

    /// Append a subscriber key.  Registration is permanent; past capacity
    /// the key is dropped silently (with a log line).
    pub fn subscribe(&mut self, key: K) {
        if self.table.push(key).is_err() {
            warn!("bus: subscriber table full ({SUBSCRIBER_CAP}), registration dropped");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.table.len()
    }

    /// Deliver `event` to every subscriber in registration order, then any
    /// follow-ups they emitted (each again to every subscriber, in order),
    /// until the pending queue drains.  Fully synchronous: everything
    /// happens before this call returns.
    pub fn publish<D: Dispatch<K>>(&mut self, event: Event, nodes: &mut D) {
        let mut pending: Deque<Event, PENDING_CAP> = Deque::new();
        let mut overflowed = false;

        // A fresh queue always has room for the first event.
        let _ = pending.push_back(event);

        while let Some(current) = pending.pop_front() {
            for key in &self.table {
                let mut out = Outbox::new(&mut pending, &mut overflowed);
                nodes.deliver(*key, &current, &mut out);
            }
        }

        if overflowed {
            warn!("bus: follow-up queue overflow, event(s) dropped");
        }
    }
}

impl<K: Copy> Default for EventBus<K> {
    fn default() -> Self {
        Self::new()
    }
}
