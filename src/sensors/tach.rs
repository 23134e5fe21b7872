//! Fan tachometer monitoring.
//!
//! Each fan's tach line fires an interrupt per pulse (standard 4-pin fans
//! give two pulses per revolution).  The ISR side only increments an atomic
//! counter; the monitor drains it on its cadence and publishes the computed
//! RPM.  The drain is a single atomic swap, so a pulse landing mid-read is
//! never lost or counted twice.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::bus::{Event, Outbox, Payload, Topic};
use crate::config::{MAX_CHANNELS, SystemConfig};
use crate::scheduler::Cadence;

/// Per-channel pulse counters incremented from interrupt context.
/// `static` because ISR callbacks in ESP-IDF cannot capture closures.
static PULSE_COUNTS: [AtomicU32; MAX_CHANNELS] = [const { AtomicU32::new(0) }; MAX_CHANNELS];

/// Called from the tach GPIO ISR on each pulse edge.  `channel` is
/// 1-based; out-of-range channels are ignored.
pub fn record_pulse(channel: u8) {
    if let Some(counter) = PULSE_COUNTS.get(usize::from(channel.wrapping_sub(1))) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Atomically take and reset the pulse count for one channel.
fn take_pulses(channel: u8) -> u32 {
    match PULSE_COUNTS.get(usize::from(channel.wrapping_sub(1))) {
        Some(counter) => counter.swap(0, Ordering::Relaxed),
        None => 0,
    }
}

/// Publishes `speed` (RPM) and a stall `alarm` flag for one fan.
pub struct FanMonitor {
    channel: u8,
    cadence: Cadence,
    pulses_per_rev: f32,
}

impl FanMonitor {
    pub fn new(channel: u8, config: &SystemConfig) -> Self {
        Self {
            channel,
            cadence: Cadence::new(config.tach_interval_ms),
            pulses_per_rev: config.pulses_per_rev,
        }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Outer-loop poll.  RPM is computed over the window the cadence
    /// actually covered, not the nominal interval, so a late caller does
    /// not inflate the reading.
    pub fn poll(&mut self, now_ms: u32, out: &mut Outbox<'_>) {
        if let Some(window_ms) = self.cadence.tick(now_ms) {
            self.update(window_ms, out);
        }
    }

    fn update(&mut self, window_ms: u32, out: &mut Outbox<'_>) {
        let pulses = take_pulses(self.channel);
        let revs_per_min = pulses as f32 / self.pulses_per_rev * (60_000.0 / window_ms as f32);
        let rpm = revs_per_min as i32;

        out.publish(Event::scoped(Topic::Speed, self.channel, Payload::Int(rpm)));
        // A silent fan is a stalled fan; the alarm level rides every report.
        out.publish(Event::scoped(
            Topic::Alarm,
            self.channel,
            Payload::Int(i32::from(rpm == 0)),
        ));
    }
}
